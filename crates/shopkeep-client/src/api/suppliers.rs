//! Supplier directory endpoints.

use shopkeep_core::{CountStat, Supplier, SupplierForm, Timeframe};

use crate::error::ClientResult;
use crate::http::{query, ApiClient, Query};
use crate::normalize;

/// Parameters of `GET /suppliers`.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplierQuery {
    pub search: Option<String>,
    pub limit: u64,
    pub skip: u64,
}

impl Default for SupplierQuery {
    fn default() -> Self {
        SupplierQuery {
            search: None,
            limit: 100,
            skip: 0,
        }
    }
}

impl SupplierQuery {
    pub fn search(term: impl Into<String>, limit: u64) -> Self {
        SupplierQuery {
            search: Some(term.into()),
            limit,
            skip: 0,
        }
    }

    fn to_query(&self) -> Query {
        let mut q = query(&[("limit", self.limit), ("skip", self.skip)]);
        if let Some(search) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            q.push(("search".into(), search.trim().to_string()));
        }
        q
    }
}

pub struct SuppliersApi<'a> {
    client: &'a ApiClient,
}

impl<'a> SuppliersApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        SuppliersApi { client }
    }

    pub async fn list(&self, params: &SupplierQuery) -> ClientResult<Vec<Supplier>> {
        let body = self.client.get_value("/suppliers", params.to_query()).await?;
        normalize::suppliers(&body)
    }

    pub async fn create(&self, form: &SupplierForm) -> ClientResult<Supplier> {
        let body = self.client.post_value("/suppliers", form).await?;
        normalize::supplier(&body)
    }

    pub async fn update(&self, id: &str, form: &SupplierForm) -> ClientResult<Option<Supplier>> {
        let body = self
            .client
            .put_value("/suppliers", query(&[("id", id)]), form)
            .await?;
        Ok(normalize::supplier(&body).ok())
    }

    pub async fn delete(&self, id: &str) -> ClientResult<()> {
        self.client
            .delete_value("/suppliers", query(&[("id", id)]))
            .await?;
        Ok(())
    }

    pub async fn count(&self, timeframe: Timeframe) -> ClientResult<CountStat> {
        let body = self
            .client
            .get_cached_value(
                "/suppliers/count",
                query(&[("search", timeframe.as_str())]),
                None,
            )
            .await?;
        Ok(normalize::count_stat(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthManager, TokenGrant};
    use crate::config::ClientConfig;
    use crate::mock::{MockReply, MockTransport};
    use crate::transport::Method;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_list_and_create() {
        let mock = Arc::new(MockTransport::new());
        mock.always(
            Method::Get,
            "/suppliers",
            MockReply::ok(json!([{"_id": "s1", "name": "Metro Traders"}])),
        )
        .always(
            Method::Post,
            "/suppliers",
            MockReply::ok(json!({"supplier": {"_id": "s2", "name": "Acme"}})),
        );
        let auth = Arc::new(AuthManager::new(mock.clone()));
        auth.sign_in(TokenGrant {
            token: "t".into(),
            refresh_token: None,
            expires_in: None,
            user: None,
        })
        .await
        .unwrap();
        let client = ApiClient::new(mock.clone(), auth, &ClientConfig::default());

        let list = client
            .suppliers()
            .list(&SupplierQuery::search("metro", 20))
            .await
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(mock.requests()[0].query_param("limit"), Some("20"));

        let created = client
            .suppliers()
            .create(&SupplierForm {
                name: "Acme".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created.id.as_str(), "s2");
    }
}
