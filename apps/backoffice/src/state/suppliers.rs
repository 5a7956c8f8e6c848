//! # Suppliers State
//!
//! Supplier directory with optimistic edits and deletes.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shopkeep_client::{ApiClient, ClientResult, SupplierQuery};
use shopkeep_core::validation::validate_supplier_form;
use shopkeep_core::{CoreError, OptimisticList, Supplier, SupplierForm};
use tracing::{debug, info, warn};

use super::{lock, surface};
use crate::error::{UiError, UiResult};
use crate::notifications::Notifications;
use crate::search::SearchSource;

pub struct SuppliersState {
    client: ApiClient,
    notifications: Arc<Notifications>,
    list: Mutex<OptimisticList<Supplier>>,
}

impl SuppliersState {
    pub fn new(client: ApiClient, notifications: Arc<Notifications>) -> Self {
        SuppliersState {
            client,
            notifications,
            list: Mutex::new(OptimisticList::new()),
        }
    }

    pub fn suppliers(&self) -> Vec<Supplier> {
        lock(&self.list).items().to_vec()
    }

    pub fn get(&self, id: &str) -> Option<Supplier> {
        lock(&self.list).get(id).cloned()
    }

    pub fn clear(&self) {
        lock(&self.list).replace_all(Vec::new());
    }

    pub async fn load(&self) -> UiResult<usize> {
        let suppliers = self
            .client
            .suppliers()
            .list(&SupplierQuery::default())
            .await
            .map_err(|e| surface(&self.notifications, e))?;
        let count = suppliers.len();
        lock(&self.list).replace_all(suppliers);
        info!(count, "Suppliers loaded");
        Ok(count)
    }

    pub async fn create(&self, form: &SupplierForm) -> UiResult<Supplier> {
        validate_supplier_form(form)?;
        let created = self
            .client
            .suppliers()
            .create(form)
            .await
            .map_err(|e| surface(&self.notifications, e))?;
        lock(&self.list).upsert(created.clone());
        info!(id = %created.id, name = %created.name, "Supplier created");
        self.notifications
            .success(format!("Supplier {} added", created.name));
        Ok(created)
    }

    pub async fn update(&self, id: &str, form: &SupplierForm) -> UiResult<()> {
        validate_supplier_form(form)?;
        let ticket = lock(&self.list)
            .update(id, |supplier| form.apply_to(supplier))
            .ok_or_else(|| UiError::from(CoreError::SupplierNotFound(id.to_string())))?;

        match self.client.suppliers().update(id, form).await {
            Ok(server) => {
                let outcome = lock(&self.list).commit(ticket, move |supplier| {
                    if let Some(server) = server {
                        *supplier = server;
                    }
                });
                debug!(id = %id, outcome = ?outcome, "Supplier update confirmed");
                Ok(())
            }
            Err(e) => {
                let outcome = lock(&self.list).rollback(ticket);
                warn!(id = %id, outcome = ?outcome, error = %e, "Supplier update rolled back");
                Err(surface(&self.notifications, e))
            }
        }
    }

    pub async fn delete(&self, id: &str) -> UiResult<()> {
        let ticket = lock(&self.list)
            .remove(id)
            .ok_or_else(|| UiError::from(CoreError::SupplierNotFound(id.to_string())))?;

        match self.client.suppliers().delete(id).await {
            Ok(()) => {
                lock(&self.list).commit(ticket, |_| {});
                info!(id = %id, "Supplier deleted");
                Ok(())
            }
            Err(e) => {
                let outcome = lock(&self.list).rollback(ticket);
                warn!(id = %id, outcome = ?outcome, error = %e, "Supplier delete rolled back");
                let mut err = UiError::from(e);
                err.message = format!("Could not delete the supplier: {}", err.message);
                Err(surface(&self.notifications, err))
            }
        }
    }
}

#[async_trait]
impl SearchSource<Supplier> for SuppliersState {
    fn cached(&self) -> Vec<Supplier> {
        self.suppliers()
    }

    async fn fetch(&self, query: &str, limit: u64) -> ClientResult<Vec<Supplier>> {
        self.client
            .suppliers()
            .list(&SupplierQuery::search(query, limit))
            .await
    }

    fn merge(&self, found: Vec<Supplier>) -> usize {
        lock(&self.list).extend_unique(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shopkeep_client::{AuthManager, ClientConfig, Method, MockReply, MockTransport, TokenGrant};
    use std::time::Duration;

    async fn setup(mock: Arc<MockTransport>) -> (SuppliersState, Arc<Notifications>) {
        let auth = Arc::new(AuthManager::new(mock.clone()));
        auth.sign_in(TokenGrant {
            token: "t".into(),
            refresh_token: None,
            expires_in: None,
            user: None,
        })
        .await
        .unwrap();
        let client = ApiClient::new(mock, auth, &ClientConfig::default());
        let notes = Arc::new(Notifications::new(Duration::from_secs(5)));
        (SuppliersState::new(client, notes.clone()), notes)
    }

    #[tokio::test]
    async fn test_delete_failure_restores_supplier() {
        let mock = Arc::new(MockTransport::new());
        mock.always(
            Method::Get,
            "/suppliers",
            MockReply::ok(json!([
                {"_id": "s1", "name": "Metro Traders"},
                {"_id": "s2", "name": "Acme"}
            ])),
        )
        .always(
            Method::Delete,
            "/suppliers",
            MockReply::json(400, json!({"message": "Supplier has products"})),
        );
        let (state, notes) = setup(mock.clone()).await;
        state.load().await.unwrap();
        let before = state.suppliers();

        let err = state.delete("s1").await.unwrap_err();
        assert_eq!(
            err.message,
            "Could not delete the supplier: Supplier has products"
        );
        assert_eq!(state.suppliers(), before);
        assert_eq!(notes.active().len(), 1);
    }

    #[tokio::test]
    async fn test_update_applies_before_response() {
        let mock = Arc::new(MockTransport::new());
        mock.always(
            Method::Get,
            "/suppliers",
            MockReply::ok(json!([{"_id": "s1", "name": "Metro"}])),
        )
        .always(Method::Put, "/suppliers", MockReply::ok(json!({"message": "ok"})));
        let (state, _) = setup(mock.clone()).await;
        state.load().await.unwrap();

        let form = SupplierForm {
            name: "Metro Traders".into(),
            phone: Some("0300-1234567".into()),
            ..Default::default()
        };
        state.update("s1", &form).await.unwrap();
        let supplier = state.get("s1").unwrap();
        assert_eq!(supplier.name, "Metro Traders");
        assert_eq!(supplier.phone.as_deref(), Some("0300-1234567"));
    }

    #[tokio::test]
    async fn test_invalid_form_makes_no_call() {
        let mock = Arc::new(MockTransport::new());
        let (state, _) = setup(mock.clone()).await;

        let err = state
            .create(&SupplierForm::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(mock.total_calls(), 0);
    }
}
