//! Product catalog endpoints.

use shopkeep_core::{CountStat, Product, ProductForm, ProductPage, Timeframe, DEFAULT_CHUNK_SIZE};
use tracing::debug;

use crate::error::ClientResult;
use crate::http::{query, ApiClient, Query};
use crate::normalize;

/// Parameters of `GET /products`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub chunk_size: u64,
    pub skip: u64,
    pub supplier: Option<String>,
}

impl Default for ProductQuery {
    fn default() -> Self {
        ProductQuery {
            search: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            skip: 0,
            supplier: None,
        }
    }
}

impl ProductQuery {
    pub fn search(term: impl Into<String>, limit: u64) -> Self {
        ProductQuery {
            search: Some(term.into()),
            chunk_size: limit,
            ..Default::default()
        }
    }

    fn to_query(&self) -> Query {
        let mut q = query(&[("chunkSize", self.chunk_size), ("skip", self.skip)]);
        if let Some(search) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            q.push(("search".into(), search.trim().to_string()));
        }
        if let Some(supplier) = &self.supplier {
            q.push(("supplier".into(), supplier.clone()));
        }
        q
    }
}

pub struct ProductsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> ProductsApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        ProductsApi { client }
    }

    pub async fn list(&self, params: &ProductQuery) -> ClientResult<ProductPage> {
        let body = self.client.get_value("/products", params.to_query()).await?;
        let page = normalize::products(&body)?;
        debug!(
            count = page.products.len(),
            skip = params.skip,
            search = ?params.search,
            "Loaded products"
        );
        Ok(page)
    }

    pub async fn create(&self, form: &ProductForm) -> ClientResult<Product> {
        let body = self.client.post_value("/products", form).await?;
        normalize::product(&body)
    }

    /// Updates a product. Returns the server's copy when it sends one back.
    pub async fn update(&self, id: &str, form: &ProductForm) -> ClientResult<Option<Product>> {
        let body = self
            .client
            .put_value("/products", query(&[("id", id)]), form)
            .await?;
        Ok(normalize::product(&body).ok())
    }

    pub async fn delete(&self, id: &str) -> ClientResult<()> {
        self.client
            .delete_value("/products", query(&[("id", id)]))
            .await?;
        Ok(())
    }

    pub async fn count(&self, timeframe: Timeframe) -> ClientResult<CountStat> {
        let body = self
            .client
            .get_cached_value(
                "/products/count",
                query(&[("search", timeframe.as_str())]),
                None,
            )
            .await?;
        Ok(normalize::count_stat(&body))
    }
}
