//! # Products State
//!
//! The catalog as the UI sees it, with optimistic edits of products and
//! their inventory lots.
//!
//! ## Adding a Lot
//! ```text
//! add_inventory(product, form)
//!   │ validate (selling ≥ cost, stock ≥ 0) ── fail ──► ValidationError, no request
//!   ▼
//! lot temp-<millis> pushed onto the product  ◄── UI shows it, dialog closes
//!   │
//!   ├─ POST /inventory ─────────── fail ──► rollback
//!   ├─ POST /product-inventory ─── fail ──► rollback + DELETE /inventory (best effort)
//!   ▼
//! temp id swapped for the server id, link id recorded
//! ```
//!
//! Until the swap, the lot can be selected, edited and removed by its temp
//! id. Edits made meanwhile are pushed to the server right after the swap;
//! a lot removed meanwhile is deleted on the server instead.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use shopkeep_client::{ApiClient, ClientResult, ProductQuery};
use shopkeep_core::validation::{validate_inventory_form, validate_product_form};
use shopkeep_core::{
    CoreError, Inventory, InventoryForm, OptimisticList, Outcome, Pagination, Product,
    ProductForm, RecordId, TempIdGenerator, DEFAULT_CHUNK_SIZE,
};
use shopkeep_db::CacheRepository;
use tracing::{debug, info, warn};

use super::{lock, surface};
use crate::error::{ErrorCode, UiError, UiResult};
use crate::notifications::Notifications;
use crate::search::SearchSource;

/// Cache key of the last loaded catalog chunk, served while offline.
pub const PRODUCTS_CACHE_KEY: &str = "products:list";

struct Catalog {
    list: OptimisticList<Product>,
    next_skip: u64,
    has_more: bool,
    supplier: Option<String>,
}

pub struct ProductsState {
    client: ApiClient,
    notifications: Arc<Notifications>,
    store: Option<CacheRepository>,
    catalog: Mutex<Catalog>,
    temp_ids: TempIdGenerator,
    chunk_size: u64,
    clock: fn() -> i64,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn has_more(pagination: Option<Pagination>, received: usize, chunk_size: u64) -> bool {
    pagination
        .map(|p| p.has_more())
        .unwrap_or(received as u64 >= chunk_size)
}

impl ProductsState {
    pub fn new(client: ApiClient, notifications: Arc<Notifications>) -> Self {
        ProductsState {
            client,
            notifications,
            store: None,
            catalog: Mutex::new(Catalog {
                list: OptimisticList::new(),
                next_skip: 0,
                has_more: false,
                supplier: None,
            }),
            temp_ids: TempIdGenerator::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            clock: now_millis,
        }
    }

    /// Keeps a copy of the catalog in the local store for offline starts.
    pub fn with_store(mut self, store: CacheRepository) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Clock used to mint temp ids (epoch millis).
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn products(&self) -> Vec<Product> {
        lock(&self.catalog).list.items().to_vec()
    }

    pub fn get(&self, id: &str) -> Option<Product> {
        lock(&self.catalog).list.get(id).cloned()
    }

    pub fn has_more(&self) -> bool {
        lock(&self.catalog).has_more
    }

    /// Forgets everything, e.g. after the session ends.
    pub fn clear(&self) {
        let mut catalog = lock(&self.catalog);
        catalog.list.replace_all(Vec::new());
        catalog.next_skip = 0;
        catalog.has_more = false;
        catalog.supplier = None;
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Loads the first chunk, optionally filtered by supplier.
    ///
    /// When the server is unreachable the last saved catalog is shown.
    pub async fn load(&self, supplier: Option<String>) -> UiResult<usize> {
        let params = ProductQuery {
            chunk_size: self.chunk_size,
            supplier: supplier.clone(),
            ..Default::default()
        };

        match self.client.products().list(&params).await {
            Ok(page) => {
                let received = page.products.len();
                {
                    let mut catalog = lock(&self.catalog);
                    catalog.list.replace_all(page.products);
                    catalog.next_skip = received as u64;
                    catalog.has_more = has_more(page.pagination, received, self.chunk_size);
                    catalog.supplier = supplier.clone();
                }
                if supplier.is_none() {
                    self.persist().await;
                }
                info!(count = received, supplier = ?supplier, "Catalog loaded");
                Ok(received)
            }
            Err(e) if e.is_retryable() && supplier.is_none() => match self.saved().await {
                Some(saved) => {
                    let count = saved.len();
                    {
                        let mut catalog = lock(&self.catalog);
                        catalog.list.replace_all(saved);
                        catalog.next_skip = count as u64;
                        catalog.has_more = false;
                        catalog.supplier = None;
                    }
                    warn!(error = %e, count, "Server unreachable, showing saved catalog");
                    self.notifications
                        .info("You are offline. Showing the last saved products.");
                    Ok(count)
                }
                None => Err(surface(&self.notifications, e)),
            },
            Err(e) => Err(surface(&self.notifications, e)),
        }
    }

    /// Loads the next chunk. Returns how many new products were added.
    pub async fn load_more(&self) -> UiResult<usize> {
        let params = {
            let catalog = lock(&self.catalog);
            if !catalog.has_more {
                return Ok(0);
            }
            ProductQuery {
                chunk_size: self.chunk_size,
                skip: catalog.next_skip,
                supplier: catalog.supplier.clone(),
                ..Default::default()
            }
        };

        let page = self
            .client
            .products()
            .list(&params)
            .await
            .map_err(|e| surface(&self.notifications, e))?;

        let received = page.products.len();
        let added = {
            let mut catalog = lock(&self.catalog);
            let added = catalog.list.extend_unique(page.products);
            catalog.next_skip += received as u64;
            catalog.has_more = has_more(page.pagination, received, self.chunk_size);
            added
        };
        debug!(received, added, skip = params.skip, "Loaded more products");
        Ok(added)
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = self.products();
        if let Err(e) = store.put(PRODUCTS_CACHE_KEY, &snapshot).await {
            warn!(error = %e, "Could not save catalog locally");
        }
    }

    async fn saved(&self) -> Option<Vec<Product>> {
        let store = self.store.as_ref()?;
        match store.get::<Vec<Product>>(PRODUCTS_CACHE_KEY).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(error = %e, "Could not read saved catalog");
                None
            }
        }
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Creates a product. Not optimistic: the server assigns the id.
    pub async fn create_product(&self, form: &ProductForm) -> UiResult<Product> {
        {
            let catalog = lock(&self.catalog);
            validate_product_form(form, catalog.list.items(), None)?;
        }

        let created = self
            .client
            .products()
            .create(form)
            .await
            .map_err(|e| surface(&self.notifications, e))?;

        lock(&self.catalog).list.upsert(created.clone());
        self.persist().await;
        info!(id = %created.id, product_id = %created.product_id, "Product created");
        self.notifications
            .success(format!("Product {} created", created.product_name));
        Ok(created)
    }

    pub async fn update_product(&self, id: &str, form: &ProductForm) -> UiResult<()> {
        let ticket = {
            let mut catalog = lock(&self.catalog);
            validate_product_form(form, catalog.list.items(), Some(id))?;
            catalog
                .list
                .update(id, |product| form.apply_to(product))
                .ok_or_else(|| UiError::from(CoreError::ProductNotFound(id.to_string())))?
        };

        match self.client.products().update(id, form).await {
            Ok(server) => {
                let outcome = lock(&self.catalog).list.commit(ticket, move |product| {
                    if let Some(server) = server {
                        adopt_server_copy(product, server);
                    }
                });
                debug!(id = %id, outcome = ?outcome, "Product update confirmed");
                self.persist().await;
                Ok(())
            }
            Err(e) => {
                let outcome = lock(&self.catalog).list.rollback(ticket);
                warn!(id = %id, outcome = ?outcome, error = %e, "Product update rolled back");
                Err(surface(&self.notifications, e))
            }
        }
    }

    pub async fn delete_product(&self, id: &str) -> UiResult<()> {
        let ticket = lock(&self.catalog)
            .list
            .remove(id)
            .ok_or_else(|| UiError::from(CoreError::ProductNotFound(id.to_string())))?;

        match self.client.products().delete(id).await {
            Ok(()) => {
                lock(&self.catalog).list.commit(ticket, |_| {});
                self.persist().await;
                info!(id = %id, "Product deleted");
                Ok(())
            }
            Err(e) => {
                let outcome = lock(&self.catalog).list.rollback(ticket);
                warn!(id = %id, outcome = ?outcome, error = %e, "Product delete rolled back");
                let mut err = UiError::from(e);
                err.message = format!("Could not delete the product: {}", err.message);
                Err(surface(&self.notifications, err))
            }
        }
    }

    // =========================================================================
    // Inventory Lots
    // =========================================================================

    /// Adds a lot to `product_id` (the product's record id).
    ///
    /// Returns the lot as confirmed by the server.
    pub async fn add_inventory(&self, product_id: &str, form: &InventoryForm) -> UiResult<Inventory> {
        validate_inventory_form(form)?;

        let temp = self.temp_ids.next((self.clock)());
        let temp_id = temp.to_string();
        let lot = Inventory {
            id: RecordId::from(temp),
            cost: form.cost,
            selling_price: form.selling_price,
            stock: form.stock,
            created_at: Utc::now(),
            link_id: None,
        };

        let (ticket, server_product_id) = {
            let mut catalog = lock(&self.catalog);
            let product = catalog
                .list
                .get(product_id)
                .ok_or_else(|| UiError::from(CoreError::ProductNotFound(product_id.to_string())))?;
            let server_product_id = product.id.committed().map(str::to_string).ok_or_else(|| {
                UiError::new(ErrorCode::NotFound, "The product has not been saved yet")
            })?;
            let ticket = catalog
                .list
                .update(product_id, move |product| product.inventories.push(lot))
                .ok_or_else(|| UiError::from(CoreError::ProductNotFound(product_id.to_string())))?;
            (ticket, server_product_id)
        };
        info!(product_id = %product_id, temp_id = %temp_id, "Inventory added optimistically");

        let created = match self.client.inventory().create(form).await {
            Ok(created) => created,
            Err(e) => {
                self.undo_add(ticket, product_id, &temp_id);
                return Err(surface(&self.notifications, e));
            }
        };

        let link_id = match self
            .client
            .inventory()
            .link(&server_product_id, created.id.as_str())
            .await
        {
            Ok(link_id) => link_id,
            Err(e) => {
                self.undo_add(ticket, product_id, &temp_id);
                if let Err(cleanup) = self.client.inventory().delete(created.id.as_str()).await {
                    warn!(
                        inventory_id = %created.id,
                        error = %cleanup,
                        "Could not delete unlinked inventory"
                    );
                }
                return Err(surface(&self.notifications, e));
            }
        };

        let swapped = {
            let mut catalog = lock(&self.catalog);
            let mut swapped = None;
            let outcome = catalog.list.commit(ticket, |product| {
                swapped = swap_temp_lot(product, &temp_id, &created, &link_id);
            });
            if outcome == Outcome::Superseded {
                // The product was edited meanwhile; swap the id in its current state.
                swapped = None;
                if let Some(mut product) = catalog.list.get(product_id).cloned() {
                    swapped = swap_temp_lot(&mut product, &temp_id, &created, &link_id);
                    if swapped.is_some() {
                        catalog.list.upsert(product);
                    }
                }
            }
            swapped
        };

        let Some(lot) = swapped else {
            info!(inventory_id = %created.id, "Lot removed before it was saved, deleting it");
            self.delete_remote_lot(&link_id, created.id.as_str()).await;
            return Ok(Inventory {
                link_id: Some(link_id),
                ..created
            });
        };

        let edited = InventoryForm {
            cost: lot.cost,
            selling_price: lot.selling_price,
            stock: lot.stock,
        };
        if edited != *form {
            debug!(inventory_id = %lot.id, "Sending edits made before the lot was saved");
            if let Err(e) = self.client.inventory().update(lot.id.as_str(), &edited).await {
                surface(&self.notifications, e);
            }
        }

        self.persist().await;
        info!(product_id = %product_id, temp_id = %temp_id, inventory_id = %lot.id, "Inventory saved");
        Ok(lot)
    }

    fn undo_add(&self, ticket: shopkeep_core::Ticket<Product>, product_id: &str, temp_id: &str) {
        let mut catalog = lock(&self.catalog);
        let outcome = catalog.list.rollback(ticket);
        if outcome == Outcome::Superseded {
            if let Some(mut product) = catalog.list.get(product_id).cloned() {
                product.inventories.retain(|lot| !lot.id.matches(temp_id));
                catalog.list.upsert(product);
            }
        }
        warn!(product_id = %product_id, temp_id = %temp_id, outcome = ?outcome, "Inventory add rolled back");
    }

    async fn delete_remote_lot(&self, link_id: &str, inventory_id: &str) {
        if let Err(e) = self.client.inventory().unlink(link_id).await {
            warn!(link_id = %link_id, error = %e, "Could not unlink inventory");
        }
        if let Err(e) = self.client.inventory().delete(inventory_id).await {
            warn!(inventory_id = %inventory_id, error = %e, "Could not delete inventory");
        }
    }

    pub async fn update_inventory(
        &self,
        product_id: &str,
        inventory_id: &str,
        form: &InventoryForm,
    ) -> UiResult<()> {
        validate_inventory_form(form)?;

        let (ticket, pending) = {
            let mut catalog = lock(&self.catalog);
            let pending = find_lot(&catalog.list, product_id, inventory_id)?.id.is_pending();
            let form = *form;
            let ticket = catalog
                .list
                .update(product_id, |product| {
                    if let Some(lot) = product.find_inventory_mut(inventory_id) {
                        lot.cost = form.cost;
                        lot.selling_price = form.selling_price;
                        lot.stock = form.stock;
                    }
                })
                .ok_or_else(|| UiError::from(CoreError::ProductNotFound(product_id.to_string())))?;
            (ticket, pending)
        };

        if pending {
            // Sent by add_inventory once the server id is known.
            lock(&self.catalog).list.commit(ticket, |_| {});
            debug!(inventory_id = %inventory_id, "Edited unsaved lot locally");
            return Ok(());
        }

        match self.client.inventory().update(inventory_id, form).await {
            Ok(_) => {
                lock(&self.catalog).list.commit(ticket, |_| {});
                self.persist().await;
                Ok(())
            }
            Err(e) => {
                let outcome = lock(&self.catalog).list.rollback(ticket);
                warn!(inventory_id = %inventory_id, outcome = ?outcome, error = %e, "Inventory update rolled back");
                Err(surface(&self.notifications, e))
            }
        }
    }

    /// Removes a lot: the product link first, then the lot itself.
    ///
    /// If either call fails the product is restored as it was. A saved lot
    /// whose link id was never reported is refused without any request,
    /// since deleting it alone would leave the link behind.
    pub async fn delete_inventory(&self, product_id: &str, inventory_id: &str) -> UiResult<()> {
        let (ticket, lot, server_product_id) = {
            let mut catalog = lock(&self.catalog);
            let lot = find_lot(&catalog.list, product_id, inventory_id)?.clone();
            if lot.link_id.is_none() && !lot.id.is_pending() {
                warn!(product_id = %product_id, inventory_id = %inventory_id, "Inventory has no known link, delete refused");
                return Err(surface(
                    &self.notifications,
                    UiError::new(
                        ErrorCode::NotFound,
                        "Could not delete the inventory: its product link is unknown, reload and try again",
                    ),
                ));
            }
            let server_product_id = catalog
                .list
                .get(product_id)
                .and_then(|p| p.id.committed().map(str::to_string));
            let ticket = catalog
                .list
                .update(product_id, |product| {
                    product.inventories.retain(|l| !l.id.matches(inventory_id))
                })
                .ok_or_else(|| UiError::from(CoreError::ProductNotFound(product_id.to_string())))?;
            (ticket, lot, server_product_id)
        };

        if lot.id.is_pending() {
            // add_inventory deletes it on the server once it lands.
            lock(&self.catalog).list.commit(ticket, |_| {});
            return Ok(());
        }

        if let Some(link_id) = &lot.link_id {
            if let Err(e) = self.client.inventory().unlink(link_id).await {
                let outcome = lock(&self.catalog).list.rollback(ticket);
                warn!(link_id = %link_id, outcome = ?outcome, error = %e, "Inventory unlink failed, restored");
                return Err(self.delete_failed(e));
            }
        }

        if let Err(e) = self.client.inventory().delete(inventory_id).await {
            let outcome = lock(&self.catalog).list.rollback(ticket);
            warn!(inventory_id = %inventory_id, outcome = ?outcome, error = %e, "Inventory delete failed, restored");
            if let (Some(_), Some(server_product_id)) = (&lot.link_id, server_product_id) {
                self.relink(product_id, &server_product_id, inventory_id).await;
            }
            return Err(self.delete_failed(e));
        }

        lock(&self.catalog).list.commit(ticket, |_| {});
        self.persist().await;
        info!(product_id = %product_id, inventory_id = %inventory_id, "Inventory deleted");
        Ok(())
    }

    fn delete_failed(&self, e: shopkeep_client::ClientError) -> UiError {
        let mut err = UiError::from(e);
        err.message = format!("Could not delete the inventory: {}", err.message);
        surface(&self.notifications, err)
    }

    /// Restores the server link removed by a half-finished delete.
    async fn relink(&self, product_id: &str, server_product_id: &str, inventory_id: &str) {
        match self
            .client
            .inventory()
            .link(server_product_id, inventory_id)
            .await
        {
            Ok(new_link) => {
                let mut catalog = lock(&self.catalog);
                if let Some(mut product) = catalog.list.get(product_id).cloned() {
                    if let Some(lot) = product.find_inventory_mut(inventory_id) {
                        lot.link_id = Some(new_link);
                        catalog.list.upsert(product);
                    }
                }
            }
            Err(e) => warn!(inventory_id = %inventory_id, error = %e, "Could not restore inventory link"),
        }
    }
}

fn find_lot<'a>(
    list: &'a OptimisticList<Product>,
    product_id: &str,
    inventory_id: &str,
) -> UiResult<&'a Inventory> {
    let product = list
        .get(product_id)
        .ok_or_else(|| UiError::from(CoreError::ProductNotFound(product_id.to_string())))?;
    product.find_inventory(inventory_id).ok_or_else(|| {
        UiError::from(CoreError::InventoryNotFound {
            product_id: product_id.to_string(),
            inventory_id: inventory_id.to_string(),
        })
    })
}

/// Swaps the temp id of a lot for the server's. Local field values win.
fn swap_temp_lot(
    product: &mut Product,
    temp_id: &str,
    created: &Inventory,
    link_id: &str,
) -> Option<Inventory> {
    let lot = product.find_inventory_mut(temp_id)?;
    lot.id = created.id.clone();
    lot.link_id = Some(link_id.to_string());
    Some(lot.clone())
}

/// Takes the server's copy of a product, keeping local lots it left out.
fn adopt_server_copy(product: &mut Product, mut server: Product) {
    if server.inventories.is_empty() {
        server.inventories = std::mem::take(&mut product.inventories);
    }
    *product = server;
}

#[async_trait]
impl SearchSource<Product> for ProductsState {
    fn cached(&self) -> Vec<Product> {
        self.products()
    }

    async fn fetch(&self, query: &str, limit: u64) -> ClientResult<Vec<Product>> {
        let page = self
            .client
            .products()
            .list(&ProductQuery::search(query, limit))
            .await?;
        Ok(page.products)
    }

    fn merge(&self, found: Vec<Product>) -> usize {
        lock(&self.catalog).list.extend_unique(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shopkeep_client::{
        AuthManager, ClientConfig, Method, MockReply, MockTransport, TokenGrant,
    };
    use shopkeep_core::Money;
    use shopkeep_db::{Database, DbConfig};
    use std::time::Duration;

    fn catalog_json() -> serde_json::Value {
        json!({
            "products": [{
                "_id": "p1",
                "productId": "P-1",
                "productName": "Basmati Rice",
                "brand": "Falak",
                "inventories": [{
                    "_id": "link1",
                    "inventory": {"_id": "inv1", "cost": 60, "sellingPrice": 100, "stock": 5,
                                  "createdAt": "2024-05-01T00:00:00Z"}
                }]
            }],
            "pagination": {"total": 1, "skip": 0, "chunkSize": 50}
        })
    }

    async fn setup(mock: Arc<MockTransport>) -> (Arc<ProductsState>, Arc<Notifications>) {
        let auth = Arc::new(AuthManager::new(mock.clone()));
        auth.sign_in(TokenGrant {
            token: "t".into(),
            refresh_token: None,
            expires_in: None,
            user: None,
        })
        .await
        .unwrap();
        let mut config = ClientConfig::default();
        config.retry.base_delay_ms = 1;
        let client = ApiClient::new(mock, auth, &config);
        let notes = Arc::new(Notifications::new(Duration::from_secs(5)));
        let state = ProductsState::new(client, notes.clone()).with_clock(|| 123);
        (Arc::new(state), notes)
    }

    fn form(cost: i64, price: i64, stock: i64) -> InventoryForm {
        InventoryForm {
            cost: Money::from_cents(cost),
            selling_price: Money::from_cents(price),
            stock,
        }
    }

    #[tokio::test]
    async fn test_load_reads_pagination() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "/products", MockReply::ok(catalog_json()));
        let (state, _) = setup(mock.clone()).await;

        assert_eq!(state.load(None).await.unwrap(), 1);
        assert!(!state.has_more());
        let product = state.get("p1").unwrap();
        assert_eq!(product.inventories[0].link_id.as_deref(), Some("link1"));
        assert_eq!(state.load_more().await.unwrap(), 0);
        assert_eq!(mock.count(Method::Get, "/products"), 1);
    }

    #[tokio::test]
    async fn test_inventory_create_failure_restores_snapshot() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "/products", MockReply::ok(catalog_json()))
            .always(
                Method::Post,
                "/inventory",
                MockReply::json(400, json!({"message": "Inventory rejected"}))
                    .after(Duration::from_millis(50)),
            );
        let (state, notes) = setup(mock.clone()).await;
        state.load(None).await.unwrap();
        let before = state.products();

        let task = {
            let state = state.clone();
            tokio::spawn(async move { state.add_inventory("p1", &form(6000, 9000, 3)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // applied before the server answered
        let pending = state.get("p1").unwrap();
        assert_eq!(pending.inventories.len(), 2);
        assert_eq!(pending.inventories[1].id.as_str(), "temp-123");
        assert!(pending.inventories[1].id.is_pending());

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.message, "Inventory rejected");
        assert_eq!(state.products(), before);

        let toasts = notes.active();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].message, "Inventory rejected");
        assert_eq!(mock.count(Method::Post, "/product-inventory"), 0);
    }

    #[tokio::test]
    async fn test_selling_below_cost_blocks_submission() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "/products", MockReply::ok(catalog_json()));
        let (state, notes) = setup(mock.clone()).await;
        state.load(None).await.unwrap();
        let calls = mock.total_calls();

        let err = state
            .add_inventory("p1", &form(10000, 8000, 1))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.field.as_deref(), Some("sellingPrice"));
        assert_eq!(mock.total_calls(), calls);
        assert_eq!(state.get("p1").unwrap().inventories.len(), 1);
        assert!(notes.active().is_empty());
    }

    #[tokio::test]
    async fn test_inventory_add_swaps_temp_id() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "/products", MockReply::ok(catalog_json()))
            .always(
                Method::Post,
                "/inventory",
                MockReply::ok(json!({"_id": "inv2", "cost": 60, "sellingPrice": 90, "stock": 3})),
            )
            .always(
                Method::Post,
                "/product-inventory",
                MockReply::ok(json!({"_id": "link2"})),
            );
        let (state, _) = setup(mock.clone()).await;
        state.load(None).await.unwrap();

        let lot = state.add_inventory("p1", &form(6000, 9000, 3)).await.unwrap();
        assert_eq!(lot.id, RecordId::Committed("inv2".into()));
        assert_eq!(lot.link_id.as_deref(), Some("link2"));

        let product = state.get("p1").unwrap();
        assert!(product.find_inventory("temp-123").is_none());
        assert_eq!(product.find_inventory("inv2").unwrap().stock, 3);

        let link = &mock.requests()[2];
        assert_eq!(link.body.as_ref().unwrap()["productId"], "p1");
        assert_eq!(link.body.as_ref().unwrap()["inventoryId"], "inv2");
    }

    #[tokio::test]
    async fn test_link_failure_deletes_created_inventory() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "/products", MockReply::ok(catalog_json()))
            .always(Method::Post, "/inventory", MockReply::ok(json!({"_id": "inv2"})))
            .always(Method::Post, "/product-inventory", MockReply::status(500))
            .always(Method::Delete, "/inventory", MockReply::ok(json!({})));
        let (state, _) = setup(mock.clone()).await;
        state.load(None).await.unwrap();
        let before = state.products();

        let err = state
            .add_inventory("p1", &form(6000, 9000, 3))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ServerError);
        assert_eq!(state.products(), before);

        let deletes: Vec<_> = mock
            .requests()
            .into_iter()
            .filter(|r| r.method == Method::Delete)
            .collect();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].query_param("id"), Some("inv2"));
    }

    #[tokio::test]
    async fn test_edit_of_unsaved_lot_is_sent_after_swap() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "/products", MockReply::ok(catalog_json()))
            .always(
                Method::Post,
                "/inventory",
                MockReply::ok(json!({"_id": "inv2", "cost": 60, "sellingPrice": 90, "stock": 3}))
                    .after(Duration::from_millis(50)),
            )
            .always(Method::Post, "/product-inventory", MockReply::ok(json!({"_id": "link2"})))
            .always(Method::Put, "/inventory", MockReply::ok(json!({})));
        let (state, _) = setup(mock.clone()).await;
        state.load(None).await.unwrap();

        let task = {
            let state = state.clone();
            tokio::spawn(async move { state.add_inventory("p1", &form(6000, 9000, 3)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        state
            .update_inventory("p1", "temp-123", &form(6000, 9500, 7))
            .await
            .unwrap();

        let lot = task.await.unwrap().unwrap();
        assert_eq!(lot.id.as_str(), "inv2");
        assert_eq!(lot.stock, 7);

        let product = state.get("p1").unwrap();
        assert_eq!(product.find_inventory("inv2").unwrap().selling_price, Money::from_cents(9500));
        let put = mock
            .requests()
            .into_iter()
            .find(|r| r.method == Method::Put)
            .unwrap();
        assert_eq!(put.query_param("id"), Some("inv2"));
        assert_eq!(put.body.unwrap()["stock"], 7);
    }

    #[tokio::test]
    async fn test_delete_inventory_failure_restores_link_and_lot() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "/products", MockReply::ok(catalog_json()))
            .always(Method::Delete, "/product-inventory", MockReply::ok(json!({})))
            .always(
                Method::Delete,
                "/inventory",
                MockReply::json(409, json!({"message": "Inventory has sales"})),
            )
            .always(Method::Post, "/product-inventory", MockReply::ok(json!({"_id": "link9"})));
        let (state, notes) = setup(mock.clone()).await;
        state.load(None).await.unwrap();

        let err = state.delete_inventory("p1", "inv1").await.unwrap_err();
        assert_eq!(
            err.message,
            "Could not delete the inventory: Inventory has sales"
        );

        let product = state.get("p1").unwrap();
        let lot = product.find_inventory("inv1").unwrap();
        assert_eq!(lot.link_id.as_deref(), Some("link9"));
        assert_eq!(notes.active().len(), 1);

        let unlink = mock
            .requests()
            .into_iter()
            .find(|r| r.method == Method::Delete && r.path == "/product-inventory")
            .unwrap();
        assert_eq!(unlink.query_param("id"), Some("link1"));
    }

    #[tokio::test]
    async fn test_delete_inventory_unlinks_first() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "/products", MockReply::ok(catalog_json()))
            .always(Method::Delete, "/product-inventory", MockReply::ok(json!({})))
            .always(Method::Delete, "/inventory", MockReply::ok(json!({})));
        let (state, _) = setup(mock.clone()).await;
        state.load(None).await.unwrap();

        state.delete_inventory("p1", "inv1").await.unwrap();
        assert!(state.get("p1").unwrap().inventories.is_empty());

        let sent = mock.requests();
        assert_eq!(sent[1].path, "/product-inventory");
        assert_eq!(sent[2].path, "/inventory");
        assert_eq!(sent[2].query_param("id"), Some("inv1"));
    }

    #[tokio::test]
    async fn test_delete_inventory_without_link_is_refused() {
        let mock = Arc::new(MockTransport::new());
        mock.always(
            Method::Get,
            "/products",
            MockReply::ok(json!({
                "products": [{
                    "_id": "p1",
                    "productId": "P-1",
                    "productName": "Basmati Rice",
                    "inventories": [{"_id": "inv1", "cost": 60, "sellingPrice": 100, "stock": 5}]
                }]
            })),
        );
        let (state, notes) = setup(mock.clone()).await;
        state.load(None).await.unwrap();
        let before = state.products();
        assert!(before[0].inventories[0].link_id.is_none());

        let err = state.delete_inventory("p1", "inv1").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(state.products(), before);
        assert_eq!(notes.active().len(), 1);
        assert_eq!(mock.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_update_product_rolls_back_on_403() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "/products", MockReply::ok(catalog_json()))
            .always(
                Method::Put,
                "/products",
                MockReply::json(403, json!({"message": "admins only"})),
            );
        let (state, notes) = setup(mock.clone()).await;
        state.load(None).await.unwrap();
        let before = state.products();

        let form = ProductForm {
            product_id: "P-1".into(),
            product_name: "Brown Rice".into(),
            ..Default::default()
        };
        let err = state.update_product("p1", &form).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AccessDenied);
        assert_eq!(state.products(), before);
        assert_eq!(notes.active()[0].code.as_deref(), Some("ACCESS_DENIED"));
    }

    #[tokio::test]
    async fn test_create_product_rejects_duplicate_id() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "/products", MockReply::ok(catalog_json()));
        let (state, _) = setup(mock.clone()).await;
        state.load(None).await.unwrap();

        let err = state
            .create_product(&ProductForm {
                product_id: "p-1".into(),
                product_name: "Another".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("productId"));
        assert_eq!(mock.count(Method::Post, "/products"), 0);
    }

    #[tokio::test]
    async fn test_offline_load_uses_saved_catalog() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mock = Arc::new(MockTransport::new());
        mock.push(Method::Get, "/products", MockReply::ok(catalog_json()))
            .always(
                Method::Get,
                "/products",
                MockReply::fail(shopkeep_client::ClientError::Network("offline".into())),
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
        let mut config = ClientConfig::default();
        config.retry.base_delay_ms = 1;
        let notes = Arc::new(Notifications::new(Duration::from_secs(5)));
        let state = ProductsState::new(ApiClient::new(mock.clone(), auth, &config), notes.clone())
            .with_store(db.cache());

        state.load(None).await.unwrap();
        state.clear();
        assert!(state.products().is_empty());

        assert_eq!(state.load(None).await.unwrap(), 1);
        assert_eq!(state.get("p1").unwrap().product_name, "Basmati Rice");
        assert_eq!(notes.active()[0].kind, crate::notifications::ToastKind::Info);
    }
}
