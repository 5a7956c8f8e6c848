//! # Shopkeep Back Office Library
//!
//! Application layer of the back office: the state the screens render from
//! and the actions they trigger.
//!
//! ## Module Organization
//! ```text
//! shopkeep_backoffice/
//! ├── lib.rs            ◄─── You are here (AppContext wiring)
//! ├── state/
//! │   ├── mod.rs        ◄─── State type exports, lock + toast helpers
//! │   ├── auth.rs       ◄─── Login, restore, password reset
//! │   ├── products.rs   ◄─── Catalog, optimistic edits, inventory lots
//! │   ├── suppliers.rs  ◄─── Supplier directory
//! │   ├── cart.rs       ◄─── Point-of-sale cart and checkout
//! │   └── dashboard.rs  ◄─── Counters, performance, supplier reports
//! ├── search.rs         ◄─── Local-first search with debounced fallback
//! ├── notifications.rs  ◄─── Toast queue
//! └── error.rs          ◄─── UiError for the screens
//! ```
//!
//! ## State Management
//! One `AppContext` owns a focused state type per screen. Each one holds a
//! cheap clone of the `ApiClient` and the shared toast queue:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          AppContext                                     │
//! │                                                                         │
//! │  ┌────────────┐ ┌──────────────┐ ┌──────────────┐ ┌─────────────────┐  │
//! │  │ AuthState  │ │ProductsState │ │SuppliersState│ │ CartState       │  │
//! │  └────────────┘ └──────────────┘ └──────────────┘ └─────────────────┘  │
//! │  ┌────────────────┐   ┌──────────────────────────────────────────────┐ │
//! │  │ DashboardState │   │ Notifications (Arc, shared by every state)   │ │
//! │  └────────────────┘   └──────────────────────────────────────────────┘ │
//! │                                                                         │
//! │  session watcher: SessionExpired / SignedOut ──► clear cached data      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod notifications;
pub mod search;
pub mod state;

use std::sync::Arc;

use shopkeep_client::{ApiClient, AuthEvent, ClientConfig};
use shopkeep_core::{Product, Supplier};
use shopkeep_db::{Database, DbConfig};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use error::{ErrorCode, UiError, UiResult};
use notifications::Notifications;
use search::SearchController;
use state::{AuthState, CartState, DashboardState, ProductsState, SuppliersState};

pub type ProductSearch = SearchController<Product, ProductsState>;
pub type SupplierSearch = SearchController<Supplier, SuppliersState>;

/// Everything the back office needs at runtime.
pub struct AppContext {
    pub config: ClientConfig,
    pub db: Database,
    pub client: ApiClient,
    pub notifications: Arc<Notifications>,
    pub auth: AuthState,
    pub products: Arc<ProductsState>,
    pub suppliers: Arc<SuppliersState>,
    pub cart: Arc<CartState>,
    pub dashboard: DashboardState,
}

impl AppContext {
    /// Opens the local database and connects the API client.
    ///
    /// ## Startup Sequence
    /// ```text
    /// 1. Resolve database path (config or platform data dir)
    /// 2. Open SQLite, run migrations
    /// 3. Build the reqwest-backed ApiClient (session persisted in SQLite)
    /// 4. Build the state objects
    /// ```
    pub async fn open(config: ClientConfig) -> UiResult<Self> {
        let db_path = config.database_path().ok_or_else(|| {
            UiError::new(
                ErrorCode::ConfigError,
                "Could not determine the app data directory",
            )
        })?;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                UiError::new(
                    ErrorCode::StorageError,
                    format!("Could not create {}: {}", parent.display(), e),
                )
            })?;
        }
        info!(?db_path, "Database path determined");

        let db = Database::new(DbConfig::new(db_path)).await?;
        let client = ApiClient::connect(&config, db.clone())?;
        Ok(Self::new(config, db, client))
    }

    /// Builds the states over an existing database and client.
    pub fn new(config: ClientConfig, db: Database, client: ApiClient) -> Self {
        let notifications = Arc::new(Notifications::new(config.notifications.toast_ttl()));

        AppContext {
            auth: AuthState::new(client.clone(), notifications.clone()),
            products: Arc::new(
                ProductsState::new(client.clone(), notifications.clone())
                    .with_store(db.cache()),
            ),
            suppliers: Arc::new(SuppliersState::new(client.clone(), notifications.clone())),
            cart: Arc::new(CartState::new(client.clone(), notifications.clone())),
            dashboard: DashboardState::new(client.clone(), notifications.clone())
                .with_store(db.cache()),
            config,
            db,
            client,
            notifications,
        }
    }

    /// Shows any notice left by the last run, restores the session and
    /// starts the session watcher.
    ///
    /// Returns whether a user is signed in.
    pub async fn start(&self) -> UiResult<(bool, JoinHandle<()>)> {
        self.notifications.show_pending(&self.db.cache()).await;
        let watcher = self.watch_session();
        let signed_in = self.auth.restore().await?;
        info!(signed_in, "Back office started");
        Ok((signed_in, watcher))
    }

    /// Clears per-user data whenever the session ends.
    pub fn watch_session(&self) -> JoinHandle<()> {
        let mut events = self.client.auth_manager().subscribe();
        let client = self.client.clone();
        let products = self.products.clone();
        let suppliers = self.suppliers.clone();
        let cart = self.cart.clone();
        let notifications = self.notifications.clone();
        let cache = self.db.cache();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::SessionExpired { reason }) => {
                        warn!(reason = %reason, "Session ended, clearing data");
                        products.clear();
                        suppliers.clear();
                        cart.clear();
                        client.clear_cache();
                        notifications.show_pending(&cache).await;
                    }
                    Ok(AuthEvent::SignedOut) => {
                        products.clear();
                        suppliers.clear();
                        cart.clear();
                        client.clear_cache();
                        debug!("Signed out, data cleared");
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Session watcher lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn product_search(&self) -> ProductSearch {
        SearchController::new(self.products.clone(), self.config.search.clone())
    }

    pub fn supplier_search(&self) -> SupplierSearch {
        SearchController::new(self.suppliers.clone(), self.config.search.clone())
    }
}
