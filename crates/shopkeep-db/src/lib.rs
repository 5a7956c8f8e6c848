//! # shopkeep-db: Local Storage for Shopkeep
//!
//! SQLite persistence for what the back office client keeps between runs:
//! the login session and a handful of cached JSON values.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Shopkeep Local Data                              │
//! │                                                                         │
//! │  AuthManager (client)        DashboardState / Notifications (app)       │
//! │       │                                  │                              │
//! │       ▼                                  ▼                              │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   shopkeep-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐   ┌────────────┐  │   │
//! │  │   │   Database    │    │   Repositories     │   │ Migrations │  │   │
//! │  │   │   (pool.rs)   │◄───│ SessionRepository  │   │ (embedded) │  │   │
//! │  │   │  SqlitePool   │    │ CacheRepository    │   │ 001_...sql │  │   │
//! │  │   └───────────────┘    └────────────────────┘   └────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  <platform data dir>/shopkeep.db                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded schema migrations
//! - [`repository`] - Session and cache repositories
//! - [`error`] - Database error types

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::cache::{CacheRepository, CachedValue};
pub use repository::session::{SessionRepository, StoredSession};
