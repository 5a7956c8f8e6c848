//! # shopkeep-core: Pure Business Logic for Shopkeep
//!
//! The cart calculator, the optimistic mutation protocol, local search
//! matching and form validation, as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Shopkeep Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/backoffice (state + search)                │   │
//! │  │   ProductsState ─ SuppliersState ─ CartState ─ DashboardState   │   │
//! │  └──────────────┬──────────────────────────────────┬───────────────┘   │
//! │                 │                                  │                    │
//! │  ┌──────────────▼──────────────┐   ┌───────────────▼───────────────┐   │
//! │  │ shopkeep-client (HTTP)      │   │ shopkeep-db (SQLite)          │   │
//! │  └──────────────┬──────────────┘   └───────────────┬───────────────┘   │
//! │                 │                                  │                    │
//! │  ┌──────────────▼──────────────────────────────────▼───────────────┐   │
//! │  │               ★ shopkeep-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │  ┌────────┐ ┌───────┐ ┌──────┐ ┌────────────┐ ┌────────┐ ┌─────┐ │   │
//! │  │  │ types  │ │ money │ │ cart │ │ optimistic │ │ search │ │valid│ │   │
//! │  │  └────────┘ └───────┘ └──────┘ └────────────┘ └────────┘ └─────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • NO TIMERS                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Inventory, Supplier, RecordId, ...)
//! - [`money`] - Integer-cents money
//! - [`cart`] - Cart lines and running totals
//! - [`optimistic`] - Snapshot / commit / rollback list
//! - [`search`] - Local substring matching and merge
//! - [`validation`] - Form validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use shopkeep_core::cart::Cart;
//! use shopkeep_core::money::Money;
//! use shopkeep_core::types::{Inventory, Product, RecordId};
//!
//! let rice = Product {
//!     id: RecordId::Committed("65f0".into()),
//!     product_id: "RICE-5KG".into(),
//!     product_name: "Rice 5kg".into(),
//!     brand: String::new(),
//!     category: String::new(),
//!     rack_number: String::new(),
//!     description: String::new(),
//!     supplier: None,
//!     inventories: vec![Inventory {
//!         id: RecordId::Committed("inv-1".into()),
//!         cost: Money::from_cents(6000),
//!         selling_price: Money::from_cents(10000),
//!         stock: 10,
//!         created_at: chrono::Utc::now(),
//!         link_id: None,
//!     }],
//! };
//!
//! let mut cart = Cart::new();
//! cart.add_line(&rice, 2).unwrap();
//! assert_eq!(cart.totals().profit, Money::from_cents(8000));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod money;
pub mod optimistic;
pub mod search;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartLineItem, CartTotals, NewSale};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use optimistic::{Keyed, OptimisticList, Outcome, Ticket};
pub use search::Searchable;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line.
///
/// Catches typing 1000 instead of 10.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Default page size when loading the catalog.
pub const DEFAULT_CHUNK_SIZE: u64 = 50;
