//! # Endpoint Groups
//!
//! Typed wrappers over [`ApiClient`], one per resource.
//!
//! ```text
//! client.auth()       /login /refresh-token /validate-token /request-otp
//!                     /verify-otp /reset-password /logout
//! client.products()   /products /products/count
//! client.suppliers()  /suppliers /suppliers/count
//! client.inventory()  /inventory /product-inventory
//! client.sales()      /sales /sales/count /sales/revenue /sales/performance
//!                     /sales/report/supplier /print
//! ```
//!
//! Inputs are validated before any request is built; a rejected form never
//! reaches the network.

pub mod auth;
pub mod inventory;
pub mod products;
pub mod sales;
pub mod suppliers;

use crate::http::ApiClient;

pub use auth::AuthApi;
pub use inventory::InventoryApi;
pub use products::{ProductQuery, ProductsApi};
pub use sales::{Bill, BillLine, SalesApi};
pub use suppliers::{SupplierQuery, SuppliersApi};

impl ApiClient {
    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi::new(self)
    }

    pub fn products(&self) -> ProductsApi<'_> {
        ProductsApi::new(self)
    }

    pub fn suppliers(&self) -> SuppliersApi<'_> {
        SuppliersApi::new(self)
    }

    pub fn inventory(&self) -> InventoryApi<'_> {
        InventoryApi::new(self)
    }

    pub fn sales(&self) -> SalesApi<'_> {
        SalesApi::new(self)
    }
}
