//! # Cart State
//!
//! The point-of-sale cart and its submission.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart State Operations                                │
//! │                                                                         │
//! │  UI Action                CartState               Cart Change           │
//! │  ─────────                ─────────               ───────────           │
//! │                                                                         │
//! │  Click Product ─────────► add() ────────────────► lines.push(line)      │
//! │  Edit Price/Discount ───► edit_line() ──────────► totals recomputed     │
//! │  Change Quantity ───────► set_quantity() ───────► lines[i].qty = n      │
//! │  Click Remove ──────────► remove_line() ────────► lines.remove(i)       │
//! │  Checkout ──────────────► submit() ─────────────► POST /sales, clear    │
//! │                                                   (kept on failure)     │
//! │  Print ─────────────────► print_bill() ─────────► POST /print           │
//! │                                                                         │
//! │  NOTE: The lock is released before any request is sent.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use shopkeep_client::{ApiClient, Bill};
use shopkeep_core::{Cart, CartLineItem, CartTotals, Money, Product, Sale};
use tracing::{info, warn};

use super::{lock, surface};
use crate::error::{ErrorCode, UiError, UiResult};
use crate::notifications::Notifications;

/// A recorded sale with the receipt built from the cart it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleReceipt {
    pub sale: Sale,
    pub bill: Bill,
}

/// Shared cart state.
///
/// ## Thread Safety
/// Uses `Mutex<Cart>`: cart operations are quick and most of them write,
/// so a RwLock buys nothing.
pub struct CartState {
    client: ApiClient,
    notifications: Arc<Notifications>,
    cart: Mutex<Cart>,
    submitting: AtomicBool,
}

impl CartState {
    pub fn new(client: ApiClient, notifications: Arc<Notifications>) -> Self {
        CartState {
            client,
            notifications,
            cart: Mutex::new(Cart::new()),
            submitting: AtomicBool::new(false),
        }
    }

    /// Runs `f` with read access to the cart.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let count = cart_state.with_cart(|cart| cart.len());
    /// ```
    pub fn with_cart<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Cart) -> R,
    {
        f(&lock(&self.cart))
    }

    /// Runs `f` with write access to the cart.
    pub fn with_cart_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Cart) -> R,
    {
        f(&mut lock(&self.cart))
    }

    pub fn lines(&self) -> Vec<CartLineItem> {
        self.with_cart(|cart| cart.lines().to_vec())
    }

    pub fn totals(&self) -> CartTotals {
        self.with_cart(|cart| cart.totals())
    }

    pub fn add(&self, product: &Product, quantity: i64) -> UiResult<CartTotals> {
        self.with_cart_mut(|cart| {
            cart.add_line(product, quantity)?;
            Ok(cart.totals())
        })
    }

    pub fn edit_line(
        &self,
        index: usize,
        price: Option<Money>,
        discount: Option<Money>,
    ) -> UiResult<CartTotals> {
        self.with_cart_mut(|cart| {
            cart.edit_line(index, price, discount)?;
            Ok(cart.totals())
        })
    }

    pub fn set_quantity(&self, index: usize, quantity: i64) -> UiResult<CartTotals> {
        self.with_cart_mut(|cart| {
            cart.set_quantity(index, quantity)?;
            Ok(cart.totals())
        })
    }

    pub fn remove_line(&self, index: usize) -> UiResult<CartTotals> {
        self.with_cart_mut(|cart| {
            cart.remove_line(index)?;
            Ok(cart.totals())
        })
    }

    pub fn clear(&self) {
        self.with_cart_mut(Cart::clear);
    }

    /// Records the cart as a sale.
    ///
    /// The cart is emptied only once the server has the sale; on any
    /// failure it is left exactly as it was.
    pub async fn submit(&self) -> UiResult<SaleReceipt> {
        if self.submitting.swap(true, Ordering::SeqCst) {
            return Err(UiError::new(
                ErrorCode::CartError,
                "This sale is already being submitted",
            ));
        }
        let result = self.submit_inner().await;
        self.submitting.store(false, Ordering::SeqCst);
        result
    }

    async fn submit_inner(&self) -> UiResult<SaleReceipt> {
        let (sale, draft) = self.with_cart(|cart| {
            let sale = cart.to_new_sale()?;
            let bill = Bill::from_cart(cart, None)?;
            Ok::<_, UiError>((sale, bill))
        })?;

        match self.client.sales().create(&sale).await {
            Ok(recorded) => {
                self.clear();
                info!(sale_id = %recorded.id, lines = sale.products.len(), "Cart submitted");
                self.notifications.success("Sale recorded");
                let bill = Bill {
                    sale_id: Some(recorded.id.clone()),
                    ..draft
                };
                Ok(SaleReceipt {
                    sale: recorded,
                    bill,
                })
            }
            Err(e) => {
                warn!(error = %e, lines = sale.products.len(), "Sale submission failed, cart kept");
                Err(surface(&self.notifications, e))
            }
        }
    }

    /// Sends a receipt to the printer.
    pub async fn print_bill(&self, bill: &Bill) -> UiResult<Value> {
        let result = self
            .client
            .sales()
            .print(bill)
            .await
            .map_err(|e| surface(&self.notifications, e))?;
        self.notifications.success("Bill sent to the printer");
        Ok(result)
    }
}
