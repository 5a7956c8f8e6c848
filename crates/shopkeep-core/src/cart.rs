//! # Cart Calculator
//!
//! The point-of-sale cart and its running totals.
//!
//! ## Totals Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Cart Totals                                     │
//! │                                                                         │
//! │  sub_total      = Σ selling_price × quantity                            │
//! │  discount_total = Σ discount                (flat per line, not × qty)  │
//! │  grand_total    = sub_total − discount_total                            │
//! │  total_cost     = Σ cost_price × quantity                               │
//! │  profit         = Σ (selling_price − cost_price) × quantity             │
//! │                                                                         │
//! │  add_line ────► totals += line            (incremental)                 │
//! │  remove_line ─► totals -= line            (incremental)                 │
//! │  edit_line ───► totals = recompute()      (full sum over all lines)     │
//! │  set_quantity ► totals = recompute()                                    │
//! │                                                                         │
//! │  recompute() is the authority: the incremental path must always equal  │
//! │  it. With integer cents they are exactly equal.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//! The cart lives in memory only. Submitting posts [`Cart::to_new_sale`] to
//! the sales endpoint; success clears the cart, failure leaves it intact.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::Product;
use crate::validation::{
    validate_cart_size, validate_discount, validate_price, validate_quantity,
};

// =============================================================================
// Cart Line Item
// =============================================================================

/// One product placed into the active sale.
///
/// Price, cost and stock are frozen at add-time so later catalog edits do
/// not shift a sale in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartLineItem {
    /// Business key of the product.
    pub product_id: String,
    pub product_name: String,
    pub selling_price: Money,
    pub cost_price: Money,
    /// Flat deduction for the line.
    pub discount: Money,
    /// Always `selling_price - discount`.
    pub discounted_price: Money,
    pub quantity: i64,
    pub supplier: Option<String>,
    /// Stock snapshot at add-time; upper bound for `quantity`.
    pub stock: i64,
}

impl CartLineItem {
    /// Builds a line from the product's current (latest lot) prices.
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        let selling_price = product.selling_price();
        CartLineItem {
            product_id: product.product_id.clone(),
            product_name: product.product_name.clone(),
            selling_price,
            cost_price: product.cost_price(),
            discount: Money::zero(),
            discounted_price: selling_price,
            quantity,
            supplier: product.supplier.clone(),
            stock: product.total_stock(),
        }
    }

    /// Sets price and discount together, keeping `discounted_price` in step.
    fn set_pricing(&mut self, selling_price: Money, discount: Money) {
        self.selling_price = selling_price;
        self.discount = discount;
        self.discounted_price = selling_price - discount;
    }

    /// `selling_price × quantity`
    pub fn line_sub_total(&self) -> Money {
        self.selling_price * self.quantity
    }

    /// `cost_price × quantity`
    pub fn line_cost(&self) -> Money {
        self.cost_price * self.quantity
    }

    /// `(selling_price − cost_price) × quantity`
    pub fn line_profit(&self) -> Money {
        (self.selling_price - self.cost_price) * self.quantity
    }
}

// =============================================================================
// Cart Totals
// =============================================================================

/// Derived totals. Never edited directly, only through the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartTotals {
    pub sub_total: Money,
    pub discount_total: Money,
    pub grand_total: Money,
    pub total_cost: Money,
    pub profit: Money,
}

impl CartTotals {
    /// Sums every line from scratch.
    pub fn from_lines(lines: &[CartLineItem]) -> Self {
        let mut totals = CartTotals::default();
        for line in lines {
            totals.include(line);
        }
        totals
    }

    fn include(&mut self, line: &CartLineItem) {
        self.sub_total += line.line_sub_total();
        self.discount_total += line.discount;
        self.total_cost += line.line_cost();
        self.profit += line.line_profit();
        self.grand_total = self.sub_total - self.discount_total;
    }

    fn exclude(&mut self, line: &CartLineItem) {
        self.sub_total -= line.line_sub_total();
        self.discount_total -= line.discount;
        self.total_cost -= line.line_cost();
        self.profit -= line.line_profit();
        self.grand_total = self.sub_total - self.discount_total;
    }
}

// =============================================================================
// New Sale
// =============================================================================

/// Payload of a sale submission: the full line list and its grand total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewSale {
    pub grand_total: Money,
    pub products: Vec<CartLineItem>,
}

// =============================================================================
// Cart
// =============================================================================

/// The active sale.
///
/// ## Invariants
/// - `totals() == recompute()` after every operation
/// - every line has `1 <= quantity <= stock`
/// - at most [`MAX_CART_ITEMS`](crate::MAX_CART_ITEMS) lines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Cart {
    lines: Vec<CartLineItem>,
    totals: CartTotals,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[CartLineItem] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Current running totals.
    pub fn totals(&self) -> CartTotals {
        self.totals
    }

    /// Totals summed from scratch over the current lines.
    pub fn recompute(&self) -> CartTotals {
        CartTotals::from_lines(&self.lines)
    }

    /// Appends a line for `product` at its current price, no discount.
    ///
    /// ## Errors
    /// - `InsufficientStock` when `quantity` exceeds the product's stock
    /// - `Validation` when `quantity < 1` or the cart is full
    pub fn add_line(&mut self, product: &Product, quantity: i64) -> CoreResult<&CartLineItem> {
        let available = product.total_stock() - self.quantity_of(&product.product_id, None);
        if quantity > available {
            return Err(CoreError::InsufficientStock {
                product_id: product.product_id.clone(),
                available: available.max(0),
                requested: quantity,
            });
        }
        validate_quantity(quantity, available)?;

        validate_cart_size(self.lines.len())?;

        let line = CartLineItem::from_product(product, quantity);
        self.totals.include(&line);
        self.lines.push(line);
        Ok(&self.lines[self.lines.len() - 1])
    }

    /// Changes price and/or discount of line `index`.
    ///
    /// `None` keeps the current value. Totals are recomputed over the whole
    /// list since both inputs of the line may change at once.
    pub fn edit_line(
        &mut self,
        index: usize,
        new_price: Option<Money>,
        new_discount: Option<Money>,
    ) -> CoreResult<()> {
        let len = self.lines.len();
        let line = self
            .lines
            .get_mut(index)
            .ok_or(CoreError::LineNotFound { index, len })?;

        let price = new_price.unwrap_or(line.selling_price);
        let discount = new_discount.unwrap_or(line.discount);
        validate_price("sellingPrice", price)?;
        validate_discount(discount, price)?;

        line.set_pricing(price, discount);
        self.totals = self.recompute();
        Ok(())
    }

    /// Sets the quantity of line `index`, bounded by its stock snapshot
    /// less what other lines of the same product already hold.
    pub fn set_quantity(&mut self, index: usize, quantity: i64) -> CoreResult<()> {
        let len = self.lines.len();
        let (product_id, stock) = match self.lines.get(index) {
            Some(line) => (line.product_id.clone(), line.stock),
            None => return Err(CoreError::LineNotFound { index, len }),
        };

        let available = stock - self.quantity_of(&product_id, Some(index));
        if quantity > available {
            return Err(CoreError::InsufficientStock {
                product_id,
                available: available.max(0),
                requested: quantity,
            });
        }
        validate_quantity(quantity, available)?;

        self.lines[index].quantity = quantity;
        self.totals = self.recompute();
        Ok(())
    }

    /// Removes line `index`, subtracting its contribution first.
    pub fn remove_line(&mut self, index: usize) -> CoreResult<CartLineItem> {
        let len = self.lines.len();
        let line = self
            .lines
            .get(index)
            .ok_or(CoreError::LineNotFound { index, len })?;
        self.totals.exclude(line);
        Ok(self.lines.remove(index))
    }

    /// Units of `product_id` across all lines, skipping line `except`.
    fn quantity_of(&self, product_id: &str, except: Option<usize>) -> i64 {
        self.lines
            .iter()
            .enumerate()
            .filter(|(i, line)| Some(*i) != except && line.product_id == product_id)
            .map(|(_, line)| line.quantity)
            .sum()
    }

    /// Empties the cart.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.totals = CartTotals::default();
    }

    /// The submission payload for the current cart.
    pub fn to_new_sale(&self) -> CoreResult<NewSale> {
        if self.lines.is_empty() {
            return Err(CoreError::CartEmpty);
        }
        Ok(NewSale {
            grand_total: self.totals.grand_total,
            products: self.lines.clone(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
