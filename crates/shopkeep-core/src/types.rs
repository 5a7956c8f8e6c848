//! # Domain Types
//!
//! Core domain types used throughout Shopkeep.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐  owns  ┌─────────────────┐   ┌─────────────────┐  │
//! │  │    Product      │───────►│   Inventory     │   │    Supplier     │  │
//! │  │  ─────────────  │  0..n  │  ─────────────  │   │  ─────────────  │  │
//! │  │  id (RecordId)  │        │  id (RecordId)  │   │  id (RecordId)  │  │
//! │  │  product_id     │        │  cost           │   │  name           │  │
//! │  │  product_name   │        │  selling_price  │   │  contact        │  │
//! │  │  brand/category │        │  stock          │   │  email / phone  │  │
//! │  └─────────────────┘        │  link_id        │   └─────────────────┘  │
//! │                             └─────────────────┘                        │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐  │
//! │  │    RecordId     │   │   Timeframe     │   │  SalesPerformance   │  │
//! │  │  Pending(temp)  │   │  day / week /   │   │  profit, margin,    │  │
//! │  │  Committed(id)  │   │  month / year   │   │  top products, ...  │  │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Products carry two identities:
//! - `id`: the server record id, or a temp id while a create is in flight
//! - `product_id`: the business key typed by the shop owner, unique per catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Record Identity
// =============================================================================

/// Prefix of locally generated placeholder ids.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Placeholder identifier for a record the server has not confirmed yet.
///
/// Always renders as `temp-<epoch-millis>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct TempId(String);

impl TempId {
    /// Builds the temp id for a given epoch-millis timestamp.
    pub fn from_millis(millis: i64) -> Self {
        TempId(format!("{}{}", TEMP_ID_PREFIX, millis))
    }

    /// Parses `temp-<digits>`; anything else is not a temp id.
    pub fn parse(raw: &str) -> Option<Self> {
        let digits = raw.strip_prefix(TEMP_ID_PREFIX)?;
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(TempId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues strictly increasing temp ids.
///
/// Two creates within the same millisecond get `temp-N` and `temp-N+1`
/// instead of colliding.
#[derive(Debug, Default)]
pub struct TempIdGenerator {
    last: AtomicI64,
}

impl TempIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a temp id for `now_millis`, bumped past the last one issued.
    pub fn next(&self, now_millis: i64) -> TempId {
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now_millis.max(prev + 1);
            match self
                .last
                .compare_exchange(prev, candidate, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return TempId::from_millis(candidate),
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Identity of a record that may still be waiting for server confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(tag = "state", content = "id", rename_all = "snake_case")]
#[ts(export)]
pub enum RecordId {
    /// Inserted optimistically, server id not known yet.
    Pending(TempId),
    /// Confirmed by the server.
    Committed(String),
}

impl RecordId {
    /// Wraps a raw id, recognising `temp-<millis>` placeholders.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        match TempId::parse(&raw) {
            Some(temp) => RecordId::Pending(temp),
            None => RecordId::Committed(raw),
        }
    }

    /// The id the record is currently known by.
    pub fn as_str(&self) -> &str {
        match self {
            RecordId::Pending(temp) => temp.as_str(),
            RecordId::Committed(id) => id,
        }
    }

    /// True while the server has not confirmed the record.
    pub fn is_pending(&self) -> bool {
        matches!(self, RecordId::Pending(_))
    }

    /// The server id, if confirmed.
    pub fn committed(&self) -> Option<&str> {
        match self {
            RecordId::Committed(id) => Some(id),
            RecordId::Pending(_) => None,
        }
    }

    /// Whether `raw` refers to this record (temp or server id).
    pub fn matches(&self, raw: &str) -> bool {
        self.as_str() == raw
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TempId> for RecordId {
    fn from(temp: TempId) -> Self {
        RecordId::Pending(temp)
    }
}

// =============================================================================
// Inventory
// =============================================================================

/// One purchasing lot of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Inventory {
    pub id: RecordId,

    /// Purchase cost per unit.
    pub cost: Money,

    /// Selling price per unit. Never below `cost` once validated.
    pub selling_price: Money,

    /// Units on hand in this lot.
    pub stock: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// Id of the product↔inventory link record, once created.
    pub link_id: Option<String>,
}

impl Inventory {
    /// Margin per unit.
    pub fn unit_margin(&self) -> Money {
        self.selling_price - self.cost
    }
}

// =============================================================================
// Product
// =============================================================================

/// A catalog product together with its inventory lots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Product {
    /// Server record id (or temp id during an optimistic create).
    pub id: RecordId,

    /// Business key, unique across the catalog.
    pub product_id: String,

    pub product_name: String,
    pub brand: String,
    pub category: String,
    pub rack_number: String,
    pub description: String,

    /// Supplier label or id, as the server sent it.
    pub supplier: Option<String>,

    /// Ordered oldest first.
    pub inventories: Vec<Inventory>,
}

impl Product {
    /// Stock across all lots.
    pub fn total_stock(&self) -> i64 {
        self.inventories.iter().map(|i| i.stock).sum()
    }

    /// The most recently created lot; prices are quoted from it.
    pub fn latest_inventory(&self) -> Option<&Inventory> {
        self.inventories.iter().max_by_key(|i| i.created_at)
    }

    /// Current selling price (latest lot), zero with no lots.
    pub fn selling_price(&self) -> Money {
        self.latest_inventory()
            .map(|i| i.selling_price)
            .unwrap_or_default()
    }

    /// Current cost price (latest lot), zero with no lots.
    pub fn cost_price(&self) -> Money {
        self.latest_inventory().map(|i| i.cost).unwrap_or_default()
    }

    pub fn find_inventory(&self, inventory_id: &str) -> Option<&Inventory> {
        self.inventories.iter().find(|i| i.id.matches(inventory_id))
    }

    pub fn find_inventory_mut(&mut self, inventory_id: &str) -> Option<&mut Inventory> {
        self.inventories
            .iter_mut()
            .find(|i| i.id.matches(inventory_id))
    }
}

/// Fields the product form submits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProductForm {
    pub product_id: String,
    pub product_name: String,
    pub brand: String,
    pub category: String,
    pub rack_number: String,
    pub description: String,
    pub supplier: Option<String>,
}

impl ProductForm {
    /// Copies the form fields onto an existing product, keeping its lots.
    pub fn apply_to(&self, product: &mut Product) {
        product.product_id = self.product_id.trim().to_string();
        product.product_name = self.product_name.trim().to_string();
        product.brand = self.brand.clone();
        product.category = self.category.clone();
        product.rack_number = self.rack_number.clone();
        product.description = self.description.clone();
        product.supplier = self.supplier.clone();
    }
}

/// Fields the inventory form submits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InventoryForm {
    pub cost: Money,
    pub selling_price: Money,
    pub stock: i64,
}

// =============================================================================
// Supplier
// =============================================================================

/// A supplier contact record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Supplier {
    pub id: RecordId,
    pub name: String,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

/// Fields the supplier form submits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SupplierForm {
    pub name: String,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

impl SupplierForm {
    pub fn apply_to(&self, supplier: &mut Supplier) {
        supplier.name = self.name.trim().to_string();
        supplier.contact_person = self.contact_person.clone();
        supplier.email = self.email.clone();
        supplier.phone = self.phone.clone();
        supplier.address = self.address.clone();
        supplier.notes = self.notes.clone();
    }
}

// =============================================================================
// Sales
// =============================================================================

/// One product line of a recorded sale, as the server returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SaleLine {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub selling_price: Money,
    pub discount: Money,
}

/// A recorded sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub grand_total: Money,
    pub products: Vec<SaleLine>,
    pub payment_method: Option<String>,
    #[ts(as = "Option<String>")]
    pub created_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Dashboard
// =============================================================================

/// Reporting window for dashboard counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Timeframe {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [
        Timeframe::Day,
        Timeframe::Week,
        Timeframe::Month,
        Timeframe::Year,
    ];

    /// Value of the `search` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Day => "day",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
            Timeframe::Year => "year",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Percentage change from `previous` to `current`; `None` without a baseline.
fn change_percent(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }
    Some((current - previous) / previous.abs() * 100.0)
}

/// A counter for the current window and the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CountStat {
    pub count: i64,
    pub prev_count: i64,
}

impl CountStat {
    pub fn change_percent(&self) -> Option<f64> {
        change_percent(self.count as f64, self.prev_count as f64)
    }
}

/// Revenue for the current window and the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RevenueStat {
    pub revenue: Money,
    pub prev_revenue: Money,
}

impl RevenueStat {
    pub fn change_percent(&self) -> Option<f64> {
        change_percent(
            self.revenue.cents() as f64,
            self.prev_revenue.cents() as f64,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TopProduct {
    pub product_name: String,
    pub quantity: i64,
    pub revenue: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PaymentMethodShare {
    pub method: String,
    pub count: i64,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DailyProfit {
    /// Calendar day as the server labels it (e.g. `2024-05-01`).
    pub date: String,
    pub profit: Money,
}

/// Aggregates behind the dashboard charts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SalesPerformance {
    pub total_profit: Money,
    /// Percent, e.g. `32.5`.
    pub profit_margin: f64,
    pub average_order_value: Money,
    pub top_selling_products: Vec<TopProduct>,
    pub payment_method_breakdown: Vec<PaymentMethodShare>,
    pub profit_30_days: Vec<DailyProfit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SupplierSaleRow {
    pub sale_id: String,
    #[ts(as = "Option<String>")]
    pub date: Option<DateTime<Utc>>,
    pub product_name: String,
    pub quantity: i64,
    pub revenue: Money,
}

/// Sales of one supplier's products over a date range.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SupplierReport {
    pub supplier_name: String,
    pub total_quantity: i64,
    pub total_revenue: Money,
    pub sales: Vec<SupplierSaleRow>,
}

// =============================================================================
// Session
// =============================================================================

/// The signed-in user, as cached after login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserProfile {
    pub id: Option<String>,
    pub username: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

// =============================================================================
// Paging
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Pagination {
    pub total: u64,
    pub skip: u64,
    pub chunk_size: u64,
}

impl Pagination {
    /// Whether another chunk exists past this one.
    pub fn has_more(&self) -> bool {
        self.skip + self.chunk_size < self.total
    }
}

/// One chunk of the product catalog.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProductPage {
    pub products: Vec<Product>,
    /// Absent when the server returned a bare array.
    pub pagination: Option<Pagination>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn lot(cost: i64, price: i64, stock: i64, day: u32) -> Inventory {
        Inventory {
            id: RecordId::Committed(format!("inv-{}", day)),
            cost: Money::from_cents(cost),
            selling_price: Money::from_cents(price),
            stock,
            created_at: Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap(),
            link_id: None,
        }
    }

    #[test]
    fn test_temp_id_format_and_parse() {
        let temp = TempId::from_millis(123);
        assert_eq!(temp.as_str(), "temp-123");
        assert_eq!(TempId::parse("temp-123"), Some(temp));
        assert_eq!(TempId::parse("temp-"), None);
        assert_eq!(TempId::parse("temp-12a"), None);
        assert_eq!(TempId::parse("65f1c0ffee"), None);
    }

    #[test]
    fn test_temp_id_generator_never_repeats() {
        let generator = TempIdGenerator::new();
        let a = generator.next(1_000);
        let b = generator.next(1_000);
        let c = generator.next(999);
        assert_eq!(a.as_str(), "temp-1000");
        assert_eq!(b.as_str(), "temp-1001");
        assert_eq!(c.as_str(), "temp-1002");
    }

    #[test]
    fn test_record_id_from_raw() {
        assert!(RecordId::from_raw("temp-42").is_pending());
        let committed = RecordId::from_raw("65f1c0ffee");
        assert_eq!(committed.committed(), Some("65f1c0ffee"));
        assert!(committed.matches("65f1c0ffee"));
    }

    #[test]
    fn test_product_prices_follow_latest_lot() {
        let product = Product {
            id: RecordId::Committed("p1".into()),
            product_id: "P-1".into(),
            product_name: "Rice 5kg".into(),
            brand: String::new(),
            category: String::new(),
            rack_number: String::new(),
            description: String::new(),
            supplier: None,
            inventories: vec![lot(6000, 10000, 4, 1), lot(6500, 11000, 6, 3)],
        };

        assert_eq!(product.total_stock(), 10);
        assert_eq!(product.selling_price().cents(), 11000);
        assert_eq!(product.cost_price().cents(), 6500);
        assert!(product.find_inventory("inv-1").is_some());
    }

    #[test]
    fn test_change_percent() {
        let stat = CountStat {
            count: 15,
            prev_count: 10,
        };
        assert_eq!(stat.change_percent(), Some(50.0));
        assert_eq!(CountStat::default().change_percent(), None);
    }

    #[test]
    fn test_timeframe_query_values() {
        let values: Vec<&str> = Timeframe::ALL.iter().map(|t| t.as_str()).collect();
        assert_eq!(values, vec!["day", "week", "month", "year"]);
        assert_eq!(Timeframe::default(), Timeframe::Month);
    }

    #[test]
    fn test_pagination_has_more() {
        let page = Pagination {
            total: 120,
            skip: 50,
            chunk_size: 50,
        };
        assert!(page.has_more());
        let last = Pagination { skip: 100, ..page };
        assert!(!last.has_more());
    }
}
