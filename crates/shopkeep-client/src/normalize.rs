//! # Response Normalization
//!
//! The API is loose about shapes: `_id` or `id`, `productName` or `name`,
//! prices as numbers or strings, lists bare or wrapped. Every response is
//! mapped into the canonical `shopkeep_core` types here, once.
//!
//! ```text
//! raw JSON ──► normalize::product() ──► Product   (Money in cents, RecordId)
//!          ──► normalize::products() ──► ProductPage
//!          ──► normalize::count_stat() ──► CountStat
//! ```

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use shopkeep_core::{
    CountStat, DailyProfit, Inventory, Money, Pagination, PaymentMethodShare, Product,
    ProductPage, RecordId, RevenueStat, Sale, SaleLine, SalesPerformance, Supplier,
    SupplierReport, SupplierSaleRow, TopProduct, UserProfile,
};
use tracing::warn;

use crate::error::{ClientError, ClientResult};

// =============================================================================
// Field Helpers
// =============================================================================

/// First of `keys` present and not null.
fn pick<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| v.get(*k))
        .find(|value| !value.is_null())
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        // Mongo extended JSON: {"$oid": "..."}
        Value::Object(map) => map.get("$oid").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn text(v: &Value, keys: &[&str]) -> Option<String> {
    pick(v, keys).and_then(as_text)
}

fn text_or_empty(v: &Value, keys: &[&str]) -> String {
    text(v, keys).unwrap_or_default()
}

/// Optional text, with blank strings treated as absent.
fn opt_text(v: &Value, keys: &[&str]) -> Option<String> {
    text(v, keys).filter(|s| !s.trim().is_empty())
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn money(v: &Value, keys: &[&str]) -> Option<Money> {
    pick(v, keys).and_then(as_number).map(Money::from_major_f64)
}

fn int(v: &Value, keys: &[&str]) -> Option<i64> {
    pick(v, keys)
        .and_then(as_number)
        .filter(|n| n.is_finite())
        .map(|n| n.round() as i64)
}

fn float(v: &Value, keys: &[&str]) -> Option<f64> {
    pick(v, keys).and_then(as_number).filter(|n| n.is_finite())
}

fn as_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        // Mongo extended JSON: {"$date": ...}
        Value::Object(map) => map.get("$date").and_then(as_timestamp),
        _ => None,
    }
}

fn timestamp(v: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    pick(v, keys).and_then(as_timestamp)
}

fn record_id(v: &Value) -> Option<String> {
    text(v, &["_id", "id"])
}

/// Unwraps `{data: {...}}` or `{<name>: {...}}` envelopes.
fn unwrap_envelope<'a>(v: &'a Value, names: &[&str]) -> &'a Value {
    names
        .iter()
        .chain(std::iter::once(&"data"))
        .filter_map(|k| v.get(*k))
        .find(|inner| inner.is_object())
        .unwrap_or(v)
}

/// The list inside a bare array or `{<name>: [...]}` / `{data: [...]}`.
fn list<'a>(v: &'a Value, names: &[&str]) -> Option<&'a Vec<Value>> {
    if let Value::Array(items) = v {
        return Some(items);
    }
    names
        .iter()
        .chain(["data", "items", "results"].iter())
        .filter_map(|k| v.get(*k))
        .find_map(Value::as_array)
}

/// A reference that may be populated: `"64ab..."` or `{_id, name}`.
fn reference_label(v: &Value, keys: &[&str]) -> Option<String> {
    let value = pick(v, keys)?;
    if value.is_object() {
        opt_text(value, &["name", "supplierName"]).or_else(|| record_id(value))
    } else {
        as_text(value).filter(|s| !s.trim().is_empty())
    }
}

/// Id of a record the server just created.
pub fn created_id(v: &Value, envelope: &[&str]) -> ClientResult<String> {
    record_id(unwrap_envelope(v, envelope))
        .ok_or_else(|| ClientError::Decode("response carries no record id".into()))
}

// =============================================================================
// Catalog
// =============================================================================

/// One inventory lot. Accepts both the lot itself and a link record that
/// wraps it (`{_id: <link>, inventory: {...}}`).
pub fn inventory(v: &Value) -> ClientResult<Inventory> {
    let v = unwrap_envelope(v, &[]);
    let (lot, link_id) = match pick(v, &["inventory", "inventoryId"]) {
        Some(inner) if inner.is_object() => (inner, record_id(v)),
        _ => (v, opt_text(v, &["linkId", "productInventoryId"])),
    };

    let id = record_id(lot).ok_or_else(|| ClientError::Decode("inventory without id".into()))?;

    Ok(Inventory {
        id: RecordId::from_raw(id),
        cost: money(lot, &["cost", "costPrice"]).unwrap_or_default(),
        selling_price: money(lot, &["sellingPrice", "price", "selling_price"]).unwrap_or_default(),
        stock: int(lot, &["stock", "quantity", "qty"]).unwrap_or(0).max(0),
        created_at: timestamp(lot, &["createdAt", "created_at", "date"]).unwrap_or_default(),
        link_id,
    })
}

/// One product with its lots.
pub fn product(v: &Value) -> ClientResult<Product> {
    let v = unwrap_envelope(v, &["product"]);
    let id = record_id(v).ok_or_else(|| ClientError::Decode("product without id".into()))?;

    let mut inventories = Vec::new();
    if let Some(items) = pick(v, &["inventories", "inventory"]).and_then(Value::as_array) {
        for item in items {
            match inventory(item) {
                Ok(lot) => inventories.push(lot),
                Err(e) => warn!(product = %id, error = %e, "Skipping malformed inventory"),
            }
        }
    }

    // Flat shape: prices on the product itself, one implicit lot.
    if inventories.is_empty()
        && pick(v, &["cost", "costPrice", "sellingPrice", "price", "stock"]).is_some()
    {
        inventories.push(Inventory {
            id: RecordId::from_raw(id.clone()),
            cost: money(v, &["cost", "costPrice"]).unwrap_or_default(),
            selling_price: money(v, &["sellingPrice", "price"]).unwrap_or_default(),
            stock: int(v, &["stock", "quantity"]).unwrap_or(0).max(0),
            created_at: timestamp(v, &["createdAt"]).unwrap_or_default(),
            link_id: None,
        });
    }

    Ok(Product {
        product_id: text(v, &["productId", "product_id", "sku"]).unwrap_or_else(|| id.clone()),
        id: RecordId::from_raw(id),
        product_name: text_or_empty(v, &["productName", "name", "product_name"]),
        brand: text_or_empty(v, &["brand"]),
        category: text_or_empty(v, &["category"]),
        rack_number: text_or_empty(v, &["rackNumber", "rack_number", "rack"]),
        description: text_or_empty(v, &["description"]),
        supplier: reference_label(v, &["supplier", "supplierName", "supplierId"]),
        inventories,
    })
}

fn pagination(v: &Value) -> Option<Pagination> {
    let p = v.get("pagination").filter(|p| p.is_object())?;
    Some(Pagination {
        total: int(p, &["total", "totalCount", "count"]).unwrap_or(0).max(0) as u64,
        skip: int(p, &["skip", "offset"]).unwrap_or(0).max(0) as u64,
        chunk_size: int(p, &["chunkSize", "limit", "pageSize"]).unwrap_or(0).max(0) as u64,
    })
}

/// A product list: bare array or `{products, pagination}`.
pub fn products(v: &Value) -> ClientResult<ProductPage> {
    let items =
        list(v, &["products"]).ok_or_else(|| ClientError::Decode("expected a product list".into()))?;

    let products = items
        .iter()
        .filter_map(|item| match product(item) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(error = %e, "Skipping malformed product");
                None
            }
        })
        .collect();

    Ok(ProductPage {
        products,
        pagination: pagination(v),
    })
}

// =============================================================================
// Suppliers
// =============================================================================

pub fn supplier(v: &Value) -> ClientResult<Supplier> {
    let v = unwrap_envelope(v, &["supplier"]);
    let id = record_id(v).ok_or_else(|| ClientError::Decode("supplier without id".into()))?;

    Ok(Supplier {
        id: RecordId::from_raw(id),
        name: text_or_empty(v, &["name", "supplierName", "companyName"]),
        contact_person: opt_text(v, &["contactPerson", "contact_person", "contact"]),
        email: opt_text(v, &["email"]),
        phone: opt_text(v, &["phone", "phoneNumber"]),
        address: opt_text(v, &["address"]),
        notes: opt_text(v, &["notes", "note"]),
    })
}

pub fn suppliers(v: &Value) -> ClientResult<Vec<Supplier>> {
    let items = list(v, &["suppliers"])
        .ok_or_else(|| ClientError::Decode("expected a supplier list".into()))?;
    Ok(items
        .iter()
        .filter_map(|item| match supplier(item) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, "Skipping malformed supplier");
                None
            }
        })
        .collect())
}

// =============================================================================
// Sales
// =============================================================================

fn sale_line(v: &Value) -> SaleLine {
    // productId may be populated with the product document.
    let (product_id, populated_name) = match pick(v, &["productId", "product"]) {
        Some(p @ Value::Object(_)) => (
            text(p, &["productId"]).or_else(|| record_id(p)).unwrap_or_default(),
            text(p, &["productName", "name"]),
        ),
        Some(other) => (as_text(other).unwrap_or_default(), None),
        None => (String::new(), None),
    };

    SaleLine {
        product_id,
        product_name: text(v, &["productName", "name"])
            .or(populated_name)
            .unwrap_or_default(),
        quantity: int(v, &["quantity", "qty"]).unwrap_or(0),
        selling_price: money(v, &["sellingPrice", "price"]).unwrap_or_default(),
        discount: money(v, &["discount"]).unwrap_or_default(),
    }
}

pub fn sale(v: &Value) -> ClientResult<Sale> {
    let v = unwrap_envelope(v, &["sale"]);
    let id = record_id(v).ok_or_else(|| ClientError::Decode("sale without id".into()))?;

    Ok(Sale {
        id,
        grand_total: money(v, &["grandTotal", "total"]).unwrap_or_default(),
        products: pick(v, &["products", "items"])
            .and_then(Value::as_array)
            .map(|items| items.iter().map(sale_line).collect())
            .unwrap_or_default(),
        payment_method: opt_text(v, &["paymentMethod", "payment_method"]),
        created_at: timestamp(v, &["createdAt", "date"]),
    })
}

// =============================================================================
// Dashboard
// =============================================================================

/// `{count, prevCount}` or a bare number.
pub fn count_stat(v: &Value) -> CountStat {
    if let Some(n) = as_number(v) {
        return CountStat {
            count: n.round() as i64,
            prev_count: 0,
        };
    }
    CountStat {
        count: int(v, &["count", "total", "value"]).unwrap_or(0),
        prev_count: int(v, &["prevCount", "previousCount", "prev_count"]).unwrap_or(0),
    }
}

/// Revenue arrives as `{count, prevCount}` like the counters, or with
/// explicit `revenue` fields.
pub fn revenue_stat(v: &Value) -> RevenueStat {
    if let Some(n) = as_number(v) {
        return RevenueStat {
            revenue: Money::from_major_f64(n),
            prev_revenue: Money::zero(),
        };
    }
    RevenueStat {
        revenue: money(v, &["revenue", "count", "total"]).unwrap_or_default(),
        prev_revenue: money(v, &["prevRevenue", "prevCount", "previousRevenue"])
            .unwrap_or_default(),
    }
}

pub fn sales_performance(v: &Value) -> SalesPerformance {
    let v = unwrap_envelope(v, &[]);
    let array = |keys: &[&str]| {
        pick(v, keys)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };

    SalesPerformance {
        total_profit: money(v, &["totalProfit"]).unwrap_or_default(),
        profit_margin: float(v, &["profitMargin"]).unwrap_or(0.0),
        average_order_value: money(v, &["averageOrderValue", "avgOrderValue"]).unwrap_or_default(),
        top_selling_products: array(&["topSellingProducts"])
            .iter()
            .map(|p| TopProduct {
                product_name: text_or_empty(p, &["productName", "name", "_id"]),
                quantity: int(p, &["quantity", "totalQuantity", "qty"]).unwrap_or(0),
                revenue: money(p, &["revenue", "totalRevenue"]).unwrap_or_default(),
            })
            .collect(),
        payment_method_breakdown: array(&["paymentMethodBreakdown"])
            .iter()
            .map(|m| PaymentMethodShare {
                method: text(m, &["method", "paymentMethod", "_id"])
                    .unwrap_or_else(|| "unknown".into()),
                count: int(m, &["count"]).unwrap_or(0),
                total: money(m, &["total", "amount", "revenue"]).unwrap_or_default(),
            })
            .collect(),
        profit_30_days: array(&["profit30Days", "profitLast30Days"])
            .iter()
            .map(|d| DailyProfit {
                date: text_or_empty(d, &["date", "_id", "day"]),
                profit: money(d, &["profit", "total"]).unwrap_or_default(),
            })
            .collect(),
    }
}

pub fn supplier_report(v: &Value) -> SupplierReport {
    let v = unwrap_envelope(v, &["report"]);
    let sales = pick(v, &["sales"])
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| SupplierSaleRow {
                    sale_id: record_id(row)
                        .or_else(|| text(row, &["saleId"]))
                        .unwrap_or_default(),
                    date: timestamp(row, &["date", "createdAt"]),
                    product_name: text_or_empty(row, &["productName", "name"]),
                    quantity: int(row, &["quantity", "qty"]).unwrap_or(0),
                    revenue: money(row, &["revenue", "total", "amount"]).unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    SupplierReport {
        supplier_name: text_or_empty(v, &["supplierName", "name"]),
        total_quantity: int(v, &["totalQuantity"]).unwrap_or(0),
        total_revenue: money(v, &["totalRevenue"]).unwrap_or_default(),
        sales,
    }
}

// =============================================================================
// Users
// =============================================================================

pub fn user_profile(v: &Value) -> UserProfile {
    let v = unwrap_envelope(v, &["user"]);
    let email = opt_text(v, &["email"]);
    UserProfile {
        id: record_id(v),
        username: text(v, &["username", "name"])
            .or_else(|| email.clone())
            .unwrap_or_default(),
        email,
        role: opt_text(v, &["role"]),
    }
}
