//! Sales, dashboard aggregates and receipt printing.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use shopkeep_core::money::{self, Money};
use shopkeep_core::{
    Cart, CartLineItem, CountStat, CoreError, NewSale, RevenueStat, Sale, SalesPerformance,
    SupplierReport, Timeframe,
};
use std::time::Duration;
use tracing::info;

use crate::error::ClientResult;
use crate::http::{query, ApiClient, Query};
use crate::normalize;

/// Performance aggregates change slowly; keep them a little longer.
const PERFORMANCE_TTL: Duration = Duration::from_secs(60);

// =============================================================================
// Wire Bodies
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaleLineBody<'a> {
    product_id: &'a str,
    product_name: &'a str,
    quantity: i64,
    #[serde(with = "money::as_major")]
    selling_price: Money,
    #[serde(with = "money::as_major")]
    cost_price: Money,
    #[serde(with = "money::as_major")]
    discount: Money,
    #[serde(with = "money::as_major")]
    discounted_price: Money,
    supplier: Option<&'a str>,
}

impl<'a> From<&'a CartLineItem> for SaleLineBody<'a> {
    fn from(line: &'a CartLineItem) -> Self {
        SaleLineBody {
            product_id: &line.product_id,
            product_name: &line.product_name,
            quantity: line.quantity,
            selling_price: line.selling_price,
            cost_price: line.cost_price,
            discount: line.discount,
            discounted_price: line.discounted_price,
            supplier: line.supplier.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaleBody<'a> {
    #[serde(with = "money::as_major")]
    grand_total: Money,
    products: Vec<SaleLineBody<'a>>,
}

/// One receipt line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillLine {
    pub product_name: String,
    pub quantity: i64,
    #[serde(with = "money::as_major")]
    pub unit_price: Money,
    #[serde(with = "money::as_major")]
    pub discount: Money,
    #[serde(with = "money::as_major")]
    pub line_total: Money,
}

/// A receipt, as sent to `POST /print`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub sale_id: Option<String>,
    pub lines: Vec<BillLine>,
    #[serde(with = "money::as_major")]
    pub sub_total: Money,
    #[serde(with = "money::as_major")]
    pub discount_total: Money,
    #[serde(with = "money::as_major")]
    pub grand_total: Money,
    pub printed_at: DateTime<Utc>,
}

impl Bill {
    pub fn from_cart(cart: &Cart, sale_id: Option<String>) -> Result<Self, CoreError> {
        if cart.is_empty() {
            return Err(CoreError::CartEmpty);
        }
        let totals = cart.totals();
        Ok(Bill {
            sale_id,
            lines: cart
                .lines()
                .iter()
                .map(|line| BillLine {
                    product_name: line.product_name.clone(),
                    quantity: line.quantity,
                    unit_price: line.selling_price,
                    discount: line.discount,
                    line_total: line.line_sub_total() - line.discount,
                })
                .collect(),
            sub_total: totals.sub_total,
            discount_total: totals.discount_total,
            grand_total: totals.grand_total,
            printed_at: Utc::now(),
        })
    }
}

// =============================================================================
// Sales API
// =============================================================================

pub struct SalesApi<'a> {
    client: &'a ApiClient,
}

impl<'a> SalesApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        SalesApi { client }
    }

    /// Records a sale.
    pub async fn create(&self, sale: &NewSale) -> ClientResult<Sale> {
        let body = SaleBody {
            grand_total: sale.grand_total,
            products: sale.products.iter().map(SaleLineBody::from).collect(),
        };
        let response = self.client.post_value("/sales", &body).await?;
        let recorded = normalize::sale(&response)?;
        info!(sale_id = %recorded.id, grand_total = %recorded.grand_total, "Sale recorded");
        Ok(recorded)
    }

    pub async fn count(&self, timeframe: Timeframe) -> ClientResult<CountStat> {
        let body = self
            .client
            .get_cached_value("/sales/count", timeframe_query(timeframe), None)
            .await?;
        Ok(normalize::count_stat(&body))
    }

    pub async fn revenue(&self, timeframe: Timeframe) -> ClientResult<RevenueStat> {
        let body = self
            .client
            .get_cached_value("/sales/revenue", timeframe_query(timeframe), None)
            .await?;
        Ok(normalize::revenue_stat(&body))
    }

    pub async fn performance(&self) -> ClientResult<SalesPerformance> {
        let body = self
            .client
            .get_cached_value("/sales/performance", Query::new(), Some(PERFORMANCE_TTL))
            .await?;
        Ok(normalize::sales_performance(&body))
    }

    pub async fn supplier_report(
        &self,
        supplier_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ClientResult<SupplierReport> {
        let params = query(&[
            ("supplierId", supplier_id.to_string()),
            ("startDate", start.format("%Y-%m-%d").to_string()),
            ("endDate", end.format("%Y-%m-%d").to_string()),
        ]);
        let body = self
            .client
            .get_value("/sales/report/supplier", params)
            .await?;
        Ok(normalize::supplier_report(&body))
    }

    /// Sends a receipt to the print service. Returns whatever it reports.
    pub async fn print(&self, bill: &Bill) -> ClientResult<Value> {
        let result = self
            .client
            .post_value("/print", &serde_json::json!({ "bill": bill }))
            .await?;
        info!(sale_id = ?bill.sale_id, lines = bill.lines.len(), "Bill sent to printer");
        Ok(result)
    }
}

fn timeframe_query(timeframe: Timeframe) -> Query {
    query(&[("search", timeframe.as_str())])
}
