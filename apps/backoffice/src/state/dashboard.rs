//! # Dashboard State
//!
//! Headline counters per timeframe, sales performance and supplier reports.
//!
//! Counters are saved to the local store after every successful load and
//! served from there when the server cannot be reached:
//! ```text
//! counts(month)
//!   ├─ 4 requests (suppliers, products, sales, revenue) ── ok ──► save "dashboard:counts:month"
//!   └─ any fails ──► saved copy? ── yes ──► stale snapshot
//!                                └─ no  ──► error
//! ```

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shopkeep_client::ApiClient;
use shopkeep_core::{
    CountStat, RevenueStat, SalesPerformance, SupplierReport, Timeframe, ValidationError,
};
use shopkeep_db::CacheRepository;
use tracing::{debug, warn};

use super::surface;
use crate::error::UiResult;
use crate::notifications::Notifications;

const COUNTS_KEY_PREFIX: &str = "dashboard:counts:";

fn counts_key(timeframe: Timeframe) -> String {
    format!("{}{}", COUNTS_KEY_PREFIX, timeframe)
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCounts {
    pub suppliers: CountStat,
    pub products: CountStat,
    pub sales: CountStat,
    pub revenue: RevenueStat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub timeframe: Timeframe,
    pub counts: DashboardCounts,
    /// Served from the local store because the server was unreachable.
    pub stale: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

pub struct DashboardState {
    client: ApiClient,
    notifications: Arc<Notifications>,
    store: Option<CacheRepository>,
}

impl DashboardState {
    pub fn new(client: ApiClient, notifications: Arc<Notifications>) -> Self {
        DashboardState {
            client,
            notifications,
            store: None,
        }
    }

    pub fn with_store(mut self, store: CacheRepository) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn counts(&self, timeframe: Timeframe) -> UiResult<DashboardSnapshot> {
        let suppliers_api = self.client.suppliers();
        let products_api = self.client.products();
        let sales_api = self.client.sales();
        let fetched = tokio::try_join!(
            suppliers_api.count(timeframe),
            products_api.count(timeframe),
            sales_api.count(timeframe),
            sales_api.revenue(timeframe),
        );

        match fetched {
            Ok((suppliers, products, sales, revenue)) => {
                let counts = DashboardCounts {
                    suppliers,
                    products,
                    sales,
                    revenue,
                };
                if let Some(store) = &self.store {
                    if let Err(e) = store.put(&counts_key(timeframe), &counts).await {
                        warn!(timeframe = %timeframe, error = %e, "Could not save dashboard counts");
                    }
                }
                debug!(timeframe = %timeframe, sales = counts.sales.count, "Dashboard counts loaded");
                Ok(DashboardSnapshot {
                    timeframe,
                    counts,
                    stale: false,
                    updated_at: Some(Utc::now()),
                })
            }
            Err(e) if !e.is_silent() => match self.saved_counts(timeframe).await {
                Some(snapshot) => {
                    warn!(timeframe = %timeframe, error = %e, "Serving saved dashboard counts");
                    Ok(snapshot)
                }
                None => Err(surface(&self.notifications, e)),
            },
            Err(e) => Err(surface(&self.notifications, e)),
        }
    }

    /// Counts saved by the last successful load, if any.
    pub async fn saved_counts(&self, timeframe: Timeframe) -> Option<DashboardSnapshot> {
        let store = self.store.as_ref()?;
        match store.get_entry::<DashboardCounts>(&counts_key(timeframe)).await {
            Ok(entry) => entry.map(|entry| DashboardSnapshot {
                timeframe,
                counts: entry.value,
                stale: true,
                updated_at: entry.updated_at,
            }),
            Err(e) => {
                warn!(error = %e, "Could not read saved dashboard counts");
                None
            }
        }
    }

    pub async fn performance(&self) -> UiResult<SalesPerformance> {
        self.client
            .sales()
            .performance()
            .await
            .map_err(|e| surface(&self.notifications, e))
    }

    pub async fn supplier_report(
        &self,
        supplier_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> UiResult<SupplierReport> {
        if supplier_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "supplierId".into(),
            }
            .into());
        }
        if end < start {
            return Err(ValidationError::InvalidFormat {
                field: "endDate".into(),
                reason: "must not be before the start date".into(),
            }
            .into());
        }
        self.client
            .sales()
            .supplier_report(supplier_id, start, end)
            .await
            .map_err(|e| surface(&self.notifications, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shopkeep_client::{
        AuthManager, ClientConfig, ClientError, Method, MockReply, MockTransport, TokenGrant,
    };
    use shopkeep_core::Money;
    use shopkeep_db::{Database, DbConfig};
    use std::time::Duration;

    async fn client(mock: Arc<MockTransport>) -> ApiClient {
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
        ApiClient::new(mock, auth, &config)
    }

    fn script_counts(mock: &MockTransport) {
        mock.push(Method::Get, "/suppliers/count", MockReply::ok(json!({"count": 4, "prevCount": 3})))
            .push(Method::Get, "/products/count", MockReply::ok(json!(120)))
            .push(Method::Get, "/sales/count", MockReply::ok(json!({"count": 30, "prevCount": 25})))
            .push(
                Method::Get,
                "/sales/revenue",
                MockReply::ok(json!({"count": 1500, "prevCount": 1200})),
            );
    }

    #[tokio::test]
    async fn test_counts_saved_and_served_offline() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mock = Arc::new(MockTransport::new());
        script_counts(&mock);
        let notes = Arc::new(Notifications::new(Duration::from_secs(5)));
        let dashboard = DashboardState::new(client(mock.clone()).await, notes.clone())
            .with_store(db.cache());

        let fresh = dashboard.counts(Timeframe::Week).await.unwrap();
        assert!(!fresh.stale);
        assert_eq!(fresh.counts.products.count, 120);
        assert_eq!(fresh.counts.revenue.revenue, Money::from_cents(150000));

        // a different timeframe bypasses the GET cache and finds the server gone
        let offline = MockReply::fail(ClientError::Network("offline".into()));
        for path in ["/suppliers/count", "/products/count", "/sales/count", "/sales/revenue"] {
            mock.always(Method::Get, path, offline.clone());
        }
        assert!(dashboard.counts(Timeframe::Day).await.is_err());

        let client = client(mock.clone()).await;
        let cold = DashboardState::new(client, notes).with_store(db.cache());
        let served = cold.counts(Timeframe::Week).await.unwrap();
        assert!(served.stale);
        assert_eq!(served.counts, fresh.counts);
        assert!(served.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_report_range_checked_before_request() {
        let mock = Arc::new(MockTransport::new());
        let dashboard = DashboardState::new(
            client(mock.clone()).await,
            Arc::new(Notifications::new(Duration::from_secs(5))),
        );
        let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let err = dashboard.supplier_report("s1", start, end).await.unwrap_err();
        assert_eq!(err.field.as_deref(), Some("endDate"));
        assert_eq!(mock.total_calls(), 0);
    }
}
