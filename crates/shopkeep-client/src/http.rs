//! # API Client
//!
//! Every request to the back office API goes through [`ApiClient`].
//!
//! ## Request Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  get_cached() ──► fresh cache hit? ──yes──► value                      │
//! │        │                 no                                             │
//! │        ▼                                                                │
//! │  same GET in flight? ──yes──► await the shared future (one call)        │
//! │        │ no                                                             │
//! │        ▼                                                                │
//! │  execute():                                                             │
//! │    public path? ──no──► token? ──none──► AuthRequired (silent, no call) │
//! │        │                                                                │
//! │        ▼                                                                │
//! │    transport.send ──► 2xx ─────────────────────────────► value          │
//! │                   ├─► 401 (first) ──► refresh once ──► send again       │
//! │                   ├─► 401 (again) ──► TokenInvalid, session dropped     │
//! │                   ├─► 403 ─────────► AccessDenied (no refresh)          │
//! │                   ├─► 4xx ─────────► Server { message verbatim }        │
//! │                   └─► 5xx / network / timeout                           │
//! │                           │                                             │
//! │                  POST / PATCH? ──yes──► error (never resent)            │
//! │                           │ no                                          │
//! │                  attempt < max_retries? ──yes──► sleep base×2^n, resend │
//! │                           no ──► error                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cache Epoch
//! Every invalidation bumps an epoch under the cache lock. A GET started
//! before the bump neither fills the cache nor is joined by later callers.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use shopkeep_db::Database;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::auth::{is_public_path, AuthManager};
use crate::config::{ClientConfig, RetrySettings};
use crate::error::{ClientError, ClientResult};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};

/// Query parameters as sent on the wire.
pub type Query = Vec<(String, String)>;

/// Builds a [`Query`] from borrowed pairs.
pub fn query<V: ToString>(pairs: &[(&str, V)]) -> Query {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

type SharedResponse = Shared<BoxFuture<'static, ClientResult<Value>>>;

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

struct Inner {
    transport: Arc<dyn HttpTransport>,
    auth: Arc<AuthManager>,
    retry: RetrySettings,
    default_ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
    /// Bumped by every invalidation, always while holding `cache`.
    epoch: AtomicU64,
    /// In-flight GETs keyed by cache key, with the epoch they started in.
    in_flight: Mutex<HashMap<String, (u64, SharedResponse)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `path?k=v&...` with parameters sorted, so argument order never matters.
fn cache_key(path: &str, query: &Query) -> String {
    let mut pairs: Vec<_> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    pairs.sort();
    format!("{}?{}", path, pairs.join("&"))
}

/// `/products/count` → `/products`.
fn resource_prefix(path: &str) -> String {
    let first = path
        .trim_start_matches('/')
        .split(['/', '?'])
        .next()
        .unwrap_or_default();
    format!("/{}", first)
}

/// Shared handle to the API. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        auth: Arc<AuthManager>,
        config: &ClientConfig,
    ) -> Self {
        ApiClient {
            inner: Arc::new(Inner {
                transport,
                auth,
                retry: config.retry.clone(),
                default_ttl: config.cache.default_ttl(),
                cache: Mutex::new(HashMap::new()),
                epoch: AtomicU64::new(0),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Real client: reqwest transport, session persisted in `db`.
    pub fn connect(config: &ClientConfig, db: Database) -> ClientResult<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(&config.api)?);
        let auth = Arc::new(AuthManager::new(transport.clone()).with_database(db));
        info!(base_url = %config.api.base_url, "API client ready");
        Ok(Self::new(transport, auth, config))
    }

    pub fn auth_manager(&self) -> &Arc<AuthManager> {
        &self.inner.auth
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.inner.transport
    }

    // =========================================================================
    // Raw JSON
    // =========================================================================

    /// Sends one logical request through the full pipeline (no cache).
    pub async fn request_value(
        &self,
        method: Method,
        path: &str,
        query: Query,
        body: Option<Value>,
    ) -> ClientResult<Value> {
        let value = self.inner.execute(method, path, query, body).await?;
        if method != Method::Get {
            self.invalidate(&resource_prefix(path));
        }
        Ok(value)
    }

    pub async fn get_value(&self, path: &str, query: Query) -> ClientResult<Value> {
        self.request_value(Method::Get, path, query, None).await
    }

    /// GET through the response cache. Concurrent identical calls share
    /// one network request. `ttl` defaults to the configured cache TTL.
    pub async fn get_cached_value(
        &self,
        path: &str,
        query: Query,
        ttl: Option<Duration>,
    ) -> ClientResult<Value> {
        let key = cache_key(path, &query);
        let ttl = ttl.unwrap_or(self.inner.default_ttl);

        if let Some(entry) = lock(&self.inner.cache).get(&key) {
            if entry.expires_at > Instant::now() {
                debug!(key = %key, "Cache hit");
                return Ok(entry.value.clone());
            }
        }

        let shared = {
            let mut in_flight = lock(&self.inner.in_flight);
            let epoch = self.inner.epoch.load(Ordering::SeqCst);
            match in_flight.get(&key) {
                Some((started, existing)) if *started == epoch => {
                    debug!(key = %key, "Joining in-flight request");
                    existing.clone()
                }
                _ => {
                    let inner = self.inner.clone();
                    let path = path.to_string();
                    let owned_key = key.clone();
                    let fut = async move {
                        let result = inner.execute(Method::Get, &path, query, None).await;
                        if let Ok(value) = &result {
                            let mut cache = lock(&inner.cache);
                            if inner.epoch.load(Ordering::SeqCst) == epoch {
                                cache.insert(
                                    owned_key.clone(),
                                    CacheEntry {
                                        value: value.clone(),
                                        expires_at: Instant::now() + ttl,
                                    },
                                );
                            } else {
                                debug!(key = %owned_key, "Cache invalidated during request, not storing");
                            }
                        }
                        let mut in_flight = lock(&inner.in_flight);
                        if matches!(in_flight.get(&owned_key), Some((started, _)) if *started == epoch) {
                            in_flight.remove(&owned_key);
                        }
                        result
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key, (epoch, fut.clone()));
                    fut
                }
            }
        };

        shared.await
    }

    pub async fn post_value<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<Value> {
        let body = serde_json::to_value(body)?;
        self.request_value(Method::Post, path, Query::new(), Some(body))
            .await
    }

    pub async fn put_value<B: Serialize + ?Sized>(
        &self,
        path: &str,
        query: Query,
        body: &B,
    ) -> ClientResult<Value> {
        let body = serde_json::to_value(body)?;
        self.request_value(Method::Put, path, query, Some(body)).await
    }

    pub async fn patch_value<B: Serialize + ?Sized>(
        &self,
        path: &str,
        query: Query,
        body: &B,
    ) -> ClientResult<Value> {
        let body = serde_json::to_value(body)?;
        self.request_value(Method::Patch, path, query, Some(body))
            .await
    }

    pub async fn delete_value(&self, path: &str, query: Query) -> ClientResult<Value> {
        self.request_value(Method::Delete, path, query, None).await
    }

    // =========================================================================
    // Typed
    // =========================================================================

    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: Query) -> ClientResult<T> {
        Ok(serde_json::from_value(self.get_value(path, query).await?)?)
    }

    pub async fn get_cached<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Query,
        ttl: Option<Duration>,
    ) -> ClientResult<T> {
        Ok(serde_json::from_value(
            self.get_cached_value(path, query, ttl).await?,
        )?)
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        Ok(serde_json::from_value(self.post_value(path, body).await?)?)
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        query: Query,
        body: &B,
    ) -> ClientResult<T> {
        Ok(serde_json::from_value(
            self.put_value(path, query, body).await?,
        )?)
    }

    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        query: Query,
        body: &B,
    ) -> ClientResult<T> {
        Ok(serde_json::from_value(
            self.patch_value(path, query, body).await?,
        )?)
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str, query: Query) -> ClientResult<T> {
        Ok(serde_json::from_value(self.delete_value(path, query).await?)?)
    }

    // =========================================================================
    // Cache control
    // =========================================================================

    /// Drops cached GETs whose path starts with `prefix`.
    pub fn invalidate(&self, prefix: &str) -> usize {
        let mut cache = lock(&self.inner.cache);
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let before = cache.len();
        cache.retain(|key, _| !key.starts_with(prefix));
        let removed = before - cache.len();
        if removed > 0 {
            debug!(prefix = %prefix, removed, "Invalidated cached responses");
        }
        removed
    }

    pub fn clear_cache(&self) {
        let mut cache = lock(&self.inner.cache);
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        cache.clear();
    }
}

impl Inner {
    fn retry_schedule(&self) -> ExponentialBackoff {
        let base = self.retry.base_delay();
        ExponentialBackoff {
            current_interval: base,
            initial_interval: base,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: Query,
        body: Option<Value>,
    ) -> ClientResult<Value> {
        let public = is_public_path(path);
        let mut schedule = self.retry_schedule();
        let mut attempt: u32 = 0;
        let mut refreshed = false;

        loop {
            let bearer = if public {
                self.auth.current_token().await
            } else {
                Some(self.auth.token_for_request().await?)
            };

            let request = HttpRequest::new(method, path)
                .with_query(query.clone())
                .with_bearer(bearer.clone());
            let request = match &body {
                Some(body) => request.with_body(body.clone()),
                None => request,
            };

            debug!(method = %method, path = %path, attempt, "API request");

            let error = match self.transport.send(request).await {
                Ok(resp) if resp.is_success() => return Ok(resp.body),
                Ok(resp) if resp.status == 401 && !public => {
                    if refreshed {
                        let reason = resp
                            .server_message()
                            .unwrap_or_else(|| "token rejected after refresh".into());
                        warn!(path = %path, "Token rejected after refresh");
                        self.auth.expire_session(&reason).await;
                        return Err(ClientError::TokenInvalid(reason));
                    }
                    refreshed = true;
                    let stale = bearer.unwrap_or_default();
                    self.auth.refresh_after(&stale).await?;
                    continue;
                }
                Ok(resp) => status_error(resp),
                Err(e) => e,
            };

            if error.is_retryable() && method.is_idempotent() && attempt < self.retry.max_retries {
                let delay = schedule
                    .next_backoff()
                    .unwrap_or_else(|| self.retry.base_delay());
                attempt += 1;
                warn!(
                    method = %method,
                    path = %path,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying request"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if !error.is_silent() {
                debug!(method = %method, path = %path, code = error.code(), "Request failed");
            }
            return Err(error);
        }
    }
}

fn status_error(resp: HttpResponse) -> ClientError {
    let message = resp.server_message();
    match resp.status {
        403 => ClientError::AccessDenied(
            message.unwrap_or_else(|| "You do not have permission for this action".into()),
        ),
        status => ClientError::Server {
            status,
            message: message.unwrap_or_else(|| format!("Request failed with status {}", status)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenGrant;
    use crate::mock::{MockReply, MockTransport};
    use futures_util::future::join_all;
    use serde_json::json;

    fn config() -> ClientConfig {
        let mut config = ClientConfig::default();
        config.retry.base_delay_ms = 1;
        config
    }

    async fn client_with(mock: Arc<MockTransport>, token: Option<&str>) -> ApiClient {
        let auth = Arc::new(AuthManager::new(mock.clone()));
        if let Some(token) = token {
            auth.sign_in(TokenGrant {
                token: token.into(),
                refresh_token: Some("refresh".into()),
                expires_in: Some(3600),
                user: None,
            })
            .await
            .unwrap();
        }
        ApiClient::new(mock, auth, &config())
    }

    #[test]
    fn test_cache_key_and_prefix() {
        let a = cache_key("/products", &query(&[("skip", "0"), ("search", "rice")]));
        let b = cache_key("/products", &query(&[("search", "rice"), ("skip", "0")]));
        assert_eq!(a, b);
        assert_eq!(resource_prefix("/products/count"), "/products");
        assert_eq!(resource_prefix("/product-inventory"), "/product-inventory");
    }

    #[tokio::test]
    async fn test_no_token_no_network() {
        let mock = Arc::new(MockTransport::new());
        let client = client_with(mock.clone(), None).await;

        let err = client.get_value("/products", Query::new()).await.unwrap_err();
        assert_eq!(err, ClientError::AuthRequired);
        assert!(err.is_silent());
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_public_path_without_token() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Post, "/request-otp", MockReply::ok(json!({"success": true})));
        let client = client_with(mock.clone(), None).await;

        client
            .post_value("/request-otp", &json!({"email": "a@b.pk"}))
            .await
            .unwrap();
        let sent = mock.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].bearer, None);
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let mock = Arc::new(MockTransport::new());
        mock.handle(Method::Get, "/products", |req| {
            if req.bearer.as_deref() == Some("new") {
                MockReply::ok(json!([]))
            } else {
                MockReply::status(401)
            }
        })
        .always(
            Method::Post,
            "/refresh-token",
            MockReply::ok(json!({"token": "new", "expiresIn": 3600}))
                .after(Duration::from_millis(20)),
        );
        let client = client_with(mock.clone(), Some("old")).await;

        let results = join_all((0..6).map(|_| client.get_value("/products", Query::new()))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(mock.count(Method::Post, "/refresh-token"), 1);
        assert_eq!(client.auth_manager().refresh_calls(), 1);
        let final_bearers: Vec<_> = mock
            .requests()
            .into_iter()
            .filter(|r| r.path == "/products" && r.bearer.as_deref() == Some("new"))
            .collect();
        assert_eq!(final_bearers.len(), 6);
    }

    #[tokio::test]
    async fn test_401_after_refresh_drops_session() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "/sales/performance", MockReply::status(401))
            .always(
                Method::Post,
                "/refresh-token",
                MockReply::ok(json!({"token": "new"})),
            );
        let client = client_with(mock.clone(), Some("old")).await;

        let err = client
            .get_value("/sales/performance", Query::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::TokenInvalid(_)));
        assert!(err.forces_logout());
        assert!(!client.auth_manager().is_signed_in().await);
        assert_eq!(mock.count(Method::Get, "/sales/performance"), 2);
    }

    #[tokio::test]
    async fn test_403_is_not_refreshed() {
        let mock = Arc::new(MockTransport::new());
        mock.always(
            Method::Delete,
            "/suppliers",
            MockReply::json(403, json!({"message": "Admins only"})),
        );
        let client = client_with(mock.clone(), Some("t")).await;

        let err = client
            .delete_value("/suppliers", query(&[("id", "s1")]))
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::AccessDenied("Admins only".into()));
        assert_eq!(mock.count(Method::Post, "/refresh-token"), 0);
        assert_eq!(mock.total_calls(), 1);
        assert!(client.auth_manager().is_signed_in().await);
    }

    #[tokio::test]
    async fn test_5xx_retried_twice_then_surfaced() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "/sales/count", MockReply::status(503));
        let client = client_with(mock.clone(), Some("t")).await;

        let err = client
            .get_value("/sales/count", query(&[("search", "day")]))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(mock.count(Method::Get, "/sales/count"), 3);
    }

    #[tokio::test]
    async fn test_network_error_recovers_on_retry() {
        let mock = Arc::new(MockTransport::new());
        mock.push(
            Method::Put,
            "/suppliers",
            MockReply::fail(ClientError::Timeout(15)),
        )
        .always(Method::Put, "/suppliers", MockReply::ok(json!({"_id": "s1"})));
        let client = client_with(mock.clone(), Some("t")).await;

        let value = client
            .put_value("/suppliers", query(&[("id", "s1")]), &json!({"name": "Metro"}))
            .await
            .unwrap();
        assert_eq!(value["_id"], "s1");
        assert_eq!(mock.count(Method::Put, "/suppliers"), 2);
    }

    #[tokio::test]
    async fn test_sale_post_is_sent_once() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Post, "/sales", MockReply::fail(ClientError::Timeout(15)))
            .always(Method::Patch, "/sales", MockReply::status(503));
        let client = client_with(mock.clone(), Some("t")).await;

        let err = client.post_value("/sales", &json!({})).await.unwrap_err();
        assert_eq!(err, ClientError::Timeout(15));
        assert_eq!(mock.count(Method::Post, "/sales"), 1);

        assert!(client
            .patch_value("/sales", Query::new(), &json!({}))
            .await
            .is_err());
        assert_eq!(mock.count(Method::Patch, "/sales"), 1);
    }

    #[tokio::test]
    async fn test_4xx_message_verbatim_without_retry() {
        let mock = Arc::new(MockTransport::new());
        mock.always(
            Method::Post,
            "/products",
            MockReply::json(400, json!({"message": "Product ID already exists"})),
        );
        let client = client_with(mock.clone(), Some("t")).await;

        let err = client
            .post_value("/products", &json!({"productId": "P-1"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Product ID already exists");
        assert_eq!(mock.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_identical_gets_share_one_call() {
        let mock = Arc::new(MockTransport::new());
        mock.always(
            Method::Get,
            "/products/count",
            MockReply::ok(json!({"count": 4, "prevCount": 2}))
                .after(Duration::from_millis(20)),
        );
        let client = client_with(mock.clone(), Some("t")).await;
        let q = || query(&[("search", "month")]);

        let results = join_all(
            (0..5).map(|_| client.get_cached_value("/products/count", q(), None)),
        )
        .await;
        assert!(results.iter().all(|r| r.as_ref().unwrap()["count"] == 4));
        assert_eq!(mock.total_calls(), 1);

        // Served from cache.
        client
            .get_cached_value("/products/count", q(), None)
            .await
            .unwrap();
        assert_eq!(mock.total_calls(), 1);

        assert_eq!(client.invalidate("/products"), 1);
        client
            .get_cached_value("/products/count", q(), None)
            .await
            .unwrap();
        assert_eq!(mock.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_mutation_invalidates_resource() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Get, "/suppliers", MockReply::ok(json!([])))
            .always(Method::Post, "/suppliers", MockReply::ok(json!({"_id": "s9"})));
        let client = client_with(mock.clone(), Some("t")).await;

        client
            .get_cached_value("/suppliers", Query::new(), None)
            .await
            .unwrap();
        client
            .post_value("/suppliers", &json!({"name": "Acme"}))
            .await
            .unwrap();
        client
            .get_cached_value("/suppliers", Query::new(), None)
            .await
            .unwrap();
        assert_eq!(mock.count(Method::Get, "/suppliers"), 2);
    }

    #[tokio::test]
    async fn test_invalidate_during_get_skips_cache_fill() {
        let mock = Arc::new(MockTransport::new());
        mock.push(
            Method::Get,
            "/suppliers",
            MockReply::ok(json!([{"_id": "s1"}])).after(Duration::from_millis(50)),
        )
        .always(Method::Get, "/suppliers", MockReply::ok(json!([{"_id": "s1"}, {"_id": "s2"}])));
        let client = client_with(mock.clone(), Some("t")).await;

        let slow = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .get_cached_value("/suppliers", Query::new(), None)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.invalidate("/suppliers");

        // Started after the invalidation: must not join the older request.
        let fresh = client
            .get_cached_value("/suppliers", Query::new(), None)
            .await
            .unwrap();
        assert_eq!(fresh.as_array().unwrap().len(), 2);

        let stale = slow.await.unwrap().unwrap();
        assert_eq!(stale.as_array().unwrap().len(), 1);

        let cached = client
            .get_cached_value("/suppliers", Query::new(), None)
            .await
            .unwrap();
        assert_eq!(cached.as_array().unwrap().len(), 2);
        assert_eq!(mock.count(Method::Get, "/suppliers"), 2);
    }

    #[tokio::test]
    async fn test_failed_get_is_not_cached() {
        let mock = Arc::new(MockTransport::new());
        mock.push(
            Method::Get,
            "/sales/performance",
            MockReply::json(400, json!({"message": "bad"})),
        )
        .always(Method::Get, "/sales/performance", MockReply::ok(json!({})));
        let client = client_with(mock.clone(), Some("t")).await;

        assert!(client
            .get_cached_value("/sales/performance", Query::new(), None)
            .await
            .is_err());
        assert!(client
            .get_cached_value("/sales/performance", Query::new(), None)
            .await
            .is_ok());
    }
}
