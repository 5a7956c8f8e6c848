//! # Session and Token Refresh
//!
//! Owns the access token, refreshes it when the server says it is stale,
//! and makes sure only one refresh is ever in flight.
//!
//! ## Refresh Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Single-Flight Token Refresh                          │
//! │                                                                         │
//! │  request A ──401──┐                                                     │
//! │  request B ──401──┼──► refresh_after("old")                             │
//! │  request C ──401──┘          │                                          │
//! │                              ▼                                          │
//! │                  ┌────────────────────────┐                             │
//! │                  │ refresh_lock (Mutex)   │  A gets it, B and C queue   │
//! │                  └───────────┬────────────┘                             │
//! │                              │                                          │
//! │       token still "old"? ───yes──► POST /refresh-token ──► "new"        │
//! │              │                                                          │
//! │              no (B, C: A already swapped it)                            │
//! │              ▼                                                          │
//! │       return current token "new"  ◄── no second refresh call           │
//! │                                                                         │
//! │  Refresh rejected ──► clear session (memory + SQLite)                   │
//! │                   ──► persist "session expired" notice                  │
//! │                   ──► AuthEvent::SessionExpired ──► UI goes to login    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{json, Value};
use shopkeep_core::UserProfile;
use shopkeep_db::{Database, StoredSession};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::transport::{HttpRequest, HttpTransport, Method};

/// Endpoints reachable without a session.
pub const PUBLIC_PATHS: &[&str] = &[
    "/login",
    "/request-otp",
    "/verify-otp",
    "/reset-password",
    "/refresh-token",
    "/validate-token",
];

/// Cache key of the message shown once on the login screen.
pub const PENDING_NOTICE_KEY: &str = "notice:pending";

pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please sign in again.";

pub fn is_public_path(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path).trim_end_matches('/');
    PUBLIC_PATHS.contains(&path)
}

// =============================================================================
// Token Grant
// =============================================================================

/// What `/login` and `/refresh-token` hand back.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, when the server says.
    pub expires_in: Option<i64>,
    pub user: Option<UserProfile>,
}

impl TokenGrant {
    pub fn from_response(body: &Value) -> ClientResult<Self> {
        let field = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| body.get(*k))
                .find_map(|v| v.as_str().map(str::to_string))
        };

        let token = field(&["token", "accessToken", "access_token"])
            .ok_or_else(|| ClientError::Decode("response carries no token".into()))?;

        let expires_in = body.get("expiresIn").and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        let user = body
            .get("user")
            .filter(|u| u.is_object())
            .map(crate::normalize::user_profile);

        Ok(TokenGrant {
            token,
            refresh_token: field(&["refreshToken", "refresh_token"]),
            expires_in,
            user,
        })
    }

    /// Expiry in epoch millis: `expiresIn` first, then the JWT `exp` claim.
    pub fn expires_at_ms(&self, now_ms: i64) -> Option<i64> {
        self.expires_in
            .map(|secs| now_ms + secs * 1000)
            .or_else(|| jwt_expiry_ms(&self.token))
    }
}

#[derive(Debug, Deserialize)]
struct ExpClaim {
    exp: Option<i64>,
}

/// Reads `exp` from a JWT without verifying it. The server verifies; the
/// client only needs to know when to refresh.
pub fn jwt_expiry_ms(token: &str) -> Option<i64> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<ExpClaim>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .and_then(|data| data.claims.exp)
        .map(|exp| exp * 1000)
}

// =============================================================================
// Auth Events
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn { username: Option<String> },
    TokenRefreshed,
    /// The session was dropped; the UI should show the login screen.
    SessionExpired { reason: String },
    SignedOut,
}

// =============================================================================
// Auth Manager
// =============================================================================

/// Session holder shared by every request.
pub struct AuthManager {
    transport: Arc<dyn HttpTransport>,
    db: Option<Database>,
    session: RwLock<Option<StoredSession>>,
    refresh_lock: Mutex<()>,
    events: broadcast::Sender<AuthEvent>,
    refresh_calls: AtomicU64,
}

impl AuthManager {
    /// A manager that keeps the session in memory only.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        let (events, _) = broadcast::channel(16);
        AuthManager {
            transport,
            db: None,
            session: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            events,
            refresh_calls: AtomicU64::new(0),
        }
    }

    /// Persists the session (and the expiry notice) to `db`.
    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Number of `/refresh-token` calls made so far.
    pub fn refresh_calls(&self) -> u64 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Loads the stored session into memory.
    pub async fn restore(&self) -> ClientResult<Option<StoredSession>> {
        let Some(db) = &self.db else {
            return Ok(self.session().await);
        };
        let stored = db.session().load().await?;
        debug!(found = stored.is_some(), "Restored session from storage");
        *self.session.write().await = stored.clone();
        Ok(stored)
    }

    pub async fn session(&self) -> Option<StoredSession> {
        self.session.read().await.clone()
    }

    pub async fn current_token(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.token.clone())
    }

    pub async fn user(&self) -> Option<UserProfile> {
        self.session.read().await.as_ref().and_then(|s| s.user.clone())
    }

    pub async fn is_signed_in(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Stores a fresh session after a successful login.
    pub async fn sign_in(&self, grant: TokenGrant) -> ClientResult<StoredSession> {
        let session = StoredSession {
            expires_at_ms: grant.expires_at_ms(Utc::now().timestamp_millis()),
            token: grant.token,
            refresh_token: grant.refresh_token,
            user: grant.user,
        };

        if let Some(db) = &self.db {
            db.session().save(&session).await?;
        }
        *self.session.write().await = Some(session.clone());

        let username = session.user.as_ref().map(|u| u.username.clone());
        info!(username = ?username, expires_at_ms = ?session.expires_at_ms, "Signed in");
        self.emit(AuthEvent::SignedIn { username });
        Ok(session)
    }

    /// Replaces the cached user profile.
    pub async fn set_user(&self, user: UserProfile) -> ClientResult<()> {
        let updated = {
            let mut guard = self.session.write().await;
            let Some(session) = guard.as_mut() else {
                return Err(ClientError::AuthRequired);
            };
            session.user = Some(user);
            session.clone()
        };
        if let Some(db) = &self.db {
            db.session().save(&updated).await?;
        }
        Ok(())
    }

    /// Token to attach to a protected request.
    ///
    /// Fails fast with [`ClientError::AuthRequired`] when signed out, and
    /// refreshes first when the known expiry has already passed.
    pub async fn token_for_request(&self) -> ClientResult<String> {
        let session = self
            .session
            .read()
            .await
            .clone()
            .ok_or(ClientError::AuthRequired)?;

        if session.is_expired_at(Utc::now().timestamp_millis()) && session.refresh_token.is_some() {
            debug!("Access token past expiry, refreshing before send");
            return self.refresh_after(&session.token).await;
        }
        Ok(session.token)
    }

    /// Refreshes the session that was using `stale_token`.
    ///
    /// Callers that queue up behind a refresh find the token already
    /// swapped and get the new one without another call.
    pub async fn refresh_after(&self, stale_token: &str) -> ClientResult<String> {
        let _guard = self.refresh_lock.lock().await;

        let session = self
            .session
            .read()
            .await
            .clone()
            .ok_or(ClientError::AuthRequired)?;

        // Double-check after acquiring the refresh lock
        if session.token != stale_token
            && !session.is_expired_at(Utc::now().timestamp_millis())
        {
            debug!("Token already refreshed by another request");
            return Ok(session.token);
        }

        let Some(refresh_token) = session.refresh_token.clone() else {
            let reason = "no refresh token".to_string();
            self.expire_session(&reason).await;
            return Err(ClientError::RefreshTokenInvalid(reason));
        };

        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        info!("Refreshing access token");

        let request = HttpRequest::new(Method::Post, "/refresh-token")
            .with_body(json!({ "refreshToken": refresh_token }));

        let reason = match self.transport.send(request).await {
            Ok(resp) if resp.is_success() => match TokenGrant::from_response(&resp.body) {
                Ok(grant) => return self.store_refreshed(session, grant).await,
                Err(e) => e.to_string(),
            },
            Ok(resp) => resp
                .server_message()
                .unwrap_or_else(|| format!("refresh rejected with status {}", resp.status)),
            Err(e @ (ClientError::Network(_) | ClientError::Timeout(_))) => {
                // Nothing came back; the refresh token may still be good.
                warn!(error = %e, "Token refresh did not reach the server");
                return Err(e);
            }
            Err(e) => e.to_string(),
        };

        warn!(reason = %reason, "Token refresh failed");
        self.expire_session(&reason).await;
        Err(ClientError::RefreshTokenInvalid(reason))
    }

    async fn store_refreshed(
        &self,
        previous: StoredSession,
        grant: TokenGrant,
    ) -> ClientResult<String> {
        let session = StoredSession {
            expires_at_ms: grant.expires_at_ms(Utc::now().timestamp_millis()),
            refresh_token: grant.refresh_token.or(previous.refresh_token),
            user: grant.user.or(previous.user),
            token: grant.token,
        };

        if let Some(db) = &self.db {
            if let Err(e) = db.session().save(&session).await {
                warn!(error = %e, "Failed to persist refreshed session");
            }
        }

        let token = session.token.clone();
        *self.session.write().await = Some(session);
        info!("Access token refreshed");
        self.emit(AuthEvent::TokenRefreshed);
        Ok(token)
    }

    /// Drops the session because it can no longer be used.
    pub async fn expire_session(&self, reason: &str) {
        *self.session.write().await = None;

        if let Some(db) = &self.db {
            if let Err(e) = db.session().clear().await {
                warn!(error = %e, "Failed to clear stored session");
            }
            if let Err(e) = db
                .cache()
                .put(PENDING_NOTICE_KEY, SESSION_EXPIRED_MESSAGE)
                .await
            {
                warn!(error = %e, "Failed to persist session notice");
            }
        }

        info!(reason = %reason, "Session expired");
        self.emit(AuthEvent::SessionExpired {
            reason: reason.to_string(),
        });
    }

    /// Clears the session on explicit logout.
    pub async fn sign_out(&self) -> ClientResult<()> {
        *self.session.write().await = None;
        if let Some(db) = &self.db {
            db.session().clear().await?;
        }
        info!("Signed out");
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockReply, MockTransport};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use shopkeep_db::DbConfig;
    use std::time::Duration;

    fn grant(token: &str) -> TokenGrant {
        TokenGrant {
            token: token.into(),
            refresh_token: Some("refresh-1".into()),
            expires_in: Some(3600),
            user: None,
        }
    }

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/login"));
        assert!(is_public_path("/refresh-token/"));
        assert!(is_public_path("/validate-token?x=1"));
        assert!(!is_public_path("/products"));
        assert!(!is_public_path("/logout"));
    }

    #[test]
    fn test_grant_parsing() {
        let g = TokenGrant::from_response(&json!({
            "token": "abc",
            "refreshToken": "def",
            "expiresIn": "60",
            "user": {"username": "owner", "role": "admin"}
        }))
        .unwrap();
        assert_eq!(g.refresh_token.as_deref(), Some("def"));
        assert_eq!(g.expires_at_ms(1_000), Some(61_000));
        assert_eq!(g.user.unwrap().username, "owner");

        assert!(matches!(
            TokenGrant::from_response(&json!({"ok": true})),
            Err(ClientError::Decode(_))
        ));
    }

    #[test]
    fn test_jwt_exp_fallback() {
        #[derive(serde::Serialize)]
        struct Claims {
            sub: String,
            exp: i64,
        }
        let token = encode(
            &Header::default(),
            &Claims {
                sub: "u1".into(),
                exp: 1_900_000_000,
            },
            &EncodingKey::from_secret(b"server-secret"),
        )
        .unwrap();

        assert_eq!(jwt_expiry_ms(&token), Some(1_900_000_000_000));
        assert_eq!(jwt_expiry_ms("not-a-jwt"), None);

        let g = TokenGrant {
            token,
            refresh_token: None,
            expires_in: None,
            user: None,
        };
        assert_eq!(g.expires_at_ms(0), Some(1_900_000_000_000));
    }

    #[tokio::test]
    async fn test_signed_out_fails_fast() {
        let mock = Arc::new(MockTransport::new());
        let auth = AuthManager::new(mock.clone());
        assert_eq!(
            auth.token_for_request().await.unwrap_err(),
            ClientError::AuthRequired
        );
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_single_flight() {
        let mock = Arc::new(MockTransport::new());
        mock.always(
            Method::Post,
            "/refresh-token",
            MockReply::ok(json!({"token": "new", "expiresIn": 3600}))
                .after(Duration::from_millis(30)),
        );

        let auth = Arc::new(AuthManager::new(mock.clone()));
        auth.sign_in(grant("old")).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let auth = auth.clone();
                tokio::spawn(async move { auth.refresh_after("old").await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "new");
        }
        assert_eq!(mock.count(Method::Post, "/refresh-token"), 1);
        assert_eq!(auth.refresh_calls(), 1);

        // Refresh token is kept when the server does not rotate it.
        let session = auth.session().await.unwrap();
        assert_eq!(session.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_everything() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mock = Arc::new(MockTransport::new());
        mock.push(
            Method::Post,
            "/refresh-token",
            MockReply::json(401, json!({"message": "Refresh token expired"})),
        );

        let auth = AuthManager::new(mock.clone()).with_database(db.clone());
        let mut events = auth.subscribe();
        auth.sign_in(grant("old")).await.unwrap();
        assert!(matches!(events.recv().await.unwrap(), AuthEvent::SignedIn { .. }));

        let err = auth.refresh_after("old").await.unwrap_err();
        assert_eq!(
            err,
            ClientError::RefreshTokenInvalid("Refresh token expired".into())
        );
        assert!(err.forces_logout());

        assert!(auth.session().await.is_none());
        assert!(db.session().load().await.unwrap().is_none());
        let notice: Option<String> = db.cache().get(PENDING_NOTICE_KEY).await.unwrap();
        assert_eq!(notice.as_deref(), Some(SESSION_EXPIRED_MESSAGE));
        assert_eq!(
            events.recv().await.unwrap(),
            AuthEvent::SessionExpired {
                reason: "Refresh token expired".into()
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_refresh_keeps_session() {
        let mock = Arc::new(MockTransport::new());
        mock.push(
            Method::Post,
            "/refresh-token",
            MockReply::fail(ClientError::Network("connection refused".into())),
        );
        let auth = AuthManager::new(mock.clone());
        auth.sign_in(grant("old")).await.unwrap();

        let err = auth.refresh_after("old").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(auth.current_token().await.as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_before_send() {
        let mock = Arc::new(MockTransport::new());
        mock.always(
            Method::Post,
            "/refresh-token",
            MockReply::ok(json!({"token": "fresh", "expiresIn": 3600})),
        );
        let auth = AuthManager::new(mock.clone());
        auth.sign_in(TokenGrant {
            expires_in: Some(-10),
            ..grant("stale")
        })
        .await
        .unwrap();

        assert_eq!(auth.token_for_request().await.unwrap(), "fresh");
        assert_eq!(auth.token_for_request().await.unwrap(), "fresh");
        assert_eq!(mock.count(Method::Post, "/refresh-token"), 1);
    }

    #[tokio::test]
    async fn test_restore_and_sign_out() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mock: Arc<dyn HttpTransport> = Arc::new(MockTransport::new());

        let first = AuthManager::new(mock.clone()).with_database(db.clone());
        first.sign_in(grant("persisted")).await.unwrap();

        let second = AuthManager::new(mock).with_database(db.clone());
        let restored = second.restore().await.unwrap().unwrap();
        assert_eq!(restored.token, "persisted");
        assert_eq!(second.token_for_request().await.unwrap(), "persisted");

        second.sign_out().await.unwrap();
        assert!(!second.is_signed_in().await);
        assert!(db.session().load().await.unwrap().is_none());
    }
}
