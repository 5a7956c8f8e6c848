//! # Auth State
//!
//! Login screen, session restore and the password reset flow.
//!
//! ```text
//! startup ──► restore() ──► stored session? ── no ──► login screen
//!                                 │
//!                                 yes ──► GET /validate-token
//!                                           ├─ valid ────────► signed in
//!                                           ├─ rejected ─────► expire, login screen
//!                                           └─ unreachable ──► signed in (offline)
//! ```

use std::sync::Arc;

use shopkeep_client::ApiClient;
use shopkeep_core::UserProfile;
use tracing::{info, warn};

use super::surface;
use crate::error::{ErrorCode, UiError, UiResult};
use crate::notifications::Notifications;

pub struct AuthState {
    client: ApiClient,
    notifications: Arc<Notifications>,
}

impl AuthState {
    pub fn new(client: ApiClient, notifications: Arc<Notifications>) -> Self {
        AuthState {
            client,
            notifications,
        }
    }

    pub async fn user(&self) -> Option<UserProfile> {
        self.client.auth_manager().user().await
    }

    pub async fn is_signed_in(&self) -> bool {
        self.client.auth_manager().is_signed_in().await
    }

    pub async fn login(&self, username: &str, password: &str) -> UiResult<UserProfile> {
        let session = self
            .client
            .auth()
            .login(username, password)
            .await
            .map_err(|e| surface(&self.notifications, e))?;

        let user = session.user.unwrap_or_else(|| UserProfile {
            id: None,
            username: username.trim().to_string(),
            email: None,
            role: None,
        });
        self.notifications
            .success(format!("Welcome back, {}", user.username));
        Ok(user)
    }

    /// Loads the saved session and checks it with the server.
    ///
    /// Returns whether the user is signed in afterwards. A server that
    /// cannot be reached keeps the session so the app works offline.
    pub async fn restore(&self) -> UiResult<bool> {
        let auth = self.client.auth_manager();
        let restored = auth
            .restore()
            .await
            .map_err(|e| surface(&self.notifications, e))?;
        if restored.is_none() {
            return Ok(false);
        }

        match self.client.auth().validate_token().await {
            Ok(true) => {
                info!("Stored session is valid");
                Ok(true)
            }
            Ok(false) => {
                auth.expire_session("stored token rejected").await;
                Ok(false)
            }
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "Could not validate stored session, keeping it");
                Ok(true)
            }
            Err(e) => {
                let err = UiError::from(e);
                if err.needs_login() {
                    return Ok(false);
                }
                Err(surface(&self.notifications, err))
            }
        }
    }

    pub async fn logout(&self) -> UiResult<()> {
        self.client
            .auth()
            .logout()
            .await
            .map_err(|e| surface(&self.notifications, e))
    }

    pub async fn request_otp(&self, email: &str) -> UiResult<()> {
        self.client
            .auth()
            .request_otp(email)
            .await
            .map_err(|e| surface(&self.notifications, e))?;
        self.notifications.info("A code was sent to your email");
        Ok(())
    }

    pub async fn verify_otp(&self, email: &str, otp: &str) -> UiResult<bool> {
        let accepted = self
            .client
            .auth()
            .verify_otp(email, otp)
            .await
            .map_err(|e| surface(&self.notifications, e))?;
        if !accepted {
            self.notifications
                .error(&UiError::new(ErrorCode::ValidationError, "That code is not valid"));
        }
        Ok(accepted)
    }

    pub async fn reset_password(&self, email: &str, otp: &str, new_password: &str) -> UiResult<bool> {
        let changed = self
            .client
            .auth()
            .reset_password(email, otp, new_password)
            .await
            .map_err(|e| surface(&self.notifications, e))?;
        if changed {
            self.notifications
                .success("Password changed, sign in with the new one");
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shopkeep_client::{AuthManager, ClientConfig, ClientError, Method, MockReply, MockTransport};
    use shopkeep_db::{Database, DbConfig};
    use std::time::Duration;

    fn state(mock: Arc<MockTransport>, db: Option<Database>) -> (AuthState, Arc<Notifications>) {
        let mut auth = AuthManager::new(mock.clone());
        if let Some(db) = db {
            auth = auth.with_database(db);
        }
        let mut config = ClientConfig::default();
        config.retry.base_delay_ms = 1;
        let client = ApiClient::new(mock, Arc::new(auth), &config);
        let notes = Arc::new(Notifications::new(Duration::from_secs(5)));
        (AuthState::new(client, notes.clone()), notes)
    }

    #[tokio::test]
    async fn test_login_returns_profile() {
        let mock = Arc::new(MockTransport::new());
        mock.always(
            Method::Post,
            "/login",
            MockReply::ok(json!({
                "token": "t1",
                "user": {"_id": "u1", "username": "owner", "role": "admin"}
            })),
        );
        let (auth, notes) = state(mock, None);

        let user = auth.login("owner", "pw").await.unwrap();
        assert_eq!(user.username, "owner");
        assert!(auth.is_signed_in().await);
        assert_eq!(notes.active().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_credentials_toast_validation_does_not() {
        let mock = Arc::new(MockTransport::new());
        mock.always(
            Method::Post,
            "/login",
            MockReply::json(401, json!({"message": "Invalid username or password"})),
        );
        let (auth, notes) = state(mock.clone(), None);

        let err = auth.login("", "pw").await.unwrap_err();
        assert!(err.is_validation());
        assert!(notes.active().is_empty());

        let err = auth.login("owner", "wrong").await.unwrap_err();
        assert_eq!(err.message, "Invalid username or password");
        assert!(!auth.is_signed_in().await);
    }

    #[tokio::test]
    async fn test_restore_rejected_token_expires_session() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Post, "/login", MockReply::ok(json!({"token": "t1"})))
            .always(Method::Get, "/validate-token", MockReply::ok(json!({"valid": false})));

        let (first, _) = state(mock.clone(), Some(db.clone()));
        first.login("owner", "pw").await.unwrap();

        let (second, _) = state(mock, Some(db.clone()));
        assert!(!second.restore().await.unwrap());
        assert!(!second.is_signed_in().await);
        assert!(db.session().load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_offline_keeps_session() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Post, "/login", MockReply::ok(json!({"token": "t1"})))
            .always(
                Method::Get,
                "/validate-token",
                MockReply::fail(ClientError::Network("offline".into())),
            );

        let (first, _) = state(mock.clone(), Some(db.clone()));
        first.login("owner", "pw").await.unwrap();

        let (second, _) = state(mock, Some(db));
        assert!(second.restore().await.unwrap());
        assert_eq!(second.user().await.unwrap().username, "owner");
    }

    #[tokio::test]
    async fn test_rejected_otp_shows_error() {
        let mock = Arc::new(MockTransport::new());
        mock.always(Method::Post, "/verify-otp", MockReply::ok(json!({"success": false})));
        let (auth, notes) = state(mock, None);

        assert!(!auth.verify_otp("o@shop.pk", "1234").await.unwrap());
        assert_eq!(notes.active().len(), 1);
    }
}
