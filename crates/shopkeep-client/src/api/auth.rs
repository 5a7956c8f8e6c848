//! Login, token checks and password reset.

use serde_json::{json, Value};
use shopkeep_core::validation::{validate_email, validate_otp, validate_password};
use shopkeep_core::{UserProfile, ValidationError};
use shopkeep_db::StoredSession;
use tracing::{info, warn};

use crate::auth::TokenGrant;
use crate::error::{ClientError, ClientResult};
use crate::http::{ApiClient, Query};

pub struct AuthApi<'a> {
    client: &'a ApiClient,
}

fn success_flag(body: &Value) -> bool {
    body.get("success")
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

impl<'a> AuthApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        AuthApi { client }
    }

    /// Signs in and stores the session.
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<StoredSession> {
        if username.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "username".into(),
            }
            .into());
        }
        if password.is_empty() {
            return Err(ValidationError::Required {
                field: "password".into(),
            }
            .into());
        }

        let body = self
            .client
            .post_value(
                "/login",
                &json!({ "username": username.trim(), "password": password }),
            )
            .await?;

        let mut grant = TokenGrant::from_response(&body)?;
        if grant.user.is_none() {
            grant.user = Some(UserProfile {
                id: None,
                username: username.trim().to_string(),
                email: None,
                role: None,
            });
        }

        self.client.clear_cache();
        self.client.auth_manager().sign_in(grant).await
    }

    /// Forces a refresh of the current access token.
    pub async fn refresh(&self) -> ClientResult<String> {
        let auth = self.client.auth_manager();
        let current = auth.current_token().await.ok_or(ClientError::AuthRequired)?;
        auth.refresh_after(&current).await
    }

    /// Asks the server whether the stored token is still good.
    ///
    /// Signed out → `false` without a request.
    pub async fn validate_token(&self) -> ClientResult<bool> {
        if !self.client.auth_manager().is_signed_in().await {
            return Ok(false);
        }
        match self.client.get_value("/validate-token", Query::new()).await {
            Ok(body) => Ok(body
                .get("valid")
                .and_then(Value::as_bool)
                .unwrap_or(true)),
            Err(ClientError::Server { status: 401, .. }) | Err(ClientError::AccessDenied(_)) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn request_otp(&self, email: &str) -> ClientResult<()> {
        validate_email(email)?;
        self.client
            .post_value("/request-otp", &json!({ "email": email.trim() }))
            .await?;
        info!("OTP requested");
        Ok(())
    }

    /// Whether the server accepted the code.
    pub async fn verify_otp(&self, email: &str, otp: &str) -> ClientResult<bool> {
        validate_email(email)?;
        validate_otp(otp)?;
        let body = self
            .client
            .post_value(
                "/verify-otp",
                &json!({ "email": email.trim(), "otp": otp.trim() }),
            )
            .await?;
        Ok(success_flag(&body))
    }

    pub async fn reset_password(
        &self,
        email: &str,
        otp: &str,
        new_password: &str,
    ) -> ClientResult<bool> {
        validate_email(email)?;
        validate_otp(otp)?;
        validate_password(new_password)?;
        let body = self
            .client
            .post_value(
                "/reset-password",
                &json!({
                    "email": email.trim(),
                    "otp": otp.trim(),
                    "newPassword": new_password,
                }),
            )
            .await?;
        Ok(success_flag(&body))
    }

    /// Tells the server (best effort) and clears the local session.
    pub async fn logout(&self) -> ClientResult<()> {
        if self.client.auth_manager().is_signed_in().await {
            if let Err(e) = self.client.post_value("/logout", &json!({})).await {
                warn!(error = %e, "Server logout failed, clearing local session anyway");
            }
        }
        self.client.clear_cache();
        self.client.auth_manager().sign_out().await
    }
}
