//! # Session Repository
//!
//! The one stored login session: access token, refresh token, expiry and the
//! cached user profile.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use shopkeep_core::UserProfile;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

/// A persisted login session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub token: String,
    pub refresh_token: Option<String>,
    /// Access token expiry in epoch milliseconds, when known.
    pub expires_at_ms: Option<i64>,
    pub user: Option<UserProfile>,
}

impl StoredSession {
    /// Whether the access token is past its known expiry at `now_ms`.
    ///
    /// Unknown expiry counts as not expired; the server will answer 401.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at_ms.map(|exp| now_ms >= exp).unwrap_or(false)
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    token: String,
    refresh_token: Option<String>,
    expires_at_ms: Option<i64>,
    user_json: Option<String>,
}

/// Repository for the stored session.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SessionRepository { pool }
    }

    /// Loads the stored session, if any.
    ///
    /// A user profile that no longer parses is dropped, the tokens are kept.
    pub async fn load(&self) -> DbResult<Option<StoredSession>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT token, refresh_token, expires_at_ms, user_json
            FROM session
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let user = row
                .user_json
                .as_deref()
                .and_then(|json| serde_json::from_str(json).ok());
            StoredSession {
                token: row.token,
                refresh_token: row.refresh_token,
                expires_at_ms: row.expires_at_ms,
                user,
            }
        }))
    }

    /// Stores `session`, replacing any previous one.
    pub async fn save(&self, session: &StoredSession) -> DbResult<()> {
        let user_json = session
            .user
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        debug!(
            has_refresh = session.refresh_token.is_some(),
            expires_at_ms = ?session.expires_at_ms,
            "Saving session"
        );

        sqlx::query(
            r#"
            INSERT INTO session (id, token, refresh_token, expires_at_ms, user_json, updated_at)
            VALUES (1, ?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                token = excluded.token,
                refresh_token = excluded.refresh_token,
                expires_at_ms = excluded.expires_at_ms,
                user_json = excluded.user_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&session.token)
        .bind(&session.refresh_token)
        .bind(session.expires_at_ms)
        .bind(user_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes the stored session.
    pub async fn clear(&self) -> DbResult<()> {
        debug!("Clearing stored session");
        sqlx::query("DELETE FROM session")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn session() -> StoredSession {
        StoredSession {
            token: "access-1".into(),
            refresh_token: Some("refresh-1".into()),
            expires_at_ms: Some(1_700_000_000_000),
            user: Some(UserProfile {
                id: Some("u1".into()),
                username: "owner".into(),
                email: Some("owner@shop.pk".into()),
                role: Some("admin".into()),
            }),
        }
    }

    #[tokio::test]
    async fn test_save_load_clear() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.session();

        assert!(repo.load().await.unwrap().is_none());

        repo.save(&session()).await.unwrap();
        assert_eq!(repo.load().await.unwrap(), Some(session()));

        let rotated = StoredSession {
            token: "access-2".into(),
            ..session()
        };
        repo.save(&rotated).await.unwrap();
        assert_eq!(repo.load().await.unwrap().unwrap().token, "access-2");

        repo.clear().await.unwrap();
        assert!(repo.load().await.unwrap().is_none());
    }

    #[test]
    fn test_expiry_check() {
        let s = session();
        assert!(!s.is_expired_at(1_699_999_999_999));
        assert!(s.is_expired_at(1_700_000_000_000));

        let unknown = StoredSession {
            expires_at_ms: None,
            ..s
        };
        assert!(!unknown.is_expired_at(i64::MAX));
    }
}
