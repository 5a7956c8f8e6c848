//! # Notifications
//!
//! Toast queue shown over every screen.
//!
//! ```text
//! push ──► [toast #1 (5s)] [toast #2 (5s)] [notice (sticky)]
//!              │                                 │
//!              └── expires on its own            └── dismiss(id)
//! ```
//!
//! Expiry is evaluated on read, against tokio's clock, so paused-time tests
//! can step past the TTL. A session-expiry notice is written to the local
//! store by the auth layer and shown here once, after the redirect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use shopkeep_client::auth::PENDING_NOTICE_KEY;
use shopkeep_db::CacheRepository;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::UiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Toast {
    pub id: u64,
    pub kind: ToastKind,
    pub message: String,
    /// Error code for error toasts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip)]
    expires_at: Option<Instant>,
}

impl Toast {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now < at).unwrap_or(true)
    }
}

pub struct Notifications {
    toasts: Mutex<Vec<Toast>>,
    next_id: AtomicU64,
    ttl: Duration,
    /// Bumped whenever the queue changes.
    revision: watch::Sender<u64>,
}

impl Notifications {
    pub fn new(ttl: Duration) -> Self {
        let (revision, _) = watch::channel(0);
        Notifications {
            toasts: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            ttl,
            revision,
        }
    }

    /// Receiver that changes whenever a toast is added or dismissed.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Toast>> {
        self.toasts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn add(&self, kind: ToastKind, message: String, code: Option<String>, sticky: bool) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let expires_at = (!sticky).then(|| Instant::now() + self.ttl);
        debug!(toast_id = id, kind = ?kind, sticky, "Toast shown");
        self.lock().push(Toast {
            id,
            kind,
            message,
            code,
            expires_at,
        });
        self.revision.send_modify(|rev| *rev += 1);
        id
    }

    pub fn info(&self, message: impl Into<String>) -> u64 {
        self.add(ToastKind::Info, message.into(), None, false)
    }

    pub fn success(&self, message: impl Into<String>) -> u64 {
        self.add(ToastKind::Success, message.into(), None, false)
    }

    /// A toast that stays until dismissed.
    pub fn sticky(&self, kind: ToastKind, message: impl Into<String>) -> u64 {
        self.add(kind, message.into(), None, true)
    }

    /// Shows `err` as an error toast unless it is silent.
    ///
    /// Returns the toast id, `None` when nothing was shown.
    pub fn error(&self, err: &UiError) -> Option<u64> {
        if err.silent {
            debug!(code = ?err.code, "Silent error, no toast");
            return None;
        }
        let code = serde_json::to_value(err.code)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string));
        Some(self.add(ToastKind::Error, err.message.clone(), code, false))
    }

    /// Removes a toast. Returns whether it was still showing.
    pub fn dismiss(&self, id: u64) -> bool {
        let removed = {
            let mut toasts = self.lock();
            let before = toasts.len();
            toasts.retain(|t| t.id != id);
            toasts.len() != before
        };
        if removed {
            self.revision.send_modify(|rev| *rev += 1);
        }
        removed
    }

    /// Toasts still on screen, oldest first. Expired ones are dropped.
    pub fn active(&self) -> Vec<Toast> {
        let now = Instant::now();
        let mut toasts = self.lock();
        toasts.retain(|t| t.is_live(now));
        toasts.clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Shows the notice left behind by a forced logout, at most once.
    pub async fn show_pending(&self, cache: &CacheRepository) -> Option<u64> {
        match cache.take::<String>(PENDING_NOTICE_KEY).await {
            Ok(Some(message)) => Some(self.sticky(ToastKind::Info, message)),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Could not read pending notice");
                None
            }
        }
    }
}
