//! # Search With Remote Fallback
//!
//! Drives a search box over a locally cached list, going to the server only
//! when nothing local matches.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  on_query_change(q)                                                     │
//! │     │  abort pending debounce, generation += 1                          │
//! │     ▼                                                                   │
//! │  q empty ───────────────────────────────────────────────► Idle          │
//! │     │                                                                   │
//! │  local hits > 0 ────────────────────────────────────────► LocalMatch(h) │
//! │     │                                                                   │
//! │  len(q) < min_remote_query_len ─────────────────────────► LocalMatch([])│
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  DebouncePending ── quiet for debounce_ms ──► RemoteSearching           │
//! │                                                 │                       │
//! │                         results ──► merge into cache ──► RemoteDone(r)  │
//! │                         none    ─────────────────────► RemoteEmpty      │
//! │                         error   ─────────────────────► RemoteFailed(e)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Local hits always win; a remote search is never started while anything
//! local matches. A keystroke aborts the pending debounce timer, so only the
//! last query of a burst reaches the server. A request already sent is not
//! aborted; its result is dropped if the query changed meanwhile.
//!
//! The generation is checked inside the watch channel's write lock, and a
//! keystroke bumps it before publishing, so a stale result either lands
//! before the new state (and is overwritten) or not at all.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use shopkeep_client::config::SearchSettings;
use shopkeep_client::ClientResult;
use shopkeep_core::search::{filter_local, normalize_query};
use shopkeep_core::Searchable;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::UiError;
use crate::state::lock;

// =============================================================================
// Search Source
// =============================================================================

/// A locally cached list that can also be searched on the server.
#[async_trait]
pub trait SearchSource<T>: Send + Sync + 'static {
    /// Snapshot of the records held locally.
    fn cached(&self) -> Vec<T>;

    /// Server-side search.
    async fn fetch(&self, query: &str, limit: u64) -> ClientResult<Vec<T>>;

    /// Adds records found remotely to the local cache, skipping known keys.
    fn merge(&self, found: Vec<T>) -> usize;
}

// =============================================================================
// Search State
// =============================================================================

/// What the search box shows.
///
/// `DebouncePending`, `RemoteSearching` and `RemoteEmpty` are distinct so the
/// UI never flashes "no results" while a search is still possible.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "camelCase")]
pub enum SearchState<T> {
    Idle,
    LocalMatch(Vec<T>),
    DebouncePending,
    RemoteSearching,
    RemoteDone(Vec<T>),
    RemoteEmpty,
    RemoteFailed(UiError),
}

// =============================================================================
// Controller
// =============================================================================

struct Shared<T, S> {
    source: Arc<S>,
    settings: SearchSettings,
    state: watch::Sender<SearchState<T>>,
    /// Bumped on every query change; results of older generations are dropped.
    generation: AtomicU64,
}

impl<T, S> Shared<T, S> {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Stores `next` only if `generation` is still current when the write
    /// lock is held.
    fn publish(&self, generation: u64, next: SearchState<T>) -> bool {
        self.state.send_if_modified(|state| {
            if !self.is_current(generation) {
                return false;
            }
            *state = next;
            true
        })
    }
}

pub struct SearchController<T, S> {
    shared: Arc<Shared<T, S>>,
    debounce: Mutex<Option<JoinHandle<()>>>,
}

impl<T, S> SearchController<T, S>
where
    T: Searchable + Clone + Send + Sync + 'static,
    S: SearchSource<T>,
{
    pub fn new(source: Arc<S>, settings: SearchSettings) -> Self {
        let (state, _) = watch::channel(SearchState::Idle);
        SearchController {
            shared: Arc::new(Shared {
                source,
                settings,
                state,
                generation: AtomicU64::new(0),
            }),
            debounce: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState<T>> {
        self.shared.state.subscribe()
    }

    pub fn state(&self) -> SearchState<T> {
        self.shared.state.borrow().clone()
    }

    fn abort_debounce(&self) {
        if let Some(handle) = lock(&self.debounce).take() {
            handle.abort();
        }
    }

    /// Handles one keystroke. Must be called inside a tokio runtime.
    pub fn on_query_change(&self, query: &str) {
        self.abort_debounce();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let needle = normalize_query(query);
        if needle.is_empty() {
            self.shared.publish(generation, SearchState::Idle);
            return;
        }

        let cached = self.shared.source.cached();
        let hits: Vec<T> = filter_local(&cached, &needle).into_iter().cloned().collect();
        if !hits.is_empty() {
            debug!(query = %needle, hits = hits.len(), "Local search hit");
            self.shared.publish(generation, SearchState::LocalMatch(hits));
            return;
        }

        if needle.chars().count() < self.shared.settings.min_remote_query_len {
            self.shared
                .publish(generation, SearchState::LocalMatch(Vec::new()));
            return;
        }

        self.shared.publish(generation, SearchState::DebouncePending);

        let shared = Arc::clone(&self.shared);
        let remote_query = query.trim().to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(shared.settings.debounce()).await;
            if !shared.is_current(generation) {
                return;
            }
            // Detached so a later keystroke cannot abort a request already sent.
            tokio::spawn(run_remote(shared, generation, remote_query));
        });

        *lock(&self.debounce) = Some(handle);
    }

    /// Drops any pending search and returns to `Idle`.
    pub fn cancel(&self) {
        self.abort_debounce();
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.state.send_replace(SearchState::Idle);
    }
}

async fn run_remote<T, S>(shared: Arc<Shared<T, S>>, generation: u64, query: String)
where
    T: Searchable + Clone + Send + Sync + 'static,
    S: SearchSource<T>,
{
    if !shared.publish(generation, SearchState::RemoteSearching) {
        return;
    }
    debug!(query = %query, "Remote search");

    let result = shared
        .source
        .fetch(&query, shared.settings.remote_limit)
        .await;

    if !shared.is_current(generation) {
        debug!(query = %query, "Discarding superseded search result");
        return;
    }

    let next = match result {
        Ok(found) if found.is_empty() => SearchState::RemoteEmpty,
        Ok(found) => {
            let added = shared.source.merge(found.clone());
            debug!(query = %query, found = found.len(), added, "Remote search done");
            SearchState::RemoteDone(found)
        }
        Err(e) => {
            warn!(query = %query, error = %e, "Remote search failed");
            SearchState::RemoteFailed(e.into())
        }
    };
    shared.publish(generation, next);
}

impl<T, S> Drop for SearchController<T, S> {
    fn drop(&mut self) {
        let slot = self
            .debounce
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
    }
}
