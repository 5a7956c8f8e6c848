//! # Optimistic List
//!
//! Local collection that applies mutations before the server confirms them
//! and can undo them if the server refuses.
//!
//! ## Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Optimistic Mutation Flow                             │
//! │                                                                         │
//! │  apply(key, f)                                                          │
//! │     │  1. deep snapshot of the WHOLE list                               │
//! │     │  2. f(list) runs synchronously  ──► UI shows the change now       │
//! │     │  3. key stamped with seq N                                        │
//! │     ▼                                                                   │
//! │  Ticket { key, seq: N, snapshot, prior record }                         │
//! │     │                                                                   │
//! │     ├── server OK ──► commit(ticket, patch)                             │
//! │     │                   stamp still N? ── yes ──► patch record in place │
//! │     │                                    no  ──► Superseded (discard)   │
//! │     │                                                                   │
//! │     └── server ERR ─► rollback(ticket)                                  │
//! │                         stamp moved on?  ──► Superseded                 │
//! │                         list untouched since apply? ──► RestoredSnapshot│
//! │                         otherwise ──► RestoredRecord (only this key)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Same-Record Races
//! Two quick edits of one record each get their own sequence stamp. A
//! response for the older edit arriving after the newer edit was applied is
//! reported as [`Outcome::Superseded`] and leaves the list alone, so the
//! newest local intent always wins instead of whichever response lands last.
//!
//! While edits of a key are outstanding the list also keeps the key's
//! *base*: the last value the server confirmed. It starts as the record
//! before the oldest outstanding edit and moves forward when a superseded
//! edit commits. A failing newest edit restores the base, never a value
//! only an older, also failed, edit produced. The entry is dropped once the
//! newest edit resolves and no older one is still in flight.

use std::collections::HashMap;

use crate::types::{Product, Supplier};

// =============================================================================
// Keyed Trait
// =============================================================================

/// A record with a stable identity inside an [`OptimisticList`].
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Product {
    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl Keyed for Supplier {
    fn key(&self) -> &str {
        self.id.as_str()
    }
}

// =============================================================================
// Ticket / Outcome
// =============================================================================

/// Receipt for an applied mutation. Pass it back to `commit` or `rollback`.
#[derive(Debug, Clone)]
#[must_use = "an optimistic mutation must be committed or rolled back"]
pub struct Ticket<T> {
    key: String,
    seq: u64,
    version_after: u64,
    snapshot: Vec<T>,
    prior: Option<(usize, T)>,
    after: Option<(usize, T)>,
}

impl<T> Ticket<T> {
    /// Key of the mutated record at apply time.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The full list as it was before the mutation.
    pub fn snapshot(&self) -> &[T] {
        &self.snapshot
    }

    /// True when the record did not exist before (a create).
    pub fn is_create(&self) -> bool {
        self.prior.is_none()
    }
}

/// What `commit` or `rollback` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Server result applied to the record.
    Committed,
    /// Whole list restored verbatim from the snapshot.
    RestoredSnapshot,
    /// Only the affected record restored; other changes kept.
    RestoredRecord,
    /// A newer mutation of the same record owns it; nothing changed.
    Superseded,
}

// =============================================================================
// Optimistic List
// =============================================================================

/// Bookkeeping for a key with unresolved mutations.
#[derive(Debug, Clone)]
struct Pending<T> {
    /// Sequence of the newest mutation.
    seq: u64,
    /// Last server-confirmed record and its position; `None` if absent.
    base: Option<(usize, T)>,
    /// Tickets issued for this key and not yet resolved.
    outstanding: usize,
    /// The newest mutation already rolled back while older ones are in flight.
    newest_failed: bool,
}

#[derive(Debug, Clone)]
pub struct OptimisticList<T> {
    items: Vec<T>,
    /// Bumped on every change to `items`.
    version: u64,
    next_seq: u64,
    pending: HashMap<String, Pending<T>>,
}

impl<T> Default for OptimisticList<T> {
    fn default() -> Self {
        OptimisticList {
            items: Vec::new(),
            version: 0,
            next_seq: 0,
            pending: HashMap::new(),
        }
    }
}

impl<T: Keyed + Clone> OptimisticList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<T>) -> Self {
        OptimisticList {
            items,
            ..Self::default()
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.items.iter().find(|item| item.key() == key)
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.items.iter().position(|item| item.key() == key)
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    /// Number of keys with unresolved mutations.
    pub fn pending_keys(&self) -> usize {
        self.pending.len()
    }

    /// Puts `record` back under `key`, or removes the key when `None`.
    fn restore_record(&mut self, key: &str, record: Option<(usize, T)>) {
        match (self.position(key), record) {
            (Some(pos), Some((_, record))) => self.items[pos] = record,
            (Some(pos), None) => {
                self.items.remove(pos);
            }
            (None, Some((idx, record))) => {
                let idx = idx.min(self.items.len());
                self.items.insert(idx, record);
            }
            (None, None) => {}
        }
    }

    /// Counts one ticket of `key` as resolved, dropping the entry at zero.
    fn settle(&mut self, key: &str) {
        if let Some(entry) = self.pending.get_mut(key) {
            entry.outstanding = entry.outstanding.saturating_sub(1);
            if entry.outstanding == 0 {
                self.pending.remove(key);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Non-optimistic changes (server already confirmed)
    // -------------------------------------------------------------------------

    /// Replaces the whole list, e.g. after a fresh load.
    pub fn replace_all(&mut self, items: Vec<T>) {
        self.items = items;
        self.touch();
    }

    /// Appends records whose key is not present yet. Returns how many were added.
    pub fn extend_unique(&mut self, incoming: impl IntoIterator<Item = T>) -> usize {
        let before = self.items.len();
        for item in incoming {
            if self.position(item.key()).is_none() {
                self.items.push(item);
            }
        }
        let added = self.items.len() - before;
        if added > 0 {
            self.touch();
        }
        added
    }

    /// Inserts or replaces a confirmed record.
    pub fn upsert(&mut self, item: T) {
        match self.position(item.key()) {
            Some(idx) => self.items[idx] = item,
            None => self.items.push(item),
        }
        self.touch();
    }

    // -------------------------------------------------------------------------
    // Optimistic changes
    // -------------------------------------------------------------------------

    /// Snapshots the list, runs `mutate` and stamps `key`.
    ///
    /// `key` names the record the mutation is about; for a create it is the
    /// temp key of the record `mutate` inserts.
    pub fn apply(&mut self, key: &str, mutate: impl FnOnce(&mut Vec<T>)) -> Ticket<T> {
        let snapshot = self.items.clone();
        let prior = self
            .position(key)
            .map(|idx| (idx, self.items[idx].clone()));

        mutate(&mut self.items);
        self.touch();
        let after = self
            .position(key)
            .map(|idx| (idx, self.items[idx].clone()));

        self.next_seq += 1;
        let seq = self.next_seq;
        let entry = self.pending.entry(key.to_string()).or_insert_with(|| Pending {
            seq,
            base: prior.clone(),
            outstanding: 0,
            newest_failed: false,
        });
        entry.seq = seq;
        entry.outstanding += 1;
        entry.newest_failed = false;

        Ticket {
            key: key.to_string(),
            seq,
            version_after: self.version,
            snapshot,
            prior,
            after,
        }
    }

    /// Optimistically appends a new record.
    pub fn insert(&mut self, item: T) -> Ticket<T> {
        let key = item.key().to_string();
        self.apply(&key, move |items| items.push(item))
    }

    /// Optimistically edits the record under `key`; `None` if absent.
    pub fn update(&mut self, key: &str, edit: impl FnOnce(&mut T)) -> Option<Ticket<T>> {
        let idx = self.position(key)?;
        Some(self.apply(key, move |items| edit(&mut items[idx])))
    }

    /// Optimistically removes the record under `key`; `None` if absent.
    pub fn remove(&mut self, key: &str) -> Option<Ticket<T>> {
        let idx = self.position(key)?;
        Some(self.apply(key, move |items| {
            items.remove(idx);
        }))
    }

    /// Reconciles with the server result.
    ///
    /// `patch` runs on the record (if it still exists) and may change its
    /// key, e.g. swapping a temp id for the server id. For a superseded
    /// ticket it runs on the confirmed base instead, which the list shows
    /// again only if the newer mutation fails.
    pub fn commit(&mut self, ticket: Ticket<T>, patch: impl FnOnce(&mut T)) -> Outcome {
        let Some(entry) = self.pending.get(&ticket.key) else {
            return Outcome::Superseded;
        };

        if entry.seq != ticket.seq {
            let newest_failed = entry.newest_failed;
            let mut confirmed = ticket.after;
            if let Some((_, record)) = confirmed.as_mut() {
                patch(record);
            }
            self.settle(&ticket.key);
            if newest_failed {
                // Nothing newer stands, so the confirmed value is shown.
                self.restore_record(&ticket.key, confirmed);
                self.touch();
                return Outcome::Committed;
            }
            if let Some(entry) = self.pending.get_mut(&ticket.key) {
                entry.base = confirmed;
            }
            return Outcome::Superseded;
        }

        self.pending.remove(&ticket.key);
        if let Some(idx) = self.position(&ticket.key) {
            patch(&mut self.items[idx]);
            self.touch();
        }
        Outcome::Committed
    }

    /// Undoes the mutation behind `ticket`, back to the key's last
    /// confirmed value.
    pub fn rollback(&mut self, ticket: Ticket<T>) -> Outcome {
        let Some(entry) = self.pending.get_mut(&ticket.key) else {
            return Outcome::Superseded;
        };
        if entry.seq != ticket.seq || entry.newest_failed {
            self.settle(&ticket.key);
            return Outcome::Superseded;
        }

        let base = entry.base.clone();
        entry.newest_failed = true;
        self.settle(&ticket.key);

        if self.version == ticket.version_after {
            self.items = ticket.snapshot;
            self.restore_record(&ticket.key, base);
            self.touch();
            return Outcome::RestoredSnapshot;
        }

        self.restore_record(&ticket.key, base);
        self.touch();
        Outcome::RestoredRecord
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: String,
        value: i64,
    }

    impl Keyed for Row {
        fn key(&self) -> &str {
            &self.id
        }
    }

    fn row(id: &str, value: i64) -> Row {
        Row {
            id: id.to_string(),
            value,
        }
    }

    fn list() -> OptimisticList<Row> {
        OptimisticList::from_items(vec![row("a", 1), row("b", 2), row("c", 3)])
    }

    #[test]
    fn test_rollback_restores_snapshot_exactly() {
        let mut list = list();
        let before = list.items().to_vec();

        let ticket = list.update("b", |r| r.value = 20).unwrap();
        assert_eq!(list.get("b").unwrap().value, 20);

        assert_eq!(list.rollback(ticket), Outcome::RestoredSnapshot);
        assert_eq!(list.items(), before.as_slice());
    }

    #[test]
    fn test_delete_rollback_restores_position() {
        let mut list = list();
        let before = list.items().to_vec();

        let ticket = list.remove("b").unwrap();
        assert_eq!(list.len(), 2);
        list.rollback(ticket);
        assert_eq!(list.items(), before.as_slice());
    }

    #[test]
    fn test_commit_swaps_temp_key() {
        let mut list = list();
        let ticket = list.insert(row("temp-123", 9));
        assert!(ticket.is_create());

        let outcome = list.commit(ticket, |r| r.id = "srv-9".to_string());
        assert_eq!(outcome, Outcome::Committed);
        assert!(list.get("temp-123").is_none());
        assert_eq!(list.get("srv-9").unwrap().value, 9);
    }

    #[test]
    fn test_interleaved_rollback_keeps_other_records() {
        let mut list = list();
        let t_a = list.update("a", |r| r.value = 10).unwrap();
        let t_c = list.update("c", |r| r.value = 30).unwrap();

        // a fails after c was applied: only a reverts.
        assert_eq!(list.rollback(t_a), Outcome::RestoredRecord);
        assert_eq!(list.get("a").unwrap().value, 1);
        assert_eq!(list.get("c").unwrap().value, 30);
        assert_eq!(list.items()[0].id, "a");

        assert_eq!(list.commit(t_c, |_| {}), Outcome::Committed);
    }

    #[test]
    fn test_interleaved_create_rollback_removes_only_new_record() {
        let mut list = list();
        let t_new = list.insert(row("temp-1", 7));
        let t_b = list.update("b", |r| r.value = 22).unwrap();

        assert_eq!(list.rollback(t_new), Outcome::RestoredRecord);
        assert!(list.get("temp-1").is_none());
        assert_eq!(list.get("b").unwrap().value, 22);
        let _ = list.commit(t_b, |_| {});
    }

    #[test]
    fn test_stale_response_for_same_record_is_discarded() {
        let mut list = list();
        let first = list.update("a", |r| r.value = 10).unwrap();
        let second = list.update("a", |r| r.value = 11).unwrap();

        assert_eq!(list.commit(first, |r| r.value = 10), Outcome::Superseded);
        assert_eq!(list.get("a").unwrap().value, 11);

        assert_eq!(list.commit(second, |r| r.value = 11), Outcome::Committed);
    }

    #[test]
    fn test_failed_older_edit_does_not_clobber_newer() {
        let mut list = list();
        let first = list.update("a", |r| r.value = 10).unwrap();
        let second = list.update("a", |r| r.value = 11).unwrap();

        assert_eq!(list.rollback(first), Outcome::Superseded);
        assert_eq!(list.get("a").unwrap().value, 11);

        // Both failed: back to what the server still holds.
        assert_eq!(list.rollback(second), Outcome::RestoredSnapshot);
        assert_eq!(list.get("a").unwrap().value, 1);
        assert_eq!(list.items()[0].id, "a");
        assert_eq!(list.pending_keys(), 0);
    }

    #[test]
    fn test_newer_failure_keeps_older_confirmed_edit() {
        let mut list = list();
        let first = list.update("a", |r| r.value = 10).unwrap();
        let second = list.update("a", |r| r.value = 11).unwrap();

        assert_eq!(list.commit(first, |_| {}), Outcome::Superseded);
        assert_eq!(list.rollback(second), Outcome::RestoredSnapshot);
        assert_eq!(list.get("a").unwrap().value, 10);
    }

    #[test]
    fn test_older_success_after_newer_failure_is_shown() {
        let mut list = list();
        let first = list.update("a", |r| r.value = 10).unwrap();
        let second = list.update("a", |r| r.value = 11).unwrap();

        assert_eq!(list.rollback(second), Outcome::RestoredSnapshot);
        assert_eq!(list.get("a").unwrap().value, 1);

        assert_eq!(list.commit(first, |_| {}), Outcome::Committed);
        assert_eq!(list.get("a").unwrap().value, 10);
        assert_eq!(list.pending_keys(), 0);
    }

    #[test]
    fn test_resolved_keys_are_forgotten() {
        let mut list = list();
        for value in 0..50 {
            let ticket = list.update("b", |r| r.value = value).unwrap();
            assert_eq!(list.commit(ticket, |_| {}), Outcome::Committed);
        }
        let ticket = list.insert(row("temp-1", 5));
        let _ = list.commit(ticket, |r| r.id = "srv-1".to_string());
        let ticket = list.update("c", |r| r.value = 0).unwrap();
        let _ = list.rollback(ticket);

        assert_eq!(list.pending_keys(), 0);
    }

    #[test]
    fn test_extend_unique_skips_known_keys() {
        let mut list = list();
        let added = list.extend_unique(vec![row("b", 99), row("d", 4)]);
        assert_eq!(added, 1);
        assert_eq!(list.get("b").unwrap().value, 2);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn test_missing_key_yields_no_ticket() {
        let mut list = list();
        assert!(list.update("zzz", |r| r.value = 0).is_none());
        assert!(list.remove("zzz").is_none());
    }
}
