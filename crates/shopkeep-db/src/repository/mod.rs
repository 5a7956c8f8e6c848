//! # Repository Module
//!
//! Local storage repositories.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  AuthManager / DashboardState / Notifications                           │
//! │       │                                                                 │
//! │       │  db.session().save(&session)                                    │
//! │       │  db.cache().get::<CountStat>("dashboard:...")                   │
//! │       ▼                                                                 │
//! │  SessionRepository            CacheRepository                           │
//! │  ├── load()                   ├── get(key)                              │
//! │  ├── save(session)            ├── put(key, value)                       │
//! │  └── clear()                  ├── take(key)                             │
//! │                               ├── remove(key)                           │
//! │                               └── clear()                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (session, cache_entries)                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes are last-write-wins. One process owns the file.

pub mod cache;
pub mod session;
