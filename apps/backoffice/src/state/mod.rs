//! # State Module
//!
//! Domain state containers the UI renders from.
//!
//! ## State Types
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Back Office State                              │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐  │
//! │  │ ProductsState   │  │ SuppliersState  │  │ CartState               │  │
//! │  │ Optimistic list │  │ Optimistic list │  │ Mutex<Cart>             │  │
//! │  │ + inventory lots│  │                 │  │ submit / print          │  │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘  │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                               │
//! │  │ DashboardState  │  │ AuthState       │                               │
//! │  │ counts (cached) │  │ login / restore │                               │
//! │  │ performance     │  │ OTP / reset     │                               │
//! │  └─────────────────┘  └─────────────────┘                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Locks are `std::sync::Mutex` and are never held across an `.await`.
//! Optimistic changes are applied under the lock, the lock is released,
//! then the request is sent.

mod auth;
mod cart;
mod dashboard;
mod products;
mod suppliers;

pub use auth::AuthState;
pub use cart::{CartState, SaleReceipt};
pub use dashboard::{DashboardCounts, DashboardSnapshot, DashboardState};
pub use products::ProductsState;
pub use suppliers::SuppliersState;

use std::sync::{Mutex, MutexGuard};

use crate::error::UiError;
use crate::notifications::Notifications;

/// Locks `mutex`, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Converts `err` and shows it as a toast.
///
/// Validation errors are shown next to the form field instead, and silent
/// errors not at all.
pub(crate) fn surface(notifications: &Notifications, err: impl Into<UiError>) -> UiError {
    let err = err.into();
    if !err.is_validation() {
        notifications.error(&err);
    }
    err
}
