//! roster-core library.
//!
//! The layer between an HR admin UI and its REST API. UI state (search text,
//! filters, sort clicks, pagination) is folded into a [`query::CanonicalQuery`];
//! a [`fetch::FetchGate`] decides whether that query warrants a network call;
//! [`collection::CollectionView`] applies results last-issued-wins. Lookup
//! data lives in a [`reference::ReferenceCache`] and bulk edits run as
//! [`bulk::BulkMutationPlan`] values through a
//! [`bulk::BulkMutationCoordinator`].
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums per concern, each mapped to a stable
//!   [`error::ErrorCode`]. Duplicate and stale conditions are outcomes, not
//!   errors.
//! - **Logging**: `tracing` macros with structured fields.
//! - **Locking**: shared state sits behind `std::sync::Mutex` and no guard is
//!   held across an `.await`.

pub mod api;
pub mod bulk;
pub mod collection;
pub mod config;
pub mod error;
pub mod fetch;
pub mod model;
pub mod query;
pub mod reference;
pub mod selection;
pub mod sort;

#[cfg(feature = "http")]
pub mod transport;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Every critical section in this crate leaves its state consistent before
/// any call that could panic, so the data behind a poisoned lock is usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
