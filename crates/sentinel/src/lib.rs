//! The monitoring daemon: per-tick observation of validator signing health,
//! fault classification and debounced alerting, subscription management, and
//! delivery through a chat notifier.

pub mod address;
pub mod alerts;
pub mod collector;
pub mod notifier;
pub mod registry;
pub mod scheduler;
pub mod store;
