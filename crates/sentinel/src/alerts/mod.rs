//! Alerting engine overview
//!
//! Each tick produces one [`models::ValidatorStats`] snapshot per monitored
//! address. The snapshot flows through two stages:
//!
//! - `aggregate`: derives the snapshot-wide annotations that only make sense
//!   once collection is complete: the overall alert level, the SLA-breach
//!   fault, whether the RPC view was broken. Runs once per validator per
//!   tick, before the snapshot is shared with subscribers.
//! - `evaluator`: the per-(validator, subscriber) state machine. It folds the
//!   snapshot's fault list into the subscriber's durable
//!   [`models::ValidatorAlertState`] and decides which faults become fresh
//!   alerts, which stay suppressed by the debounce cadence, and which produce
//!   a cleared edge. Clearing of non-RPC kinds is deferred while an RPC-class
//!   fault is present, because silence about a validator cannot be trusted
//!   when the view of the chain is broken.
//!
//! The evaluator never mutates the snapshot; subscribers of the same address
//! share it read-only.

mod aggregate;
mod evaluator;

pub use aggregate::aggregate;
pub use evaluator::evaluate;
