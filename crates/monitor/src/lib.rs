//! Change detection and monitoring-sample persistence (§4.8): a recursive
//! structural diff over extracted JSON values, plus the append-only sample
//! and change-record history it reads against.
//!
//! `MonitoringStore` mirrors `PlanCache`'s durable/in-memory trait-object
//! split (§4.5) rather than any single teacher module — the teacher does not
//! itself do periodic re-extraction diffing.

pub mod detector;
pub mod store;

pub use detector::{get_change_details, has_changed, to_change_record, ChangeKind, ChangeOutcome, FieldChange};
pub use store::{shared_in_memory, InMemoryMonitoringStore, MonitoringStore, SqlMonitoringStore};
