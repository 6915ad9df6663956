//! Durable background job queue for the Shelfmark backend.
//!
//! Jobs are rows in the shared SQLite database. One or more workers poll the
//! store on a fixed delay; the claim is a single conditional `UPDATE ...
//! RETURNING` statement, so concurrent workers never receive the same job
//! without any cross-process locking.
//!
//! # Architecture
//!
//! - [`JobStore`] - durable records with the atomic claim and the
//!   retry/failure state machine
//! - [`JobHandler`] / [`JobRegistry`] - per-type policy objects and the
//!   dispatch table built once at startup
//! - [`JobWorker`] - the poll/claim/execute/resolve loop
//! - [`JobEventSink`] - best-effort change feed notified after every store
//!   mutation
//!
//! A worker that dies mid-handler leaves its job `RUNNING` until an operator
//! intervenes; there is deliberately no lease or heartbeat expiry.

mod error;
mod events;
mod registry;
mod store;
mod types;
mod worker;

pub use error::{JobError, JobStoreError};
pub use events::{BroadcastEventSink, JobEventSink, NoopEventSink};
pub use registry::{JobHandler, JobRegistry};
pub use store::JobStore;
pub use types::{Job, JobStatus};
pub use worker::JobWorker;

// Re-export async_trait for convenience when implementing JobHandler
pub use async_trait::async_trait;
