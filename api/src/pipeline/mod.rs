//! Feedback ingestion and credit-gated auto-response

pub mod archive;
pub mod draft;
pub mod manual;
pub mod orchestrator;
pub mod policy;
pub mod prompt;
pub mod publish;
pub mod refusal;
pub mod scheduler;

#[cfg(test)]
pub mod testing;

pub use orchestrator::{SyncError, SyncRunner, SyncSettings};
pub use scheduler::{TenantSyncReport, run_sync};
