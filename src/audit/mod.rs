//! Audits: records, progress math and the editing session.

mod manager;
mod progress;
mod sync;
mod types;

pub use manager::AuditManager;
pub use progress::calculate_progress;
pub use sync::AuditSession;
pub use types::{Audit, CheckState, PartFilter, PartStatus, TrackingMode};
#[cfg(test)]
pub use types::Progress;
