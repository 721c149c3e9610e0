//! The moderation engine: adaptive long-poll watching, deduplication,
//! policy classification, the per-user violation ledger, and the
//! escalation policy that turns a verdict into gateway actions.

pub mod classifier;
pub mod dedup;
pub mod engine;
pub mod ledger;
pub mod policy;
pub mod watcher;

pub use classifier::{PolicyClassifier, Verdict};
pub use dedup::DedupFilter;
pub use engine::ModerationEngine;
pub use ledger::{ViolationLedger, ViolationRecord};
pub use policy::{decide, Escalation};
pub use watcher::{PollResult, RoomWatcher};

/// Seconds since the Unix epoch. Violation timestamps and the decay window
/// are compared in whole seconds.
pub(crate) fn unix_now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
