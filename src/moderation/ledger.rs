use std::collections::HashMap;

/// A user's violation count resets if they stay clean this long.
pub const DECAY_WINDOW_SECS: u64 = 3600;

/// Per-user violation state. Created on the first violation and kept for
/// the process lifetime; history is append-only and audit-only.
#[derive(Debug, Clone, Default)]
pub struct ViolationRecord {
    pub count: u32,
    /// Unix seconds of the most recent violation.
    pub last_violation_secs: u64,
    /// `(event_id, body)` of every confirmed violation, oldest first.
    pub history: Vec<(String, String)>,
}

/// Map of user id to violation record. Owned exclusively by the engine's
/// single execution context; not persisted across restarts.
#[derive(Debug, Default)]
pub struct ViolationLedger {
    records: HashMap<String, ViolationRecord>,
}

impl ViolationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one confirmed violation and return the updated count.
    ///
    /// Invariant: the count resets to 0 before incrementing whenever more
    /// than [`DECAY_WINDOW_SECS`] passed since the previous violation, and
    /// increases by exactly 1 per call.
    pub fn record_violation(
        &mut self,
        user_id: &str,
        event_id: &str,
        body: &str,
        now_secs: u64,
    ) -> u32 {
        let record = self.records.entry(user_id.to_string()).or_default();

        if record.count > 0 && now_secs.saturating_sub(record.last_violation_secs) > DECAY_WINDOW_SECS
        {
            tracing::info!(
                "resetting violation count for {user_id} (over an hour since last violation)"
            );
            record.count = 0;
        }

        record.count += 1;
        record.last_violation_secs = now_secs;
        record.history.push((event_id.to_string(), body.to_string()));
        record.count
    }

    pub fn get(&self, user_id: &str) -> Option<&ViolationRecord> {
        self.records.get(user_id)
    }

    /// Number of users with at least one recorded violation.
    pub fn tracked_users(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000;

    #[test]
    fn first_violation_creates_record_with_count_one() {
        let mut ledger = ViolationLedger::new();
        let count = ledger.record_violation("@alice:example.org", "$e1", "bad", T0);
        assert_eq!(count, 1);

        let record = ledger.get("@alice:example.org").unwrap();
        assert_eq!(record.count, 1);
        assert_eq!(record.last_violation_secs, T0);
        assert_eq!(record.history, vec![("$e1".to_string(), "bad".to_string())]);
    }

    #[test]
    fn nth_violation_within_window_yields_count_n() {
        let mut ledger = ViolationLedger::new();
        for n in 1..=5 {
            let count =
                ledger.record_violation("@alice:example.org", "$e", "bad", T0 + u64::from(n) * 60);
            assert_eq!(count, n);
        }
    }

    #[test]
    fn violation_after_decay_window_resets_to_one() {
        let mut ledger = ViolationLedger::new();
        ledger.record_violation("@bob:example.org", "$e1", "bad", T0);
        let count =
            ledger.record_violation("@bob:example.org", "$e2", "bad again", T0 + 2 * 3600);
        assert_eq!(count, 1);
        // History survives the decay; it is audit-only.
        assert_eq!(ledger.get("@bob:example.org").unwrap().history.len(), 2);
    }

    #[test]
    fn violation_exactly_at_window_boundary_does_not_reset() {
        let mut ledger = ViolationLedger::new();
        ledger.record_violation("@carol:example.org", "$e1", "bad", T0);
        let count =
            ledger.record_violation("@carol:example.org", "$e2", "bad", T0 + DECAY_WINDOW_SECS);
        assert_eq!(count, 2);
    }

    #[test]
    fn users_are_tracked_independently() {
        let mut ledger = ViolationLedger::new();
        ledger.record_violation("@alice:example.org", "$e1", "bad", T0);
        ledger.record_violation("@alice:example.org", "$e2", "bad", T0 + 1);
        let count = ledger.record_violation("@bob:example.org", "$e3", "bad", T0 + 2);
        assert_eq!(count, 1);
        assert_eq!(ledger.tracked_users(), 2);
    }

    #[test]
    fn history_appends_in_order() {
        let mut ledger = ViolationLedger::new();
        ledger.record_violation("@alice:example.org", "$e1", "first", T0);
        ledger.record_violation("@alice:example.org", "$e2", "second", T0 + 10);
        ledger.record_violation("@alice:example.org", "$e3", "third", T0 + 20);

        let record = ledger.get("@alice:example.org").unwrap();
        assert_eq!(record.count, 3);
        let ids: Vec<&str> = record.history.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["$e1", "$e2", "$e3"]);
    }

    #[test]
    fn clock_going_backwards_does_not_reset() {
        let mut ledger = ViolationLedger::new();
        ledger.record_violation("@alice:example.org", "$e1", "bad", T0);
        // saturating_sub keeps an earlier timestamp inside the window
        let count = ledger.record_violation("@alice:example.org", "$e2", "bad", T0 - 100);
        assert_eq!(count, 2);
    }
}
