use std::collections::HashSet;

/// Suppresses messages already accepted for classification in this run.
///
/// Keys are `sender:event_id`. The set is unbounded for the process
/// lifetime; there is no eviction.
#[derive(Debug, Default)]
pub struct DedupFilter {
    seen: HashSet<String>,
}

impl DedupFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(sender: &str, event_id: &str) -> String {
        format!("{sender}:{event_id}")
    }

    /// True when this `(sender, event_id)` has not been accepted before.
    /// Checking does not mark; marking happens once, at acceptance.
    pub fn is_novel(&self, sender: &str, event_id: &str) -> bool {
        !self.seen.contains(&Self::key(sender, event_id))
    }

    /// Record the key at the point the message is accepted for
    /// classification.
    pub fn mark_seen(&mut self, sender: &str, event_id: &str) {
        self.seen.insert(Self::key(sender, event_id));
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
