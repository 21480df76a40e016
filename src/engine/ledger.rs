use std::collections::HashSet;

use crate::model::Slot;

/// Slots that already produced a notification during this process lifetime.
///
/// Never evicts: the keyspace is bounded by dates × slot times × courts and
/// the process restarts periodically.
#[derive(Debug, Default)]
pub struct NotificationLedger {
    notified: HashSet<Slot>,
}

impl NotificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_notified(&self, slot: &Slot) -> bool {
        self.notified.contains(slot)
    }

    pub fn mark_notified(&mut self, slot: Slot) {
        self.notified.insert(slot);
    }

    /// Re-arm a slot so it can notify again. The watcher never calls this on its own.
    pub fn unmark_notified(&mut self, slot: &Slot) {
        self.notified.remove(slot);
    }

    /// Check and mark in one step. True only the first time a slot is claimed.
    pub fn claim(&mut self, slot: Slot) -> bool {
        if self.has_notified(&slot) {
            return false;
        }
        self.mark_notified(slot);
        true
    }

    pub fn len(&self) -> usize {
        self.notified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notified.is_empty()
    }

    pub fn clear(&mut self) {
        self.notified.clear();
    }
}
