use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::model::*;

// ── Booked index ──────────────────────────────────────────────────

/// Booked courts for one queried date, grouped by slot time.
///
/// The booking API only reports occupied courts. A court missing from the
/// index is free; an index built from an empty snapshot means the whole day
/// is free.
#[derive(Debug, Clone)]
pub struct BookedIndex {
    date: NaiveDate,
    booked: HashMap<SlotTime, HashSet<ResourceId>>,
    discarded: usize,
}

impl BookedIndex {
    /// Build the index for `date` from the snapshot fetched for that date.
    /// Records carrying any other date are dropped so they cannot leak into
    /// another day's view.
    pub fn from_snapshot(date: NaiveDate, snapshot: &[BookedSlot]) -> Self {
        let mut booked: HashMap<SlotTime, HashSet<ResourceId>> = HashMap::new();
        let mut discarded = 0;
        for b in snapshot {
            if b.date != date {
                discarded += 1;
                continue;
            }
            booked.entry(b.time).or_default().insert(b.resource);
        }
        Self {
            date,
            booked,
            discarded,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn is_booked(&self, time: SlotTime, resource: ResourceId) -> bool {
        self.booked
            .get(&time)
            .is_some_and(|courts| courts.contains(&resource))
    }

    /// Number of distinct (time, court) pairs reported booked.
    pub fn booked_count(&self) -> usize {
        self.booked.values().map(HashSet::len).sum()
    }

    /// Records dropped because they belonged to another date.
    pub fn discarded(&self) -> usize {
        self.discarded
    }
}

/// Indexes for the dates successfully fetched this cycle.
pub type Snapshots = HashMap<NaiveDate, BookedIndex>;

// ── Resolution ────────────────────────────────────────────────────

/// Watched slots that are currently free, in the order they were given.
///
/// A slot is free iff its court is absent from the booked set for its
/// `(date, time)`. Slots whose date has no snapshot (fetch failed, payload
/// malformed) are not resolved at all: missing data never counts as free.
pub fn resolve_available<'a>(
    desired: &'a [WatchedSlot],
    snapshots: &Snapshots,
) -> Vec<&'a WatchedSlot> {
    desired
        .iter()
        .filter(|w| {
            snapshots
                .get(&w.slot.date)
                .is_some_and(|index| !index.is_booked(w.slot.time, w.slot.resource))
        })
        .collect()
}
