//! Ordered set of unresolved deliveries, keyed by sequence number.

use std::collections::BTreeMap;

use super::DeliveryRecord;

/// The pending set: `sequence -> DeliveryRecord` for every delivery still
/// awaiting a broker verdict.
///
/// A `BTreeMap` keeps sequences ordered, which is what makes cumulative
/// acknowledgments ("everything up to tag") a single split instead of a
/// scan. The smallest key is the oldest unresolved delivery.
#[derive(Debug, Default)]
pub struct PendingSet {
    records: BTreeMap<u64, DeliveryRecord>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }

    /// Insert a freshly allocated record. Sequences are allocated by a
    /// monotonic counter and never reused, so a collision is a bug.
    pub fn insert(&mut self, record: DeliveryRecord) {
        let previous = self.records.insert(record.sequence, record);
        debug_assert!(previous.is_none(), "delivery sequence reused");
    }

    /// Remove exactly the record with this sequence, if still unresolved.
    pub fn take(&mut self, sequence: u64) -> Option<DeliveryRecord> {
        self.records.remove(&sequence)
    }

    /// Remove every record with sequence <= `tag`, ascending. Sequences in
    /// the range that were already resolved are simply not there anymore,
    /// which is how duplicate/overlapping cumulative acks become no-ops.
    pub fn take_up_to(&mut self, tag: u64) -> Vec<DeliveryRecord> {
        if tag == u64::MAX {
            return self.drain();
        }
        let rest = self.records.split_off(&(tag + 1));
        let taken = std::mem::replace(&mut self.records, rest);
        taken.into_values().collect()
    }

    /// Remove everything, ascending. Used for connection-closed fan-out and
    /// forced drains.
    pub fn drain(&mut self) -> Vec<DeliveryRecord> {
        std::mem::take(&mut self.records).into_values().collect()
    }

    /// Oldest unresolved sequence, if any.
    pub fn low_water_mark(&self) -> Option<u64> {
        self.records.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn sequences(&self) -> Vec<u64> {
        self.records.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::Message;

    fn record(sequence: u64) -> DeliveryRecord {
        DeliveryRecord::new(
            sequence,
            Message {
                payload: b"x".to_vec(),
                routing_key: "unit.test".to_string(),
                headers: None,
            },
            0,
            None,
        )
    }

    fn set_with(sequences: &[u64]) -> PendingSet {
        let mut set = PendingSet::new();
        for &sequence in sequences {
            set.insert(record(sequence));
        }
        set
    }

    #[test]
    fn cumulative_take_resolves_up_to_tag_in_order() {
        let mut set = set_with(&[1, 2, 3, 5]);

        let taken = set.take_up_to(3);

        let sequences: Vec<u64> = taken.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(set.sequences(), vec![5]);
    }

    #[test]
    fn cumulative_take_over_settled_range_is_a_noop() {
        let mut set = set_with(&[1, 2, 3]);
        set.take_up_to(3);

        assert!(set.take_up_to(3).is_empty());
        assert!(set.take(2).is_none());
    }

    #[test]
    fn exact_take_leaves_neighbors() {
        let mut set = set_with(&[1, 2, 3]);

        let taken = set.take(2).unwrap();

        assert_eq!(taken.sequence, 2);
        assert_eq!(set.sequences(), vec![1, 3]);
    }

    #[test]
    fn drain_is_ascending() {
        let mut set = set_with(&[9, 3, 7]);

        let sequences: Vec<u64> = set.drain().iter().map(|r| r.sequence).collect();

        assert_eq!(sequences, vec![3, 7, 9]);
        assert!(set.is_empty());
    }

    #[test]
    fn low_water_mark_tracks_oldest() {
        let mut set = set_with(&[4, 6]);
        assert_eq!(set.low_water_mark(), Some(4));

        set.take(4);
        assert_eq!(set.low_water_mark(), Some(6));

        set.take(6);
        assert_eq!(set.low_water_mark(), None);
    }
}
