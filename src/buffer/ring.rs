//! Fixed-capacity recency buffer.
//!
//! # Layout
//! The buffer is a circular array of [`HealthRecord`] slots with no head
//! pointer. The newest slot is found by scanning forward from slot 0 while
//! recency is non-decreasing:
//!
//! ```text
//! not full:  [t1][t2][t3][  ][  ]   scan stops at the first unset slot → write there
//! full:      [t6][t7][t3][t4][t5]   scan stops where t7 → t3 decreases → overwrite t3
//! ```
//!
//! At most one seam (recency decrease) exists at any time, so positioning is
//! O(capacity) per append with no extra state. Stored timestamps are strictly
//! increasing: a record not newer than the latest one is stamped one
//! nanosecond after it, otherwise equal neighbours would hide the seam.

use thiserror::Error;

use crate::resource::HealthRecord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingError {
    #[error("ring capacity must be at least 1")]
    ZeroCapacity,
    #[error("cannot append a record with an unset timestamp or outcome")]
    UnsetRecord,
    #[error("ring registry is no longer running")]
    Closed,
}

/// Circular store of the most recent `capacity` health records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingBuffer {
    slots: Vec<HealthRecord>,
}

impl RingBuffer {
    /// Create an empty buffer. A capacity of 0 is rejected.
    pub fn new(capacity: usize) -> Result<Self, RingError> {
        if capacity == 0 {
            return Err(RingError::ZeroCapacity);
        }
        Ok(Self {
            slots: vec![HealthRecord::unset(); capacity],
        })
    }

    /// Create a buffer seeded with `records` (oldest first). Unset records
    /// are skipped; only the newest `capacity` records are kept.
    pub fn from_records(capacity: usize, records: &[HealthRecord]) -> Result<Self, RingError> {
        let mut ring = Self::new(capacity)?;
        let complete: Vec<HealthRecord> = records.iter().copied().filter(HealthRecord::is_set).collect();
        let skip = complete.len().saturating_sub(capacity);
        for record in complete.into_iter().skip(skip) {
            ring.append(record)?;
        }
        Ok(ring)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_set()).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.slots[0].is_set()
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Locate the newest occupied slot, or `None` when the buffer is empty.
    fn newest_position(&self) -> Option<usize> {
        if !self.slots[0].is_set() {
            return None;
        }

        let capacity = self.capacity();
        let mut current = 0;
        for _ in 1..capacity {
            let ahead = (current + 1) % capacity;
            match (self.slots[current].timestamp, self.slots[ahead].timestamp) {
                (Some(now), Some(next)) if self.slots[ahead].is_set() && next >= now => {
                    current = ahead;
                }
                _ => break,
            }
        }
        Some(current)
    }

    /// Append a record, overwriting the oldest one when full.
    ///
    /// Returns the slot position written.
    pub fn append(&mut self, mut record: HealthRecord) -> Result<usize, RingError> {
        if !record.is_set() {
            return Err(RingError::UnsetRecord);
        }

        let position = match self.newest_position() {
            None => 0,
            Some(newest) => {
                if let (Some(latest), Some(ts)) = (self.slots[newest].timestamp, record.timestamp) {
                    if ts <= latest {
                        record.timestamp = Some(latest + chrono::Duration::nanoseconds(1));
                    }
                }
                // Either the first unset slot or, when full, the oldest entry.
                (newest + 1) % self.capacity()
            }
        };

        self.slots[position] = record;
        Ok(position)
    }

    /// Change capacity in place, keeping records in chronological order.
    /// Shrinking drops the oldest records first.
    pub fn resize(&mut self, new_capacity: usize) -> Result<(), RingError> {
        let records = self.flatten();
        *self = Self::from_records(new_capacity, &records)?;
        Ok(())
    }

    /// Occupied records, oldest first.
    pub fn flatten(&self) -> Vec<HealthRecord> {
        let mut records = Vec::with_capacity(self.capacity());
        let Some(newest) = self.newest_position() else {
            return records;
        };

        let capacity = self.capacity();
        for offset in 1..=capacity {
            let slot = &self.slots[(newest + offset) % capacity];
            if slot.is_set() {
                records.push(*slot);
            }
        }
        records
    }
}
