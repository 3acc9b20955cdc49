//! Sorted time → exposure lookup.
//!
//! Maps an observation epoch back to the exposure it was taken in, by comparing
//! against exposure mid-times. Entries are kept sorted by mid-time so a lookup is
//! a binary search followed by a comparison of the two neighbours, instead of a
//! scan of the whole catalog.

use serde::{Deserialize, Serialize};

use crate::constants::{ExposureId, MJD};

/// Exposure mid-times sorted in increasing order, each tagged with its exposure id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExposureTimeIndex {
    entries: Vec<(MJD, ExposureId)>,
}

impl ExposureTimeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an exposure, keeping the index sorted by time.
    ///
    /// Equal mid-times are kept in insertion order.
    pub fn insert(&mut self, mid_time: MJD, exposure: ExposureId) {
        let pos = self.entries.partition_point(|(t, _)| *t <= mid_time);
        self.entries.insert(pos, (mid_time, exposure));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the exposure whose mid-time is nearest to `time`.
    ///
    /// Arguments
    /// -----------------
    /// * `time`: the epoch to resolve (MJD)
    /// * `tolerance`: maximum accepted `|time - mid_time|` (days)
    ///
    /// Return
    /// ----------
    /// * `Some(exposure)` for the nearest exposure within `tolerance`. When two
    ///   exposures are equally near, the earlier one wins.
    /// * `None` if the index is empty, `time` is NaN, or no exposure is close enough.
    pub fn lookup(&self, time: MJD, tolerance: f64) -> Option<ExposureId> {
        if time.is_nan() {
            return None;
        }

        let pos = self.entries.partition_point(|(t, _)| *t < time);
        let before = pos.checked_sub(1).and_then(|i| self.entries.get(i));
        let after = self.entries.get(pos);

        let nearest = match (before, after) {
            (Some(b), Some(a)) => {
                if (time - b.0) <= (a.0 - time) {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };

        ((nearest.0 - time).abs() <= tolerance).then_some(nearest.1)
    }
}
