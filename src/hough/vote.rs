//! Vote accumulation.
//!
//! Both entry points add `weight` (times a per-detection value for
//! [`vote_bins`]) to `grid[v, i, j]` for every (velocity, detection) pair whose bin
//! falls inside the grid. Bins outside `[0, nx) × [0, ny)` are dropped silently:
//! the grid geometry is a window, and detections projecting outside of it are
//! expected. Array-shape and geometry mismatches on the other hand are caller
//! errors and are rejected before the grid is touched.
use log::debug;
use rayon::prelude::*;

use crate::catalog::Detection;
use crate::houghtrack_errors::HoughTrackError;
use crate::velocities::CandidateVelocities;

use super::grid::cell_offset;
use super::{project_detection, DigitizedBins, GridGeometry, VoteGrid};

/// Number of (velocity, detection) votes that landed inside / outside the grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteSummary {
    pub cast: usize,
    pub dropped: usize,
}

impl std::ops::Add for VoteSummary {
    type Output = VoteSummary;

    fn add(self, rhs: Self) -> Self::Output {
        VoteSummary {
            cast: self.cast + rhs.cast,
            dropped: self.dropped + rhs.dropped,
        }
    }
}

/// Vote every detection under every candidate velocity.
///
/// Arguments
/// -----------------
/// * `grid`: the accumulator; its velocity axis must match `velocities`
/// * `detections`: the multi-epoch detections
/// * `velocities`: the candidate velocities, one grid plane each
/// * `geometry`: must equal the geometry `grid` was built with
/// * `weight`: added to the cell of each in-range vote
///
/// Return
/// ----------
/// * A [`VoteSummary`] of cast and dropped votes.
///
/// Errors
/// ----------
/// * [`HoughTrackError::GeometryMismatch`] if `geometry` differs from the grid's.
/// * [`HoughTrackError::ShapeMismatch`] if `velocities.len()` differs from the grid's velocity axis.
pub fn vote_points(
    grid: &mut VoteGrid,
    detections: &[Detection],
    velocities: &CandidateVelocities,
    geometry: &GridGeometry,
    weight: f64,
) -> Result<VoteSummary, HoughTrackError> {
    grid.check_geometry(geometry)?;
    grid.check_velocities(velocities.len())?;

    let b = velocities.as_slice();
    let reference_time = geometry.reference_time;
    let summary = accumulate(
        grid,
        detections.len(),
        |v, k| geometry.digitize(&project_detection(&detections[k], &b[v], reference_time)),
        |_| weight,
    );
    debug!(
        "voted {} detections over {} velocities: {} cast, {} dropped",
        detections.len(),
        velocities.len(),
        summary.cast,
        summary.dropped
    );
    Ok(summary)
}

/// Vote from bins computed ahead of time with [`digitize_all`](super::digitize_all).
///
/// Each in-range bin of detection `k` adds `values[k] * weight`.
///
/// Errors
/// ----------
/// * [`HoughTrackError::GeometryMismatch`] if `bins` were digitized under another geometry.
/// * [`HoughTrackError::ShapeMismatch`] if the velocity axis of `bins` differs from the
///   grid's, or `values` does not hold one entry per detection.
pub fn vote_bins(
    grid: &mut VoteGrid,
    bins: &DigitizedBins,
    values: &[f64],
    weight: f64,
) -> Result<VoteSummary, HoughTrackError> {
    grid.check_geometry(bins.geometry())?;
    grid.check_velocities(bins.n_velocities())?;
    if values.len() != bins.n_detections() {
        return Err(HoughTrackError::ShapeMismatch {
            what: "per-detection values",
            expected: bins.n_detections(),
            found: values.len(),
        });
    }

    let summary = accumulate(
        grid,
        bins.n_detections(),
        |v, k| bins.get(v, k).unwrap_or((i64::MIN, i64::MIN)),
        |k| values[k] * weight,
    );
    debug!(
        "voted {} precomputed bins over {} velocities: {} cast, {} dropped",
        bins.n_detections(),
        bins.n_velocities(),
        summary.cast,
        summary.dropped
    );
    Ok(summary)
}

/// Add the votes of each velocity to its own grid plane.
///
/// `bin(v, k)` is the bin hit by detection `k` under velocity `v`, `value(k)` the
/// amount it adds. Planes are disjoint, so they are filled in parallel without
/// synchronization; within a plane detections are added in order.
fn accumulate<B, F>(grid: &mut VoteGrid, n_detections: usize, bin: B, value: F) -> VoteSummary
where
    B: Fn(usize, usize) -> (i64, i64) + Sync,
    F: Fn(usize) -> f64 + Sync,
{
    let (nx, ny) = (grid.nx(), grid.ny());
    grid.par_planes_mut()
        .enumerate()
        .map(|(v, plane)| {
            let mut summary = VoteSummary::default();
            for k in 0..n_detections {
                let (i, j) = bin(v, k);
                match cell_offset(i, j, nx, ny) {
                    Some(offset) => {
                        plane[offset] += value(k);
                        summary.cast += 1;
                    }
                    None => summary.dropped += 1,
                }
            }
            summary
        })
        .reduce(VoteSummary::default, |a, b| a + b)
}
