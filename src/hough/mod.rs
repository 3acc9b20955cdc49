//! # Velocity-space Hough transform
//!
//! Tests many linear-motion hypotheses at once. For every candidate velocity `b`,
//! each detection `(x, y, t)` is moved to where an object travelling at `b` would
//! have been at the reference time:
//!
//! ```text
//! x' = x - b_x · (t - t_ref)
//! y' = y - b_y · (t - t_ref)
//! ```
//!
//! In that comoving frame a real mover is stationary, so its detections pile up
//! in one cell of a regular 2D grid. Votes are accumulated in a [`VoteGrid`] of
//! shape `(n_velocities, nx, ny)`; peak finding over the grid is left to the caller.
//!
//! Modules
//! -----------------
//! * [`grid`] – the vote accumulator array.
//! * [`vote`] – voting from raw detections or from precomputed bins.
//! * [`batch`] – precomputation of every comoving position and bin, reusable across
//!   several voting passes (e.g. re-voting with different weights).
//! * [`proximity`] – selection of detections close to a hypothesized track.
//!
//! Concurrency
//! -----------------
//! Voting runs in parallel over the velocity axis with `rayon`. Each worker owns
//! the disjoint grid slice of the velocity it processes, so no synchronization is
//! needed and the result does not depend on scheduling.
//!
//! Non-finite input
//! -----------------
//! Projection propagates NaN/∞ unchanged. [`digitize`] maps a non-finite
//! coordinate to the bin index `i64::MIN`, which is out of range for every grid,
//! so such detections never vote.
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::catalog::Detection;
use crate::clusters::{ClusterLine, HoughCell};
use crate::constants::{Degree, MJD};
use crate::houghtrack_errors::HoughTrackError;
use crate::velocities::CandidateVelocities;

pub mod batch;
pub mod grid;
pub mod proximity;
pub mod vote;

pub use batch::{digitize_all, transform_all, DigitizedBins, ProjectedPositions};
pub use grid::VoteGrid;
pub use proximity::{close_to_line, refine_members};
pub use vote::{vote_bins, vote_points, VoteSummary};

/// Position of a detection in the frame comoving with `velocity`, at `reference_time`.
#[inline]
pub fn project(
    position: &Vector2<f64>,
    time: MJD,
    velocity: &Vector2<f64>,
    reference_time: MJD,
) -> Vector2<f64> {
    position - velocity * (time - reference_time)
}

/// Comoving position of a [`Detection`], see [`project`].
#[inline]
pub(crate) fn project_detection(
    detection: &Detection,
    velocity: &Vector2<f64>,
    reference_time: MJD,
) -> Vector2<f64> {
    project(
        &Vector2::new(detection.ra, detection.dec),
        detection.time,
        velocity,
        reference_time,
    )
}

#[inline]
fn floor_index(offset: f64) -> i64 {
    let f = offset.floor();
    if f.is_finite() {
        f as i64
    } else {
        i64::MIN
    }
}

/// Bin indices of a point on a regular grid.
///
/// `i = floor((x - min_x) / dx)`, `j = floor((y - min_y) / dy)`. Indices may be
/// negative or beyond the grid; bounds are checked by the voting code.
#[inline]
pub fn digitize(point: &Vector2<f64>, min_x: f64, min_y: f64, dx: f64, dy: f64) -> (i64, i64) {
    (
        floor_index((point.x - min_x) / dx),
        floor_index((point.y - min_y) / dy),
    )
}

/// Placement of the comoving grid: origin, bin widths and reference epoch.
///
/// Fixed for the lifetime of a [`VoteGrid`]; votes accumulated under one geometry
/// are meaningless under another.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub min_x: Degree,
    pub min_y: Degree,
    pub dx: Degree,
    pub dy: Degree,
    pub reference_time: MJD,
}

impl GridGeometry {
    /// Errors
    /// ----------
    /// * [`HoughTrackError::InvalidGeometry`] if a value is not finite or a bin width is not > 0.
    pub fn new(
        min_x: Degree,
        min_y: Degree,
        dx: Degree,
        dy: Degree,
        reference_time: MJD,
    ) -> Result<Self, HoughTrackError> {
        if ![min_x, min_y, dx, dy, reference_time]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(HoughTrackError::InvalidGeometry(
                "geometry values must be finite".into(),
            ));
        }
        if dx <= 0.0 || dy <= 0.0 {
            return Err(HoughTrackError::InvalidGeometry(format!(
                "bin widths must be > 0, got dx={dx}, dy={dy}"
            )));
        }
        Ok(GridGeometry {
            min_x,
            min_y,
            dx,
            dy,
            reference_time,
        })
    }

    #[inline]
    pub fn digitize(&self, point: &Vector2<f64>) -> (i64, i64) {
        digitize(point, self.min_x, self.min_y, self.dx, self.dy)
    }

    /// Lower-left corner of bin `(i, j)` in the comoving frame.
    pub fn cell_origin(&self, i: usize, j: usize) -> Vector2<f64> {
        Vector2::new(
            self.min_x + i as f64 * self.dx,
            self.min_y + j as f64 * self.dy,
        )
    }
}

/// A vote grid bundled with the velocities and geometry it is defined over.
#[derive(Debug, Clone)]
pub struct HoughTransform {
    velocities: CandidateVelocities,
    geometry: GridGeometry,
    grid: VoteGrid,
}

impl HoughTransform {
    /// Empty transform of `nx × ny` bins per candidate velocity.
    pub fn new(
        velocities: CandidateVelocities,
        geometry: GridGeometry,
        nx: usize,
        ny: usize,
    ) -> Result<Self, HoughTrackError> {
        let grid = VoteGrid::new(geometry, velocities.len(), nx, ny)?;
        Ok(HoughTransform {
            velocities,
            geometry,
            grid,
        })
    }

    /// Empty transform whose grid covers the comoving positions of every
    /// detection under every candidate velocity, so no vote is lost at the border.
    ///
    /// Errors
    /// ----------
    /// * [`HoughTrackError::InvalidGeometry`] if `detections` is empty, a projection is
    ///   not finite, or the bin widths are invalid.
    pub fn covering(
        detections: &[Detection],
        velocities: CandidateVelocities,
        dx: Degree,
        dy: Degree,
        reference_time: MJD,
    ) -> Result<Self, HoughTrackError> {
        let (lo, hi) = velocities
            .iter()
            .flat_map(|v| {
                detections
                    .iter()
                    .map(move |d| project_detection(d, v, reference_time))
            })
            .fold(None, |acc: Option<(Vector2<f64>, Vector2<f64>)>, p| {
                Some(match acc {
                    None => (p, p),
                    Some((lo, hi)) => (lo.inf(&p), hi.sup(&p)),
                })
            })
            .ok_or_else(|| HoughTrackError::InvalidGeometry("no detections to cover".into()))?;

        let geometry = GridGeometry::new(lo.x, lo.y, dx, dy, reference_time)?;
        let (i, j) = geometry.digitize(&hi);
        if i < 0 || j < 0 {
            return Err(HoughTrackError::InvalidGeometry(
                "projected extent is not finite".into(),
            ));
        }
        let extent = |n: i64| usize::try_from(n).ok().and_then(|n| n.checked_add(1));
        match (extent(i), extent(j)) {
            (Some(nx), Some(ny)) => Self::new(velocities, geometry, nx, ny),
            _ => Err(HoughTrackError::InvalidGeometry(format!(
                "projected extent spans ({i}, {j}) bins"
            ))),
        }
    }

    pub fn velocities(&self) -> &CandidateVelocities {
        &self.velocities
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn grid(&self) -> &VoteGrid {
        &self.grid
    }

    /// Vote every detection under every candidate velocity, see [`vote_points`].
    pub fn vote(
        &mut self,
        detections: &[Detection],
        weight: f64,
    ) -> Result<VoteSummary, HoughTrackError> {
        vote_points(
            &mut self.grid,
            detections,
            &self.velocities,
            &self.geometry,
            weight,
        )
    }

    /// Comoving bins of every (velocity, detection) pair, for use with [`HoughTransform::vote_bins`].
    pub fn precompute(&self, detections: &[Detection]) -> DigitizedBins {
        let positions = transform_all(
            detections,
            &self.velocities,
            self.geometry.reference_time,
        );
        digitize_all(&positions, &self.geometry)
    }

    /// Vote from precomputed bins, see [`vote_bins`].
    pub fn vote_bins(
        &mut self,
        bins: &DigitizedBins,
        values: &[f64],
        weight: f64,
    ) -> Result<VoteSummary, HoughTrackError> {
        vote_bins(&mut self.grid, bins, values, weight)
    }

    /// Clear every vote.
    pub fn reset(&mut self) {
        self.grid.reset();
    }

    /// Track hypothesis of a grid cell, see [`ClusterLine::from_hough_cell`].
    pub fn cell_line(&self, cell: HoughCell) -> Result<ClusterLine, HoughTrackError> {
        ClusterLine::from_hough_cell(cell, &self.geometry, &self.velocities)
    }
}
