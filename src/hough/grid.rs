use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::houghtrack_errors::HoughTrackError;

use super::GridGeometry;

/// Flat offset of bin `(i, j)` in an `nx × ny` plane, `None` outside it.
#[inline]
pub(crate) fn cell_offset(i: i64, j: i64, nx: usize, ny: usize) -> Option<usize> {
    if i < 0 || j < 0 {
        return None;
    }
    let (i, j) = (i as usize, j as usize);
    (i < nx && j < ny).then_some(i * ny + j)
}

/// Number of cells of a `(n_velocities, nx, ny)` grid.
fn cell_count(n_velocities: usize, nx: usize, ny: usize) -> Result<usize, HoughTrackError> {
    if n_velocities == 0 || nx == 0 || ny == 0 {
        return Err(HoughTrackError::InvalidGeometry(format!(
            "grid shape must be non-empty, got ({n_velocities}, {nx}, {ny})"
        )));
    }
    nx.checked_mul(ny)
        .and_then(|plane| plane.checked_mul(n_velocities))
        .ok_or_else(|| {
            HoughTrackError::InvalidGeometry(format!(
                "grid shape ({n_velocities}, {nx}, {ny}) overflows the addressable size"
            ))
        })
}

/// Dense vote accumulator of shape `(n_velocities, nx, ny)`.
///
/// Stored row-major: the votes of velocity `v` occupy the contiguous slice
/// `v * nx * ny .. (v + 1) * nx * ny`, with `y` varying fastest. The grid remembers
/// the [`GridGeometry`] it was created with and refuses votes computed under any
/// other geometry.
///
/// Entries stay ≥ 0 under unit-weight voting; weighted passes may make them
/// negative or fractional. The grid never shrinks and is cleared only by
/// [`VoteGrid::reset`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawVoteGrid")]
pub struct VoteGrid {
    geometry: GridGeometry,
    n_velocities: usize,
    nx: usize,
    ny: usize,
    data: Vec<f64>,
}

#[derive(Deserialize)]
struct RawVoteGrid {
    geometry: GridGeometry,
    n_velocities: usize,
    nx: usize,
    ny: usize,
    data: Vec<f64>,
}

impl TryFrom<RawVoteGrid> for VoteGrid {
    type Error = HoughTrackError;

    fn try_from(raw: RawVoteGrid) -> Result<Self, Self::Error> {
        let expected = cell_count(raw.n_velocities, raw.nx, raw.ny)?;
        if raw.data.len() != expected {
            return Err(HoughTrackError::ShapeMismatch {
                what: "vote grid data",
                expected,
                found: raw.data.len(),
            });
        }
        Ok(VoteGrid {
            geometry: raw.geometry,
            n_velocities: raw.n_velocities,
            nx: raw.nx,
            ny: raw.ny,
            data: raw.data,
        })
    }
}

impl VoteGrid {
    /// Errors
    /// ----------
    /// * [`HoughTrackError::InvalidGeometry`] if any dimension is zero or the cell
    ///   count does not fit in `usize`.
    pub fn new(
        geometry: GridGeometry,
        n_velocities: usize,
        nx: usize,
        ny: usize,
    ) -> Result<Self, HoughTrackError> {
        let len = cell_count(n_velocities, nx, ny)?;
        Ok(VoteGrid {
            geometry,
            n_velocities,
            nx,
            ny,
            data: vec![0.0; len],
        })
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    /// `(n_velocities, nx, ny)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.n_velocities, self.nx, self.ny)
    }

    pub fn n_velocities(&self) -> usize {
        self.n_velocities
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    /// Vote count at `(v, i, j)`, `None` outside the grid.
    pub fn get(&self, v: usize, i: usize, j: usize) -> Option<f64> {
        (v < self.n_velocities && i < self.nx && j < self.ny)
            .then(|| self.data[(v * self.nx + i) * self.ny + j])
    }

    /// The `nx × ny` plane of velocity `v`, row-major.
    pub fn slice(&self, v: usize) -> Result<&[f64], HoughTrackError> {
        if v >= self.n_velocities {
            return Err(HoughTrackError::IndexOutOfRange {
                what: "vote grid velocity axis",
                index: v,
                len: self.n_velocities,
            });
        }
        let plane = self.nx * self.ny;
        Ok(&self.data[v * plane..(v + 1) * plane])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn sum(&self) -> f64 {
        self.data.par_iter().sum()
    }

    /// Largest entry and its `(v, i, j)` position. Ties resolve to the first in storage order.
    pub fn max(&self) -> (f64, (usize, usize, usize)) {
        let (idx, value) = self
            .data
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (idx, value)| {
                if value > best.1 {
                    (idx, value)
                } else {
                    best
                }
            });
        let j = idx % self.ny;
        let i = (idx / self.ny) % self.nx;
        let v = idx / (self.nx * self.ny);
        (value, (v, i, j))
    }

    /// Zero every entry, keeping shape and geometry.
    pub fn reset(&mut self) {
        self.data.par_iter_mut().for_each(|x| *x = 0.0);
    }

    /// Flat offset of bin `(i, j)` inside a velocity plane, `None` outside the grid.
    #[inline]
    pub(crate) fn cell_offset(&self, i: i64, j: i64) -> Option<usize> {
        cell_offset(i, j, self.nx, self.ny)
    }

    /// Mutable per-velocity planes, processed in parallel.
    pub(crate) fn par_planes_mut(&mut self) -> rayon::slice::ChunksMut<'_, f64> {
        let plane = self.nx * self.ny;
        self.data.par_chunks_mut(plane)
    }

    pub(crate) fn check_geometry(&self, geometry: &GridGeometry) -> Result<(), HoughTrackError> {
        if self.geometry != *geometry {
            return Err(HoughTrackError::GeometryMismatch(format!(
                "grid built with {:?}, votes computed with {:?}",
                self.geometry, geometry
            )));
        }
        Ok(())
    }

    pub(crate) fn check_velocities(&self, n_velocities: usize) -> Result<(), HoughTrackError> {
        if self.n_velocities != n_velocities {
            return Err(HoughTrackError::ShapeMismatch {
                what: "velocity axis",
                expected: self.n_velocities,
                found: n_velocities,
            });
        }
        Ok(())
    }
}
