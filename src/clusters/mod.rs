//! # Clusters and track models
//!
//! A [`Cluster`] is a set of detections believed to belong to one object moving
//! linearly across the sky, together with the track fitted through them. Clusters
//! are produced outside this crate by peak extraction over a vote grid; here they
//! are only read, by the refinement and recovery steps.
//!
//! The track is a [`ClusterLine`], a tagged variant:
//! * [`ClusterLine::Anchored`] – anchor + direction at a reference epoch, typically
//!   straight from a Hough cell ([`ClusterLine::from_hough_cell`]);
//! * [`ClusterLine::Regression`] – a least-squares [`LinearFit`] of the members.
//!
//! Both implement [`TrajectoryModel`], the only capability recovery relies on.
use log::warn;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, Detection};
use crate::constants::{Degree, MJD};
use crate::hough::GridGeometry;
use crate::houghtrack_errors::HoughTrackError;
use crate::velocities::CandidateVelocities;

/// Anything able to predict a sky position at a given epoch.
pub trait TrajectoryModel {
    /// Predicted `(ra, dec)` in degrees at `time` (MJD).
    fn predict(&self, time: MJD) -> Vector2<f64>;

    fn predict_many(&self, times: &[MJD]) -> Vec<Vector2<f64>> {
        times.iter().map(|t| self.predict(*t)).collect()
    }
}

/// Position of a cell in the vote grid: candidate velocity index and spatial bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HoughCell {
    pub velocity: usize,
    pub x: usize,
    pub y: usize,
}

/// Ordinary least-squares fit of `ra(t)` and `dec(t)`.
///
/// `predict(t) = alpha + beta · (t - t0)`; `rms` is the root mean square of the
/// Euclidean residuals of the fitted points (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub alpha: Vector2<f64>,
    pub beta: Vector2<f64>,
    pub t0: MJD,
    pub rms: Degree,
}

impl LinearFit {
    /// Fit a straight track through `detections`, with intercept at `t0`.
    ///
    /// Errors
    /// ----------
    /// * [`HoughTrackError::EmptyFit`] if fewer than two distinct epochs are present.
    pub fn from_detections(detections: &[Detection], t0: MJD) -> Result<Self, HoughTrackError> {
        let mut epochs: Vec<MJD> = detections.iter().map(|d| d.time).collect();
        epochs.sort_by(f64::total_cmp);
        epochs.dedup();
        if epochs.len() < 2 {
            return Err(HoughTrackError::EmptyFit(epochs.len()));
        }

        let n = detections.len() as f64;
        let t_mean = detections.iter().map(|d| d.time - t0).sum::<f64>() / n;
        let p_mean = detections
            .iter()
            .map(|d| Vector2::new(d.ra, d.dec))
            .sum::<Vector2<f64>>()
            / n;

        let (stt, stp) = detections.iter().fold(
            (0.0, Vector2::zeros()),
            |(stt, stp): (f64, Vector2<f64>), d| {
                let dt = d.time - t0 - t_mean;
                (stt + dt * dt, stp + (Vector2::new(d.ra, d.dec) - p_mean) * dt)
            },
        );

        let beta = stp / stt;
        let alpha = p_mean - beta * t_mean;

        let mut fit = LinearFit {
            alpha,
            beta,
            t0,
            rms: 0.0,
        };
        fit.rms = (detections
            .iter()
            .map(|d| (Vector2::new(d.ra, d.dec) - fit.predict(d.time)).norm_squared())
            .sum::<f64>()
            / n)
            .sqrt();
        Ok(fit)
    }
}

impl TrajectoryModel for LinearFit {
    fn predict(&self, time: MJD) -> Vector2<f64> {
        self.alpha + self.beta * (time - self.t0)
    }
}

/// Track hypothesis attached to a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ClusterLine {
    /// Position `anchor` at `reference_time`, moving at `direction` (degrees per day).
    Anchored {
        anchor: Vector2<f64>,
        direction: Vector2<f64>,
        reference_time: MJD,
    },
    /// Explicit regression parameters.
    Regression(LinearFit),
}

impl ClusterLine {
    /// Track of a vote-grid cell: the cell's lower corner in the comoving frame,
    /// moving at the cell's candidate velocity.
    ///
    /// Errors
    /// ----------
    /// * [`HoughTrackError::IndexOutOfRange`] if the velocity index is not in `velocities`.
    pub fn from_hough_cell(
        cell: HoughCell,
        geometry: &GridGeometry,
        velocities: &CandidateVelocities,
    ) -> Result<Self, HoughTrackError> {
        Ok(ClusterLine::Anchored {
            anchor: geometry.cell_origin(cell.x, cell.y),
            direction: velocities.get(cell.velocity)?,
            reference_time: geometry.reference_time,
        })
    }

    /// `(anchor, direction, reference_time)` of the track.
    pub fn track(&self) -> (Vector2<f64>, Vector2<f64>, MJD) {
        match self {
            ClusterLine::Anchored {
                anchor,
                direction,
                reference_time,
            } => (*anchor, *direction, *reference_time),
            ClusterLine::Regression(fit) => (fit.alpha, fit.beta, fit.t0),
        }
    }
}

impl TrajectoryModel for ClusterLine {
    fn predict(&self, time: MJD) -> Vector2<f64> {
        match self {
            ClusterLine::Anchored {
                anchor,
                direction,
                reference_time,
            } => anchor + direction * (time - reference_time),
            ClusterLine::Regression(fit) => fit.predict(time),
        }
    }
}

/// Member detections sharing one linear track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub members: Vec<Detection>,
    pub line: ClusterLine,
    /// Vote-grid cell the cluster was extracted from, if any.
    pub cell: Option<HoughCell>,
}

impl Cluster {
    pub fn new(members: Vec<Detection>, line: ClusterLine) -> Self {
        Cluster {
            members,
            line,
            cell: None,
        }
    }

    pub fn with_cell(mut self, cell: HoughCell) -> Self {
        self.cell = Some(cell);
        self
    }

    /// Build a cluster from bare `(ra, dec, time)` points, recovering each point's
    /// exposure from the catalog by time.
    ///
    /// Points with no exposure mid-time within `tolerance` days are dropped.
    pub fn from_sky_points(
        points: &[(Degree, Degree, MJD)],
        line: ClusterLine,
        catalog: &Catalog,
        tolerance: f64,
    ) -> Self {
        let members: Vec<Detection> = points
            .iter()
            .filter_map(|&(ra, dec, time)| match catalog.exposure_at(time, tolerance) {
                Some(exposure) => Some(Detection::new(ra, dec, time, exposure)),
                None => {
                    warn!("no exposure within {tolerance} d of t={time}, point dropped");
                    None
                }
            })
            .collect();
        Cluster::new(members, line)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
