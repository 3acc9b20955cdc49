//! # Recovery of injected synthetic trajectories
//!
//! Given the ground truth of injected moving objects ("fakes"), the clusters
//! extracted from a vote grid and the raw multi-epoch catalog, [`recover`]
//! measures, per orbit:
//!
//! 1. **Point match**: how many members of each cluster coincide with a fake of
//!    the orbit in the same exposure ([`PointMatch`]).
//! 2. **Line match**: how many fakes of the orbit lie on each cluster's fitted track,
//!    evaluated at the fake's own epoch ([`LineMatch`]).
//! 3. **Catalog match**: how many fakes were detected at all by the per-exposure
//!    source extraction, regardless of clustering ([`CatalogMatch`]).
//! 4. **Kinematics**: the orbit's mean angular velocity and whether some candidate
//!    velocity of the search is close enough to make it findable ([`Kinematics`]).
//!
//! Orbits are processed independently and in parallel. Degenerate orbits (fewer
//! than two time-distinct fakes) are reported with NaN velocity and
//! `findable == false`, never as an error.
//!
//! Matching is by exposure id, not by time: two exposures may share a mid-time
//! (several detectors of one visit), so time alone cannot pair a fake with a
//! detection.
//!
//! ## Example
//!
//! ```rust, no_run
//! use houghtrack::recovery::{group_fakes, recover, RecoveryParamsBuilder};
//! use houghtrack::constants::ClusterSet;
//! use houghtrack::catalog::Catalog;
//!
//! let params = RecoveryParamsBuilder::new()
//!     .match_threshold_points_arcsec(0.5)
//!     .build()?;
//!
//! let fakes = group_fakes(vec![]);
//! let clusters = ClusterSet::default();
//! let report = recover(&fakes, &clusters, &Catalog::new(), &params, None);
//! assert!(report.is_empty());
//! # Ok::<(), houghtrack::houghtrack_errors::HoughTrackError>(())
//! ```
use std::cmp::Ordering::Greater;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use ahash::RandomState;
use log::{info, warn};
use nalgebra::Vector2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::catalog::Catalog;
use crate::clusters::{Cluster, TrajectoryModel};
use crate::constants::{
    ArcSec, ClusterId, ClusterSet, Degree, DegreePerDay, ExposureId, FakeSet, OrbitId,
    RecoveryReport, ARCSEC_TO_DEG, MJD,
};
use crate::hough::GridGeometry;
use crate::houghtrack_errors::HoughTrackError;
use crate::sky::angular_separation;
use crate::velocities::CandidateVelocities;

pub mod stats;

/// Ground-truth position of an injected object in one exposure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FakeDetection {
    pub orbit: OrbitId,
    pub ra: Degree,
    pub dec: Degree,
    pub time: MJD,
    pub exposure: ExposureId,
}

/// Group fakes by orbit id, keeping the input order inside each orbit.
pub fn group_fakes(fakes: impl IntoIterator<Item = FakeDetection>) -> FakeSet {
    let mut set = FakeSet::default();
    for fake in fakes {
        set.entry(fake.orbit).or_default().push(fake);
    }
    set
}

/// Angular match thresholds used by [`recover`], in degrees.
///
/// Build with [`RecoveryParamsBuilder`]; both thresholds default to one arcsecond.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryParams {
    /// Maximum separation between a fake and a cluster member or catalog detection.
    pub match_threshold_points: Degree,
    /// Maximum separation between a fake and a cluster track prediction.
    pub match_threshold_line: Degree,
}

impl RecoveryParams {
    pub fn builder() -> RecoveryParamsBuilder {
        RecoveryParamsBuilder::new()
    }
}

impl Default for RecoveryParams {
    fn default() -> Self {
        RecoveryParams {
            match_threshold_points: ARCSEC_TO_DEG,
            match_threshold_line: ARCSEC_TO_DEG,
        }
    }
}

/// Builder for [`RecoveryParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct RecoveryParamsBuilder {
    params: RecoveryParams,
}

impl RecoveryParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn match_threshold_points(mut self, v: Degree) -> Self {
        self.params.match_threshold_points = v;
        self
    }
    pub fn match_threshold_points_arcsec(mut self, v: ArcSec) -> Self {
        self.params.match_threshold_points = v * ARCSEC_TO_DEG;
        self
    }
    pub fn match_threshold_line(mut self, v: Degree) -> Self {
        self.params.match_threshold_line = v;
        self
    }
    pub fn match_threshold_line_arcsec(mut self, v: ArcSec) -> Self {
        self.params.match_threshold_line = v * ARCSEC_TO_DEG;
        self
    }

    /// Return true iff x > 0.0, finite and comparable (i.e., not NaN).
    #[inline]
    fn gt0_finite(x: f64) -> bool {
        x.is_finite() && x.partial_cmp(&0.0) == Some(Greater)
    }

    /// Finalize the builder.
    ///
    /// Errors
    /// ----------
    /// * [`HoughTrackError::InvalidRecoveryParameter`] if a threshold is not a
    ///   strictly positive finite angle.
    pub fn build(self) -> Result<RecoveryParams, HoughTrackError> {
        let p = &self.params;
        if !Self::gt0_finite(p.match_threshold_points) {
            return Err(HoughTrackError::InvalidRecoveryParameter(format!(
                "match_threshold_points must be > 0 and finite, got {}",
                p.match_threshold_points
            )));
        }
        if !Self::gt0_finite(p.match_threshold_line) {
            return Err(HoughTrackError::InvalidRecoveryParameter(format!(
                "match_threshold_line must be > 0 and finite, got {}",
                p.match_threshold_line
            )));
        }
        Ok(self.params)
    }
}

impl fmt::Display for RecoveryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let points = self.match_threshold_points / ARCSEC_TO_DEG;
        let line = self.match_threshold_line / ARCSEC_TO_DEG;
        if f.alternate() {
            writeln!(f, "Recovery Parameters")?;
            writeln!(f, "-------------------")?;
            writeln!(
                f,
                "  match_threshold_points = {points:.3} arcsec   # fake vs member / catalog detection"
            )?;
            write!(
                f,
                "  match_threshold_line   = {line:.3} arcsec   # fake vs track prediction"
            )
        } else {
            write!(
                f,
                "RecoveryParams(points={points:.3}\", line={line:.3}\")"
            )
        }
    }
}

/// Cluster members matching a fake of the orbit in the same exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointMatch {
    pub matched: usize,
    pub cluster_size: usize,
    /// Members whose exposure holds more than one fake of the orbit.
    pub ambiguous: usize,
}

/// Fakes of the orbit lying on the cluster's track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMatch {
    pub matched: usize,
    pub total: usize,
}

impl LineMatch {
    pub fn completeness(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.matched as f64 / self.total as f64
        }
    }
}

/// Fakes of the orbit found in the raw catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogMatch {
    pub matched: usize,
    pub total: usize,
}

impl CatalogMatch {
    /// Every fake of a non-empty orbit was extracted.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.matched == self.total
    }
}

/// Candidate velocity nearest to an orbit's velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClosestCandidate {
    pub index: usize,
    pub velocity: Vector2<f64>,
    /// Distance in velocity space (degrees per day).
    pub min_dv: DegreePerDay,
    /// Position error accumulated over the orbit's baseline (degrees).
    pub distance: Degree,
}

/// Mean angular motion of an orbit and its reachability by the search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kinematics {
    /// `(dRA/dt, dDec/dt)` in degrees per day from the first and last fake; NaN if degenerate.
    pub velocity: Vector2<f64>,
    /// Time between first and last fake (days).
    pub baseline: f64,
    pub closest: Option<ClosestCandidate>,
    pub findable: bool,
}

/// Everything [`recover`] measured for one orbit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Clusters with at least one matched or ambiguous member.
    pub points: BTreeMap<ClusterId, PointMatch>,
    /// Clusters whose track matched at least one fake.
    pub line: BTreeMap<ClusterId, LineMatch>,
    pub catalog: CatalogMatch,
    pub kinematics: Kinematics,
}

impl MatchRecord {
    /// Highest line completeness over all clusters, 0 when no track matched.
    pub fn best_line_completeness(&self) -> f64 {
        self.line
            .values()
            .map(LineMatch::completeness)
            .fold(0.0, f64::max)
    }

    /// Cluster holding the most matched members, if any.
    pub fn best_point_match(&self) -> Option<(ClusterId, PointMatch)> {
        self.points
            .iter()
            .filter(|(_, m)| m.matched > 0)
            .max_by_key(|(_, m)| m.matched)
            .map(|(id, m)| (*id, *m))
    }

    pub fn is_ambiguous(&self) -> bool {
        self.points.values().any(|m| m.ambiguous > 0)
    }
}

type FakesByExposure<'a> = HashMap<ExposureId, SmallVec<[&'a FakeDetection; 2]>, RandomState>;

fn by_exposure(fakes: &[FakeDetection]) -> FakesByExposure<'_> {
    let mut map = FakesByExposure::default();
    for fake in fakes {
        map.entry(fake.exposure).or_default().push(fake);
    }
    map
}

fn point_match(
    cluster: &Cluster,
    fakes: &FakesByExposure<'_>,
    threshold: Degree,
) -> PointMatch {
    let mut record = PointMatch {
        matched: 0,
        cluster_size: cluster.len(),
        ambiguous: 0,
    };
    for member in &cluster.members {
        let Some(candidates) = fakes.get(&member.exposure) else {
            continue;
        };
        if candidates.len() > 1 {
            record.ambiguous += 1;
        }
        if candidates
            .iter()
            .any(|f| angular_separation(f.ra, f.dec, member.ra, member.dec) < threshold)
        {
            record.matched += 1;
        }
    }
    record
}

fn line_match(cluster: &Cluster, fakes: &[FakeDetection], threshold: Degree) -> LineMatch {
    let matched = fakes
        .iter()
        .filter(|f| {
            let p = cluster.line.predict(f.time);
            angular_separation(f.ra, f.dec, p.x, p.y) < threshold
        })
        .count();
    LineMatch {
        matched,
        total: fakes.len(),
    }
}

fn catalog_match(fakes: &[FakeDetection], catalog: &Catalog, threshold: Degree) -> CatalogMatch {
    let matched = fakes
        .iter()
        .filter(|f| {
            catalog
                .exposure_detections(f.exposure)
                .is_some_and(|dets| {
                    dets.iter()
                        .any(|d| angular_separation(f.ra, f.dec, d.ra, d.dec) < threshold)
                })
        })
        .count();
    CatalogMatch {
        matched,
        total: fakes.len(),
    }
}

/// Mean velocity from the first and last fake by time.
///
/// No `cos(dec)` factor and no RA wrap-around: the velocity lives in the same
/// flat (ra, dec) space as the candidate velocities of the search.
pub fn kinematics(
    fakes: &[FakeDetection],
    context: Option<(&CandidateVelocities, &GridGeometry)>,
) -> Kinematics {
    let degenerate = Kinematics {
        velocity: Vector2::new(f64::NAN, f64::NAN),
        baseline: 0.0,
        closest: None,
        findable: false,
    };

    let first = fakes.iter().min_by(|a, b| a.time.total_cmp(&b.time));
    let last = fakes.iter().max_by(|a, b| a.time.total_cmp(&b.time));
    let (Some(first), Some(last)) = (first, last) else {
        return degenerate;
    };
    let baseline = last.time - first.time;
    if !(baseline.is_finite() && baseline > 0.0) {
        return Kinematics {
            baseline: 0.0,
            ..degenerate
        };
    }

    let velocity = Vector2::new(last.ra - first.ra, last.dec - first.dec) / baseline;
    let closest = context.and_then(|(velocities, geometry)| {
        velocities.nearest(&velocity).map(|(index, min_dv)| {
            (
                ClosestCandidate {
                    index,
                    velocity: velocities.as_slice()[index],
                    min_dv,
                    distance: min_dv * baseline,
                },
                geometry.dx,
            )
        })
    });

    Kinematics {
        velocity,
        baseline,
        findable: closest.is_some_and(|(c, dx)| c.distance < dx),
        closest: closest.map(|(c, _)| c),
    }
}

fn match_orbit(
    orbit: OrbitId,
    fakes: &[FakeDetection],
    clusters: &ClusterSet,
    catalog: &Catalog,
    params: &RecoveryParams,
    context: Option<(&CandidateVelocities, &GridGeometry)>,
) -> MatchRecord {
    let per_exposure = by_exposure(fakes);

    let mut points = BTreeMap::new();
    let mut line = BTreeMap::new();
    for (id, cluster) in clusters {
        let pm = point_match(cluster, &per_exposure, params.match_threshold_points);
        if pm.ambiguous > 0 {
            warn!(
                "orbit {orbit}, cluster {id}: {} member(s) share an exposure with several fakes",
                pm.ambiguous
            );
        }
        if pm.matched > 0 || pm.ambiguous > 0 {
            info!(
                "orbit {orbit}, cluster {id}: {}/{} members matched",
                pm.matched, pm.cluster_size
            );
            points.insert(*id, pm);
        }

        let lm = line_match(cluster, fakes, params.match_threshold_line);
        if lm.matched > 0 {
            info!(
                "orbit {orbit}, cluster {id}: track matches {}/{} fakes",
                lm.matched, lm.total
            );
            line.insert(*id, lm);
        }
    }

    let catalog = catalog_match(fakes, catalog, params.match_threshold_points);
    let kinematics = kinematics(fakes, context);
    info!(
        "orbit {orbit}: {}/{} fakes in catalog, findable={}",
        catalog.matched, catalog.total, kinematics.findable
    );

    MatchRecord {
        points,
        line,
        catalog,
        kinematics,
    }
}

/// Compare extracted clusters and the raw catalog against injected fakes.
///
/// Arguments
/// -----------------
/// * `fakes`: ground truth, grouped by orbit (see [`group_fakes`])
/// * `clusters`: extracted clusters keyed by cluster id
/// * `catalog`: the full multi-epoch catalog the clusters were extracted from
/// * `params`: angular match thresholds
/// * `context`: candidate velocities and grid geometry of the search, enabling
///   the `closest` and `findable` diagnostics
///
/// Return
/// ----------
/// * One [`MatchRecord`] per orbit of `fakes`.
pub fn recover(
    fakes: &FakeSet,
    clusters: &ClusterSet,
    catalog: &Catalog,
    params: &RecoveryParams,
    context: Option<(&CandidateVelocities, &GridGeometry)>,
) -> RecoveryReport {
    #[cfg(feature = "progress")]
    let pb = {
        let pb = ProgressBar::new(fakes.len() as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | {per_sec} | ETA {eta_precise}",
        ) {
            pb.set_style(style);
        }
        pb
    };

    let report: RecoveryReport = fakes
        .par_iter()
        .map(|(orbit, orbit_fakes)| {
            let record = match_orbit(*orbit, orbit_fakes, clusters, catalog, params, context);
            #[cfg(feature = "progress")]
            pb.inc(1);
            (*orbit, record)
        })
        .collect();

    #[cfg(feature = "progress")]
    pb.finish_and_clear();

    report
}
