//! # Constants and type definitions for houghtrack
//!
//! This module centralizes the **unit conversions**, **identifier aliases**, and
//! **container types** shared by the voting engine and the recovery pass.
//!
//! ## Overview
//!
//! - Unit conversions (arcseconds ↔ degrees, days ↔ seconds)
//! - Unit and identifier type aliases used across the crate
//! - Hash-map containers for fakes, clusters and recovery reports
//!
//! Positions are expressed in **degrees** on the sky, times in **MJD** (days) and
//! angular rates in **degrees per day** everywhere in the crate.

use std::collections::HashMap;

use ahash::RandomState;

use crate::clusters::Cluster;
use crate::recovery::{FakeDetection, MatchRecord};

// -------------------------------------------------------------------------------------------------
// Unit conversions
// -------------------------------------------------------------------------------------------------

/// Number of seconds in a day
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Arcseconds → degrees
pub const ARCSEC_TO_DEG: f64 = 1.0 / 3600.0;

/// Default tolerance (days) when matching a time to an exposure mid-time: one second.
pub const EXPOSURE_TIME_TOLERANCE: f64 = 1.0 / SECONDS_PER_DAY;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in arcseconds
pub type ArcSec = f64;
/// Angular rate in degrees per day
pub type DegreePerDay = f64;
/// Modified Julian Date (days)
pub type MJD = f64;

/// Identifier of an exposure (visit)
pub type ExposureId = i64;
/// Identifier of a detector within an exposure
pub type DetectorId = i32;
/// Identifier of an injected synthetic orbit
pub type OrbitId = u64;
/// Identifier of an extracted cluster
pub type ClusterId = u64;

// -------------------------------------------------------------------------------------------------
// Data containers
// -------------------------------------------------------------------------------------------------

/// Ground-truth detections grouped by orbit, each group ordered as supplied.
pub type FakeSet = HashMap<OrbitId, Vec<FakeDetection>, RandomState>;

/// Clusters handed over by the external extraction step, keyed by cluster id.
pub type ClusterSet = HashMap<ClusterId, Cluster, RandomState>;

/// One [`MatchRecord`] per orbit, produced by [`recover`](crate::recovery::recover).
pub type RecoveryReport = HashMap<OrbitId, MatchRecord, RandomState>;
