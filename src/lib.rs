//! # houghtrack
//!
//! Search of multi-epoch point-source catalogs for objects moving with a constant
//! angular velocity, by voting in velocity space, and validation of the search
//! against injected synthetic trajectories.
//!
//! Typical pipeline:
//!
//! 1. Assemble a [`Catalog`](catalog::Catalog) from per-exposure catalogs.
//! 2. Build a [`HoughTransform`](hough::HoughTransform) over a set of
//!    [`CandidateVelocities`](velocities::CandidateVelocities) and vote the detections.
//! 3. Extract peaks (outside this crate) and turn them into
//!    [`Cluster`](clusters::Cluster)s, refining members with
//!    [`refine_members`](hough::refine_members).
//! 4. Measure completeness with [`recover`](recovery::recover).
//!
//! Feature flags
//! -----------------
//! * `progress` – progress bar over orbits during recovery (`indicatif`).
pub mod catalog;
pub mod clusters;
pub mod constants;
pub mod hough;
pub mod houghtrack_errors;
pub mod recovery;
pub mod sky;
pub mod velocities;
