//! # Candidate velocities
//!
//! The ordered set of angular-rate hypotheses tested by the Hough transform.
//! The position of a velocity in the set is its identity: it indexes axis 0 of
//! the vote grid and of every precomputed position/bin array. Indices are dense
//! (`0..len`) and never change once the set is built.
use std::f64::consts::TAU;

use itertools::Itertools;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::constants::DegreePerDay;
use crate::houghtrack_errors::HoughTrackError;

/// Ordered set of candidate velocities `(v_ra, v_dec)` in degrees per day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateVelocities {
    b: Vec<Vector2<f64>>,
}

impl CandidateVelocities {
    /// Build the set from explicit vectors.
    ///
    /// Errors
    /// ----------
    /// * [`HoughTrackError::InvalidVelocitySet`] if the set is empty or holds a non-finite component.
    pub fn from_vectors(b: Vec<Vector2<f64>>) -> Result<Self, HoughTrackError> {
        if b.is_empty() {
            return Err(HoughTrackError::InvalidVelocitySet(
                "at least one candidate velocity is required".into(),
            ));
        }
        if let Some(idx) = b.iter().position(|v| !(v.x.is_finite() && v.y.is_finite())) {
            return Err(HoughTrackError::InvalidVelocitySet(format!(
                "velocity {idx} is not finite"
            )));
        }
        Ok(CandidateVelocities { b })
    }

    /// Polar grid of velocities: `n_speeds` evenly spaced rates in
    /// `[min_speed, max_speed]`, each sampled at `n_angles` evenly spaced
    /// position angles starting at 0 (towards +RA).
    ///
    /// A zero rate produces a single zero vector instead of `n_angles` copies.
    /// Velocities are ordered by speed, then by angle.
    pub fn from_speed_angle_grid(
        min_speed: DegreePerDay,
        max_speed: DegreePerDay,
        n_speeds: usize,
        n_angles: usize,
    ) -> Result<Self, HoughTrackError> {
        if n_speeds == 0 || n_angles == 0 {
            return Err(HoughTrackError::InvalidVelocitySet(
                "n_speeds and n_angles must be >= 1".into(),
            ));
        }
        if !(min_speed.is_finite() && max_speed.is_finite())
            || min_speed < 0.0
            || min_speed > max_speed
        {
            return Err(HoughTrackError::InvalidVelocitySet(
                "require 0 <= min_speed <= max_speed".into(),
            ));
        }

        let step = if n_speeds > 1 {
            (max_speed - min_speed) / (n_speeds - 1) as f64
        } else {
            0.0
        };

        let b = (0..n_speeds)
            .map(|i| min_speed + step * i as f64)
            .cartesian_product(0..n_angles)
            .filter(|(speed, k)| *speed > 0.0 || *k == 0)
            .map(|(speed, k)| {
                let (sin, cos) = (TAU * k as f64 / n_angles as f64).sin_cos();
                Vector2::new(speed * cos, speed * sin)
            })
            .collect();

        Self::from_vectors(b)
    }

    pub fn len(&self) -> usize {
        self.b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.b.is_empty()
    }

    pub fn as_slice(&self) -> &[Vector2<f64>] {
        &self.b
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vector2<f64>> {
        self.b.iter()
    }

    /// Velocity at `index`, or [`HoughTrackError::IndexOutOfRange`].
    pub fn get(&self, index: usize) -> Result<Vector2<f64>, HoughTrackError> {
        self.b
            .get(index)
            .copied()
            .ok_or(HoughTrackError::IndexOutOfRange {
                what: "candidate velocities",
                index,
                len: self.b.len(),
            })
    }

    /// Candidate closest to `v` in velocity space.
    ///
    /// Return
    /// ----------
    /// * `Some((index, distance))` with the Euclidean distance in degrees per day.
    /// * `None` if `v` has a non-finite component.
    pub fn nearest(&self, v: &Vector2<f64>) -> Option<(usize, DegreePerDay)> {
        if !(v.x.is_finite() && v.y.is_finite()) {
            return None;
        }
        self.b
            .iter()
            .map(|b| (b - v).norm())
            .enumerate()
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
    }
}
