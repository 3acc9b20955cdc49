//! Precomputed comoving positions and bins.
//!
//! [`transform_all`] and [`digitize_all`] compute, once, what
//! [`vote_points`](super::vote_points) computes inline: the comoving position and the
//! grid bin of every (velocity, detection) pair. The resulting [`DigitizedBins`]
//! can then be voted any number of times with different per-detection weights via
//! [`vote_bins`](super::vote_bins), without repeating the geometry.
//!
//! Both arrays are laid out velocity-major: entry `(v, k)` sits at `v * n_detections + k`.
use nalgebra::Vector2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::catalog::Detection;
use crate::constants::MJD;
use crate::houghtrack_errors::HoughTrackError;
use crate::velocities::CandidateVelocities;

use super::{project_detection, GridGeometry};

/// Comoving positions, shape `(n_velocities, n_detections)` of 2D points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawProjectedPositions")]
pub struct ProjectedPositions {
    reference_time: MJD,
    n_velocities: usize,
    n_detections: usize,
    data: Vec<Vector2<f64>>,
}

/// Grid bins, shape `(n_velocities, n_detections)` of `(i, j)` pairs.
///
/// Bins may lie outside any particular grid. The geometry they were computed
/// with travels along, so they cannot be voted into a grid built for another one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDigitizedBins")]
pub struct DigitizedBins {
    geometry: GridGeometry,
    n_velocities: usize,
    n_detections: usize,
    data: Vec<(i64, i64)>,
}

fn check_index(
    what: &'static str,
    index: usize,
    len: usize,
) -> Result<(), HoughTrackError> {
    if index >= len {
        return Err(HoughTrackError::IndexOutOfRange { what, index, len });
    }
    Ok(())
}

fn check_len(
    what: &'static str,
    n_velocities: usize,
    n_detections: usize,
    found: usize,
) -> Result<(), HoughTrackError> {
    match n_velocities.checked_mul(n_detections) {
        Some(expected) if expected == found => Ok(()),
        Some(expected) => Err(HoughTrackError::ShapeMismatch {
            what,
            expected,
            found,
        }),
        None => Err(HoughTrackError::InvalidGeometry(format!(
            "{what} shape ({n_velocities}, {n_detections}) overflows the addressable size"
        ))),
    }
}

#[derive(Deserialize)]
struct RawProjectedPositions {
    reference_time: MJD,
    n_velocities: usize,
    n_detections: usize,
    data: Vec<Vector2<f64>>,
}

impl TryFrom<RawProjectedPositions> for ProjectedPositions {
    type Error = HoughTrackError;

    fn try_from(raw: RawProjectedPositions) -> Result<Self, Self::Error> {
        check_len(
            "projected positions",
            raw.n_velocities,
            raw.n_detections,
            raw.data.len(),
        )?;
        Ok(ProjectedPositions {
            reference_time: raw.reference_time,
            n_velocities: raw.n_velocities,
            n_detections: raw.n_detections,
            data: raw.data,
        })
    }
}

#[derive(Deserialize)]
struct RawDigitizedBins {
    geometry: GridGeometry,
    n_velocities: usize,
    n_detections: usize,
    data: Vec<(i64, i64)>,
}

impl TryFrom<RawDigitizedBins> for DigitizedBins {
    type Error = HoughTrackError;

    fn try_from(raw: RawDigitizedBins) -> Result<Self, Self::Error> {
        check_len(
            "digitized bins",
            raw.n_velocities,
            raw.n_detections,
            raw.data.len(),
        )?;
        Ok(DigitizedBins {
            geometry: raw.geometry,
            n_velocities: raw.n_velocities,
            n_detections: raw.n_detections,
            data: raw.data,
        })
    }
}

impl ProjectedPositions {
    pub fn reference_time(&self) -> MJD {
        self.reference_time
    }

    pub fn n_velocities(&self) -> usize {
        self.n_velocities
    }

    pub fn n_detections(&self) -> usize {
        self.n_detections
    }

    /// Comoving position of detection `k` under velocity `v`.
    pub fn get(&self, v: usize, k: usize) -> Result<Vector2<f64>, HoughTrackError> {
        check_index("velocity axis", v, self.n_velocities)?;
        check_index("detection axis", k, self.n_detections)?;
        Ok(self.data[v * self.n_detections + k])
    }

    /// Positions of every detection under velocity `v`.
    pub fn plane(&self, v: usize) -> Result<&[Vector2<f64>], HoughTrackError> {
        check_index("velocity axis", v, self.n_velocities)?;
        Ok(&self.data[v * self.n_detections..(v + 1) * self.n_detections])
    }
}

impl DigitizedBins {
    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn n_velocities(&self) -> usize {
        self.n_velocities
    }

    pub fn n_detections(&self) -> usize {
        self.n_detections
    }

    /// Bin of detection `k` under velocity `v`.
    pub fn get(&self, v: usize, k: usize) -> Result<(i64, i64), HoughTrackError> {
        check_index("velocity axis", v, self.n_velocities)?;
        check_index("detection axis", k, self.n_detections)?;
        Ok(self.data[v * self.n_detections + k])
    }

    /// Bins of every detection under velocity `v`.
    pub fn plane(&self, v: usize) -> Result<&[(i64, i64)], HoughTrackError> {
        check_index("velocity axis", v, self.n_velocities)?;
        Ok(&self.data[v * self.n_detections..(v + 1) * self.n_detections])
    }
}

/// Comoving position of every detection under every candidate velocity.
///
/// Element `(v, k)` equals [`project`](super::project) applied to detection `k` and velocity `v`.
pub fn transform_all(
    detections: &[Detection],
    velocities: &CandidateVelocities,
    reference_time: MJD,
) -> ProjectedPositions {
    let data = velocities
        .as_slice()
        .par_iter()
        .flat_map_iter(|v| {
            detections
                .iter()
                .map(move |d| project_detection(d, v, reference_time))
        })
        .collect();

    ProjectedPositions {
        reference_time,
        n_velocities: velocities.len(),
        n_detections: detections.len(),
        data,
    }
}

/// Grid bin of every precomputed position.
///
/// Element `(v, k)` equals [`digitize`](super::digitize) applied to position `(v, k)`.
/// The caller is responsible for having projected `positions` at `geometry.reference_time`.
pub fn digitize_all(positions: &ProjectedPositions, geometry: &GridGeometry) -> DigitizedBins {
    let data = positions
        .data
        .par_iter()
        .map(|p| geometry.digitize(p))
        .collect();

    DigitizedBins {
        geometry: *geometry,
        n_velocities: positions.n_velocities,
        n_detections: positions.n_detections,
        data,
    }
}

#[cfg(test)]
mod test_batch {
    use super::*;
    use crate::hough::{digitize, project};

    fn setup() -> (Vec<Detection>, CandidateVelocities, GridGeometry) {
        let detections = vec![
            Detection::new(10.0, 1.0, 60000.0, 1),
            Detection::new(10.3, 1.1, 60001.5, 2),
            Detection::new(9.6, 0.8, 60003.0, 3),
        ];
        let velocities = CandidateVelocities::from_speed_angle_grid(0.0, 0.4, 3, 5).unwrap();
        let geometry = GridGeometry::new(9.0, 0.0, 0.05, 0.05, 60001.0).unwrap();
        (detections, velocities, geometry)
    }

    #[test]
    fn test_elementwise_equivalence() {
        let (detections, velocities, geometry) = setup();
        let positions = transform_all(&detections, &velocities, geometry.reference_time);
        let bins = digitize_all(&positions, &geometry);

        assert_eq!(positions.n_velocities(), velocities.len());
        assert_eq!(positions.n_detections(), 3);

        for (v, b) in velocities.iter().enumerate() {
            for (k, d) in detections.iter().enumerate() {
                let expected = project(
                    &Vector2::new(d.ra, d.dec),
                    d.time,
                    b,
                    geometry.reference_time,
                );
                assert_eq!(positions.get(v, k).unwrap(), expected);
                assert_eq!(
                    bins.get(v, k).unwrap(),
                    digitize(
                        &expected,
                        geometry.min_x,
                        geometry.min_y,
                        geometry.dx,
                        geometry.dy
                    )
                );
            }
            assert_eq!(bins.plane(v).unwrap().len(), 3);
            assert_eq!(positions.plane(v).unwrap().len(), 3);
        }
    }

    #[test]
    fn test_out_of_range_index_is_an_error() {
        let (detections, velocities, geometry) = setup();
        let bins = digitize_all(
            &transform_all(&detections, &velocities, geometry.reference_time),
            &geometry,
        );
        assert_eq!(
            bins.get(velocities.len(), 0),
            Err(HoughTrackError::IndexOutOfRange {
                what: "velocity axis",
                index: velocities.len(),
                len: velocities.len()
            })
        );
        assert!(bins.get(0, 3).is_err());
        assert_eq!(
            bins.plane(velocities.len()),
            Err(HoughTrackError::IndexOutOfRange {
                what: "velocity axis",
                index: velocities.len(),
                len: velocities.len()
            })
        );
        let positions = transform_all(&detections, &velocities, geometry.reference_time);
        assert!(positions.plane(velocities.len()).is_err());
    }

    #[test]
    fn test_deserialize_checks_shape() {
        let (detections, velocities, geometry) = setup();
        let positions = transform_all(&detections, &velocities, geometry.reference_time);
        let bins = digitize_all(&positions, &geometry);

        let json = serde_json::to_string(&bins).unwrap();
        let back: DigitizedBins = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bins);

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["n_detections"] = serde_json::json!(4);
        let err = serde_json::from_value::<DigitizedBins>(value).unwrap_err();
        assert!(err.to_string().contains("digitized bins"));

        let mut value = serde_json::to_value(&positions).unwrap();
        value["data"] = serde_json::json!([]);
        let err = serde_json::from_value::<ProjectedPositions>(value).unwrap_err();
        assert!(err.to_string().contains("projected positions"));

        let mut value = serde_json::to_value(&positions).unwrap();
        value["n_velocities"] = serde_json::json!(usize::MAX);
        assert!(serde_json::from_value::<ProjectedPositions>(value).is_err());
    }

    #[test]
    fn test_no_detections() {
        let (_, velocities, geometry) = setup();
        let positions = transform_all(&[], &velocities, geometry.reference_time);
        let bins = digitize_all(&positions, &geometry);
        assert_eq!(bins.n_detections(), 0);
        assert!(bins.plane(0).unwrap().is_empty());
    }
}
