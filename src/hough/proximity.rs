use nalgebra::Vector2;

use crate::catalog::Detection;
use crate::clusters::ClusterLine;
use crate::constants::{Degree, MJD};

use super::project_detection;

/// Flag the detections lying within `tolerance` of a linear track.
///
/// Each detection is projected to `reference_time` with `velocity = direction`
/// and compared to `anchor`, the position of the track at that epoch.
///
/// Arguments
/// -----------------
/// * `detections`: candidate members
/// * `anchor`: track position at `reference_time` (degrees)
/// * `direction`: track angular velocity (degrees per day)
/// * `tolerance`: maximum accepted Euclidean distance in the comoving frame (degrees)
/// * `reference_time`: epoch of `anchor` (MJD)
///
/// Return
/// ----------
/// * One flag per detection, `true` when its distance is ≤ `tolerance`.
///   Detections with non-finite coordinates are never flagged.
pub fn close_to_line(
    detections: &[Detection],
    anchor: &Vector2<f64>,
    direction: &Vector2<f64>,
    tolerance: Degree,
    reference_time: MJD,
) -> Vec<bool> {
    detections
        .iter()
        .map(|d| (anchor - project_detection(d, direction, reference_time)).norm() <= tolerance)
        .collect()
}

/// Detections within `tolerance` of a cluster's track, in their original order.
pub fn refine_members(
    detections: &[Detection],
    line: &ClusterLine,
    tolerance: Degree,
) -> Vec<Detection> {
    let (anchor, direction, reference_time) = line.track();
    close_to_line(detections, &anchor, &direction, tolerance, reference_time)
        .into_iter()
        .zip(detections)
        .filter_map(|(keep, d)| keep.then_some(*d))
        .collect()
}

#[cfg(test)]
mod test_proximity {
    use super::*;

    fn track_detections() -> Vec<Detection> {
        vec![
            // On the track x = 10 + 0.1 (t - 60000), y = 20
            Detection::new(10.0, 20.0, 60000.0, 1),
            Detection::new(10.2, 20.0, 60002.0, 2),
            // 0.01° off the track
            Detection::new(10.1, 20.01, 60001.0, 3),
            // Far away
            Detection::new(11.0, 20.0, 60001.0, 4),
            Detection::new(f64::NAN, 20.0, 60001.0, 5),
        ]
    }

    #[test]
    fn test_close_to_line_mask() {
        let mask = close_to_line(
            &track_detections(),
            &Vector2::new(10.0, 20.0),
            &Vector2::new(0.1, 0.0),
            0.005,
            60000.0,
        );
        assert_eq!(mask, vec![true, true, false, false, false]);

        let wider = close_to_line(
            &track_detections(),
            &Vector2::new(10.0, 20.0),
            &Vector2::new(0.1, 0.0),
            0.02,
            60000.0,
        );
        assert_eq!(wider, vec![true, true, true, false, false]);
    }

    #[test]
    fn test_refine_members() {
        let line = ClusterLine::Anchored {
            anchor: Vector2::new(10.1, 20.0),
            direction: Vector2::new(0.1, 0.0),
            reference_time: 60001.0,
        };
        let members = refine_members(&track_detections(), &line, 0.02);
        let exposures: Vec<i64> = members.iter().map(|d| d.exposure).collect();
        assert_eq!(exposures, vec![1, 2, 3]);
    }
}
