mod common;

use houghtrack::clusters::{Cluster, ClusterLine, HoughCell, LinearFit};
use houghtrack::constants::{ClusterSet, EXPOSURE_TIME_TOLERANCE};
use houghtrack::hough::{refine_members, HoughTransform};
use houghtrack::recovery::stats::RecoveryStats;
use houghtrack::recovery::{group_fakes, recover, LineMatch, RecoveryParams};
use houghtrack::velocities::CandidateVelocities;
use nalgebra::Vector2;

use common::{epoch, plane_argmax, synthetic_sky, FIRST_EXPOSURE};

const N_EXPOSURES: usize = 8;

/// Orbits 0 and 1 move at a candidate velocity, orbit 2 is far too fast for the search.
fn movers() -> [Vector2<f64>; 3] {
    [
        Vector2::new(0.1, 0.05),
        Vector2::new(-0.15, 0.0),
        Vector2::new(0.5, 0.0),
    ]
}

#[test]
fn test_recovery_of_searched_velocities() {
    let _ = flexi_logger::Logger::try_with_str("warn").and_then(|l| l.start());

    let truth = movers();
    let sky = synthetic_sky(42, N_EXPOSURES, 3, 25, &truth);
    let velocities = CandidateVelocities::from_vectors(vec![
        Vector2::zeros(),
        truth[0],
        truth[1],
        Vector2::new(0.0, 0.2),
    ])
    .unwrap();

    let mut hough = HoughTransform::covering(
        sky.catalog.detections(),
        velocities.clone(),
        0.01,
        0.01,
        epoch(N_EXPOSURES / 2),
    )
    .unwrap();
    hough.vote(sky.catalog.detections(), 1.0).unwrap();

    // Stand-in for peak extraction: the best cell of each searched mover's plane.
    let mut clusters = ClusterSet::default();
    for (id, v_index) in [(0u64, 1usize), (1, 2)] {
        let plane = hough.grid().slice(v_index).unwrap();
        let (votes, (x, y)) = plane_argmax(plane, hough.grid().ny());
        assert_eq!(votes, N_EXPOSURES as f64);

        let cell = HoughCell {
            velocity: v_index,
            x,
            y,
        };
        let line = hough.cell_line(cell).unwrap();
        let members = refine_members(sky.catalog.detections(), &line, 0.02);
        let fit = LinearFit::from_detections(&members, epoch(0)).unwrap();
        clusters.insert(
            id,
            Cluster::new(members, ClusterLine::Regression(fit)).with_cell(cell),
        );
    }

    let report = recover(
        &group_fakes(sky.fakes.clone()),
        &clusters,
        &sky.catalog,
        &RecoveryParams::default(),
        Some((&velocities, hough.geometry())),
    );
    assert_eq!(report.len(), 3);

    for orbit in [0, 1] {
        let record = &report[&orbit];
        assert!(record.catalog.is_complete());
        assert!(record.kinematics.findable);
        assert_eq!(record.kinematics.closest.unwrap().index, orbit as usize + 1);

        let (cluster, points) = record.best_point_match().unwrap();
        assert_eq!(cluster, orbit);
        assert_eq!(points.matched, N_EXPOSURES);
        assert_eq!(points.cluster_size, N_EXPOSURES);
        assert_eq!(
            record.line[&orbit],
            LineMatch {
                matched: N_EXPOSURES,
                total: N_EXPOSURES
            }
        );
        assert_eq!(record.line.len(), 1);
    }

    let fast = &report[&2];
    assert!(fast.catalog.is_complete());
    assert!(!fast.kinematics.findable);
    assert!(fast.points.is_empty());
    assert!(fast.line.is_empty());

    let stats = RecoveryStats::from_report(&report).unwrap();
    assert_eq!(stats.orbits, 3);
    assert_eq!(stats.catalog_complete, 3);
    assert_eq!(stats.findable, 2);
    assert_eq!(stats.point_matched, 2);
    assert_eq!(stats.line_matched, 2);
    assert_eq!(stats.ambiguous, 0);
}

#[test]
fn test_clusters_from_sky_points() {
    let truth = movers();
    let sky = synthetic_sky(3, N_EXPOSURES, 1, 10, &truth[..1]);

    // Positions only, as handed over by an external extraction step; the last
    // point falls between exposures and cannot be attributed.
    let mut points: Vec<(f64, f64, f64)> =
        sky.fakes.iter().map(|f| (f.ra, f.dec, f.time)).collect();
    points.push((0.0, 0.0, epoch(0) + 0.5 * common::CADENCE));

    let line = ClusterLine::Anchored {
        anchor: Vector2::new(sky.fakes[0].ra, sky.fakes[0].dec),
        direction: truth[0],
        reference_time: epoch(0),
    };
    let cluster =
        Cluster::from_sky_points(&points, line, &sky.catalog, EXPOSURE_TIME_TOLERANCE);
    assert_eq!(cluster.len(), N_EXPOSURES);
    assert_eq!(cluster.members[0].exposure, FIRST_EXPOSURE);

    let mut clusters = ClusterSet::default();
    clusters.insert(9, cluster);
    let report = recover(
        &group_fakes(sky.fakes.clone()),
        &clusters,
        &sky.catalog,
        &RecoveryParams::default(),
        None,
    );

    let record = &report[&0];
    assert_eq!(record.points[&9].matched, N_EXPOSURES);
    assert_eq!(record.line[&9].matched, N_EXPOSURES);
    assert!((record.best_line_completeness() - 1.0).abs() < 1e-12);
}
