use std::env;

use flexi_logger::Logger;
use hifitime::{Epoch, Unit};
use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use houghtrack::catalog::{Catalog, ExposureCatalog, MaskedPixelSummary};
use houghtrack::clusters::{Cluster, ClusterLine, HoughCell, LinearFit};
use houghtrack::constants::{ClusterSet, MJD};
use houghtrack::hough::{close_to_line, HoughTransform};
use houghtrack::houghtrack_errors::HoughTrackError;
use houghtrack::recovery::stats::RecoveryStats;
use houghtrack::recovery::{group_fakes, recover, FakeDetection, RecoveryParams};
use houghtrack::velocities::CandidateVelocities;

const N_EXPOSURES: usize = 12;
const N_MOVERS: usize = 8;
const N_BACKGROUND: usize = 50;
const BIN: f64 = 0.005;

/// Twelve 30 s exposures, one hour apart, of a half-degree field holding
/// `N_MOVERS` linear movers and uniform background sources.
fn synthetic_catalog(rng: &mut StdRng) -> Result<(Catalog, Vec<FakeDetection>), HoughTrackError> {
    let movers: Vec<(Vector2<f64>, Vector2<f64>)> = (0..N_MOVERS)
        .map(|_| {
            let start = Vector2::new(rng.random_range(150.0..150.5), rng.random_range(2.0..2.5));
            let (speed, angle) = (
                rng.random_range(0.02..0.25),
                rng.random_range(0.0..std::f64::consts::TAU),
            );
            (start, Vector2::new(speed * angle.cos(), speed * angle.sin()))
        })
        .collect();

    let first_open = Epoch::from_mjd_utc(60000.0);
    let t0 = ExposureCatalog::mid_time_from_start(first_open, 30.0 * Unit::Second);

    let mut fakes = Vec::new();
    let mut catalog = Catalog::new();
    for k in 0..N_EXPOSURES {
        let open = first_open + k as f64 * Unit::Hour;
        let mid_time: MJD = ExposureCatalog::mid_time_from_start(open, 30.0 * Unit::Second);
        let exposure = 1000 + k as i64;

        let mut sources = Vec::with_capacity(N_MOVERS + N_BACKGROUND);
        for (orbit, (start, v)) in movers.iter().enumerate() {
            let p = start + v * (mid_time - t0);
            fakes.push(FakeDetection {
                orbit: orbit as u64,
                ra: p.x,
                dec: p.y,
                time: mid_time,
                exposure,
            });
            sources.push((p.x, p.y, Some(rng.random_range(200.0..800.0))));
        }
        for _ in 0..N_BACKGROUND {
            sources.push((
                rng.random_range(149.9..150.6),
                rng.random_range(1.9..2.6),
                Some(rng.random_range(50.0..300.0)),
            ));
        }

        catalog.append(ExposureCatalog::new(
            exposure,
            1,
            mid_time,
            sources,
            MaskedPixelSummary::default(),
        ))?;
    }
    catalog.freeze();
    Ok((catalog, fakes))
}

/// Greedy peak extraction: strongest cells first, each detection used by one cluster at most.
fn extract_clusters(hough: &HoughTransform, catalog: &Catalog, min_votes: f64) -> ClusterSet {
    let grid = hough.grid();
    let mut peaks: Vec<(f64, HoughCell)> = Vec::new();
    for v in 0..grid.n_velocities() {
        for x in 0..grid.nx() {
            for y in 0..grid.ny() {
                match grid.get(v, x, y) {
                    Some(votes) if votes >= min_votes => {
                        peaks.push((votes, HoughCell { velocity: v, x, y }))
                    }
                    _ => {}
                }
            }
        }
    }
    peaks.sort_by(|a, b| b.0.total_cmp(&a.0));

    let detections = catalog.detections();
    let mut claimed = vec![false; detections.len()];
    let mut clusters = ClusterSet::default();
    for (_, cell) in peaks {
        let Ok(line) = hough.cell_line(cell) else {
            continue;
        };
        let (anchor, direction, reference_time) = line.track();
        let mask = close_to_line(detections, &anchor, &direction, 2.0 * BIN, reference_time);

        let picked: Vec<usize> = (0..detections.len())
            .filter(|&k| mask[k] && !claimed[k])
            .collect();
        if (picked.len() as f64) < min_votes {
            continue;
        }
        let members: Vec<_> = picked.iter().map(|&k| detections[k]).collect();
        let Ok(fit) = LinearFit::from_detections(&members, reference_time) else {
            continue;
        };
        for k in picked {
            claimed[k] = true;
        }
        let id = clusters.len() as u64;
        clusters.insert(
            id,
            Cluster::new(members, ClusterLine::Regression(fit)).with_cell(cell),
        );
    }
    clusters
}

/// Synthetic end-to-end run: catalog → votes → clusters → recovery.
/// Usage:
///   synthetic_recovery [SEED] [--verbose]
fn main() -> Result<(), HoughTrackError> {
    let mut args = env::args().skip(1).collect::<Vec<_>>();
    let verbose = if let Some(pos) = args.iter().position(|a| a == "--verbose") {
        args.remove(pos);
        true
    } else {
        false
    };
    let seed = args.first().and_then(|s| s.parse().ok()).unwrap_or(42);

    let level = if verbose { "info" } else { "warn" };
    let _logger = Logger::try_with_str(level)
        .and_then(|l| l.start())
        .unwrap_or_else(|e| panic!("Logger initialization failed with {e}"));

    let mut rng = StdRng::seed_from_u64(seed);
    let (catalog, fakes) = synthetic_catalog(&mut rng)?;
    let (t_first, t_last) = catalog.time_span().unwrap_or((0.0, 0.0));

    let velocities = CandidateVelocities::from_speed_angle_grid(0.0, 0.25, 11, 36)?;
    let mut hough = HoughTransform::covering(
        catalog.detections(),
        velocities,
        BIN,
        BIN,
        0.5 * (t_first + t_last),
    )?;
    let summary = hough.vote(catalog.detections(), 1.0)?;
    let (n_velocities, nx, ny) = hough.grid().shape();
    println!(
        "[synthetic_recovery] {} detections, grid {n_velocities}x{nx}x{ny}, {} votes cast",
        catalog.len(),
        summary.cast
    );

    let clusters = extract_clusters(&hough, &catalog, (N_EXPOSURES - 2) as f64);
    println!("[synthetic_recovery] {} clusters extracted", clusters.len());

    let params = RecoveryParams::builder()
        .match_threshold_points_arcsec(1.0)
        .match_threshold_line_arcsec(2.0)
        .build()?;
    let report = recover(
        &group_fakes(fakes),
        &clusters,
        &catalog,
        &params,
        Some((hough.velocities(), hough.geometry())),
    );

    if verbose {
        println!("{params:#}");
    }
    if let Some(stats) = RecoveryStats::from_report(&report) {
        println!("{stats:#}");
    }
    Ok(())
}
