#![allow(dead_code)]

use houghtrack::catalog::{Catalog, ExposureCatalog, MaskedPixelSummary};
use houghtrack::recovery::FakeDetection;
use houghtrack::sky::angular_separation;
use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const T0: f64 = 60000.0;
pub const CADENCE: f64 = 0.1;
pub const FIRST_EXPOSURE: i64 = 100;

/// Background sources closer than this to a mover (same epoch) are not generated.
pub const CLEAR_RADIUS: f64 = 0.05;

pub struct SyntheticSky {
    pub catalog: Catalog,
    pub fakes: Vec<FakeDetection>,
    /// True velocity of each orbit, indexed by orbit id.
    pub velocities: Vec<Vector2<f64>>,
}

pub fn epoch(k: usize) -> f64 {
    T0 + CADENCE * k as f64
}

/// Exactly positioned movers plus uniform background sources.
///
/// Orbit `o` starts at `ra` in `[10, 10.5]`, `dec = -0.5 + 0.5 o` at `T0`, with a
/// speed in `[0.05, 0.2]` deg/day. `extra_velocities` are used first, in order,
/// before random ones are drawn. Movers slower than 0.5 deg/day never come
/// within 0.1 deg of each other over eight exposures.
pub fn synthetic_sky(
    seed: u64,
    n_exposures: usize,
    n_movers: usize,
    n_background: usize,
    extra_velocities: &[Vector2<f64>],
) -> SyntheticSky {
    let mut rng = StdRng::seed_from_u64(seed);

    let starts: Vec<Vector2<f64>> = (0..n_movers)
        .map(|o| Vector2::new(rng.random_range(10.0..10.5), -0.5 + 0.5 * o as f64))
        .collect();
    let velocities: Vec<Vector2<f64>> = (0..n_movers)
        .map(|o| {
            extra_velocities.get(o).copied().unwrap_or_else(|| {
                let speed = rng.random_range(0.05..0.2);
                let angle = rng.random_range(0.0..std::f64::consts::TAU);
                Vector2::new(speed * angle.cos(), speed * angle.sin())
            })
        })
        .collect();

    let dec_max = -0.3 + 0.5 * n_movers as f64;

    let mut fakes = Vec::new();
    let mut exposures = Vec::new();
    for k in 0..n_exposures {
        let t = epoch(k);
        let exposure = FIRST_EXPOSURE + k as i64;

        let movers: Vec<Vector2<f64>> = starts
            .iter()
            .zip(&velocities)
            .map(|(p, v)| p + v * (t - T0))
            .collect();
        for (o, p) in movers.iter().enumerate() {
            fakes.push(FakeDetection {
                orbit: o as u64,
                ra: p.x,
                dec: p.y,
                time: t,
                exposure,
            });
        }

        let mut sources: Vec<(f64, f64, Option<f64>)> =
            movers.iter().map(|p| (p.x, p.y, Some(500.0))).collect();
        while sources.len() < movers.len() + n_background {
            let (ra, dec) = (rng.random_range(9.8..10.8), rng.random_range(-0.7..dec_max));
            if movers
                .iter()
                .all(|p| angular_separation(ra, dec, p.x, p.y) > CLEAR_RADIUS)
            {
                sources.push((ra, dec, Some(rng.random_range(50.0..200.0))));
            }
        }

        exposures.push(ExposureCatalog::new(
            exposure,
            0,
            t,
            sources,
            MaskedPixelSummary::default(),
        ));
    }

    SyntheticSky {
        catalog: Catalog::from_exposures(exposures).unwrap(),
        fakes,
        velocities,
    }
}

/// Index and value of the largest entry of a grid plane, as `(i, j)`.
pub fn plane_argmax(plane: &[f64], ny: usize) -> (f64, (usize, usize)) {
    let (idx, value) = plane
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (idx, v)| {
            if v > best.1 {
                (idx, v)
            } else {
                best
            }
        });
    (value, (idx / ny, idx % ny))
}
