//! # Detection catalogs
//!
//! In-memory representation of the point sources produced by the external
//! per-exposure extraction stage, and of the multi-epoch catalog assembled from
//! them.
//!
//! Data Model
//! -----------------
//! * [`Detection`] – one point source: position (degrees), epoch (MJD), exposure id,
//!   optional flux. Immutable once produced.
//! * [`ExposureCatalog`] – the detections of a single exposure, plus its mid-time,
//!   detector and a [`MaskedPixelSummary`].
//! * [`Catalog`] – the ordered concatenation of exposure catalogs. Append-only
//!   (one append per processed exposure) until [`Catalog::freeze`] is called,
//!   read-only afterwards.
//!
//! Exposure lookup by time goes through [`exposure_index::ExposureTimeIndex`],
//! which keeps mid-times sorted and answers nearest-within-tolerance queries.
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use ahash::RandomState;
use hifitime::{Duration, Epoch};
use serde::{Deserialize, Serialize};

use crate::constants::{Degree, DetectorId, ExposureId, MJD};
use crate::houghtrack_errors::HoughTrackError;

pub mod exposure_index;

use exposure_index::ExposureTimeIndex;

/// A single point-source detection.
///
/// # Fields
///
/// * `ra` - Right ascension in degrees
/// * `dec` - Declination in degrees
/// * `time` - Epoch of the exposure mid-point (MJD)
/// * `exposure` - Identifier of the exposure the source was extracted from
/// * `flux` - Optional flux, usable as a voting weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub ra: Degree,
    pub dec: Degree,
    pub time: MJD,
    pub exposure: ExposureId,
    pub flux: Option<f64>,
}

impl Detection {
    pub fn new(ra: Degree, dec: Degree, time: MJD, exposure: ExposureId) -> Self {
        Detection {
            ra,
            dec,
            time,
            exposure,
            flux: None,
        }
    }

    pub fn with_flux(mut self, flux: f64) -> Self {
        self.flux = Some(flux);
        self
    }
}

/// Pixel mask statistics of one exposure.
///
/// `per_plane` counts the pixels flagged by each excluded mask plane (e.g. `"SAT"`,
/// `"EDGE"`); `masked` counts pixels flagged by at least one of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskedPixelSummary {
    pub total: u64,
    pub masked: u64,
    pub per_plane: BTreeMap<String, u64>,
}

impl MaskedPixelSummary {
    /// Fraction of the exposure that is masked, 0 for an empty exposure.
    pub fn masked_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.masked as f64 / self.total as f64
        }
    }
}

/// Detections of a single exposure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureCatalog {
    pub exposure: ExposureId,
    pub detector: DetectorId,
    pub mid_time: MJD,
    pub masked: MaskedPixelSummary,
    detections: Vec<Detection>,
}

impl ExposureCatalog {
    /// Build an exposure catalog from the sky positions found in that exposure.
    ///
    /// Every detection is stamped with the exposure id and mid-time.
    ///
    /// Arguments
    /// -----------------
    /// * `exposure`, `detector`: identifiers of the exposure
    /// * `mid_time`: mid-exposure epoch (MJD), see [`ExposureCatalog::mid_time_from_start`]
    /// * `sources`: `(ra, dec, flux)` triplets in degrees
    /// * `masked`: mask statistics of the exposure
    pub fn new(
        exposure: ExposureId,
        detector: DetectorId,
        mid_time: MJD,
        sources: impl IntoIterator<Item = (Degree, Degree, Option<f64>)>,
        masked: MaskedPixelSummary,
    ) -> Self {
        let detections = sources
            .into_iter()
            .map(|(ra, dec, flux)| Detection {
                ra,
                dec,
                time: mid_time,
                exposure,
                flux,
            })
            .collect();

        ExposureCatalog {
            exposure,
            detector,
            mid_time,
            masked,
            detections,
        }
    }

    /// Mid-exposure epoch (MJD, UTC) from the shutter-open epoch and exposure time.
    ///
    /// Half a second of readout is added on top of half the exposure time.
    pub fn mid_time_from_start(start: Epoch, exposure_time: Duration) -> MJD {
        let half = exposure_time * 0.5 + Duration::from_seconds(0.5);
        (start + half).to_mjd_utc_days()
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Metadata kept by the [`Catalog`] for every appended exposure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureSummary {
    pub exposure: ExposureId,
    pub detector: DetectorId,
    pub mid_time: MJD,
    pub masked: MaskedPixelSummary,
    range: Range<usize>,
}

impl ExposureSummary {
    /// Number of detections contributed by this exposure.
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Multi-epoch detection catalog.
///
/// Detections are stored contiguously, exposure after exposure, in append order.
/// Only detections, exposure summaries and the frozen flag are serialized; the
/// lookup indices are rebuilt, and every exposure range checked, on deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "RawCatalog")]
pub struct Catalog {
    detections: Vec<Detection>,
    exposures: Vec<ExposureSummary>,
    #[serde(skip_serializing)]
    index: ExposureTimeIndex,
    #[serde(skip_serializing)]
    by_id: HashMap<ExposureId, usize, RandomState>,
    frozen: bool,
}

#[derive(Deserialize)]
struct RawCatalog {
    detections: Vec<Detection>,
    exposures: Vec<ExposureSummary>,
    frozen: bool,
}

impl TryFrom<RawCatalog> for Catalog {
    type Error = HoughTrackError;

    fn try_from(raw: RawCatalog) -> Result<Self, Self::Error> {
        let mut catalog = Catalog {
            detections: raw.detections,
            ..Catalog::default()
        };
        for summary in raw.exposures {
            let (start, end) = (summary.range.start, summary.range.end);
            if start > end || end > catalog.detections.len() {
                return Err(HoughTrackError::ShapeMismatch {
                    what: "exposure detection range",
                    expected: catalog.detections.len(),
                    found: end.max(start),
                });
            }
            catalog.register(summary)?;
        }
        catalog.frozen = raw.frozen;
        Ok(catalog)
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble and freeze a catalog from a sequence of exposure catalogs.
    pub fn from_exposures(
        exposures: impl IntoIterator<Item = ExposureCatalog>,
    ) -> Result<Self, HoughTrackError> {
        let mut catalog = Catalog::new();
        for exposure in exposures {
            catalog.append(exposure)?;
        }
        catalog.freeze();
        Ok(catalog)
    }

    /// Append the detections of one exposure.
    ///
    /// Errors
    /// ----------
    /// * [`HoughTrackError::CatalogFrozen`] once [`Catalog::freeze`] has been called.
    /// * [`HoughTrackError::DuplicateExposure`] if the exposure id is already present.
    pub fn append(&mut self, exposure: ExposureCatalog) -> Result<(), HoughTrackError> {
        if self.frozen {
            return Err(HoughTrackError::CatalogFrozen);
        }
        if self.by_id.contains_key(&exposure.exposure) {
            return Err(HoughTrackError::DuplicateExposure(exposure.exposure));
        }

        let start = self.detections.len();
        self.detections.extend_from_slice(&exposure.detections);
        self.register(ExposureSummary {
            exposure: exposure.exposure,
            detector: exposure.detector,
            mid_time: exposure.mid_time,
            masked: exposure.masked,
            range: start..self.detections.len(),
        })
    }

    /// Index an exposure whose detections are already stored.
    fn register(&mut self, summary: ExposureSummary) -> Result<(), HoughTrackError> {
        if self.by_id.contains_key(&summary.exposure) {
            return Err(HoughTrackError::DuplicateExposure(summary.exposure));
        }
        self.by_id.insert(summary.exposure, self.exposures.len());
        self.index.insert(summary.mid_time, summary.exposure);
        self.exposures.push(summary);
        Ok(())
    }

    /// Mark the catalog read-only.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn exposures(&self) -> &[ExposureSummary] {
        &self.exposures
    }

    pub fn exposure(&self, id: ExposureId) -> Option<&ExposureSummary> {
        self.by_id.get(&id).and_then(|&k| self.exposures.get(k))
    }

    /// Detections of a single exposure, in their original order.
    pub fn exposure_detections(&self, id: ExposureId) -> Option<&[Detection]> {
        self.exposure(id)
            .map(|summary| &self.detections[summary.range.clone()])
    }

    /// Exposure whose mid-time is nearest to `time`, within `tolerance` days.
    pub fn exposure_at(&self, time: MJD, tolerance: f64) -> Option<ExposureId> {
        self.index.lookup(time, tolerance)
    }

    /// Earliest and latest exposure mid-times, `None` for an empty catalog.
    pub fn time_span(&self) -> Option<(MJD, MJD)> {
        self.exposures
            .iter()
            .map(|e| e.mid_time)
            .fold(None, |acc, t| match acc {
                None => Some((t, t)),
                Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
            })
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

#[cfg(test)]
mod test_catalog {
    use super::*;
    use crate::constants::EXPOSURE_TIME_TOLERANCE;
    use approx::assert_relative_eq;

    fn exposure(id: ExposureId, time: MJD, n: usize) -> ExposureCatalog {
        ExposureCatalog::new(
            id,
            7,
            time,
            (0..n).map(|i| (10.0 + i as f64, -5.0, None)),
            MaskedPixelSummary {
                total: 100,
                masked: 25,
                per_plane: BTreeMap::from([("SAT".to_string(), 25)]),
            },
        )
    }

    #[test]
    fn test_exposure_catalog_stamps_detections() {
        let cat = exposure(42, 60000.5, 3);
        assert_eq!(cat.len(), 3);
        assert!(cat
            .detections()
            .iter()
            .all(|d| d.exposure == 42 && d.time == 60000.5 && d.flux.is_none()));
        assert_eq!(cat.masked.masked_fraction(), 0.25);
    }

    #[test]
    fn test_mid_time() {
        let start = Epoch::from_mjd_utc(60000.0);
        let mid = ExposureCatalog::mid_time_from_start(start, Duration::from_seconds(30.0));
        assert_relative_eq!(mid, 60000.0 + 15.5 / 86_400.0, epsilon = 1e-9);
    }

    #[test]
    fn test_append_and_lookup() {
        let mut catalog = Catalog::new();
        catalog.append(exposure(2, 60000.2, 2)).unwrap();
        catalog.append(exposure(1, 60000.1, 3)).unwrap();

        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog.exposures().len(), 2);
        assert_eq!(catalog.exposure(1).unwrap().len(), 3);
        assert_eq!(catalog.exposure_detections(2).unwrap().len(), 2);
        assert!(catalog.exposure_detections(3).is_none());

        assert_eq!(catalog.exposure_at(60000.1, EXPOSURE_TIME_TOLERANCE), Some(1));
        assert_eq!(catalog.exposure_at(60000.3, EXPOSURE_TIME_TOLERANCE), None);
        assert_eq!(catalog.time_span(), Some((60000.1, 60000.2)));
    }

    #[test]
    fn test_duplicate_exposure_rejected() {
        let mut catalog = Catalog::new();
        catalog.append(exposure(1, 60000.1, 1)).unwrap();
        assert_eq!(
            catalog.append(exposure(1, 60000.2, 1)),
            Err(HoughTrackError::DuplicateExposure(1))
        );
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_frozen_catalog_rejects_append() {
        let mut catalog = Catalog::from_exposures([exposure(1, 60000.1, 1)]).unwrap();
        assert!(catalog.is_frozen());
        assert_eq!(
            catalog.append(exposure(2, 60000.2, 1)),
            Err(HoughTrackError::CatalogFrozen)
        );
    }

    #[test]
    fn test_lookup_over_many_exposures() {
        let catalog = Catalog::from_exposures(
            (0..200).map(|k| exposure(1000 - k, 60000.0 + 0.01 * k as f64, (k % 3) as usize)),
        )
        .unwrap();
        assert_eq!(catalog.exposures().len(), 200);
        for k in 0..200 {
            let summary = catalog.exposure(1000 - k).unwrap();
            assert_eq!(summary.exposure, 1000 - k);
            assert_eq!(summary.len(), (k % 3) as usize);
        }
        assert!(catalog.exposure(1000 - 200).is_none());
    }

    #[test]
    fn test_deserialize_rebuilds_lookups() {
        let catalog =
            Catalog::from_exposures([exposure(5, 60000.1, 2), exposure(3, 60000.2, 3)]).unwrap();
        let json = serde_json::to_string(&catalog).unwrap();
        let back: Catalog = serde_json::from_str(&json).unwrap();

        assert!(back.is_frozen());
        assert_eq!(back.detections(), catalog.detections());
        assert_eq!(back.exposures(), catalog.exposures());
        assert_eq!(back.exposure_detections(3).unwrap().len(), 3);
        assert_eq!(back.exposure_at(60000.1, EXPOSURE_TIME_TOLERANCE), Some(5));
    }

    #[test]
    fn test_deserialize_rejects_bad_ranges() {
        let catalog =
            Catalog::from_exposures([exposure(5, 60000.1, 2), exposure(3, 60000.2, 3)]).unwrap();
        let json = serde_json::to_value(&catalog).unwrap();

        let mut value = json.clone();
        value["exposures"][1]["range"]["end"] = serde_json::json!(9);
        let err = serde_json::from_value::<Catalog>(value).unwrap_err();
        assert!(err.to_string().contains("exposure detection range"));

        let mut value = json.clone();
        value["exposures"][0]["range"]["start"] = serde_json::json!(4);
        assert!(serde_json::from_value::<Catalog>(value).is_err());

        let mut value = json;
        value["exposures"][1]["exposure"] = serde_json::json!(5);
        let err = serde_json::from_value::<Catalog>(value).unwrap_err();
        assert!(err.to_string().contains("already present"));
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = Catalog::new();
        assert!(catalog.is_empty());
        assert_eq!(catalog.time_span(), None);
    }
}
