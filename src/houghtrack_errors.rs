use thiserror::Error;

use crate::constants::ExposureId;

#[derive(Error, Debug)]
pub enum HoughTrackError {
    #[error("Grid geometry does not match the geometry the vote grid was built with: {0}")]
    GeometryMismatch(String),

    #[error("Shape mismatch for {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Index {index} out of range for {what} of length {len}")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Invalid grid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid candidate velocity set: {0}")]
    InvalidVelocitySet(String),

    #[error("Invalid recovery parameter: {0}")]
    InvalidRecoveryParameter(String),

    #[error("Exposure {0} is already present in the catalog")]
    DuplicateExposure(ExposureId),

    #[error("The catalog is frozen and cannot be appended to")]
    CatalogFrozen,

    #[error("Linear fit needs at least two distinct epochs, got {0}")]
    EmptyFit(usize),
}

impl PartialEq for HoughTrackError {
    fn eq(&self, other: &Self) -> bool {
        use HoughTrackError::*;
        match (self, other) {
            (GeometryMismatch(a), GeometryMismatch(b)) => a == b,
            (
                ShapeMismatch {
                    what: w1,
                    expected: e1,
                    found: f1,
                },
                ShapeMismatch {
                    what: w2,
                    expected: e2,
                    found: f2,
                },
            ) => w1 == w2 && e1 == e2 && f1 == f2,
            (
                IndexOutOfRange {
                    what: w1,
                    index: i1,
                    len: l1,
                },
                IndexOutOfRange {
                    what: w2,
                    index: i2,
                    len: l2,
                },
            ) => w1 == w2 && i1 == i2 && l1 == l2,
            (InvalidGeometry(a), InvalidGeometry(b)) => a == b,
            (InvalidVelocitySet(a), InvalidVelocitySet(b)) => a == b,
            (InvalidRecoveryParameter(a), InvalidRecoveryParameter(b)) => a == b,
            (DuplicateExposure(a), DuplicateExposure(b)) => a == b,
            (EmptyFit(a), EmptyFit(b)) => a == b,

            // Unit variants
            (CatalogFrozen, CatalogFrozen) => true,

            _ => false,
        }
    }
}
