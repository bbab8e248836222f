use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error("tracker not calibrated yet")]
    NotCalibrated,
    #[error("image shape {actual:?} does not match expected {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("marker dictionary holds {available} codes, {requested} requested")]
    DictionaryTooSmall { requested: usize, available: usize },
    #[error("marker payload of {bits}x{bits} cells not supported, 2 to 7 cells per side")]
    InvalidMarkerBits { bits: usize },
}
