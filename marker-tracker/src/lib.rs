#![allow(missing_docs)]

pub mod encoding;
pub mod error;
pub mod filters;
pub mod geometry;
pub mod marker_detector;
pub mod quad;
pub mod rotation_tracker;
pub mod utils;
pub const IS_DEBUG: bool = false;

pub use error::TrackerError;
pub use marker_detector::{MarkerDetection, MarkerDetectionParameter, MarkerDetector, SquareMarkerDetector};
pub use rotation_tracker::{CalibrationReference, Tracker, TrackerParameter};
