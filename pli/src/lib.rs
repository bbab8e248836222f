#![allow(missing_docs)]

pub mod analysis;
pub mod driver;
pub mod epa;
pub mod error;
pub mod export;
pub mod fom;
pub mod inclination;
pub mod overlay;
pub mod source;
pub mod stack;
pub mod tilt;

pub use analysis::{Analysis, AnalysisParameter, Modality};
pub use driver::{MeasurementDriver, PliParameter, State, Tick};
pub use epa::Modalities;
pub use error::PliError;
pub use source::{ColorMode, Frame, FrameSource};
pub use stack::{FrozenStack, ImageStack};
pub use tilt::{RetardationModel, Tilt};
