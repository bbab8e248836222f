use marker_tracker::TrackerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PliError {
    #[error("shape {actual:?} does not match expected {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("no filled rotation in the stack")]
    EmptyStack,
    #[error("no completed analysis")]
    NotReady,
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Npy(#[from] ndarray_npy::WriteNpyError),
}
