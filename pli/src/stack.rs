use std::f64::consts::PI;
use std::sync::Arc;

use itertools::Itertools;
use marker_tracker::geometry::{diff_orientation, wrap};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3};

use crate::error::PliError;

/// One target angle of the half turn and the frame recorded for it.
#[derive(Clone, Debug)]
pub struct RotationSlot {
    target: f64,
    image: Option<Array2<f32>>,
}

impl RotationSlot {
    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn filled(&self) -> bool {
        self.image.is_some()
    }

    pub fn image(&self) -> Option<&Array2<f32>> {
        self.image.as_ref()
    }
}

/// Angle-indexed accumulator for one measurement cycle.
#[derive(Clone, Debug)]
pub struct ImageStack {
    slots: Vec<RotationSlot>,
    offset: f64,
    insert_threshold: f64,
    shape: Option<(usize, usize)>,
}

impl ImageStack {
    /// `n` slots at `k * π / n`; frames farther than `insert_threshold`
    /// radians from every slot are dropped.
    pub fn new(n: usize, insert_threshold: f64) -> Result<ImageStack, PliError> {
        if n == 0 {
            return Err(PliError::EmptyStack);
        }
        Ok(ImageStack {
            slots: (0..n)
                .map(|k| RotationSlot {
                    target: k as f64 * PI / n as f64,
                    image: None,
                })
                .collect(),
            offset: 0.0,
            insert_threshold,
            shape: None,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[RotationSlot] {
        &self.slots
    }

    pub fn insert_threshold(&self) -> f64 {
        self.insert_threshold
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Shape of the stored frames, known after the first insertion.
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.shape
    }

    /// Store `frame` in the slot nearest to `angle`. Returns `false` when the
    /// angle is too far from every slot or the slot is already filled.
    pub fn insert<T>(&mut self, frame: &ArrayView2<T>, angle: f64) -> Result<bool, PliError>
    where
        T: Copy + Into<f32>,
    {
        if let Some(shape) = self.shape {
            if frame.dim() != shape {
                return Err(PliError::ShapeMismatch {
                    expected: vec![shape.0, shape.1],
                    actual: frame.shape().to_vec(),
                });
            }
        }

        let offset = self.offset;
        let nearest = self
            .slots
            .iter_mut()
            .map(|slot| {
                let dist = diff_orientation(slot.target + offset, angle).abs();
                (slot, dist)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((slot, dist)) if dist <= self.insert_threshold && slot.image.is_none() => {
                slot.image = Some(frame.mapv(|v| v.into()));
                self.shape = Some(frame.dim());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(|s| s.filled())
    }

    pub fn filled_count(&self) -> usize {
        self.slots.iter().filter(|s| s.filled()).count()
    }

    /// Set the uniform rotation offset. Stored images are untouched.
    pub fn apply_offset(&mut self, offset: f64) {
        self.offset = offset;
    }

    /// Angle of every slot with the offset applied, in `[0, π)`.
    pub fn rotations(&self) -> Vec<f64> {
        self.slots
            .iter()
            .map(|s| wrap(s.target + self.offset, PI))
            .collect()
    }

    pub fn valid(&self) -> Vec<bool> {
        self.slots.iter().map(|s| s.filled()).collect()
    }

    pub fn image(&self, slot: usize) -> Option<&Array2<f32>> {
        self.slots.get(slot).and_then(|s| s.image())
    }

    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|s| s.image = None);
        self.offset = 0.0;
        self.shape = None;
    }

    /// Snapshot of the filled slots.
    pub fn freeze(&self) -> Result<FrozenStack, PliError> {
        let filled = self.slots.iter().filter(|s| s.filled()).collect_vec();
        let (h, w) = match self.shape {
            Some(shape) if !filled.is_empty() => shape,
            _ => return Err(PliError::EmptyStack),
        };

        let mut images = Array3::<f32>::zeros((filled.len(), h, w));
        for (mut dst, slot) in images.outer_iter_mut().zip(&filled) {
            if let Some(image) = slot.image() {
                dst.assign(image);
            }
        }
        Ok(FrozenStack {
            targets: filled.iter().map(|s| s.target).collect(),
            offset: self.offset,
            images: Arc::new(images),
        })
    }
}

/// Immutable snapshot of a stack, cheap to clone and to send to a worker.
#[derive(Clone, Debug)]
pub struct FrozenStack {
    targets: Vec<f64>,
    offset: f64,
    images: Arc<Array3<f32>>,
}

impl FrozenStack {
    /// Same images under another offset.
    pub fn with_offset(&self, offset: f64) -> FrozenStack {
        FrozenStack {
            targets: self.targets.clone(),
            offset,
            images: Arc::clone(&self.images),
        }
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn rotations(&self) -> Vec<f64> {
        self.targets
            .iter()
            .map(|t| wrap(t + self.offset, PI))
            .collect()
    }

    /// `(n, rows, cols)` cube, one image per rotation.
    pub fn images(&self) -> ArrayView3<f32> {
        self.images.view()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn dim(&self) -> (usize, usize) {
        let (_, h, w) = self.images.dim();
        (h, w)
    }
}
