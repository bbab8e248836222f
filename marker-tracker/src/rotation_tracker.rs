use std::f64::consts::PI;

use itertools::Itertools;
use ndarray::{Array, ArrayBase, ArrayView, ArrayView2, Axis, Data, Dimension, RemoveAxis, Slice};
use slog::{info, warn, Logger};

use crate::error::TrackerError;
use crate::geometry::{centroid, circmean, signed_angle};
use crate::marker_detector::{
    MarkerDetection, MarkerDetectionParameter, MarkerDetector, SquareMarkerDetector,
};
use crate::utils::set_log_config;

/// TrackerParameter
#[derive(Clone, Debug)]
pub struct TrackerParameter {
    /// markers expected on the ring, ids `0..num_markers`
    pub num_markers: usize,
    pub zero_marker_id: usize,
    /// aperture radius over the mean corner distance
    pub aperture_scale: f64,
}

impl Default for TrackerParameter {
    fn default() -> Self {
        Self {
            num_markers: 10,
            zero_marker_id: 0,
            aperture_scale: 0.75,
        }
    }
}

impl TrackerParameter {
    pub fn new(num_markers: usize, zero_marker_id: usize) -> TrackerParameter {
        TrackerParameter {
            num_markers,
            zero_marker_id,
            ..Default::default()
        }
    }
}

/// Marker ring as seen at calibration time.
#[derive(Clone, Debug)]
pub struct CalibrationReference {
    markers: Vec<MarkerDetection>,
    center: [f64; 2],
    radius: f64,
    zero_angle: f64,
    frame_shape: (usize, usize),
}

impl CalibrationReference {
    /// `None` unless exactly `num_markers` distinct ids were found and the zero
    /// marker is one of them.
    pub fn from_detections(
        detections: &[MarkerDetection],
        param: &TrackerParameter,
        frame_shape: (usize, usize),
    ) -> Option<CalibrationReference> {
        if detections.len() != param.num_markers {
            return None;
        }
        let markers = detections
            .iter()
            .cloned()
            .sorted_by_key(|m| m.id)
            .dedup_by(|a, b| a.id == b.id)
            .collect_vec();
        if markers.len() != param.num_markers {
            return None;
        }
        let zero = markers.iter().find(|m| m.id == param.zero_marker_id)?;

        let center = centroid(markers.iter().flat_map(|m| m.corners.iter()))?;
        let corners = markers.iter().flat_map(|m| m.corners.iter()).collect_vec();
        let mean_dist = corners
            .iter()
            .map(|p| (p[0] as f64 - center[0]).hypot(p[1] as f64 - center[1]))
            .sum::<f64>()
            / corners.len() as f64;
        let zero_center = zero.center();
        let zero_vec = [
            zero_center[0] as f64 - center[0],
            zero_center[1] as f64 - center[1],
        ];

        Some(CalibrationReference {
            center,
            radius: mean_dist * param.aperture_scale,
            zero_angle: signed_angle([1.0, 0.0], zero_vec),
            frame_shape,
            markers,
        })
    }

    /// Illumination center `[x, y]`.
    pub fn center(&self) -> [f64; 2] {
        self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn zero_angle(&self) -> f64 {
        self.zero_angle
    }

    pub fn frame_shape(&self) -> (usize, usize) {
        self.frame_shape
    }

    pub fn markers(&self) -> &[MarkerDetection] {
        &self.markers
    }

    fn vector_to(&self, marker: &MarkerDetection) -> [f64; 2] {
        let c = marker.center();
        [c[0] as f64 - self.center[0], c[1] as f64 - self.center[1]]
    }

    /// Rotation of the ring in `[0, π)` from the markers of one frame.
    pub fn rotation(&self, detections: &[MarkerDetection]) -> Option<f64> {
        let angles = detections
            .iter()
            .filter_map(|det| {
                let reference = self.markers.iter().find(|m| m.id == det.id)?;
                let angle = signed_angle(self.vector_to(reference), self.vector_to(det));
                Some(angle - self.zero_angle)
            })
            .collect_vec();
        circmean(&angles, PI, 0.0)
    }

    /// `[start, end)` of the rows and columns closer to the center than the
    /// aperture radius.
    fn bounds(&self) -> ((usize, usize), (usize, usize)) {
        let axis_range = |center: f64, len: usize| {
            let start = ((center - self.radius).floor() + 1.0).max(0.0) as usize;
            let end = ((center + self.radius).ceil() as isize).clamp(0, len as isize) as usize;
            (start.min(end), end)
        };
        (
            axis_range(self.center[1], self.frame_shape.0),
            axis_range(self.center[0], self.frame_shape.1),
        )
    }
}

/// Rotation tracker for a ring of id-coded markers around the aperture.
pub struct Tracker<M: MarkerDetector = SquareMarkerDetector> {
    param: TrackerParameter,
    detector: M,
    calibration: Option<CalibrationReference>,
    last_detections: Vec<MarkerDetection>,
    log: Logger,
}

impl Tracker<SquareMarkerDetector> {
    pub fn with_markers(
        param: TrackerParameter,
        marker_param: MarkerDetectionParameter,
    ) -> Result<Self, TrackerError> {
        if marker_param.dictionary_size < param.num_markers {
            return Err(TrackerError::DictionaryTooSmall {
                requested: param.num_markers,
                available: marker_param.dictionary_size,
            });
        }
        Ok(Tracker::new(param, SquareMarkerDetector::new(marker_param)?))
    }
}

impl<M: MarkerDetector> Tracker<M> {
    pub fn new(param: TrackerParameter, detector: M) -> Self {
        Tracker {
            param,
            detector,
            calibration: None,
            last_detections: Vec::new(),
            log: set_log_config(),
        }
    }

    pub fn param(&self) -> &TrackerParameter {
        &self.param
    }

    pub fn detector(&self) -> &M {
        &self.detector
    }

    pub fn reset(&mut self) {
        self.calibration = None;
        self.last_detections.clear();
    }

    pub fn calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    pub fn calibration(&self) -> Option<&CalibrationReference> {
        self.calibration.as_ref()
    }

    /// Markers found in the last processed frame.
    pub fn last_detections(&self) -> &[MarkerDetection] {
        &self.last_detections
    }

    /// Try to calibrate on `frame`. Starts from an uncalibrated state and
    /// stays there when the ring is incomplete.
    pub fn calibrate(&mut self, frame: &ArrayView2<u8>) -> bool {
        self.reset();
        self.last_detections = self.detector.detect(frame);
        match CalibrationReference::from_detections(&self.last_detections, &self.param, frame.dim())
        {
            Some(reference) => {
                info!(
                    self.log,
                    "calibrated on {} markers, center [{:.1}, {:.1}], radius {:.1}, zero angle {:.4}",
                    reference.markers.len(),
                    reference.center[0],
                    reference.center[1],
                    reference.radius,
                    reference.zero_angle
                );
                self.calibration = Some(reference);
                true
            }
            None => false,
        }
    }

    /// Current rotation in `[0, π)`, `None` when no calibrated marker is seen.
    pub fn current_angle(&mut self, frame: &ArrayView2<u8>) -> Result<Option<f64>, TrackerError> {
        if self.calibration.is_none() {
            return Err(TrackerError::NotCalibrated);
        }
        self.last_detections = self.detector.detect(frame);
        let angle = self
            .calibration
            .as_ref()
            .and_then(|reference| reference.rotation(&self.last_detections));
        if angle.is_none() && !self.last_detections.is_empty() {
            warn!(self.log, "detected markers are not part of the calibration");
        }
        Ok(angle)
    }

    fn reference(&self) -> Result<&CalibrationReference, TrackerError> {
        self.calibration.as_ref().ok_or(TrackerError::NotCalibrated)
    }

    /// `(row, col)` of the crop origin in frame coordinates.
    pub fn crop_offset(&self) -> Result<(usize, usize), TrackerError> {
        let ((r0, _), (c0, _)) = self.reference()?.bounds();
        Ok((r0, c0))
    }

    /// Shape `(rows, cols)` of a cropped frame.
    pub fn crop_shape(&self) -> Result<(usize, usize), TrackerError> {
        let ((r0, r1), (c0, c1)) = self.reference()?.bounds();
        Ok((r1 - r0, c1 - c0))
    }

    /// Restrict a `rows x cols x ...` frame to the bounding square of the
    /// aperture.
    pub fn crop<'a, A, S, D>(
        &self,
        image: &'a ArrayBase<S, D>,
    ) -> Result<ArrayView<'a, A, D>, TrackerError>
    where
        S: Data<Elem = A>,
        D: Dimension,
    {
        let reference = self.reference()?;
        let shape = image.shape();
        let expected = reference.frame_shape;
        if shape.len() < 2 || shape[0] != expected.0 || shape[1] != expected.1 {
            return Err(TrackerError::ShapeMismatch {
                expected: vec![expected.0, expected.1],
                actual: shape.to_vec(),
            });
        }
        let ((r0, r1), (c0, c1)) = reference.bounds();
        let mut view = image.view();
        view.slice_axis_inplace(Axis(0), Slice::from(r0..r1));
        view.slice_axis_inplace(Axis(1), Slice::from(c0..c1));
        Ok(view)
    }

    /// Zero every pixel of a cropped image outside the aperture circle.
    pub fn mask<A, S, D>(&self, image: &ArrayBase<S, D>) -> Result<Array<A, D>, TrackerError>
    where
        A: Clone + Default,
        S: Data<Elem = A>,
        D: RemoveAxis,
        D::Smaller: RemoveAxis,
    {
        let reference = self.reference()?;
        let (r0, c0) = self.crop_offset()?;
        let (rows, cols) = self.crop_shape()?;
        let shape = image.shape();
        if shape[0] != rows || shape[1] != cols {
            return Err(TrackerError::ShapeMismatch {
                expected: vec![rows, cols],
                actual: shape.to_vec(),
            });
        }

        let [cx, cy] = reference.center;
        let radius = reference.radius;
        let mut out = image.to_owned();
        for (i, mut row) in out.axis_iter_mut(Axis(0)).enumerate() {
            let dy = (i + r0) as f64 - cy;
            for (j, mut px) in row.axis_iter_mut(Axis(0)).enumerate() {
                let dx = (j + c0) as f64 - cx;
                if dx.hypot(dy) >= radius {
                    px.fill(A::default());
                }
            }
        }
        Ok(out)
    }

    /// Crop then mask.
    pub fn crop_mask<A, S, D>(&self, image: &ArrayBase<S, D>) -> Result<Array<A, D>, TrackerError>
    where
        A: Clone + Default,
        S: Data<Elem = A>,
        D: RemoveAxis,
        D::Smaller: RemoveAxis,
    {
        let cropped = self.crop(image)?;
        self.mask(&cropped)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI as PI_F32;
    use std::f64::consts::PI;

    use assert_approx_eq::assert_approx_eq;
    use ndarray::{Array2, Array3};

    use super::{Tracker, TrackerParameter};
    use crate::encoding::MarkerDictionary;
    use crate::error::TrackerError;
    use crate::marker_detector::MarkerDetectionParameter;

    /// Ring of markers `0..count`, marker 0 on the +x axis at rotation 0,
    /// rotated counter-clockwise on screen by `rotation`.
    fn ring_frame(dict: &MarkerDictionary, count: usize, rotation: f32) -> Array2<u8> {
        let mut canvas = Array2::<u8>::from_elem((300, 300), 225);
        for k in 0..count {
            let theta = rotation + 2.0 * PI_F32 * k as f32 / 10.0;
            let center = [150.0 + 110.0 * theta.cos(), 150.0 - 110.0 * theta.sin()];
            dict.paint(&mut canvas, k, center, 6, rotation);
        }
        canvas
    }

    fn tracker() -> Tracker {
        Tracker::with_markers(TrackerParameter::default(), MarkerDetectionParameter::default())
            .unwrap()
    }

    #[test]
    fn test_calibrate_full_ring() {
        let mut tracker = tracker();
        let frame = ring_frame(tracker.detector().dictionary(), 10, 0.0);
        assert!(tracker.calibrate(&frame.view()));
        let reference = tracker.calibration().unwrap();
        assert_approx_eq!(reference.center()[0], 150.0, 1.0);
        assert_approx_eq!(reference.center()[1], 150.0, 1.0);
        assert_approx_eq!(reference.zero_angle(), 0.0, 0.02);
        // corners sit around the ring radius
        assert!(reference.radius() > 0.75 * 100.0 && reference.radius() < 0.75 * 125.0);
        assert_eq!(tracker.last_detections().len(), 10);
    }

    #[test]
    fn test_incomplete_ring_does_not_calibrate() {
        let mut tracker = tracker();
        let frame = ring_frame(tracker.detector().dictionary(), 9, 0.0);
        assert!(!tracker.calibrate(&frame.view()));
        assert!(!tracker.calibrated());
        assert_eq!(
            tracker.current_angle(&frame.view()),
            Err(TrackerError::NotCalibrated)
        );
        assert_eq!(tracker.crop_offset(), Err(TrackerError::NotCalibrated));
    }

    #[test]
    fn test_current_angle_follows_rotation() {
        let mut tracker = tracker();
        let dict = tracker.detector().dictionary().clone();
        assert!(tracker.calibrate(&ring_frame(&dict, 10, 0.0).view()));
        for rotation in [0.3_f32, 1.0, 2.2, 3.6] {
            let frame = ring_frame(&dict, 10, rotation);
            let angle = tracker.current_angle(&frame.view()).unwrap().unwrap();
            let expected = (rotation as f64).rem_euclid(PI);
            let diff = crate::geometry::diff_orientation(angle, expected);
            assert!(diff.abs() < 0.02, "rotation {} read {}", rotation, angle);
        }
    }

    #[test]
    fn test_no_markers_gives_no_angle() {
        let mut tracker = tracker();
        let dict = tracker.detector().dictionary().clone();
        assert!(tracker.calibrate(&ring_frame(&dict, 10, 0.0).view()));
        let blank = Array2::<u8>::from_elem((300, 300), 225);
        assert_eq!(tracker.current_angle(&blank.view()), Ok(None));
        tracker.reset();
        assert!(!tracker.calibrated());
    }

    #[test]
    fn test_crop_and_mask() {
        let mut tracker = tracker();
        let frame = ring_frame(tracker.detector().dictionary(), 10, 0.0);
        assert!(tracker.calibrate(&frame.view()));
        let radius = tracker.calibration().unwrap().radius();

        let (rows, cols) = tracker.crop_shape().unwrap();
        let cropped = tracker.crop(&frame).unwrap();
        assert_eq!(cropped.dim(), (rows, cols));
        assert!((rows as f64 - 2.0 * radius).abs() <= 2.0);

        let color = Array3::<u8>::from_elem((300, 300, 3), 7);
        let masked = tracker.crop_mask(&color).unwrap();
        assert_eq!(masked.dim(), (rows, cols, 3));
        assert_eq!(masked[[0, 0, 1]], 0);
        assert_eq!(masked[[rows / 2, cols / 2, 2]], 7);

        let wrong = Array2::<u8>::zeros((rows + 1, cols));
        assert!(matches!(
            tracker.mask(&wrong),
            Err(TrackerError::ShapeMismatch { .. })
        ));
        let wrong_frame = Array2::<u8>::zeros((200, 300));
        assert!(tracker.crop(&wrong_frame).is_err());
    }
}
