//! Periodic acquisition loop: calibrate on the marker ring, fill the stack
//! while the polarizer turns, then analyse the full stack off-thread.

use std::f64::consts::PI;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use marker_tracker::geometry::diff_angles;
use marker_tracker::utils::set_log_config;
use marker_tracker::{
    MarkerDetectionParameter, MarkerDetector, SquareMarkerDetector, Tracker, TrackerParameter,
};
use ndarray::{Array2, Array3};
use slog::{error, info, warn, Logger};

use crate::analysis::{Analysis, AnalysisParameter, Modality};
use crate::error::PliError;
use crate::export::{export_images, export_plot};
use crate::overlay::{draw_overlay, Overlay};
use crate::source::{fallback_frame, ColorMode, Frame, FrameSource};
use crate::stack::{FrozenStack, ImageStack};
use crate::tilt::Tilt;

/// PliParameter
#[derive(Clone, Debug)]
pub struct PliParameter {
    pub num_rotations: usize,
    /// largest accepted distance between a frame and its slot, radians
    pub insert_threshold: f64,
    /// rotation needed before the display refreshes again, radians
    pub update_angle: f64,
    pub color_mode: ColorMode,
    pub tracker: TrackerParameter,
    pub markers: MarkerDetectionParameter,
    pub analysis: AnalysisParameter,
}

impl Default for PliParameter {
    fn default() -> Self {
        Self {
            num_rotations: 18,
            insert_threshold: 4.2f64.to_radians(),
            update_angle: 2.5f64.to_radians(),
            color_mode: ColorMode::Gray,
            tracker: TrackerParameter::default(),
            markers: MarkerDetectionParameter::default(),
            analysis: AnalysisParameter::default(),
        }
    }
}

impl PliParameter {
    pub fn new(num_rotations: usize, insert_threshold_deg: f64) -> PliParameter {
        PliParameter {
            num_rotations,
            insert_threshold: insert_threshold_deg.to_radians(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// looking for the full marker ring
    Tracking,
    /// filling the stack
    Measurement,
    /// stack complete, angle still followed for display
    Live,
}

/// Outcome of one loop iteration.
#[derive(Clone, Debug)]
pub struct Tick {
    pub display: Frame,
    pub state: State,
    pub angle: Option<f64>,
    /// the angle moved enough for plots to be redrawn
    pub refresh: bool,
    /// a new analysis was installed during this tick
    pub analysis_updated: bool,
}

type AnalysisMessage = (u64, Result<Analysis, PliError>);

pub struct MeasurementDriver<M: MarkerDetector = SquareMarkerDetector> {
    param: PliParameter,
    tracker: Tracker<M>,
    stack: ImageStack,
    state: State,
    frozen: Option<FrozenStack>,
    analysis: Option<Analysis>,
    generation: u64,
    pending: bool,
    sender: Sender<AnalysisMessage>,
    receiver: Receiver<AnalysisMessage>,
    tilt: Tilt,
    debug: bool,
    probes: Vec<[usize; 2]>,
    angle: Option<f64>,
    last_refresh: Option<f64>,
    log: Logger,
}

impl MeasurementDriver<SquareMarkerDetector> {
    pub fn new(param: PliParameter) -> Result<Self, PliError> {
        let tracker = Tracker::with_markers(param.tracker.clone(), param.markers.clone())?;
        MeasurementDriver::with_tracker(param, tracker)
    }
}

impl<M: MarkerDetector> MeasurementDriver<M> {
    pub fn with_tracker(param: PliParameter, tracker: Tracker<M>) -> Result<Self, PliError> {
        let (sender, receiver) = bounded(1);
        Ok(MeasurementDriver {
            stack: ImageStack::new(param.num_rotations, param.insert_threshold)?,
            param,
            tracker,
            state: State::Tracking,
            frozen: None,
            analysis: None,
            generation: 0,
            pending: false,
            sender,
            receiver,
            tilt: Tilt::Center,
            debug: false,
            probes: Vec::new(),
            angle: None,
            last_refresh: None,
            log: set_log_config(),
        })
    }

    pub fn param(&self) -> &PliParameter {
        &self.param
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn tracker(&self) -> &Tracker<M> {
        &self.tracker
    }

    pub fn stack(&self) -> &ImageStack {
        &self.stack
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }

    pub fn angle(&self) -> Option<f64> {
        self.angle
    }

    pub fn tilt(&self) -> Tilt {
        self.tilt
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn probes(&self) -> &[[usize; 2]] {
        &self.probes
    }

    /// One loop iteration.
    pub fn next<S: FrameSource + ?Sized>(&mut self, source: &mut S) -> Result<Tick, PliError> {
        let analysis_updated = self.poll_analysis();

        let frame = match source.next_frame() {
            Some(frame) => frame,
            None => {
                warn!(self.log, "device disconnected, tick skipped");
                return Ok(Tick {
                    display: fallback_frame(),
                    state: self.state,
                    angle: None,
                    refresh: false,
                    analysis_updated,
                });
            }
        };
        let luma = frame.to_gray(ColorMode::Gray);

        match self.state {
            State::Tracking => {
                if self.tracker.calibrate(&luma.view()) {
                    info!(self.log, "measurement started");
                    self.state = State::Measurement;
                }
            }
            State::Measurement => {
                self.angle = self.tracker.current_angle(&luma.view())?;
                if let Some(angle) = self.angle {
                    let channel = match self.param.color_mode {
                        ColorMode::Gray => luma.clone(),
                        mode => frame.to_gray(mode),
                    };
                    let image = self.tracker.crop_mask(&channel)?;
                    if self.stack.insert(&image.view(), angle)? {
                        info!(
                            self.log,
                            "inserted frame at {:.2} deg, {}/{} filled",
                            angle.to_degrees(),
                            self.stack.filled_count(),
                            self.stack.len()
                        );
                    }
                    if self.stack.is_full() {
                        self.frozen = Some(self.stack.freeze()?);
                        self.dispatch_analysis();
                        self.state = State::Live;
                    }
                }
            }
            State::Live => {
                self.angle = self.tracker.current_angle(&luma.view())?;
            }
        }

        let display = self.display_frame(&frame, &luma)?;
        let refresh = self.throttle();
        Ok(Tick {
            display,
            state: self.state,
            angle: self.angle,
            refresh,
            analysis_updated,
        })
    }

    fn display_frame(&self, frame: &Frame, luma: &Array2<u8>) -> Result<Frame, PliError> {
        if self.debug {
            let filled = self
                .stack
                .rotations()
                .into_iter()
                .zip(self.stack.valid())
                .filter_map(|(rho, valid)| valid.then_some(rho))
                .collect::<Vec<_>>();
            let crop_offset = self.tracker.crop_offset().unwrap_or((0, 0));
            let overlay = Overlay {
                detections: self.tracker.last_detections(),
                calibration: self.tracker.calibration(),
                angle: self.angle,
                filled: &filled,
                probes: &self.probes,
                crop_offset,
            };
            return Ok(Frame::Rgb(draw_overlay(&luma.view(), &overlay)?));
        }
        if !self.tracker.calibrated() {
            return Ok(frame.clone());
        }
        Ok(match frame {
            Frame::Gray(gray) => Frame::Gray(self.tracker.crop_mask(gray)?),
            Frame::Rgb(color) => Frame::Rgb(self.tracker.crop_mask(color)?),
        })
    }

    /// `true` when the angle moved past the update angle since the last
    /// refresh.
    fn throttle(&mut self) -> bool {
        match (self.angle, self.last_refresh) {
            (Some(angle), Some(last))
                if diff_angles(last, angle, PI).abs() <= self.param.update_angle =>
            {
                false
            }
            (Some(angle), _) => {
                self.last_refresh = Some(angle);
                true
            }
            (None, _) => false,
        }
    }

    fn dispatch_analysis(&mut self) {
        let frozen = match &self.frozen {
            Some(frozen) => frozen.clone(),
            None => return,
        };
        self.generation += 1;
        self.pending = true;
        let generation = self.generation;
        let param = self.param.analysis.clone();
        let sender = self.sender.clone();
        let log = self.log.clone();
        info!(
            self.log,
            "analysis {} dispatched on {} rotations",
            generation,
            frozen.len()
        );
        std::thread::spawn(move || {
            let result = Analysis::run(&frozen, &param, &log);
            // the driver is gone when nobody listens
            let _ = sender.send((generation, result));
        });
    }

    fn install(&mut self, generation: u64, result: Result<Analysis, PliError>) -> bool {
        if generation != self.generation {
            info!(self.log, "stale analysis {} dropped", generation);
            return false;
        }
        self.pending = false;
        match result {
            Ok(analysis) => {
                info!(self.log, "analysis {} complete", generation);
                self.analysis = Some(analysis);
                true
            }
            Err(e) => {
                error!(self.log, "analysis {} failed: {}", generation, e);
                false
            }
        }
    }

    fn poll_analysis(&mut self) -> bool {
        let mut updated = false;
        while let Ok((generation, result)) = self.receiver.try_recv() {
            updated |= self.install(generation, result);
        }
        updated
    }

    /// Block until the pending analysis lands or `timeout` passes. Returns
    /// whether an analysis is available.
    pub fn wait_for_analysis(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.pending {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok((generation, result)) => {
                    self.install(generation, result);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.analysis.is_some() && !self.pending
    }

    /// Back to tracking with an empty stack. Results still in flight are
    /// ignored when they arrive.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.stack.reset();
        self.state = State::Tracking;
        self.frozen = None;
        self.analysis = None;
        self.generation += 1;
        self.pending = false;
        self.angle = None;
        self.last_refresh = None;
    }

    /// Restart calibration on the next frame.
    pub fn calibrate(&mut self) {
        info!(self.log, "recalibration requested");
        self.reset();
    }

    pub fn set_tilt(&mut self, tilt: Tilt) {
        self.tilt = tilt;
    }

    /// Offset every rotation by `degrees`. A completed stack is analysed again
    /// with the corrected angles.
    pub fn apply_offset_deg(&mut self, degrees: f64) {
        let offset = degrees.to_radians();
        self.stack.apply_offset(offset);
        if let Some(frozen) = &self.frozen {
            self.frozen = Some(frozen.with_offset(offset));
            self.dispatch_analysis();
        }
    }

    pub fn switch_debug(&mut self) {
        self.debug = !self.debug;
    }

    /// Add a probe at `[x, y]` of the cropped image; without `append` the
    /// previous probes are dropped.
    pub fn add_probe(&mut self, x: usize, y: usize, append: bool) {
        if !append {
            self.probes.clear();
        }
        self.probes.push([x, y]);
    }

    pub fn modality(&self, modality: Modality) -> Option<Array2<f32>> {
        self.analysis
            .as_ref()
            .map(|a| a.modality(self.tilt, modality))
    }

    pub fn transmittance(&self) -> Option<Array2<f32>> {
        self.modality(Modality::Transmittance)
    }

    pub fn direction(&self) -> Option<Array2<f32>> {
        self.modality(Modality::Direction)
    }

    pub fn retardation(&self) -> Option<Array2<f32>> {
        self.modality(Modality::Retardation)
    }

    pub fn inclination(&self) -> Option<Array2<f32>> {
        self.modality(Modality::Inclination)
    }

    pub fn mask(&self) -> Option<Array2<bool>> {
        self.analysis.as_ref().map(|a| a.mask(self.tilt).clone())
    }

    pub fn fom(&self) -> Option<Array3<f32>> {
        self.analysis.as_ref().map(|a| a.fom(self.tilt).clone())
    }

    /// Probe intensities against rotation for the selected tilt view. Before
    /// the first analysis the filled slots of the measured stack are used.
    pub fn export_plot<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), PliError> {
        match &self.analysis {
            Some(analysis) => export_plot(
                path,
                &analysis.rotations,
                &self.probes,
                &analysis.images(self.tilt),
            ),
            None => {
                let frozen = self.stack.freeze()?;
                export_plot(path, &frozen.rotations(), &self.probes, &frozen.images())
            }
        }
    }

    /// Maps and stack of the selected tilt view.
    pub fn export_images<P: AsRef<std::path::Path>>(&self, dir: P) -> Result<(), PliError> {
        match &self.analysis {
            Some(analysis) => export_images(dir, analysis, self.tilt),
            None => Err(PliError::NotReady),
        }
    }
}
