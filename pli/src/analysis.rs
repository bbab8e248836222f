use std::f32::consts::{FRAC_PI_2, PI};
use std::time::Instant;

use marker_tracker::IS_DEBUG;
use ndarray::{Array2, Array3, ArrayView3};
use slog::{info, Logger};

use crate::epa::Modalities;
use crate::error::PliError;
use crate::fom::render_fom;
use crate::inclination::{estimate_inclination, InclinationResult};
use crate::stack::FrozenStack;
use crate::tilt::{simulate_tilts, RetardationModel, Tilt, TiltResult};

/// AnalysisParameter
#[derive(Clone, Debug)]
pub struct AnalysisParameter {
    pub histogram_bins: usize,
    /// retardation at or below this is background
    pub mask_lower: f32,
    /// simulated tilt in radians
    pub tilt_angle: f64,
    pub retardation_model: RetardationModel,
}

impl Default for AnalysisParameter {
    fn default() -> Self {
        Self {
            histogram_bins: 42,
            mask_lower: 0.08,
            tilt_angle: 20f64.to_radians(),
            retardation_model: RetardationModel::Measured,
        }
    }
}

/// Single-channel maps an analysis provides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Modality {
    Transmittance,
    Direction,
    Retardation,
    Inclination,
    Mask,
}

impl Modality {
    pub const ALL: [Modality; 5] = [
        Modality::Transmittance,
        Modality::Direction,
        Modality::Retardation,
        Modality::Inclination,
        Modality::Mask,
    ];

    /// Value shown as full brightness.
    pub fn full_scale(self) -> f32 {
        match self {
            Modality::Transmittance => 255.0,
            Modality::Direction => PI,
            Modality::Retardation => 1.0,
            Modality::Inclination => FRAC_PI_2,
            Modality::Mask => 1.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Modality::Transmittance => "transmittance",
            Modality::Direction => "direction",
            Modality::Retardation => "retardation",
            Modality::Inclination => "inclination",
            Modality::Mask => "mask",
        }
    }
}

/// Everything derived from one completed stack.
#[derive(Clone, Debug)]
pub struct Analysis {
    pub rotations: Vec<f64>,
    /// measured stack the analysis ran on
    pub stack: FrozenStack,
    pub modalities: Modalities,
    pub inclination: InclinationResult,
    pub fom: Array3<f32>,
    pub tilts: TiltResult,
}

impl Analysis {
    pub fn run(
        stack: &FrozenStack,
        param: &AnalysisParameter,
        log: &Logger,
    ) -> Result<Analysis, PliError> {
        let tick = Instant::now();
        let rotations = stack.rotations();
        let modalities = Modalities::from_stack(stack)?;
        if IS_DEBUG {
            info!(
                log,
                "epa on {} rotations {:.3}s",
                rotations.len(),
                tick.elapsed().as_millis() as f64 / 1000.0
            );
        }

        let inclination = estimate_inclination(
            &modalities.retardation.view(),
            param.histogram_bins,
            param.mask_lower,
            log,
        );
        let fom = render_fom(
            &modalities.direction.view(),
            &inclination.inclination.view(),
            &inclination.mask.view(),
        );
        let tilts = simulate_tilts(
            &modalities,
            &inclination,
            &rotations,
            param.tilt_angle,
            param.retardation_model,
        )?;
        if IS_DEBUG {
            info!(
                log,
                "analysis done {:.3}s",
                tick.elapsed().as_millis() as f64 / 1000.0
            );
        }

        Ok(Analysis {
            rotations,
            stack: stack.clone(),
            modalities,
            inclination,
            fom,
            tilts,
        })
    }

    fn view(&self, tilt: Tilt) -> (&Modalities, &InclinationResult, &Array3<f32>) {
        match self.tilts.get(tilt) {
            Some(t) => (&t.modalities, &t.inclination, &t.fom),
            None => (&self.modalities, &self.inclination, &self.fom),
        }
    }

    /// Map of `modality` as seen from `tilt`; the mask is 0 or 1.
    pub fn modality(&self, tilt: Tilt, modality: Modality) -> Array2<f32> {
        let (m, inc, _) = self.view(tilt);
        match modality {
            Modality::Transmittance => m.transmittance.clone(),
            Modality::Direction => m.direction.clone(),
            Modality::Retardation => m.retardation.clone(),
            Modality::Inclination => inc.inclination.clone(),
            Modality::Mask => inc.mask.mapv(|v| if v { 1.0 } else { 0.0 }),
        }
    }

    pub fn mask(&self, tilt: Tilt) -> &Array2<bool> {
        &self.view(tilt).1.mask
    }

    pub fn fom(&self, tilt: Tilt) -> &Array3<f32> {
        self.view(tilt).2
    }

    /// Per-rotation images behind `tilt`: the measured stack at the center,
    /// the predicted stack otherwise. Ordered like `rotations`.
    pub fn images(&self, tilt: Tilt) -> ArrayView3<f32> {
        match self.tilts.get(tilt) {
            Some(t) => t.images.view(),
            None => self.stack.images(),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.modalities.dim()
    }
}
