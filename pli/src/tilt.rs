//! Virtual tilting: predict the modalities of the sample as if it had been
//! rigidly tilted, from the measurements of the flat sample only.

use std::f64::consts::{FRAC_PI_2, PI};

use ndarray::{arr2, Array2, Array3, ArrayView2, Axis, Zip};

use crate::epa::{epa, Modalities};
use crate::error::PliError;
use crate::fom::render_fom;
use crate::inclination::InclinationResult;

/// Retardation phase used when the measured one cannot be inverted.
pub const NOMINAL_PHASE: f64 = 0.2;

/// Viewing direction of the sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tilt {
    Center,
    North,
    East,
    South,
    West,
}

impl Tilt {
    pub const TILTED: [Tilt; 4] = [Tilt::North, Tilt::East, Tilt::South, Tilt::West];

    /// Tilt azimuth in radians, `None` for the flat sample.
    pub fn azimuth(self) -> Option<f64> {
        match self {
            Tilt::Center => None,
            Tilt::North => Some(0.0),
            Tilt::East => Some(FRAC_PI_2),
            Tilt::South => Some(PI),
            Tilt::West => Some(3.0 * FRAC_PI_2),
        }
    }
}

/// How the maximal phase retardation of a pixel is obtained.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RetardationModel {
    /// Same phase for every pixel.
    Nominal { phase: f64 },
    /// Phase recovered from the measured retardation and inclination.
    Measured,
}

impl Default for RetardationModel {
    fn default() -> Self {
        RetardationModel::Measured
    }
}

impl RetardationModel {
    fn max_phase(self, retardation: f64, inclination: f64) -> f64 {
        match self {
            RetardationModel::Nominal { phase } => phase,
            RetardationModel::Measured => {
                let cos2 = inclination.cos().powi(2);
                if cos2 < 1e-6 {
                    NOMINAL_PHASE
                } else {
                    retardation.clamp(0.0, 1.0).asin() / cos2
                }
            }
        }
    }
}

pub fn rot_x(angle: f64) -> Array2<f64> {
    let (s, c) = angle.sin_cos();
    arr2(&[[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]])
}

pub fn rot_z(angle: f64) -> Array2<f64> {
    let (s, c) = angle.sin_cos();
    arr2(&[[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]])
}

/// Rotation by `tilt` about the axis lying in the sample plane at `azimuth`.
pub fn tilt_matrix(azimuth: f64, tilt: f64) -> Array2<f64> {
    rot_z(-azimuth).dot(&rot_x(tilt)).dot(&rot_z(azimuth))
}

/// Modalities, inclination and FOM of one simulated view, with the
/// predicted `(n, rows, cols)` stack they were inverted from.
#[derive(Clone, Debug)]
pub struct TiltedModalities {
    pub modalities: Modalities,
    pub inclination: InclinationResult,
    pub fom: Array3<f32>,
    pub images: Array3<f32>,
}

/// The four cardinal tilts.
#[derive(Clone, Debug)]
pub struct TiltResult {
    pub north: TiltedModalities,
    pub east: TiltedModalities,
    pub south: TiltedModalities,
    pub west: TiltedModalities,
}

impl TiltResult {
    pub fn get(&self, tilt: Tilt) -> Option<&TiltedModalities> {
        match tilt {
            Tilt::Center => None,
            Tilt::North => Some(&self.north),
            Tilt::East => Some(&self.east),
            Tilt::South => Some(&self.south),
            Tilt::West => Some(&self.west),
        }
    }
}

/// Simulate one tilt of `tilt` radians at `azimuth` and invert the predicted
/// stack at the measured `rotations`.
pub fn simulate_tilt(
    modalities: &Modalities,
    inclination: &InclinationResult,
    rotations: &[f64],
    azimuth: f64,
    tilt: f64,
    model: RetardationModel,
) -> Result<TiltedModalities, PliError> {
    let (h, w) = modalities.dim();
    if inclination.inclination.dim() != (h, w) {
        return Err(PliError::ShapeMismatch {
            expected: vec![h, w],
            actual: inclination.inclination.shape().to_vec(),
        });
    }
    if rotations.is_empty() {
        return Err(PliError::EmptyStack);
    }

    let rot = tilt_matrix(azimuth, tilt);
    let r = [
        [rot[[0, 0]], rot[[0, 1]], rot[[0, 2]]],
        [rot[[1, 0]], rot[[1, 1]], rot[[1, 2]]],
        [rot[[2, 0]], rot[[2, 1]], rot[[2, 2]]],
    ];

    let mut stack = Array3::<f32>::zeros((rotations.len(), h, w));
    let mut tilted_inclination = Array2::<f32>::zeros((h, w));
    Zip::from(stack.lanes_mut(Axis(0)))
        .and(&mut tilted_inclination)
        .and(&modalities.transmittance)
        .and(&modalities.direction)
        .and(&modalities.retardation)
        .and(&inclination.inclination)
        .par_for_each(|mut lane, inc_out, &t, &d, &ret, &inc| {
            let (phi, theta) = (d as f64, inc as f64);
            let v = [
                theta.cos() * phi.cos(),
                theta.cos() * phi.sin(),
                theta.sin(),
            ];
            let rv = [
                r[0][0] * v[0] + r[0][1] * v[1] + r[0][2] * v[2],
                r[1][0] * v[0] + r[1][1] * v[1] + r[1][2] * v[2],
                r[2][0] * v[0] + r[2][1] * v[1] + r[2][2] * v[2],
            ];
            let a = FRAC_PI_2 - rv[2].clamp(-1.0, 1.0).acos();
            let p = rv[1].atan2(rv[0]);
            let delta =
                (model.max_phase(ret as f64, theta) * a.cos().powi(2)).clamp(0.0, FRAC_PI_2);
            let amplitude = delta.sin();
            let half_t = t as f64 / 2.0;

            lane.iter_mut().zip(rotations).for_each(|(px, &rho)| {
                *px = (half_t * (1.0 + (2.0 * (rho - p)).sin() * amplitude)) as f32;
            });
            *inc_out = a.abs() as f32;
        });

    let tilted = epa(&stack.view(), rotations)?;
    let result = InclinationResult {
        inclination: tilted_inclination,
        mask: inclination.mask.clone(),
        threshold: inclination.threshold,
    };
    let fom = render_fom(
        &tilted.direction.view(),
        &result.inclination.view(),
        &result.mask.view(),
    );
    Ok(TiltedModalities {
        modalities: tilted,
        inclination: result,
        fom,
        images: stack,
    })
}

/// All four cardinal tilts.
pub fn simulate_tilts(
    modalities: &Modalities,
    inclination: &InclinationResult,
    rotations: &[f64],
    tilt: f64,
    model: RetardationModel,
) -> Result<TiltResult, PliError> {
    let run = |t: Tilt| {
        simulate_tilt(
            modalities,
            inclination,
            rotations,
            t.azimuth().unwrap_or(0.0),
            tilt,
            model,
        )
    };
    Ok(TiltResult {
        north: run(Tilt::North)?,
        east: run(Tilt::East)?,
        south: run(Tilt::South)?,
        west: run(Tilt::West)?,
    })
}

/// Direction difference folded into `[0, π/2]`.
pub fn direction_error(a: &ArrayView2<f32>, b: &ArrayView2<f32>) -> Array2<f32> {
    let mut out = Array2::<f32>::zeros(a.dim());
    Zip::from(&mut out).and(a).and(b).for_each(|o, &x, &y| {
        let d = (x - y).rem_euclid(std::f32::consts::PI);
        *o = d.min(std::f32::consts::PI - d);
    });
    out
}
