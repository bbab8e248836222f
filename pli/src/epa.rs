//! Per-pixel harmonic inversion of a rotation series ("EPA").
//!
//! Each pixel follows `I(ρ) = a0 + a1·sin 2ρ + b1·cos 2ρ`. For rotations
//! spread evenly over the half turn the least-squares fit reduces to the
//! first Fourier coefficients.

use std::f64::consts::PI;

use ndarray::{Array2, ArrayView1, ArrayView3, Axis, Zip};

use crate::error::PliError;
use crate::stack::FrozenStack;

pub const EPSILON: f64 = 1e-16;

/// Transmittance, direction and retardation maps of one stack.
#[derive(Clone, Debug)]
pub struct Modalities {
    pub transmittance: Array2<f32>,
    pub direction: Array2<f32>,
    pub retardation: Array2<f32>,
}

impl Modalities {
    pub fn new(
        transmittance: Array2<f32>,
        direction: Array2<f32>,
        retardation: Array2<f32>,
    ) -> Result<Modalities, PliError> {
        for other in [&direction, &retardation] {
            if other.dim() != transmittance.dim() {
                return Err(PliError::ShapeMismatch {
                    expected: transmittance.shape().to_vec(),
                    actual: other.shape().to_vec(),
                });
            }
        }
        Ok(Modalities {
            transmittance,
            direction,
            retardation,
        })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.transmittance.dim()
    }

    pub fn from_stack(stack: &FrozenStack) -> Result<Modalities, PliError> {
        epa(&stack.images(), &stack.rotations())
    }
}

/// `(sin 2ρ, cos 2ρ)` of every rotation.
fn harmonics(rotations: &[f64]) -> Vec<(f64, f64)> {
    rotations.iter().map(|r| (2.0 * r).sin_cos()).collect()
}

/// `(a0, a1, b1)` of one pixel.
fn fit_pixel(lane: ArrayView1<f32>, harmonics: &[(f64, f64)]) -> (f64, f64, f64) {
    let n = harmonics.len() as f64;
    let (sum, sum_sin, sum_cos) =
        lane.iter()
            .zip(harmonics)
            .fold((0.0, 0.0, 0.0), |(s, ss, sc), (&v, &(sin, cos))| {
                let v = v as f64;
                (s + v, ss + v * sin, sc + v * cos)
            });
    (sum / n, 2.0 * sum_sin / n, 2.0 * sum_cos / n)
}

/// Direction in `[0, π)` from the first harmonic.
fn direction_of(a1: f64, b1: f64) -> f32 {
    let d = ((0.5 * (-b1).atan2(a1) + PI) % PI) as f32;
    // rounding to single precision can land on π itself
    if d >= std::f32::consts::PI {
        0.0
    } else {
        d
    }
}

fn check_input(images: &ArrayView3<f32>, rotations: &[f64]) -> Result<(), PliError> {
    let n = images.len_of(Axis(0));
    if n == 0 || rotations.is_empty() {
        return Err(PliError::EmptyStack);
    }
    if n != rotations.len() {
        return Err(PliError::ShapeMismatch {
            expected: vec![rotations.len()],
            actual: vec![n],
        });
    }
    Ok(())
}

/// Invert an `(n, rows, cols)` cube taken at `rotations` (radians).
pub fn epa(images: &ArrayView3<f32>, rotations: &[f64]) -> Result<Modalities, PliError> {
    check_input(images, rotations)?;
    let harmonics = harmonics(rotations);
    let (_, h, w) = images.dim();

    let mut transmittance = Array2::<f32>::zeros((h, w));
    let mut direction = Array2::<f32>::zeros((h, w));
    let mut retardation = Array2::<f32>::zeros((h, w));
    Zip::from(&mut transmittance)
        .and(&mut direction)
        .and(&mut retardation)
        .and(images.lanes(Axis(0)))
        .par_for_each(|t, d, r, lane| {
            let (a0, a1, b1) = fit_pixel(lane, &harmonics);
            *t = (2.0 * a0) as f32;
            *d = direction_of(a1, b1);
            *r = ((a1 * a1 + b1 * b1).sqrt() / (a0 + EPSILON)) as f32;
        });

    Modalities::new(transmittance, direction, retardation)
}

/// Direction map only.
pub fn epa_direction(images: &ArrayView3<f32>, rotations: &[f64]) -> Result<Array2<f32>, PliError> {
    check_input(images, rotations)?;
    let harmonics = harmonics(rotations);
    let (_, h, w) = images.dim();

    let mut direction = Array2::<f32>::zeros((h, w));
    Zip::from(&mut direction)
        .and(images.lanes(Axis(0)))
        .par_for_each(|d, lane| {
            let (_, a1, b1) = fit_pixel(lane, &harmonics);
            *d = direction_of(a1, b1);
        });
    Ok(direction)
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use assert_approx_eq::assert_approx_eq;
    use ndarray::{Array2, Array3};

    use super::{epa, epa_direction, Modalities};
    use crate::error::PliError;

    fn rotations(n: usize) -> Vec<f64> {
        (0..n).map(|k| k as f64 * PI / n as f64).collect()
    }

    /// Frames of a uniform sample in the model the inversion assumes.
    fn synthetic(t: f64, d: f64, r: f64, rotations: &[f64]) -> Array3<f32> {
        Array3::from_shape_fn((rotations.len(), 3, 4), |(k, _, _)| {
            (t / 2.0 * (1.0 + r * (2.0 * (rotations[k] - d)).sin())) as f32
        })
    }

    fn quantized(images: &Array3<f32>) -> Array3<f32> {
        images.mapv(|v| v.round())
    }

    #[test]
    fn test_constant_stack() {
        let rot = rotations(18);
        let images = Array3::<f32>::from_elem((18, 3, 4), 50.0);
        let m = epa(&images.view(), &rot).unwrap();
        assert_approx_eq!(m.transmittance[[0, 0]], 100.0, 1e-3);
        assert_approx_eq!(m.retardation[[1, 1]], 0.0, 1e-6);
    }

    /// Frames of `a0 + a1 sin 2ρ + b1 cos 2ρ`.
    fn harmonic(a0: f64, a1: f64, b1: f64, rotations: &[f64]) -> Array3<f32> {
        Array3::from_shape_fn((rotations.len(), 2, 2), |(k, _, _)| {
            let (s, c) = (2.0 * rotations[k]).sin_cos();
            (a0 + a1 * s + b1 * c) as f32
        })
    }

    #[test]
    fn test_harmonic_coefficients() {
        let rot = rotations(18);

        let m = epa(&harmonic(100.0, 40.0, 0.0, &rot).view(), &rot).unwrap();
        assert_approx_eq!(m.transmittance[[0, 0]], 200.0, 1e-3);
        assert_approx_eq!(m.retardation[[0, 0]], 0.4, 1e-4);
        let d = m.direction[[0, 0]];
        assert!(d < 1e-4 || d > PI as f32 - 1e-4, "direction {}", d);

        let m = epa(&harmonic(50.0, 0.0, 30.0, &rot).view(), &rot).unwrap();
        assert_approx_eq!(m.transmittance[[1, 1]], 100.0, 1e-3);
        assert_approx_eq!(m.retardation[[1, 1]], 0.6, 1e-4);
        assert_approx_eq!(m.direction[[1, 1]] as f64, 0.75 * PI, 1e-4);
    }

    #[test]
    fn test_round_trip_direction_zero() {
        let rot = rotations(18);
        let m = epa(&synthetic(100.0, 0.0, 0.4, &rot).view(), &rot).unwrap();
        assert_approx_eq!(m.transmittance[[1, 2]], 100.0, 1e-3);
        assert_approx_eq!(m.retardation[[1, 2]], 0.4, 1e-5);
        assert!(m.direction[[1, 2]] < 1e-5 || m.direction[[1, 2]] > PI as f32 - 1e-5);
    }

    #[test]
    fn test_round_trip_oblique_direction() {
        let rot = rotations(18);
        let d = 30f64.to_radians();
        let m = epa(&synthetic(50.0, d, 0.0, &rot).view(), &rot).unwrap();
        assert_approx_eq!(m.transmittance[[0, 0]], 50.0, 1e-3);
        assert_approx_eq!(m.retardation[[0, 0]], 0.0, 1e-5);

        let m = epa(&synthetic(50.0, d, 0.3, &rot).view(), &rot).unwrap();
        assert_approx_eq!(m.direction[[2, 1]] as f64, d, 1e-5);
        assert_approx_eq!(m.retardation[[2, 1]], 0.3, 1e-5);
    }

    #[test]
    fn test_round_trip_on_quantized_frames() {
        let rot = rotations(18);
        let d = 2.5;
        let images = quantized(&synthetic(180.0, d, 0.25, &rot));
        let m = epa(&images.view(), &rot).unwrap();
        assert_approx_eq!(m.transmittance[[0, 0]], 180.0, 0.5);
        assert_approx_eq!(m.retardation[[0, 0]], 0.25, 0.01);
        assert_approx_eq!(m.direction[[0, 0]] as f64, d, 0.02);
    }

    #[test]
    fn test_offset_rotations_shift_direction() {
        let rot = rotations(18);
        let images = synthetic(100.0, 1.0, 0.3, &rot);
        let shifted: Vec<f64> = rot.iter().map(|r| (r + 0.2) % PI).collect();
        let m = epa(&images.view(), &shifted).unwrap();
        assert_approx_eq!(m.direction[[0, 0]] as f64, 1.2, 1e-5);
        let d = epa_direction(&images.view(), &shifted).unwrap();
        assert_eq!(d, m.direction);
    }

    #[test]
    fn test_bad_input() {
        let images = Array3::<f32>::zeros((0, 2, 2));
        assert!(matches!(epa(&images.view(), &[]), Err(PliError::EmptyStack)));
        let images = Array3::<f32>::zeros((3, 2, 2));
        assert!(matches!(
            epa(&images.view(), &[0.0, 1.0]),
            Err(PliError::ShapeMismatch { .. })
        ));
        assert!(Modalities::new(
            Array2::zeros((2, 2)),
            Array2::zeros((2, 2)),
            Array2::zeros((2, 3))
        )
        .is_err());
    }
}
