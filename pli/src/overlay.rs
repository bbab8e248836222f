use std::f64::consts::PI;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use marker_tracker::{CalibrationReference, MarkerDetection};
use ndarray::{Array3, ArrayView2};

use crate::error::PliError;

const MARKER: Rgb<u8> = Rgb([0, 255, 0]);
const CORNER: Rgb<u8> = Rgb([255, 0, 0]);
const APERTURE: Rgb<u8> = Rgb([255, 255, 0]);
const ANGLE: Rgb<u8> = Rgb([255, 0, 255]);
const SLOT: Rgb<u8> = Rgb([0, 160, 255]);
const PROBE: Rgb<u8> = Rgb([255, 128, 0]);

/// What the debug view shows on top of a frame.
#[derive(Clone, Debug, Default)]
pub struct Overlay<'a> {
    pub detections: &'a [MarkerDetection],
    pub calibration: Option<&'a CalibrationReference>,
    /// rotation in `[0, π)` relative to the zero marker
    pub angle: Option<f64>,
    /// rotations of the filled slots
    pub filled: &'a [f64],
    /// `[x, y]` in cropped coordinates
    pub probes: &'a [[usize; 2]],
    pub crop_offset: (usize, usize),
}

fn gray_to_rgb(frame: &ArrayView2<u8>) -> RgbImage {
    let (height, width) = frame.dim();
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let v = frame[(y as usize, x as usize)];
        Rgb([v, v, v])
    })
}

/// Radial segment at `angle` (counter-clockwise on screen) between two radii.
fn radial_tick(
    canvas: &mut RgbImage,
    center: [f64; 2],
    angle: f64,
    inner: f64,
    outer: f64,
    color: Rgb<u8>,
) {
    let (s, c) = angle.sin_cos();
    let at = |r: f64| ((center[0] + r * c) as f32, (center[1] - r * s) as f32);
    draw_line_segment_mut(canvas, at(inner), at(outer), color);
}

/// Render `overlay` onto an RGB copy of `frame`, returned as `(rows, cols, 3)`.
pub fn draw_overlay(frame: &ArrayView2<u8>, overlay: &Overlay) -> Result<Array3<u8>, PliError> {
    let mut canvas = gray_to_rgb(frame);

    for marker in overlay.detections {
        for i in 0..4 {
            let (p, q) = (marker.corners[i], marker.corners[(i + 1) % 4]);
            draw_line_segment_mut(&mut canvas, (p[0], p[1]), (q[0], q[1]), MARKER);
        }
        let first = marker.corners[0];
        draw_filled_circle_mut(&mut canvas, (first[0] as i32, first[1] as i32), 2, CORNER);
    }

    if let Some(reference) = overlay.calibration {
        let center = reference.center();
        let radius = reference.radius();
        let pixel = (center[0].round() as i32, center[1].round() as i32);
        draw_hollow_circle_mut(&mut canvas, pixel, radius.round() as i32, APERTURE);
        draw_filled_circle_mut(&mut canvas, pixel, 2, APERTURE);

        for &rho in overlay.filled {
            let at = rho + reference.zero_angle();
            radial_tick(&mut canvas, center, at, 0.92 * radius, radius, SLOT);
            radial_tick(&mut canvas, center, at + PI, 0.92 * radius, radius, SLOT);
        }
        if let Some(rho) = overlay.angle {
            let at = rho + reference.zero_angle();
            radial_tick(&mut canvas, center, at, 1.02 * radius, 1.15 * radius, ANGLE);
            radial_tick(&mut canvas, center, at + PI, 1.02 * radius, 1.15 * radius, ANGLE);
        }
    }

    let (r0, c0) = overlay.crop_offset;
    for p in overlay.probes {
        let at = ((p[0] + c0) as i32, (p[1] + r0) as i32);
        draw_hollow_circle_mut(&mut canvas, at, 3, PROBE);
    }

    let (height, width) = frame.dim();
    Ok(Array3::from_shape_vec((height, width, 3), canvas.into_raw())?)
}
