use std::f32::consts::PI;

use image::{imageops, RgbImage};
use itertools::Itertools;
use marker_tracker::encoding::MarkerDictionary;
use marker_tracker::utils::ImageUtil;
use ndarray::{Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A camera frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Gray(Array2<u8>),
    /// `(rows, cols, 3)`
    Rgb(Array3<u8>),
}

/// Channel fed to the measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ColorMode {
    /// luma of color frames
    #[default]
    Gray,
    Red,
    Green,
    Blue,
}

impl Frame {
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Frame::Gray(g) => g.dim(),
            Frame::Rgb(c) => {
                let (h, w, _) = c.dim();
                (h, w)
            }
        }
    }

    /// Single channel view of the frame. Gray frames have no channels to
    /// pick from and are returned as is.
    pub fn to_gray(&self, mode: ColorMode) -> Array2<u8> {
        match self {
            Frame::Gray(g) => g.clone(),
            Frame::Rgb(c) => match mode {
                ColorMode::Gray => luma(c),
                ColorMode::Red => c.index_axis(Axis(2), 0).to_owned(),
                ColorMode::Green => c.index_axis(Axis(2), 1).to_owned(),
                ColorMode::Blue => c.index_axis(Axis(2), 2).to_owned(),
            },
        }
    }
}

fn luma(rgb: &Array3<u8>) -> Array2<u8> {
    let (h, w, _) = rgb.dim();
    let raw = rgb.iter().copied().collect_vec();
    match RgbImage::from_raw(w as u32, h as u32, raw) {
        Some(image) => ImageUtil::gray_to_array(&imageops::grayscale(&image)),
        None => Array2::zeros((h, w)),
    }
}

/// Anything delivering frames; `None` once the device is gone.
pub trait FrameSource {
    fn next_frame(&mut self) -> Option<Frame>;
}

/// Shown when no device delivers frames: black with both diagonals white.
pub fn fallback_frame() -> Frame {
    let n = 128;
    Frame::Gray(Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j || i + j == n - 1 {
            255
        } else {
            0
        }
    }))
}

/// Uniform birefringent disc under the polarizer.
#[derive(Clone, Debug)]
pub struct SyntheticSample {
    pub transmittance: f32,
    pub direction: f64,
    /// modulation depth, `sin` of the phase retardation
    pub retardation: f64,
    pub radius: f32,
}

impl Default for SyntheticSample {
    fn default() -> Self {
        Self {
            transmittance: 200.0,
            direction: 1.0,
            retardation: 0.4,
            radius: 60.0,
        }
    }
}

/// SyntheticParameter
#[derive(Clone, Debug)]
pub struct SyntheticParameter {
    pub size: usize,
    pub ring_radius: f32,
    pub cell_px: usize,
    pub num_markers: usize,
    /// polarizer rotation per frame, radians
    pub step: f64,
    pub start: f64,
    pub frames: usize,
    pub noise: u8,
    pub background: u8,
    pub rgb: bool,
    pub seed: u64,
    pub sample: SyntheticSample,
}

impl Default for SyntheticParameter {
    fn default() -> Self {
        Self {
            size: 300,
            ring_radius: 110.0,
            cell_px: 6,
            num_markers: 10,
            step: 2f64.to_radians(),
            start: 0.0,
            frames: 100,
            noise: 4,
            background: 225,
            rgb: false,
            seed: 7,
            sample: SyntheticSample::default(),
        }
    }
}

/// Rotating polarizer with a marker ring over a fixed sample.
pub struct SyntheticPolarimeter {
    param: SyntheticParameter,
    dictionary: MarkerDictionary,
    frame: usize,
    rng: StdRng,
}

impl SyntheticPolarimeter {
    pub fn new(param: SyntheticParameter, dictionary: MarkerDictionary) -> Self {
        let rng = StdRng::seed_from_u64(param.seed);
        SyntheticPolarimeter {
            param,
            dictionary,
            frame: 0,
            rng,
        }
    }

    pub fn param(&self) -> &SyntheticParameter {
        &self.param
    }

    /// Polarizer rotation of frame `k`.
    pub fn rotation(&self, k: usize) -> f64 {
        self.param.start + k as f64 * self.param.step
    }

    /// Noise free frame at polarizer rotation `rho`.
    pub fn render(&self, rho: f64) -> Array2<u8> {
        let p = &self.param;
        let center = p.size as f32 / 2.0;
        let s = &p.sample;
        let level = s.transmittance as f64 / 2.0
            * (1.0 + s.retardation * (2.0 * (rho - s.direction)).sin());
        let level = level.round().clamp(0.0, 255.0) as u8;

        let mut canvas = Array2::from_shape_fn((p.size, p.size), |(i, j)| {
            let (dx, dy) = (j as f32 - center, i as f32 - center);
            if dx.hypot(dy) < s.radius {
                level
            } else {
                p.background
            }
        });

        let ring = rho as f32;
        for id in 0..p.num_markers {
            let theta = ring + 2.0 * PI * id as f32 / p.num_markers as f32;
            let at = [
                center + p.ring_radius * theta.cos(),
                center - p.ring_radius * theta.sin(),
            ];
            self.dictionary.paint(&mut canvas, id, at, p.cell_px, ring);
        }
        canvas
    }
}

impl FrameSource for SyntheticPolarimeter {
    fn next_frame(&mut self) -> Option<Frame> {
        if self.frame >= self.param.frames {
            return None;
        }
        let mut gray = self.render(self.rotation(self.frame));
        self.frame += 1;

        let noise = self.param.noise;
        if noise > 0 {
            gray.mapv_inplace(|v| v.saturating_add(self.rng.gen_range(0..=noise)));
        }
        if self.param.rgb {
            let (h, w) = gray.dim();
            Some(Frame::Rgb(Array3::from_shape_fn((h, w, 3), |(i, j, _)| {
                gray[[i, j]]
            })))
        } else {
            Some(Frame::Gray(gray))
        }
    }
}
