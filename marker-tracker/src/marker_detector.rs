use std::collections::HashSet;
use std::time::Instant;

use itertools::Itertools;
use ndarray::{Array2, ArrayView2};
use slog::{info, Logger};

use crate::encoding::MarkerDictionary;
use crate::error::TrackerError;
use crate::filters::{dark_pixels, invert, median_3x3, otsu_threshold};
use crate::quad::{extract_corners, quad_area, rotate_corners, sample_grid, Quad};
use crate::utils::{image_connected_components, set_log_config, Component};
use crate::IS_DEBUG;

/// MarkerDetectionParameter
#[derive(Clone, Debug)]
pub struct MarkerDetectionParameter {
    /// payload cells per side, the printed marker has `bits + 2` cells per side
    pub bits: usize,
    pub dictionary_size: usize,
    pub min_distance: u32,
    pub max_hamming: u32,
    pub min_area: usize,
    /// largest accepted blob, as a fraction of the image
    pub max_area_ratio: f32,
    /// accepted range of blob area over quad area
    pub fill_ratio: (f32, f32),
    pub median_filter: bool,
    /// markers printed light on dark
    pub inverted: bool,
    pub connected_range: i32,
}

impl Default for MarkerDetectionParameter {
    fn default() -> Self {
        Self {
            bits: 4,
            dictionary_size: 32,
            min_distance: 3,
            max_hamming: 0,
            min_area: 64,
            max_area_ratio: 0.2,
            fill_ratio: (0.4, 1.05),
            median_filter: true,
            inverted: false,
            connected_range: 1,
        }
    }
}

impl MarkerDetectionParameter {
    #[allow(clippy::field_reassign_with_default)]
    pub fn new(bits: usize, min_area: usize, inverted: bool) -> MarkerDetectionParameter {
        let mut ret = MarkerDetectionParameter::default();
        ret.bits = bits;
        ret.min_area = min_area;
        ret.inverted = inverted;
        ret
    }
}

/// One decoded marker. Corners are `[x, y]`, clockwise on screen, corner 0
/// being the top-left cell corner of the canonical marker pattern.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerDetection {
    pub id: usize,
    pub corners: Quad,
}

impl MarkerDetection {
    pub fn center(&self) -> [f32; 2] {
        [
            self.corners.iter().map(|p| p[0]).sum::<f32>() / 4.0,
            self.corners.iter().map(|p| p[1]).sum::<f32>() / 4.0,
        ]
    }
}

/// Anything able to find id-coded markers in a grayscale frame.
pub trait MarkerDetector {
    fn detect(&self, image: &ArrayView2<u8>) -> Vec<MarkerDetection>;
}

pub struct SquareMarkerDetector {
    param: MarkerDetectionParameter,
    dictionary: MarkerDictionary,
    log: Logger,
}

impl SquareMarkerDetector {
    pub fn new(param: MarkerDetectionParameter) -> Result<Self, TrackerError> {
        let dictionary =
            MarkerDictionary::generate(param.bits, param.dictionary_size, param.min_distance)?;
        Ok(SquareMarkerDetector {
            param,
            dictionary,
            log: set_log_config(),
        })
    }

    pub fn dictionary(&self) -> &MarkerDictionary {
        &self.dictionary
    }

    pub fn param(&self) -> &MarkerDetectionParameter {
        &self.param
    }
}

impl MarkerDetector for SquareMarkerDetector {
    fn detect(&self, image: &ArrayView2<u8>) -> Vec<MarkerDetection> {
        detect_markers(image, &self.param, &self.dictionary, &self.log)
    }
}

/// Detect square binary markers.
pub fn detect_markers(
    img: &ArrayView2<u8>,
    param: &MarkerDetectionParameter,
    dictionary: &MarkerDictionary,
    log: &Logger,
) -> Vec<MarkerDetection> {
    let tick = Instant::now();

    let filtered = prepare_image(img, param);
    let level = otsu_threshold(&filtered.view());
    let dark = dark_pixels(&filtered.view(), level);
    let components = image_connected_components(&dark.view(), param.connected_range);

    if IS_DEBUG {
        info!(
            log,
            "threshold {} -> {} components in {:.3}s",
            level,
            components.len(),
            tick.elapsed().as_millis() as f64 / 1000.0
        );
    }

    let max_area = (param.max_area_ratio * img.len() as f32) as usize;
    let candidates = components
        .iter()
        .filter(|comp| comp.area() >= param.min_area && comp.area() <= max_area)
        .filter_map(|comp| decode_component(&filtered.view(), comp, level, param, dictionary))
        .collect_vec();

    let markers = suppress_duplicates(candidates);

    if IS_DEBUG {
        info!(
            log,
            "decoded {} markers in {:.3}s",
            markers.len(),
            tick.elapsed().as_millis() as f64 / 1000.0
        );
    }
    markers
}

fn prepare_image(img: &ArrayView2<u8>, param: &MarkerDetectionParameter) -> Array2<u8> {
    let image = if param.median_filter {
        median_3x3(img)
    } else {
        img.to_owned()
    };
    if param.inverted {
        invert(&image.view())
    } else {
        image
    }
}

fn decode_component(
    image: &ArrayView2<u8>,
    comp: &Component,
    level: u8,
    param: &MarkerDetectionParameter,
    dictionary: &MarkerDictionary,
) -> Option<(MarkerDetection, f32)> {
    let quad = extract_corners(&comp.pixels, comp.centroid())?;
    let area = quad_area(&quad);
    let fill = comp.area() as f32 / area.max(1.0);
    if fill < param.fill_ratio.0 || fill > param.fill_ratio.1 {
        return None;
    }

    let cells = param.bits + 2;
    let grid = sample_grid(image, &quad, cells)?;
    let light = grid.mapv(|v| v > level as f32);

    let border_dark = (0..cells).all(|i| {
        !light[[0, i]] && !light[[cells - 1, i]] && !light[[i, 0]] && !light[[i, cells - 1]]
    });
    if !border_dark {
        return None;
    }

    let mut word = 0_u64;
    for r in 0..param.bits {
        for c in 0..param.bits {
            if light[[r + 1, c + 1]] {
                word |= 1 << (r * param.bits + c);
            }
        }
    }

    let (id, rotation, _) = dictionary.identify(word, param.max_hamming)?;
    Some((
        MarkerDetection {
            id,
            corners: rotate_corners(&quad, rotation),
        },
        area,
    ))
}

/// Drop candidates whose center lies inside a larger candidate.
fn suppress_duplicates(mut candidates: Vec<(MarkerDetection, f32)>) -> Vec<MarkerDetection> {
    if candidates.is_empty() {
        return Vec::new();
    }
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

    let data = candidates
        .iter()
        .map(|(m, _)| {
            let c = m.center();
            [c[0] as i32, c[1] as i32]
        })
        .collect_vec();
    let kd_tree = kd_tree::KdIndexTree::build(&data);

    let mut suppressed = HashSet::<usize>::new();
    let mut kept = Vec::new();
    for (i, (marker, area)) in candidates.iter().enumerate() {
        if suppressed.contains(&i) {
            continue;
        }
        let radius = (area.sqrt() / 2.0) as i32;
        kd_tree
            .within_radius(&data[i], radius)
            .into_iter()
            .filter(|&&j| j != i)
            .for_each(|&j| {
                suppressed.insert(j);
            });
        kept.push(marker.clone());
    }
    kept
}
