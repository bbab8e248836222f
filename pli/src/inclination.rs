use std::f32::consts::FRAC_PI_2;

use ndarray::{Array1, Array2, ArrayView2, Zip};
use ndarray_stats::QuantileExt;
use slog::{warn, Logger};

/// Inclination map, tissue mask and the retardation threshold they used.
#[derive(Clone, Debug)]
pub struct InclinationResult {
    pub inclination: Array2<f32>,
    pub mask: Array2<bool>,
    pub threshold: f32,
}

/// Upper edge of the highest populated bin of the retardation histogram.
///
/// Only values `<= 1` take part. Bins holding a single value are treated as
/// noise. `None` when no bin survives.
pub fn retardation_threshold(retardation: &ArrayView2<f32>, bins: usize) -> Option<f32> {
    let values: Array1<f64> = retardation
        .iter()
        .map(|&v| v as f64)
        .filter(|v| v.is_finite() && *v <= 1.0)
        .collect();
    let (mut lo, mut hi) = match (values.min(), values.max()) {
        (Ok(&lo), Ok(&hi)) if bins > 0 => (lo, hi),
        _ => return None,
    };
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0_usize; bins];
    for &v in values.iter() {
        // last bin is closed on the right
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .iter()
        .rposition(|&c| c > 1)
        .map(|idx| (lo + (idx + 1) as f64 * width) as f32)
}

/// Inclination `(π/2)(1 - r / threshold)` clamped to `[0, π/2]`, and the tissue
/// mask `mask_lower < r <= threshold`.
pub fn estimate_inclination(
    retardation: &ArrayView2<f32>,
    bins: usize,
    mask_lower: f32,
    log: &Logger,
) -> InclinationResult {
    let threshold = retardation_threshold(retardation, bins).unwrap_or_else(|| {
        warn!(log, "no usable retardation histogram, threshold falls back to 1.0");
        1.0
    });

    let mut inclination = Array2::<f32>::zeros(retardation.dim());
    let mut mask = Array2::from_elem(retardation.dim(), false);
    Zip::from(&mut inclination)
        .and(&mut mask)
        .and(retardation)
        .par_for_each(|inc, m, &r| {
            *inc = (FRAC_PI_2 * (1.0 - r / threshold)).clamp(0.0, FRAC_PI_2);
            *m = r > mask_lower && r <= threshold;
        });

    InclinationResult {
        inclination,
        mask,
        threshold,
    }
}
