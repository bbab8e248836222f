use itertools::Itertools;
use ndarray::{s, Array2, ArrayView2, Zip};

pub fn spot_median_3x3(image: &ArrayView2<u8>, i: usize, j: usize) -> u8 {
    let mut window = [0_u8; 9];
    image
        .slice(s![i - 1..i + 2, j - 1..j + 2])
        .iter()
        .zip(window.iter_mut())
        .for_each(|(&v, w)| *w = v);
    window.sort_unstable();
    window[4]
}

/// 3x3 median filter; the one pixel border is copied unchanged.
pub fn median_3x3(image: &ArrayView2<u8>) -> Array2<u8> {
    let mut out = image.to_owned();
    if image.dim().0 < 3 || image.dim().1 < 3 {
        return out;
    }
    (1..image.dim().0 - 1)
        .cartesian_product(1..image.dim().1 - 1)
        .for_each(|(i, j)| out[[i, j]] = spot_median_3x3(image, i, j));
    out
}

pub fn invert(image: &ArrayView2<u8>) -> Array2<u8> {
    image.mapv(|v| 255 - v)
}

/// Otsu's threshold: the level `t` maximising the between-class variance of
/// the two classes `<= t` and `> t`.
pub fn otsu_threshold(image: &ArrayView2<u8>) -> u8 {
    let mut hist = [0_u64; 256];
    image.iter().for_each(|&v| hist[v as usize] += 1);

    let total = image.len() as f64;
    let sum_all: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut weight_bg = 0.0;
    let mut sum_bg = 0.0;
    let mut best = (0_u8, -1.0_f64);
    for (level, &count) in hist.iter().enumerate() {
        weight_bg += count as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }
        sum_bg += level as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;
        let between = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);
        if between > best.1 {
            best = (level as u8, between);
        }
    }
    best.0
}

/// Pixels at or below `level`.
pub fn dark_pixels(image: &ArrayView2<u8>, level: u8) -> Array2<bool> {
    let mut out = Array2::from_elem(image.dim(), false);
    Zip::from(&mut out)
        .and(image)
        .for_each(|o, &v| *o = v <= level);
    out
}

/// Bilinear sample at `[x, y]` (column, row); `None` outside the image.
pub fn bilinear(image: &ArrayView2<u8>, pt: [f32; 2]) -> Option<f32> {
    let (rows, cols) = image.dim();
    let (x, y) = (pt[0], pt[1]);
    if x < 0.0 || y < 0.0 || x > (cols - 1) as f32 || y > (rows - 1) as f32 {
        return None;
    }
    let (x0, y0) = (x.floor() as usize, y.floor() as usize);
    let (x1, y1) = ((x0 + 1).min(cols - 1), (y0 + 1).min(rows - 1));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);
    let top = image[[y0, x0]] as f32 * (1.0 - fx) + image[[y0, x1]] as f32 * fx;
    let bottom = image[[y1, x0]] as f32 * (1.0 - fx) + image[[y1, x1]] as f32 * fx;
    Some(top * (1.0 - fy) + bottom * fy)
}
