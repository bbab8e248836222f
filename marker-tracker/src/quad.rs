use ndarray::{Array2, ArrayView2};

use crate::filters::bilinear;
use crate::utils::pt_dist;

/// Four corners `[x, y]` ordered clockwise in image coordinates.
pub type Quad = [[f32; 2]; 4];

/// Estimate the four corners of a square blob from its pixels (`(row, col)`).
///
/// The first corner is the pixel farthest from the centroid, the second the
/// pixel farthest from the first (the opposite corner). The remaining two are
/// the pixels farthest from that diagonal on either side of it.
pub fn extract_corners(pixels: &[[usize; 2]], centroid: [f32; 2]) -> Option<Quad> {
    if pixels.len() < 4 {
        return None;
    }
    let pts: Vec<[f32; 2]> = pixels
        .iter()
        .map(|p| [p[1] as f32, p[0] as f32])
        .collect();

    let farthest = |from: [f32; 2]| {
        pts.iter()
            .copied()
            .fold((from, -1.0_f32), |(best, best_d), p| {
                let d = pt_dist(&p, &from);
                if d > best_d {
                    (p, d)
                } else {
                    (best, best_d)
                }
            })
            .0
    };
    let a = farthest(centroid);
    let c = farthest(a);

    let (dx, dy) = (c[0] - a[0], c[1] - a[1]);
    let diag = (dx * dx + dy * dy).sqrt();
    if diag < 2.0 {
        return None;
    }
    let side = |p: [f32; 2]| (dx * (p[1] - a[1]) - dy * (p[0] - a[0])) / diag;

    let (mut b, mut b_d) = (a, 0.0_f32);
    let (mut d, mut d_d) = (a, 0.0_f32);
    for &p in &pts {
        let s = side(p);
        if s > b_d {
            b = p;
            b_d = s;
        } else if -s > d_d {
            d = p;
            d_d = -s;
        }
    }
    // a flat blob has no corner on one of the sides
    if b_d < 0.25 * diag || d_d < 0.25 * diag {
        return None;
    }

    let mut quad = [a, b, c, d];
    let center = [
        quad.iter().map(|p| p[0]).sum::<f32>() / 4.0,
        quad.iter().map(|p| p[1]).sum::<f32>() / 4.0,
    ];
    quad.sort_by(|p, q| {
        let ap = (p[1] - center[1]).atan2(p[0] - center[0]);
        let aq = (q[1] - center[1]).atan2(q[0] - center[0]);
        ap.total_cmp(&aq)
    });
    Some(quad)
}

/// Map unit square coordinates `(u, v)` onto the quad; `u` runs from corner 0
/// to corner 1, `v` from corner 0 to corner 3.
pub fn bilinear_point(quad: &Quad, u: f32, v: f32) -> [f32; 2] {
    let w = [(1.0 - u) * (1.0 - v), u * (1.0 - v), u * v, (1.0 - u) * v];
    let mut out = [0.0_f32; 2];
    for (p, wi) in quad.iter().zip(w) {
        out[0] += p[0] * wi;
        out[1] += p[1] * wi;
    }
    out
}

/// Sample the centers of a `cells x cells` grid spanned by the quad.
pub fn sample_grid(image: &ArrayView2<u8>, quad: &Quad, cells: usize) -> Option<Array2<f32>> {
    let mut out = Array2::<f32>::zeros((cells, cells));
    for r in 0..cells {
        for c in 0..cells {
            let u = (c as f32 + 0.5) / cells as f32;
            let v = (r as f32 + 0.5) / cells as f32;
            out[[r, c]] = bilinear(image, bilinear_point(quad, u, v))?;
        }
    }
    Some(out)
}

/// Rotate the corner order left by `k`, so the new corner 0 is the old `k`.
pub fn rotate_corners(quad: &Quad, k: usize) -> Quad {
    let mut out = *quad;
    out.rotate_left(k % 4);
    out
}

/// Shoelace area.
pub fn quad_area(quad: &Quad) -> f32 {
    let mut acc = 0.0;
    for i in 0..4 {
        let (p, q) = (quad[i], quad[(i + 1) % 4]);
        acc += p[0] * q[1] - q[0] * p[1];
    }
    acc.abs() / 2.0
}
