//! Planar angle helpers. Rotation angles of the polarizer are orientations:
//! they live on a circle of period π.

use std::f64::consts::PI;

/// Signed angle from `reference` to `current`, both `[x, y]` vectors in image
/// coordinates (y pointing down).
pub fn signed_angle(reference: [f64; 2], current: [f64; 2]) -> f64 {
    let cross = current[0] * reference[1] - current[1] * reference[0];
    let dot = reference[0] * current[0] + reference[1] * current[1];
    cross.atan2(dot)
}

/// Reduce an angle into `[0, period)`.
pub fn wrap(angle: f64, period: f64) -> f64 {
    let w = angle.rem_euclid(period);
    if w >= period {
        0.0
    } else {
        w
    }
}

/// Smallest signed difference `a - b` between two orientations of period π.
pub fn diff_orientation(a: f64, b: f64) -> f64 {
    let a = wrap(a, PI);
    let b = wrap(b, PI);

    [a - b, (a + PI) - b, (a - PI) - b, a - (b + PI), a - (b - PI)]
        .into_iter()
        .fold(f64::INFINITY, |best, d| {
            if d.abs() < best.abs() {
                d
            } else {
                best
            }
        })
}

/// Signed difference `b - a` folded into `[-period/2, period/2)`.
pub fn diff_angles(a: f64, b: f64, period: f64) -> f64 {
    (b - a + period / 2.0).rem_euclid(period) - period / 2.0
}

/// Circular mean of `samples` whose period is `high - low`, returned in
/// `[low, high)`. `None` for an empty input.
pub fn circmean(samples: &[f64], high: f64, low: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let scale = 2.0 * PI / (high - low);
    let (s, c) = samples.iter().fold((0.0, 0.0), |(s, c), &x| {
        let phase = (x - low) * scale;
        (s + phase.sin(), c + phase.cos())
    });
    let mut res = s.atan2(c);
    if res < 0.0 {
        res += 2.0 * PI;
    }
    Some(wrap(res / scale, high - low) + low)
}

/// Mean of a set of `[x, y]` points.
pub fn centroid<'a, I>(points: I) -> Option<[f64; 2]>
where
    I: IntoIterator<Item = &'a [f32; 2]>,
{
    let (n, sx, sy) = points
        .into_iter()
        .fold((0_usize, 0.0, 0.0), |(n, sx, sy), p| {
            (n + 1, sx + p[0] as f64, sy + p[1] as f64)
        });
    if n == 0 {
        None
    } else {
        Some([sx / n as f64, sy / n as f64])
    }
}
