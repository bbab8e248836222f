use std::f32::consts::PI;

use ndarray::{Array3, ArrayView2, Axis, Zip};

/// HSV to RGB, all components in `[0, 1]`.
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [f32; 3] {
    if s == 0.0 {
        return [v, v, v];
    }
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match (sector as i32).rem_euclid(6) {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

/// Fiber orientation map: hue from direction, brightness from inclination.
/// Pixels outside `mask` are black. Output is `(rows, cols, 3)`.
pub fn render_fom(
    direction: &ArrayView2<f32>,
    inclination: &ArrayView2<f32>,
    mask: &ArrayView2<bool>,
) -> Array3<f32> {
    let (h, w) = direction.dim();
    let mut fom = Array3::<f32>::zeros((h, w, 3));
    Zip::from(fom.lanes_mut(Axis(2)))
        .and(direction)
        .and(inclination)
        .and(mask)
        .par_for_each(|mut px, &d, &inc, &m| {
            if !m {
                return;
            }
            let value = (1.0 - 2.0 * inc / PI).clamp(0.0, 1.0);
            let rgb = hsv_to_rgb(d / PI, 1.0, value);
            px.iter_mut().zip(rgb).for_each(|(o, c)| *o = c);
        });
    fom
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use assert_approx_eq::assert_approx_eq;
    use ndarray::{arr2, s};

    use super::{hsv_to_rgb, render_fom};

    #[test]
    fn test_hsv_sectors() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), [1.0, 0.0, 0.0]);
        let green = hsv_to_rgb(1.0 / 3.0, 1.0, 1.0);
        assert_approx_eq!(green[0], 0.0, 1e-6);
        assert_approx_eq!(green[1], 1.0, 1e-6);
        assert_approx_eq!(green[2], 0.0, 1e-6);
        let blue = hsv_to_rgb(2.0 / 3.0, 1.0, 0.5);
        assert_approx_eq!(blue[2], 0.5, 1e-6);
        assert_approx_eq!(blue[0], 0.0, 1e-6);
        assert_eq!(hsv_to_rgb(0.3, 0.0, 0.7), [0.7, 0.7, 0.7]);
    }

    #[test]
    fn test_render_fom() {
        let direction = arr2(&[[0.0_f32, PI / 3.0], [PI / 2.0, 0.0]]);
        let inclination = arr2(&[[0.0_f32, 0.0], [PI / 4.0, PI / 2.0]]);
        let mask = arr2(&[[true, true], [true, false]]);
        let fom = render_fom(&direction.view(), &inclination.view(), &mask.view());
        assert_eq!(fom.dim(), (2, 2, 3));
        // red at direction 0, flat fiber
        assert_eq!(fom.slice(s![0, 0, ..]).to_vec(), vec![1.0, 0.0, 0.0]);
        // half brightness at 45 degrees inclination
        assert_approx_eq!(fom[[1, 0, 0]].max(fom[[1, 0, 1]]).max(fom[[1, 0, 2]]), 0.5, 1e-6);
        // masked pixel is black
        assert!(fom.slice(s![1, 1, ..]).iter().all(|&v| v == 0.0));
        assert!(fom.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
}
