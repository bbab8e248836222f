use ndarray::{Array2, ArrayView2};
use slog::o;
use slog::Drain;
use slog::FnValue;
use slog::Logger;

/// A connected group of foreground pixels, stored as `(row, col)` pairs.
#[derive(Clone, Debug)]
pub struct Component {
    pub label: usize,
    pub pixels: Vec<[usize; 2]>,
}

impl Component {
    pub fn area(&self) -> usize {
        self.pixels.len()
    }

    /// Centroid in `[x, y]` (column, row) order.
    pub fn centroid(&self) -> [f32; 2] {
        let n = self.pixels.len().max(1) as f32;
        let (sx, sy) = self
            .pixels
            .iter()
            .fold((0.0_f32, 0.0_f32), |(sx, sy), px| {
                (sx + px[1] as f32, sy + px[0] as f32)
            });
        [sx / n, sy / n]
    }
}

///Calculate point-to-point distance.
pub(crate) fn pt_dist(pt1: &[f32; 2], pt2: &[f32; 2]) -> f32 {
    ((pt1[0] - pt2[0]) * (pt1[0] - pt2[0]) + (pt1[1] - pt2[1]) * (pt1[1] - pt2[1])).sqrt()
}

fn dfs(
    data: &ArrayView2<bool>,
    labeled: &mut Array2<usize>,
    row: usize,
    col: usize,
    c: usize,
    range: i32,
) -> Vec<[usize; 2]> {
    let mut node_stack = vec![(row, col)];
    let mut pixels = Vec::new();
    labeled[(row, col)] = c;

    while let Some(current_node) = node_stack.pop() {
        pixels.push([current_node.0, current_node.1]);
        for i in -range..=range {
            for j in -range..=range {
                if j == 0 && i == 0 {
                    continue;
                }
                let (nx, ny) = ((current_node.0 as i32 + i), (current_node.1 as i32 + j));

                if nx < 0
                    || nx > (data.dim().0 - 1) as i32
                    || ny < 0
                    || ny > (data.dim().1 - 1) as i32
                {
                    continue;
                }
                let (nx, ny) = (nx as usize, ny as usize);
                if data[(nx, ny)] && labeled[(nx, ny)] == 0 {
                    labeled[(nx, ny)] = c;
                    node_stack.push((nx, ny));
                }
            }
        }
    }
    pixels
}

/// Label the `true` pixels of `data` into connected components. `range` is the
/// neighbourhood radius, 1 gives 8-connectivity.
pub fn image_connected_components(data: &ArrayView2<bool>, range: i32) -> Vec<Component> {
    let mut set = 1;
    let mut labeled = Array2::<usize>::zeros(data.dim());
    let mut components = Vec::new();

    for i in 0..data.dim().0 {
        for j in 0..data.dim().1 {
            if data[(i, j)] && labeled[(i, j)] == 0 {
                let pixels = dfs(data, &mut labeled, i, j, set, range);
                components.push(Component { label: set, pixels });
                set += 1;
            }
        }
    }

    components
}

pub struct ImageUtil {}
impl ImageUtil {
    /// Copy an 8 bit array into a gray image, rows become image rows.
    pub fn array_to_gray(data: &ArrayView2<u8>) -> image::GrayImage {
        let (height, width) = data.dim();
        image::GrayImage::from_fn(width as u32, height as u32, |x, y| {
            image::Luma([data[(y as usize, x as usize)]])
        })
    }

    pub fn gray_to_array(image: &image::GrayImage) -> Array2<u8> {
        let (width, height) = image.dimensions();
        Array2::from_shape_fn((height as usize, width as usize), |(r, c)| {
            image.get_pixel(c as u32, r as u32)[0]
        })
    }

    pub fn read_gray(path: &str) -> Result<Array2<u8>, image::ImageError> {
        let image = image::open(path)?.into_luma8();
        Ok(ImageUtil::gray_to_array(&image))
    }
}

pub fn clamp(input: f32, min: f32, max: f32) -> f32 {
    debug_assert!(min <= max, "min must be less than or equal to max");
    if input < min {
        min
    } else if input > max {
        max
    } else {
        input
    }
}

pub fn set_log_config() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(
        drain,
        o!("place" =>
         FnValue(move |info| {
             format!("{}:{} {}",
                     info.file(),
                     info.line(),
                     info.module(),
                     )
         })
        ),
    )
}

#[cfg(test)]
mod tests {

    use super::{image_connected_components, ImageUtil};
    use crate::utils::set_log_config;
    use ndarray::{arr2, Array2};
    use slog::info;

    #[test]
    fn test_image_connected_components() {
        let log = set_log_config();
        let graph = arr2(&[
            [false, true, true, false, false],
            [false, false, true, false, false],
            [false, false, false, false, false],
            [false, false, false, false, true],
            [false, false, false, false, false],
        ]);

        let components = image_connected_components(&graph.view(), 1);

        info!(log, "n_components {:?}", components.len());
        assert_eq!(components.len(), 2);
        let mut first = components[0].pixels.clone();
        first.sort();
        assert_eq!(first, vec![[0, 1], [0, 2], [1, 2]]);
        assert_eq!(components[1].pixels, vec![[3, 4]]);
        assert_eq!(components[1].label, 2);
    }

    #[test]
    fn test_diagonal_pixels_are_connected() {
        let graph = arr2(&[[true, false], [false, true]]);
        let components = image_connected_components(&graph.view(), 1);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].area(), 2);
    }

    #[test]
    fn test_gray_round_trip_keeps_orientation() {
        let data = Array2::from_shape_fn((3, 5), |(r, c)| (r * 10 + c) as u8);
        let image = ImageUtil::array_to_gray(&data.view());
        assert_eq!(image.dimensions(), (5, 3));
        assert_eq!(image.get_pixel(4, 2)[0], 24);
        assert_eq!(ImageUtil::gray_to_array(&image), data);
    }
}
