use itertools::Itertools;
use ndarray::Array2;

use crate::error::TrackerError;

/// Payload words of the square markers. Bit `r * bits + c` is the payload
/// cell at row `r`, column `c`; a set bit is a light cell.
#[derive(Clone, Debug)]
pub struct MarkerDictionary {
    bits: usize,
    codes: Vec<u64>,
}

/// Rotate a `bits x bits` word by 90 degrees clockwise (image coordinates).
pub(crate) fn rotate_word(word: u64, bits: usize) -> u64 {
    let mut out = 0_u64;
    for r in 0..bits {
        for c in 0..bits {
            let src = (bits - 1 - c) * bits + r;
            if word >> src & 1 == 1 {
                out |= 1 << (r * bits + c);
            }
        }
    }
    out
}

pub(crate) fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

fn rotations(word: u64, bits: usize) -> [u64; 4] {
    let r1 = rotate_word(word, bits);
    let r2 = rotate_word(r1, bits);
    let r3 = rotate_word(r2, bits);
    [word, r1, r2, r3]
}

impl MarkerDictionary {
    /// Scan payload words in ascending order and keep a word when its four
    /// rotations are mutually at least `min_distance` apart and it is at least
    /// `min_distance` away from every rotation of the words kept so far.
    pub fn generate(bits: usize, size: usize, min_distance: u32) -> Result<Self, TrackerError> {
        // payload words live in a u64 and are enumerated exhaustively
        if !(2..=7).contains(&bits) {
            return Err(TrackerError::InvalidMarkerBits { bits });
        }
        let n_words: u64 = 1 << (bits * bits);
        let mut codes: Vec<u64> = Vec::with_capacity(size);
        let mut taken: Vec<u64> = Vec::new();

        let mut word = 0_u64;
        while codes.len() < size && word < n_words {
            let rot = rotations(word, bits);
            let self_distinct = rot
                .iter()
                .tuple_combinations()
                .all(|(a, b)| hamming(*a, *b) >= min_distance);
            let far_from_taken = taken
                .iter()
                .all(|&t| rot.iter().all(|&r| hamming(r, t) >= min_distance));
            if self_distinct && far_from_taken {
                codes.push(word);
                taken.extend_from_slice(&rot);
            }
            word += 1;
        }

        if codes.len() < size {
            return Err(TrackerError::DictionaryTooSmall {
                requested: size,
                available: codes.len(),
            });
        }
        Ok(MarkerDictionary { bits, codes })
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn code(&self, id: usize) -> Option<u64> {
        self.codes.get(id).copied()
    }

    /// Match an observed payload word. Returns `(id, rotation, distance)` where
    /// the observed word equals the code rotated clockwise `rotation` times.
    pub fn identify(&self, observed: u64, max_hamming: u32) -> Option<(usize, usize, u32)> {
        self.codes
            .iter()
            .enumerate()
            .flat_map(|(id, &code)| {
                rotations(code, self.bits)
                    .into_iter()
                    .enumerate()
                    .map(move |(k, r)| (id, k, hamming(r, observed)))
            })
            .min_by_key(|&(_, _, d)| d)
            .filter(|&(_, _, d)| d <= max_hamming)
    }

    /// Canonical bitmap of marker `id`: `(bits + 2) * cell_px` square, 0 for
    /// dark and 255 for light cells, with a one cell dark border.
    pub fn render(&self, id: usize, cell_px: usize) -> Option<Array2<u8>> {
        let code = self.code(id)?;
        let cells = self.bits + 2;
        Some(Array2::from_shape_fn(
            (cells * cell_px, cells * cell_px),
            |(y, x)| {
                let (r, c) = (y / cell_px, x / cell_px);
                if r == 0 || c == 0 || r == cells - 1 || c == cells - 1 {
                    return 0;
                }
                let bit = (r - 1) * self.bits + (c - 1);
                if code >> bit & 1 == 1 {
                    255
                } else {
                    0
                }
            },
        ))
    }

    /// Paint marker `id` onto `canvas` centered at `[x, y]`, rotated by `angle`
    /// radians counter-clockwise on screen. Returns `false` for an unknown id.
    pub fn paint(
        &self,
        canvas: &mut Array2<u8>,
        id: usize,
        center: [f32; 2],
        cell_px: usize,
        angle: f32,
    ) -> bool {
        let marker = match self.render(id, cell_px) {
            Some(m) => m,
            None => return false,
        };
        let size = marker.dim().0 as f32;
        let half = size / 2.0;
        let (s, c) = angle.sin_cos();
        let reach = (half * 1.5) as i32;
        let (rows, cols) = canvas.dim();
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let (x, y) = (center[0] as i32 + dx, center[1] as i32 + dy);
                if x < 0 || y < 0 || x >= cols as i32 || y >= rows as i32 {
                    continue;
                }
                let (fx, fy) = (x as f32 - center[0], y as f32 - center[1]);
                // inverse rotation back into marker coordinates
                let u = c * fx - s * fy + half;
                let v = s * fx + c * fy + half;
                if u >= 0.0 && v >= 0.0 && u < size && v < size {
                    canvas[[y as usize, x as usize]] = marker[[v as usize, u as usize]];
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{hamming, rotate_word, MarkerDictionary};
    use crate::error::TrackerError;

    #[test]
    fn test_rotate_word() {
        // top-left cell of a 2x2 word moves to top-right
        assert_eq!(rotate_word(0b0001, 2), 0b0010);
        let word = 0b1011_0010_0110_1001;
        let mut r = word;
        for _ in 0..4 {
            r = rotate_word(r, 4);
        }
        assert_eq!(r, word);
    }

    #[test]
    fn test_generate_dictionary() {
        let dict = MarkerDictionary::generate(4, 16, 3).unwrap();
        assert_eq!(dict.len(), 16);
        for id in 0..dict.len() {
            let code = dict.code(id).unwrap();
            let r = rotate_word(code, 4);
            assert!(hamming(code, r) >= 3);
        }
    }

    #[test]
    fn test_identify_rotated() {
        let dict = MarkerDictionary::generate(4, 12, 3).unwrap();
        let code = dict.code(7).unwrap();
        let observed = rotate_word(rotate_word(code, 4), 4);
        assert_eq!(dict.identify(observed, 0), Some((7, 2, 0)));
        // one flipped bit is recovered only with tolerance
        let noisy = observed ^ 0b100;
        assert_eq!(dict.identify(noisy, 0), None);
        assert_eq!(dict.identify(noisy, 1), Some((7, 2, 1)));
    }

    #[test]
    fn test_too_small_dictionary() {
        assert!(MarkerDictionary::generate(2, 50, 2).is_err());
    }

    #[test]
    fn test_unsupported_payload_size() {
        for bits in [0, 1, 8, 9] {
            assert_eq!(
                MarkerDictionary::generate(bits, 4, 3).unwrap_err(),
                TrackerError::InvalidMarkerBits { bits }
            );
        }
    }

    #[test]
    fn test_render_has_dark_border() {
        let dict = MarkerDictionary::generate(4, 4, 3).unwrap();
        let img = dict.render(1, 3).unwrap();
        assert_eq!(img.dim(), (18, 18));
        assert!(img.row(0).iter().all(|&v| v == 0));
        assert!(img.column(17).iter().all(|&v| v == 0));
        assert!(dict.render(4, 3).is_none());
    }
}
