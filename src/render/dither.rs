//! # Binarization
//!
//! Thermal printheads only know "burn" or "don't burn", so every luminance
//! value has to become one bit. Two methods are offered:
//!
//! | Method | Best For | Artifacts |
//! |--------|----------|-----------|
//! | [`Binarize::Threshold`] | Text, barcodes, line art | Banding on gradients |
//! | [`Binarize::Bayer`] | Photos, logos with shading | Regular cross-hatch |
//!
//! ## Bit Packing
//!
//! - Bit 7 (MSB) = leftmost dot
//! - 1 = black (burn), 0 = white
//!
//! ```
//! use niimbot::render::dither::{pack_row, Binarize};
//!
//! let b = Binarize::default();
//! assert!(b.is_dark(0, 0, 20));     // near black
//! assert!(!b.is_dark(0, 0, 200));   // near white
//!
//! let row = vec![true, true, false, false, true, false, true, false];
//! assert_eq!(pack_row(&row), vec![0b11001010]);
//! ```

use serde::{Deserialize, Serialize};

/// Default luminance cutoff: below this is dark
pub const DEFAULT_THRESHOLD: u8 = 128;

/// Bayer 8x8 dithering matrix
///
/// Values range from 0-63; each appears once.
pub const BAYER8: [[u8; 8]; 8] = [
    [0, 32, 8, 40, 2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44, 4, 36, 14, 46, 6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [3, 35, 11, 43, 1, 33, 9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47, 7, 39, 13, 45, 5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

/// How luminance becomes a dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Binarize {
    /// `luminance < cutoff` prints
    Threshold { cutoff: u8 },
    /// Ordered dithering with [`BAYER8`]
    Bayer,
}

impl Default for Binarize {
    fn default() -> Self {
        Self::Threshold {
            cutoff: DEFAULT_THRESHOLD,
        }
    }
}

impl Binarize {
    /// Decide one dot. `x`/`y` only matter for dithering.
    #[inline]
    pub fn is_dark(&self, x: usize, y: usize, luminance: u8) -> bool {
        match *self {
            Self::Threshold { cutoff } => luminance < cutoff,
            Self::Bayer => {
                let intensity = (255 - luminance) as f32 / 255.0;
                intensity > bayer_threshold(x, y)
            }
        }
    }
}

/// Dithering threshold for a pixel position, in (0, 1).
///
/// ```text
/// threshold = (BAYER8[y mod 8][x mod 8] + 0.5) / 64
/// ```
///
/// The half step keeps full black always printing and full white never
/// printing.
#[inline]
pub fn bayer_threshold(x: usize, y: usize) -> f32 {
    let matrix_value = BAYER8[y & 7][x & 7];
    (matrix_value as f32 + 0.5) / 64.0
}

/// Pack dots into printhead bytes, leftmost dot in the high bit.
///
/// A trailing partial byte is padded with white.
pub fn pack_row(dots: &[bool]) -> Vec<u8> {
    dots.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .filter(|&(_, &black)| black)
                .fold(0u8, |byte, (bit, _)| byte | (0x80 >> bit))
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bayer_matrix_values() {
        let mut seen = [false; 64];
        for row in &BAYER8 {
            for &val in row {
                assert!(val < 64, "Matrix value {} out of range", val);
                assert!(!seen[val as usize], "Duplicate value {}", val);
                seen[val as usize] = true;
            }
        }
        assert!(seen.iter().all(|&s| s), "Not all values 0-63 present");
    }

    #[test]
    fn test_threshold_cutoff_is_exclusive() {
        let b = Binarize::Threshold { cutoff: 128 };
        assert!(b.is_dark(0, 0, 127));
        assert!(!b.is_dark(0, 0, 128));
    }

    #[test]
    fn test_bayer_extremes() {
        for y in 0..16 {
            for x in 0..16 {
                assert!(Binarize::Bayer.is_dark(x, y, 0), "black at ({},{})", x, y);
                assert!(!Binarize::Bayer.is_dark(x, y, 255), "white at ({},{})", x, y);
            }
        }
    }

    #[test]
    fn test_bayer_mid_gray_density() {
        let count = (0..8)
            .flat_map(|y| (0..8).map(move |x| (x, y)))
            .filter(|&(x, y)| Binarize::Bayer.is_dark(x, y, 128))
            .count();
        assert!((28..=36).contains(&count), "50% gray printed {} of 64", count);
    }

    #[test]
    fn test_pack_row_msb_first() {
        assert_eq!(pack_row(&[true, false, false, false, false, false, false, true]), vec![0x81]);
        assert_eq!(pack_row(&[false; 16]), vec![0x00, 0x00]);
    }

    #[test]
    fn test_pack_row_pads_with_white() {
        assert_eq!(pack_row(&[true; 12]), vec![0xFF, 0xF0]);
        assert_eq!(pack_row(&[false, true]), vec![0x40]);
        assert!(pack_row(&[]).is_empty());
    }

    #[test]
    fn test_binarize_config_json() {
        let b: Binarize = serde_json::from_str(r#"{"method":"threshold","cutoff":100}"#).unwrap();
        assert_eq!(b, Binarize::Threshold { cutoff: 100 });
        let b: Binarize = serde_json::from_str(r#"{"method":"bayer"}"#).unwrap();
        assert_eq!(b, Binarize::Bayer);
    }
}
