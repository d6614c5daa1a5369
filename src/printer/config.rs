//! # Device Profiles
//!
//! This module defines the hardware characteristics for supported NIIMBOT
//! printers.
//!
//! ## Supported Printers
//!
//! | Model | Printhead (dots) | Resolution | Direction | Density |
//! |-------|------------------|------------|-----------|---------|
//! | B1    | 384 | 203 DPI | top  | 1–5 |
//! | B18   | 120 | 203 DPI | left | 1–3 |
//! | B21   | 384 | 203 DPI | top  | 1–5 |
//! | B3S   | 576 | 203 DPI | top  | 1–5 |
//! | D11   | 96  | 203 DPI | left | 1–3 |
//! | D101  | 192 | 203 DPI | left | 1–3 |
//! | D110  | 96  | 203 DPI | left | 1–3 |
//!
//! ## Usage
//!
//! ```
//! use niimbot::printer::{DeviceProfile, PrintDirection};
//!
//! let d11 = DeviceProfile::get("d11").unwrap();
//! assert_eq!(d11.printhead_pixels, 96);
//! assert_eq!(d11.print_direction, PrintDirection::Left);
//! assert_eq!(d11.clamp_density(9), 3);
//! ```

use serde::{Deserialize, Serialize};

/// Which edge of the label faces the printhead.
///
/// `Top`: the printhead spans the image width, rows are fed top to bottom.
/// `Left`: the printhead spans the image height, so the image is rotated
/// 90° before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintDirection {
    Top,
    Left,
}

/// Which way a `Left` image is turned before encoding.
///
/// Both directions produce a page of the same size; they differ in which
/// end of the label comes out first. Validate against physical output when
/// adding a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    #[default]
    Clockwise,
    CounterClockwise,
}

/// # Device Profile
///
/// Defines the hardware characteristics of a printer model. Instances only
/// exist in the static [`DEVICE_PROFILES`] table.
///
/// ## Calculations
///
/// ```text
/// dots_per_mm = dpi / 25.4
///
/// For D11:
///   dots_per_mm = 203 / 25.4 ≈ 8
///   printhead = 96 dots ≈ 12mm
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceProfile {
    /// Model name as reported on the device label
    pub model: &'static str,

    /// Resolution in dots per inch
    pub dpi: u16,

    /// Number of dots across the printhead
    pub printhead_pixels: u16,

    /// Orientation of the printhead relative to the label
    pub print_direction: PrintDirection,

    /// Rotation applied when `print_direction` is `Left`
    pub rotation: Rotation,

    pub density_min: u8,
    pub density_max: u8,
    pub density_default: u8,

    /// Label length assumed when nothing else is known
    pub default_label_length_mm: u16,

    /// Longest label the feed accepts
    pub max_label_length_mm: u16,
}

/// Every supported model. Lookup is by [`DeviceProfile::get`].
pub static DEVICE_PROFILES: &[DeviceProfile] = &[
    DeviceProfile {
        model: "B1",
        dpi: 203,
        printhead_pixels: 384,
        print_direction: PrintDirection::Top,
        rotation: Rotation::Clockwise,
        density_min: 1,
        density_max: 5,
        density_default: 3,
        default_label_length_mm: 30,
        max_label_length_mm: 200,
    },
    DeviceProfile {
        model: "B18",
        dpi: 203,
        printhead_pixels: 120,
        print_direction: PrintDirection::Left,
        rotation: Rotation::Clockwise,
        density_min: 1,
        density_max: 3,
        density_default: 2,
        default_label_length_mm: 40,
        max_label_length_mm: 120,
    },
    DeviceProfile {
        model: "B21",
        dpi: 203,
        printhead_pixels: 384,
        print_direction: PrintDirection::Top,
        rotation: Rotation::Clockwise,
        density_min: 1,
        density_max: 5,
        density_default: 3,
        default_label_length_mm: 30,
        max_label_length_mm: 200,
    },
    DeviceProfile {
        model: "B3S",
        dpi: 203,
        printhead_pixels: 576,
        print_direction: PrintDirection::Top,
        rotation: Rotation::Clockwise,
        density_min: 1,
        density_max: 5,
        density_default: 3,
        default_label_length_mm: 50,
        max_label_length_mm: 200,
    },
    DeviceProfile {
        model: "D11",
        dpi: 203,
        printhead_pixels: 96,
        print_direction: PrintDirection::Left,
        rotation: Rotation::Clockwise,
        density_min: 1,
        density_max: 3,
        density_default: 2,
        default_label_length_mm: 30,
        max_label_length_mm: 100,
    },
    DeviceProfile {
        model: "D101",
        dpi: 203,
        printhead_pixels: 192,
        print_direction: PrintDirection::Left,
        rotation: Rotation::Clockwise,
        density_min: 1,
        density_max: 3,
        density_default: 2,
        default_label_length_mm: 30,
        max_label_length_mm: 100,
    },
    DeviceProfile {
        model: "D110",
        dpi: 203,
        printhead_pixels: 96,
        print_direction: PrintDirection::Left,
        rotation: Rotation::Clockwise,
        density_min: 1,
        density_max: 3,
        density_default: 2,
        default_label_length_mm: 30,
        max_label_length_mm: 100,
    },
];

impl DeviceProfile {
    /// Look up a model, ignoring ASCII case.
    pub fn get(model: &str) -> Option<&'static DeviceProfile> {
        DEVICE_PROFILES
            .iter()
            .find(|p| p.model.eq_ignore_ascii_case(model.trim()))
    }

    /// List all built-in profiles.
    pub fn all() -> &'static [DeviceProfile] {
        DEVICE_PROFILES
    }

    /// Clamp a requested density into `[density_min, density_max]`.
    #[inline]
    pub fn clamp_density(&self, density: u8) -> u8 {
        density.clamp(self.density_min, self.density_max)
    }

    /// Printhead width in bytes (8 dots per byte, rounded up)
    #[inline]
    pub fn printhead_bytes(&self) -> usize {
        (self.printhead_pixels as usize).div_ceil(8)
    }

    /// Calculate dots per millimeter
    #[inline]
    pub fn dots_per_mm(&self) -> f32 {
        self.dpi as f32 / 25.4
    }

    /// Convert millimeters to dots
    #[inline]
    pub fn mm_to_dots(&self, mm: f32) -> u16 {
        (mm * self.dots_per_mm()).round() as u16
    }

    /// Convert dots to millimeters
    #[inline]
    pub fn dots_to_mm(&self, dots: u16) -> f32 {
        dots as f32 / self.dots_per_mm()
    }

    /// Printhead width in millimeters
    #[inline]
    pub fn printhead_mm(&self) -> f32 {
        self.dots_to_mm(self.printhead_pixels)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_case_insensitive() {
        assert_eq!(DeviceProfile::get("b1").unwrap().model, "B1");
        assert_eq!(DeviceProfile::get(" D110 ").unwrap().model, "D110");
        assert!(DeviceProfile::get("P1").is_none());
    }

    #[test]
    fn test_b1_and_d11_facts() {
        let b1 = DeviceProfile::get("B1").unwrap();
        assert_eq!((b1.printhead_pixels, b1.dpi), (384, 203));
        assert_eq!(b1.print_direction, PrintDirection::Top);

        let d11 = DeviceProfile::get("D11").unwrap();
        assert_eq!((d11.printhead_pixels, d11.dpi), (96, 203));
        assert_eq!(d11.print_direction, PrintDirection::Left);

        // 14 mm labels at 203 dpi need more than 96 dots
        let b18 = DeviceProfile::get("B18").unwrap();
        assert_eq!((b18.printhead_pixels, b18.print_direction), (120, PrintDirection::Left));
    }

    #[test]
    fn test_table_is_consistent() {
        for p in DeviceProfile::all() {
            assert!(p.density_min <= p.density_default, "{}", p.model);
            assert!(p.density_default <= p.density_max, "{}", p.model);
            assert!(p.default_label_length_mm <= p.max_label_length_mm, "{}", p.model);
            // rows must fit the bitmap-row payload limit
            assert!(p.printhead_bytes() + 6 <= 255, "{}", p.model);
        }
    }

    #[test]
    fn test_models_unique() {
        let all = DeviceProfile::all();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert!(!a.model.eq_ignore_ascii_case(b.model));
            }
        }
    }

    #[test]
    fn test_clamp_density() {
        let b21 = DeviceProfile::get("B21").unwrap();
        assert_eq!(b21.clamp_density(0), 1);
        assert_eq!(b21.clamp_density(4), 4);
        assert_eq!(b21.clamp_density(200), 5);
    }

    #[test]
    fn test_mm_conversions() {
        let d11 = DeviceProfile::get("D11").unwrap();
        // 96 dots ≈ 12mm
        assert!((d11.printhead_mm() - 12.0).abs() < 0.1);
        assert_eq!(d11.mm_to_dots(30.0), 240);
    }
}
