//! # Label Profiles
//!
//! A label profile pairs a physical label size with a printer model: the
//! millimetre dimensions printed on the roll, the dot dimensions of the page
//! the printer will be asked for, and the orientation.
//!
//! Profiles are used two ways: picked by name from a list, or matched
//! against the dimensions read from a roll's RFID tag (see
//! [`detect`](super::detect)).
//!
//! ## Dimensions
//!
//! `width_mm`/`height_mm` are the label as the user sees it (landscape for
//! the D-series). `width_px`/`height_px` are the same label in dots at the
//! profile's DPI, before any rotation.
//!
//! ```
//! use niimbot::printer::LabelProfile;
//!
//! let d11 = LabelProfile::by_name("D11 30x12").unwrap();
//! assert_eq!((d11.width_px, d11.height_px), (240, 96));
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::config::PrintDirection;
use crate::protocol::response::RfidTag;

/// A known label/printer pairing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelProfile {
    pub name: &'static str,
    pub model: &'static str,
    pub width_mm: f32,
    pub height_mm: f32,
    pub width_px: u16,
    pub height_px: u16,
    pub dpi: u16,
    pub print_direction: PrintDirection,
}

macro_rules! label {
    ($name:literal, $model:literal, $w:literal x $h:literal, $wpx:literal x $hpx:literal, $dir:ident) => {
        LabelProfile {
            name: $name,
            model: $model,
            width_mm: $w,
            height_mm: $h,
            width_px: $wpx,
            height_px: $hpx,
            dpi: 203,
            print_direction: PrintDirection::$dir,
        }
    };
}

/// Built-in label profiles, in match priority order.
///
/// Order matters: when two profiles are equally close to an RFID reading
/// the one listed first wins.
pub static LABEL_PROFILES: &[LabelProfile] = &[
    label!("B1 50mm", "B1", 50.0 x 30.0, 384 x 240, Top),
    label!("B1 40x30", "B1", 40.0 x 30.0, 320 x 240, Top),
    label!("B1 50x50", "B1", 50.0 x 50.0, 384 x 400, Top),
    label!("B1 30x15", "B1", 30.0 x 15.0, 240 x 120, Top),
    label!("B21 50x30", "B21", 50.0 x 30.0, 384 x 240, Top),
    label!("B21 40x60", "B21", 40.0 x 60.0, 320 x 480, Top),
    label!("B3S 75x50", "B3S", 75.0 x 50.0, 576 x 400, Top),
    label!("B18 40x14", "B18", 40.0 x 14.0, 320 x 112, Left),
    label!("D11 30x12", "D11", 30.0 x 12.0, 240 x 96, Left),
    label!("D11 40x12", "D11", 40.0 x 12.0, 320 x 96, Left),
    label!("D11 22x12", "D11", 22.0 x 12.0, 176 x 96, Left),
    label!("D101 25x20", "D101", 25.0 x 20.0, 200 x 160, Left),
    label!("D110 30x15", "D110", 30.0 x 15.0, 240 x 96, Left),
];

impl LabelProfile {
    /// List all built-in profiles.
    pub fn all() -> &'static [LabelProfile] {
        LABEL_PROFILES
    }

    /// Built-in profiles for one printer model.
    pub fn for_model(model: &str) -> impl Iterator<Item = &'static LabelProfile> + '_ {
        LABEL_PROFILES
            .iter()
            .filter(move |p| p.model.eq_ignore_ascii_case(model))
    }

    /// Look up a built-in profile by its display name, ignoring case.
    pub fn by_name(name: &str) -> Option<&'static LabelProfile> {
        LABEL_PROFILES
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
    }
}

// ============================================================================
// RFID READINGS
// ============================================================================

/// What the roll's RFID tag told us, reduced to what detection needs.
///
/// Dimensions are optional: NIIMBOT tags carry a product barcode rather than
/// a size, so they are only known when the barcode is in the
/// [`RollCatalog`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RfidReading {
    pub width_mm: Option<f32>,
    pub height_mm: Option<f32>,
    #[serde(rename = "type")]
    pub label_type: u8,
    #[serde(default)]
    pub raw_data: Vec<u8>,
    #[serde(default)]
    pub product_code: String,
}

impl RfidReading {
    /// A reading with known dimensions, as produced by tests and manual
    /// entry.
    pub fn with_size(width_mm: f32, height_mm: f32) -> Self {
        Self {
            width_mm: Some(width_mm),
            height_mm: Some(height_mm),
            label_type: 1,
            ..Default::default()
        }
    }

    /// Build a reading from a parsed tag, resolving the size through the
    /// catalog.
    pub fn from_tag(tag: &RfidTag, catalog: &RollCatalog) -> Self {
        let size = catalog.lookup(&tag.barcode);
        Self {
            width_mm: size.map(|s| s.0),
            height_mm: size.map(|s| s.1),
            label_type: tag.label_type,
            raw_data: tag.raw.clone(),
            product_code: tag.barcode.clone(),
        }
    }
}

/// Product barcode → label size in millimetres.
///
/// Loaded from configuration; the printers never report sizes themselves.
///
/// ```
/// use niimbot::printer::RollCatalog;
///
/// let catalog: RollCatalog = serde_json::from_str(r#"{"02282280": [50.0, 30.0]}"#).unwrap();
/// assert_eq!(catalog.lookup("02282280"), Some((50.0, 30.0)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RollCatalog {
    sizes: HashMap<String, (f32, f32)>,
}

impl RollCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, barcode: impl Into<String>, width_mm: f32, height_mm: f32) {
        self.sizes.insert(barcode.into(), (width_mm, height_mm));
    }

    /// Exact barcode match.
    pub fn lookup(&self, barcode: &str) -> Option<(f32, f32)> {
        self.sizes.get(barcode.trim()).copied()
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}
