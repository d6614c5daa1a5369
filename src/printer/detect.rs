//! # Label Profile Detection
//!
//! Matches an [`RfidReading`] against the label profile registry.
//!
//! ## Matching Rules
//!
//! 1. No reading at all → [`DetectError::NoTag`]
//! 2. Missing, zero, negative or non-finite dimension →
//!    [`DetectError::InvalidReading`]
//! 3. A profile with exactly the read `(width_mm, height_mm)` → confidence `1.0`
//! 4. Otherwise the profile within ±1 mm on both axes with the smallest total
//!    deviation. Confidence falls linearly with the deviation and stays
//!    strictly below `1.0`
//! 5. Nothing within tolerance → [`DetectError::UnknownLabel`], confidence `0.0`
//!
//! Ties are broken by registry order: the profile listed first wins.
//!
//! ## Example
//!
//! ```
//! use niimbot::printer::{ProfileDetector, RfidReading};
//!
//! let detector = ProfileDetector::default();
//!
//! let exact = detector.detect(Some(&RfidReading::with_size(50.0, 30.0)))?;
//! assert_eq!(exact.profile.name, "B1 50mm");
//! assert_eq!(exact.confidence, 1.0);
//!
//! let fuzzy = detector.detect(Some(&RfidReading::with_size(50.5, 30.5)))?;
//! assert_eq!(fuzzy.profile.name, "B1 50mm");
//! assert!(fuzzy.confidence < 1.0);
//! # Ok::<(), niimbot::printer::DetectError>(())
//! ```

use serde::Serialize;
use thiserror::Error;

use super::label::{LABEL_PROFILES, LabelProfile, RfidReading};

/// Per-axis tolerance for fuzzy matches
pub const TOLERANCE_MM: f64 = 1.0;

/// Confidence of a fuzzy match with (almost) zero deviation
const FUZZY_CEILING: f64 = 0.99;

/// Confidence lost per millimetre of total deviation
const FUZZY_DECAY: f64 = 0.2;

/// Floor for any positive match
const MIN_CONFIDENCE: f64 = 0.05;

/// Why detection did not produce a profile.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectError {
    /// The printer reported no tag on the roll
    #[error("No RFID tag detected. Load a genuine label roll or pick the label manually")]
    NoTag,

    /// The tag was read but its dimensions are unusable
    #[error("Invalid RFID reading: {0}")]
    InvalidReading(String),

    /// The dimensions are valid but match no known label
    #[error("Unknown label size {width_mm}x{height_mm}mm. Pick the label manually")]
    UnknownLabel { width_mm: f32, height_mm: f32 },
}

/// A successful match.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection<'a> {
    pub profile: &'a LabelProfile,
    pub confidence: f64,
    /// Total absolute deviation in mm (0 for an exact match)
    pub deviation_mm: f64,
}

/// Detection outcome in the shape the surrounding application consumes.
///
/// ```json
/// {"success": true, "detected_profile": {...}, "rfid_data": {...},
///  "confidence": 1.0, "error": null}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub success: bool,
    pub detected_profile: Option<LabelProfile>,
    pub rfid_data: Option<RfidReading>,
    pub confidence: f64,
    pub error: Option<String>,
}

/// Matches readings against a set of label profiles.
#[derive(Debug, Clone, Copy)]
pub struct ProfileDetector<'a> {
    profiles: &'a [LabelProfile],
    model: Option<&'a str>,
}

impl Default for ProfileDetector<'static> {
    fn default() -> Self {
        Self::new(LABEL_PROFILES)
    }
}

impl<'a> ProfileDetector<'a> {
    pub fn new(profiles: &'a [LabelProfile]) -> Self {
        Self {
            profiles,
            model: None,
        }
    }

    /// Only consider profiles for this printer model.
    pub fn for_model(mut self, model: &'a str) -> Self {
        self.model = Some(model);
        self
    }

    fn candidates(&self) -> impl Iterator<Item = &'a LabelProfile> + '_ {
        let profiles = self.profiles;
        profiles.iter().filter(move |p| match self.model {
            Some(m) => p.model.eq_ignore_ascii_case(m),
            None => true,
        })
    }

    /// Match a reading. `None` means the printer found no tag.
    pub fn detect(&self, reading: Option<&RfidReading>) -> Result<Detection<'a>, DetectError> {
        let reading = reading.ok_or(DetectError::NoTag)?;
        let (width, height) = validate(reading)?;

        // Exact
        if let Some(profile) = self
            .candidates()
            .find(|p| p.width_mm == width && p.height_mm == height)
        {
            return Ok(Detection {
                profile,
                confidence: 1.0,
                deviation_mm: 0.0,
            });
        }

        // Fuzzy: strict `<` keeps the earliest of equally close profiles
        let mut best: Option<(&'a LabelProfile, f64)> = None;
        for profile in self.candidates() {
            let dw = (profile.width_mm as f64 - width as f64).abs();
            let dh = (profile.height_mm as f64 - height as f64).abs();
            if dw > TOLERANCE_MM || dh > TOLERANCE_MM {
                continue;
            }
            let deviation = dw + dh;
            if best.is_none_or(|(_, d)| deviation < d) {
                best = Some((profile, deviation));
            }
        }

        match best {
            Some((profile, deviation)) => Ok(Detection {
                profile,
                confidence: fuzzy_confidence(deviation),
                deviation_mm: deviation,
            }),
            None => Err(DetectError::UnknownLabel {
                width_mm: width,
                height_mm: height,
            }),
        }
    }

    /// [`detect`](Self::detect), folded into a [`DetectionResult`].
    pub fn detect_result(&self, reading: Option<&RfidReading>) -> DetectionResult {
        match self.detect(reading) {
            Ok(found) => DetectionResult {
                success: true,
                detected_profile: Some(found.profile.clone()),
                rfid_data: reading.cloned(),
                confidence: found.confidence,
                error: None,
            },
            Err(e) => DetectionResult {
                success: false,
                detected_profile: None,
                rfid_data: reading.cloned(),
                confidence: 0.0,
                error: Some(e.to_string()),
            },
        }
    }
}

fn validate(reading: &RfidReading) -> Result<(f32, f32), DetectError> {
    let check = |axis: &str, v: Option<f32>| match v {
        None => Err(DetectError::InvalidReading(format!("missing {}", axis))),
        Some(v) if !v.is_finite() || v <= 0.0 => {
            Err(DetectError::InvalidReading(format!("{} is {}", axis, v)))
        }
        Some(v) => Ok(v),
    };
    Ok((
        check("width", reading.width_mm)?,
        check("height", reading.height_mm)?,
    ))
}

/// Linear decay from just under 1.0, floored at [`MIN_CONFIDENCE`].
fn fuzzy_confidence(deviation_mm: f64) -> f64 {
    (FUZZY_CEILING - FUZZY_DECAY * deviation_mm).max(MIN_CONFIDENCE)
}

// ============================================================================
// TESTS
// ============================================================================
