//! # Image Encoder
//!
//! Turns a raster into the row stream a print job sends, together with the
//! page size declared before the rows.
//!
//! ## Pipeline
//!
//! ```text
//! Raster ──orient──► (cols × rows) ──binarize + pack──► Row[0..rows]
//!                                                          │
//!                     set_page_size(rows, cols) ◄──────────┘
//! ```
//!
//! ## Orientation
//!
//! `Top` printers take the raster as is. `Left` printers have the printhead
//! along the label's short side, so a landscape raster is turned 90° (in the
//! profile's [`Rotation`] direction) until its width equals the printhead.
//! A raster that already has the printhead width is taken as pre-rotated.
//! A page still wider than the printhead after orienting is rejected.
//!
//! ```text
//! D11, 30x12mm label:  240×96 raster ──rotate──► 96 cols × 240 rows
//! ```
//!
//! ## Dimension Invariant
//!
//! The declared `(rows, cols)`, the number of rows and the byte length of
//! every row all come out of [`encode`] together and are only readable from
//! the [`EncodedImage`]. A printer told a different size than it receives
//! either cuts the label short or prints nothing.
//!
//! ```
//! use niimbot::printer::DeviceProfile;
//! use niimbot::render::encoder::{self, EncodeOptions, GrayRaster};
//!
//! let d11 = DeviceProfile::get("D11").unwrap();
//! let raster = GrayRaster::new(240, 96, 255);
//!
//! let image = encoder::encode(&raster, d11, &EncodeOptions::default())?;
//! assert_eq!((image.rows(), image.cols()), (240, 96));
//! assert_eq!(image.row_bytes(), 12);
//! assert_eq!(image.len(), 240);
//! # Ok::<(), niimbot::error::NiimbotError>(())
//! ```

use image::{GrayImage, Luma};
use rayon::prelude::*;

use super::dither::{Binarize, pack_row};
use crate::error::NiimbotError;
use crate::printer::{DeviceProfile, PrintDirection, Rotation};
use crate::protocol::{Packet, commands};

// ============================================================================
// RASTER INPUT
// ============================================================================

/// A grayscale image: luminance 0 (black) to 255 (white).
pub trait Raster {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn luminance(&self, x: u32, y: u32) -> u8;
}

impl Raster for GrayImage {
    fn width(&self) -> u32 {
        self.width()
    }

    fn height(&self) -> u32 {
        self.height()
    }

    fn luminance(&self, x: u32, y: u32) -> u8 {
        self.get_pixel(x, y).0[0]
    }
}

/// Owned row-major luminance buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayRaster {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl GrayRaster {
    /// A raster filled with one luminance value.
    pub fn new(width: u32, height: u32, fill: u8) -> Self {
        Self {
            width,
            height,
            pixels: vec![fill; width as usize * height as usize],
        }
    }

    /// Build from a function of `(x, y)`.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn set(&mut self, x: u32, y: u32, luminance: u8) {
        let i = y as usize * self.width as usize + x as usize;
        self.pixels[i] = luminance;
    }
}

impl Raster for GrayRaster {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn luminance(&self, x: u32, y: u32) -> u8 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }
}

// ============================================================================
// ORIENTATION
// ============================================================================

/// How the raster is laid onto the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    AsIs,
    Rotate(Rotation),
}

impl Orientation {
    /// Pick the orientation for a `width × height` raster on `profile`.
    pub fn for_raster(width: u32, height: u32, profile: &DeviceProfile, rotation: Rotation) -> Self {
        let head = profile.printhead_pixels as u32;
        match profile.print_direction {
            PrintDirection::Top => Self::AsIs,
            PrintDirection::Left if width == head && height != head => Self::AsIs,
            PrintDirection::Left => Self::Rotate(rotation),
        }
    }

    /// Page dimensions `(cols, rows)` for a `width × height` source.
    pub fn page_dims(&self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Self::AsIs => (width, height),
            Self::Rotate(_) => (height, width),
        }
    }

    /// Source coordinates of page dot `(x, y)`.
    #[inline]
    fn source(&self, x: u32, y: u32, width: u32, height: u32) -> (u32, u32) {
        match self {
            Self::AsIs => (x, y),
            // page(x, y) = src(y, H-1-x): top source row lands on the right
            Self::Rotate(Rotation::Clockwise) => (y, height - 1 - x),
            // page(x, y) = src(W-1-y, x): top source row lands on the left
            Self::Rotate(Rotation::CounterClockwise) => (width - 1 - y, x),
        }
    }
}

// ============================================================================
// ENCODED OUTPUT
// ============================================================================

/// One scan line of the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub index: u16,
    pub bits: Vec<u8>,
}

impl Row {
    /// No dot in this row burns.
    pub fn is_blank(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }

    /// Black dots in each third of the row, saturating at 255.
    pub fn black_counts(&self) -> [u8; 3] {
        let part = self.bits.len().div_ceil(3).max(1);
        let mut counts = [0u8; 3];
        for (i, chunk) in self.bits.chunks(part).enumerate().take(3) {
            let n: u32 = chunk.iter().map(|b| b.count_ones()).sum();
            counts[i] = n.min(u8::MAX as u32) as u8;
        }
        counts
    }

    /// The packet that carries this row. With `compact`, a blank row goes
    /// out as the short empty-row command.
    pub fn to_packet(&self, compact: bool) -> Packet {
        if compact && self.is_blank() {
            commands::empty_row(self.index)
        } else {
            commands::bitmap_row(self.index, self.black_counts(), &self.bits)
        }
    }
}

/// Encoded page: rows in order plus the size declared to the printer.
///
/// Fields are private so the declaration and the rows cannot drift apart
/// after [`encode`] built them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    rows: u16,
    cols: u16,
    data: Vec<Row>,
}

impl EncodedImage {
    /// Declared row count
    pub fn rows(&self) -> u16 {
        self.rows
    }

    /// Declared dot count per row
    pub fn cols(&self) -> u16 {
        self.cols
    }

    /// Bytes per row: `ceil(cols / 8)`
    pub fn row_bytes(&self) -> usize {
        (self.cols as usize).div_ceil(8)
    }

    /// Number of encoded rows
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.data.iter()
    }

    /// The `set_page_size` command for this page.
    pub fn page_size(&self) -> Packet {
        commands::set_page_size(self.rows, self.cols)
    }

    /// Check the dimension invariant.
    ///
    /// ## Errors
    ///
    /// [`NiimbotError::DimensionMismatch`] if the row count, any row's
    /// length or any row index disagrees with the declaration.
    pub fn verify(&self) -> Result<(), NiimbotError> {
        let row_bytes = self.row_bytes();
        let consistent = self.data.len() == self.rows as usize
            && self
                .data
                .iter()
                .enumerate()
                .all(|(i, r)| r.index as usize == i && r.bits.len() == row_bytes);

        if consistent {
            return Ok(());
        }

        let bad_len = self
            .data
            .iter()
            .map(|r| r.bits.len())
            .find(|&n| n != row_bytes)
            .unwrap_or(row_bytes);
        Err(NiimbotError::DimensionMismatch {
            declared_rows: self.rows,
            declared_cols: self.cols,
            encoded_rows: self.data.len(),
            row_bytes: bad_len,
        })
    }

    /// Render the page back to pixels, as the printer will burn it.
    pub fn to_image(&self) -> GrayImage {
        let mut img = GrayImage::new(self.cols as u32, self.rows as u32);
        for row in &self.data {
            for x in 0..self.cols as usize {
                let is_black = (row.bits[x / 8] >> (7 - (x % 8))) & 1 == 1;
                let color = if is_black { 0u8 } else { 255u8 };
                img.put_pixel(x as u32, row.index as u32, Luma([color]));
            }
        }
        img
    }
}

impl<'a> IntoIterator for &'a EncodedImage {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

// ============================================================================
// ENCODING
// ============================================================================

/// Encoder settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    pub binarize: Binarize,
    /// Overrides the profile's rotation direction for `Left` printers
    pub rotation: Option<Rotation>,
}

/// Encode `raster` for `profile`.
///
/// Widths that are not a multiple of 8 are padded with white dots.
///
/// ## Errors
///
/// [`NiimbotError::Image`] for an empty raster or a page over 65535 dots in
/// either direction.
pub fn encode<R>(
    raster: &R,
    profile: &DeviceProfile,
    options: &EncodeOptions,
) -> Result<EncodedImage, NiimbotError>
where
    R: Raster + Sync + ?Sized,
{
    let (width, height) = (raster.width(), raster.height());
    if width == 0 || height == 0 {
        return Err(NiimbotError::Image(format!(
            "Raster has no area ({}x{})",
            width, height
        )));
    }

    let rotation = options.rotation.unwrap_or(profile.rotation);
    let orientation = Orientation::for_raster(width, height, profile, rotation);
    let (cols, rows) = orientation.page_dims(width, height);

    let (cols, rows) = match (u16::try_from(cols), u16::try_from(rows)) {
        (Ok(c), Ok(r)) => (c, r),
        _ => {
            return Err(NiimbotError::Image(format!(
                "Page {}x{} exceeds 65535 dots",
                cols, rows
            )));
        }
    };

    if orientation == Orientation::AsIs && profile.print_direction == PrintDirection::Left {
        tracing::debug!(width, height, "raster already in printhead orientation");
    }
    if cols > profile.printhead_pixels {
        return Err(NiimbotError::Image(format!(
            "Page is {} dots wide but the {} printhead has {}",
            cols, profile.model, profile.printhead_pixels
        )));
    }

    let binarize = options.binarize;
    let data: Vec<Row> = (0..rows)
        .into_par_iter()
        .map(|y| {
            let pixels: Vec<bool> = (0..cols as u32)
                .map(|x| {
                    let (sx, sy) = orientation.source(x, y as u32, width, height);
                    binarize.is_dark(x as usize, y as usize, raster.luminance(sx, sy))
                })
                .collect();
            Row {
                index: y,
                bits: pack_row(&pixels),
            }
        })
        .collect();

    let image = EncodedImage { rows, cols, data };
    image.verify()?;
    Ok(image)
}

// ============================================================================
// TESTS
// ============================================================================
