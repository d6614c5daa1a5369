//! # Rendering Module
//!
//! Turns images into the bit rows a NIIMBOT printhead burns.
//!
//! ## Modules
//!
//! - [`dither`]: Threshold and Bayer 8x8 binarization, bit packing
//! - [`encoder`]: Orientation, row encoding and the page dimension invariant
//!
//! ## Usage Example
//!
//! ```
//! use niimbot::printer::DeviceProfile;
//! use niimbot::render::dither::Binarize;
//! use niimbot::render::encoder::{self, EncodeOptions, GrayRaster};
//!
//! let b1 = DeviceProfile::get("B1").unwrap();
//! let raster = GrayRaster::from_fn(384, 240, |x, _| if x < 192 { 0 } else { 255 });
//!
//! let options = EncodeOptions { binarize: Binarize::Bayer, ..Default::default() };
//! let page = encoder::encode(&raster, b1, &options)?;
//!
//! // page.page_size() goes out first, then one packet per row
//! assert_eq!(page.rows(), 240);
//! # Ok::<(), niimbot::error::NiimbotError>(())
//! ```

pub mod dither;
pub mod encoder;

pub use dither::Binarize;
pub use encoder::{EncodeOptions, EncodedImage, GrayRaster, Raster};
