//! The codec seam: every pixel operation the pipeline needs.
//!
//! [`Codec`] keeps the pipeline independent of the concrete image stack, so
//! tests can substitute a recording codec. [`ImageCodec`] is the production
//! implementation:
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP, GIF, TIFF, BMP) | `image::load_from_memory_with_format` |
//! | Resize | `DynamicImage::resize_exact`, `Lanczos3` |
//! | Grayscale | `DynamicImage::grayscale` |
//! | Rotate, quarter turns | `DynamicImage::rotate90/180/270` |
//! | Rotate, other angles | `imageproc::geometric_transformations::rotate_about_center` on an expanded canvas |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//! | Encode → PNG | `image::codecs::png` via `write_to` |
//! | Encode → WebP | `webp::Encoder` (libwebp), lossy or lossless |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e) |
//!
//! JP2 and JXL are accepted by validation but have no encoder compiled in;
//! encoding to them fails with [`CodecError::UnsupportedFormat`].
use std::io::Cursor;

use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::format::ImageFormat;

/// Largest pixel count any intermediate buffer may hold (8192²).
pub const MAX_PIXELS: u64 = 64 * 1024 * 1024;

/// Dimensions, byte size and container of an encoded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub size: usize,
    pub format: String,
}

/// Target encoding settings.
///
/// `lossless` is `None` unless lossless output was explicitly requested;
/// codecs must treat `None` as "use the format's normal mode".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub format: ImageFormat,
    pub quality: u8,
    pub lossless: Option<bool>,
}

impl EncodeOptions {
    pub fn wants_lossless(&self) -> bool {
        self.lossless == Some(true)
    }
}

/// Encoder output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub metadata: ImageMetadata,
}

/// Pixel operations used by [`Pipeline`](crate::Pipeline).
pub trait Codec: Send + Sync {
    /// Decode a complete image file and describe it.
    fn decode(&self, bytes: &[u8]) -> Result<(DynamicImage, ImageMetadata), CodecError>;

    /// Resize to exactly `width` x `height`.
    fn resize(
        &self,
        image: DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage, CodecError>;

    fn grayscale(&self, image: DynamicImage) -> Result<DynamicImage, CodecError>;

    /// Rotate clockwise by `degrees`.
    fn rotate(&self, image: DynamicImage, degrees: f64) -> Result<DynamicImage, CodecError>;

    fn encode(&self, image: &DynamicImage, options: &EncodeOptions)
        -> Result<Encoded, CodecError>;
}

/// AV1 encoder speed (0 slowest .. 10 fastest).
const AVIF_SPEED: u8 = 6;

/// Production codec built on the `image` ecosystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec;

impl ImageCodec {
    pub fn new() -> Self {
        Self
    }
}

/// Container name for a detected input format.
fn container_name(format: image::ImageFormat) -> String {
    match format {
        image::ImageFormat::Jpeg => "jpeg".to_string(),
        image::ImageFormat::Png => "png".to_string(),
        image::ImageFormat::WebP => "webp".to_string(),
        image::ImageFormat::Gif => "gif".to_string(),
        image::ImageFormat::Tiff => "tiff".to_string(),
        image::ImageFormat::Bmp => "bmp".to_string(),
        image::ImageFormat::Avif => "avif".to_string(),
        other => format!("{other:?}").to_ascii_lowercase(),
    }
}

fn is_gray(color: ColorType) -> bool {
    matches!(
        color,
        ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16
    )
}

/// Rotate by an angle that is not a quarter turn.
///
/// The source is centred on a square canvas large enough for any angle,
/// rotated there, then cropped to the rotated bounding box. Uncovered
/// corners are transparent black. Fails when the canvas would exceed
/// [`MAX_PIXELS`].
fn rotate_free(image: &DynamicImage, degrees: f64) -> Result<DynamicImage, CodecError> {
    let (w, h) = (f64::from(image.width()), f64::from(image.height()));
    let radians = degrees.to_radians();
    let (sin, cos) = radians.sin_cos();
    let out_w = (w * cos.abs() + h * sin.abs()).round().max(1.0) as u32;
    let out_h = (w * sin.abs() + h * cos.abs()).round().max(1.0) as u32;

    let side = (w.hypot(h).ceil() as u32).max(out_w).max(out_h);
    if u64::from(side) * u64::from(side) > MAX_PIXELS {
        return Err(CodecError::InvalidOperation(format!(
            "rotating {}x{} by {degrees} needs a {side}x{side} canvas",
            image.width(),
            image.height()
        )));
    }
    let background = Rgba([0, 0, 0, 0]);
    let mut canvas = RgbaImage::from_pixel(side, side, background);
    let x = i64::from((side - image.width()) / 2);
    let y = i64::from((side - image.height()) / 2);
    imageops::overlay(&mut canvas, &image.to_rgba8(), x, y);

    let rotated = rotate_about_center(&canvas, radians as f32, Interpolation::Bilinear, background);
    let cropped = imageops::crop_imm(
        &rotated,
        (side - out_w) / 2,
        (side - out_h) / 2,
        out_w,
        out_h,
    )
    .to_image();

    let rotated = DynamicImage::ImageRgba8(cropped);
    if is_gray(image.color()) {
        Ok(rotated.grayscale())
    } else {
        Ok(rotated)
    }
}

fn encode_failed(format: ImageFormat, reason: impl ToString) -> CodecError {
    CodecError::Encode {
        format: format.name().to_string(),
        reason: reason.to_string(),
    }
}

impl Codec for ImageCodec {
    fn decode(&self, bytes: &[u8]) -> Result<(DynamicImage, ImageMetadata), CodecError> {
        let format = image::guess_format(bytes)
            .map_err(|e| CodecError::Decode(format!("unrecognized container: {e}")))?;
        let decoded = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        let metadata = ImageMetadata {
            width: decoded.width(),
            height: decoded.height(),
            size: bytes.len(),
            format: container_name(format),
        };
        Ok((decoded, metadata))
    }

    fn resize(
        &self,
        image: DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage, CodecError> {
        if width == 0 || height == 0 {
            return Err(CodecError::InvalidOperation(format!(
                "cannot resize to {width}x{height}"
            )));
        }
        Ok(image.resize_exact(width, height, FilterType::Lanczos3))
    }

    fn grayscale(&self, image: DynamicImage) -> Result<DynamicImage, CodecError> {
        Ok(image.grayscale())
    }

    fn rotate(&self, image: DynamicImage, degrees: f64) -> Result<DynamicImage, CodecError> {
        if !degrees.is_finite() {
            return Err(CodecError::InvalidOperation(format!(
                "cannot rotate by {degrees}"
            )));
        }
        let turn = degrees.rem_euclid(360.0);
        let rotated = if turn == 0.0 {
            image
        } else if turn == 90.0 {
            image.rotate90()
        } else if turn == 180.0 {
            image.rotate180()
        } else if turn == 270.0 {
            image.rotate270()
        } else {
            rotate_free(&image, turn)?
        };
        Ok(rotated)
    }

    fn encode(
        &self,
        image: &DynamicImage,
        options: &EncodeOptions,
    ) -> Result<Encoded, CodecError> {
        let format = options.format;
        let mut bytes = Vec::new();

        match format {
            ImageFormat::Jpg | ImageFormat::Jpeg => {
                if options.wants_lossless() {
                    return Err(CodecError::InvalidOperation(
                        "jpeg has no lossless mode".to_string(),
                    ));
                }
                // JPEG carries neither alpha nor 16-bit samples.
                let flat = if is_gray(image.color()) {
                    DynamicImage::ImageLuma8(image.to_luma8())
                } else {
                    DynamicImage::ImageRgb8(image.to_rgb8())
                };
                let encoder = JpegEncoder::new_with_quality(&mut bytes, options.quality);
                flat.write_with_encoder(encoder)
                    .map_err(|e| encode_failed(format, e))?;
            }
            ImageFormat::Png => {
                image
                    .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
                    .map_err(|e| encode_failed(format, e))?;
            }
            ImageFormat::Webp => {
                let (width, height) = (image.width(), image.height());
                let memory = if image.color().has_alpha() {
                    let rgba = image.to_rgba8();
                    webp::Encoder::from_rgba(rgba.as_raw(), width, height)
                        .encode_simple(options.wants_lossless(), f32::from(options.quality))
                        .map_err(|e| encode_failed(format, format!("{e:?}")))?
                } else {
                    let rgb = image.to_rgb8();
                    webp::Encoder::from_rgb(rgb.as_raw(), width, height)
                        .encode_simple(options.wants_lossless(), f32::from(options.quality))
                        .map_err(|e| encode_failed(format, format!("{e:?}")))?
                };
                bytes.extend_from_slice(&memory);
            }
            ImageFormat::Avif => {
                // rav1e has no true lossless mode; maximum quality is the closest.
                let quality = if options.wants_lossless() {
                    100
                } else {
                    options.quality
                };
                let encoder = AvifEncoder::new_with_speed_quality(&mut bytes, AVIF_SPEED, quality);
                DynamicImage::ImageRgba8(image.to_rgba8())
                    .write_with_encoder(encoder)
                    .map_err(|e| encode_failed(format, e))?;
            }
            ImageFormat::Jp2 | ImageFormat::Jxl => {
                return Err(CodecError::UnsupportedFormat(format.name().to_string()));
            }
        }

        let metadata = ImageMetadata {
            width: image.width(),
            height: image.height(),
            size: bytes.len(),
            format: format.name().to_string(),
        };
        Ok(Encoded { bytes, metadata })
    }
}
