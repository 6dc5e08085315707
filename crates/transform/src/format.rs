//! Output formats accepted by the transform endpoints.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Target encoding for a transform.
///
/// `Jpg` and `Jpeg` are both accepted on the wire and encode identically;
/// [`ImageFormat::name`] reports `"jpeg"` for either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpg,
    Jpeg,
    Png,
    Webp,
    Jp2,
    Jxl,
    Avif,
}

impl ImageFormat {
    /// Every accepted format, in the order used for error messages.
    pub const ALL: [ImageFormat; 7] = [
        ImageFormat::Jpg,
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Webp,
        ImageFormat::Jp2,
        ImageFormat::Jxl,
        ImageFormat::Avif,
    ];

    /// Formats with a lossless compression mode.
    pub const LOSSLESS: [ImageFormat; 4] = [
        ImageFormat::Webp,
        ImageFormat::Avif,
        ImageFormat::Jxl,
        ImageFormat::Jp2,
    ];

    /// The identifier clients send.
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormat::Jpg => "jpg",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
            ImageFormat::Jp2 => "jp2",
            ImageFormat::Jxl => "jxl",
            ImageFormat::Avif => "avif",
        }
    }

    /// Canonical container name reported in metadata.
    pub fn name(self) -> &'static str {
        match self {
            ImageFormat::Jpg | ImageFormat::Jpeg => "jpeg",
            other => other.as_str(),
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpg | ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Jp2 => "image/jp2",
            ImageFormat::Jxl => "image/jxl",
            ImageFormat::Avif => "image/avif",
        }
    }

    pub fn supports_lossless(self) -> bool {
        Self::LOSSLESS.contains(&self)
    }

    /// `"jpg, jpeg, png, ..."` for the given set.
    pub fn list(formats: &[ImageFormat]) -> String {
        formats
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no supported format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFormat(pub String);

impl fmt::Display for UnknownFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown format {:?}, expected one of: {}",
            self.0,
            ImageFormat::list(&ImageFormat::ALL)
        )
    }
}

impl std::error::Error for UnknownFormat {}

impl FromStr for ImageFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        ImageFormat::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownFormat(s.to_string()))
    }
}
