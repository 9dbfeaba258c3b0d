//! Output format and crop mode definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Output formats a transform may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
    Gif,
}

impl OutputFormat {
    /// Canonical name used in transform strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
            OutputFormat::Avif => "avif",
            OutputFormat::Gif => "gif",
        }
    }

    /// Lossy formats built for the web; an explicit request routes to a
    /// format-specific processor.
    pub fn is_lossy_web(&self) -> bool {
        matches!(self, OutputFormat::Webp | OutputFormat::Avif)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::Webp),
            "avif" => Ok(OutputFormat::Avif),
            "gif" => Ok(OutputFormat::Gif),
            _ => Err(FormatParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown format: {0}")]
pub struct FormatParseError(String);

/// How the source is fitted into the requested box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CropMode {
    /// Scale down to fit inside the box, preserving aspect ratio.
    Fit,
    /// Cover the box, cropping overflow.
    Fill,
    /// Cut the exact box out of the source.
    Crop,
    /// Fit inside the box and pad the remainder.
    Pad,
    /// Stretch to the box, ignoring aspect ratio.
    Scale,
}

impl CropMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CropMode::Fit => "fit",
            CropMode::Fill => "fill",
            CropMode::Crop => "crop",
            CropMode::Pad => "pad",
            CropMode::Scale => "scale",
        }
    }

    /// Modes that are meaningless unless both width and height are known.
    pub fn requires_both_dimensions(&self) -> bool {
        matches!(self, CropMode::Fill | CropMode::Crop | CropMode::Pad)
    }
}

impl fmt::Display for CropMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CropMode {
    type Err = CropModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fit" => Ok(CropMode::Fit),
            "fill" => Ok(CropMode::Fill),
            "crop" => Ok(CropMode::Crop),
            "pad" => Ok(CropMode::Pad),
            "scale" => Ok(CropMode::Scale),
            _ => Err(CropModeParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown crop mode: {0}")]
pub struct CropModeParseError(String);
