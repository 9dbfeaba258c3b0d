//! Transform descriptor grammar.
//!
//! A transform string is either one of the "original" aliases (`""`, `_`,
//! `original`) or a comma-separated list of `key_value` pairs:
//!
//! | key  | meaning              | constraint            |
//! |------|----------------------|-----------------------|
//! | `w`  | width                | 1..=10000             |
//! | `h`  | height               | 1..=10000             |
//! | `q`  | quality              | 1..=100               |
//! | `f`  | output format        | [`OutputFormat`]      |
//! | `c`  | crop/fit mode        | [`CropMode`]          |
//! | `wm` | watermark text       | at most 100 chars     |
//! | `p`  | document page        | 1..=9999              |
//!
//! Parsing checks syntax and per-field ranges; [`TransformDescriptor::validate`]
//! checks cross-field constraints.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::format::{CropMode, OutputFormat};

pub const MAX_DIMENSION: u32 = 10_000;
pub const MAX_QUALITY: u32 = 100;
pub const MAX_PAGE: u32 = 9_999;
pub const MAX_WATERMARK_CHARS: usize = 100;
pub const MAX_TOTAL_PIXELS: u64 = 25_000_000;

/// Bounding boxes at or under this size on every supplied side go to the
/// thumbnail processor.
pub const THUMBNAIL_MAX_DIMENSION: u32 = 256;

/// Length of the truncated hex digest used as cache key.
pub const CACHE_KEY_LEN: usize = 16;

/// Canonical string of the default descriptor.
pub const ORIGINAL: &str = "original";

/// Processor names resolved by [`TransformDescriptor::processor_name`].
pub mod processors {
    pub const RESIZE: &str = "resize";
    pub const THUMBNAIL: &str = "thumbnail";
    pub const WATERMARK: &str = "watermark";
    pub const DOCUMENT: &str = "document";
    pub const WEBP: &str = "webp";
    pub const AVIF: &str = "avif";
}

/// Content types that are paginated documents.
const PAGINATED_CONTENT_TYPES: &[&str] = &["application/pdf"];

/// Errors produced while parsing or validating a transform string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("invalid transform format: '{0}' (expected key_value)")]
    MalformedPair(String),

    #[error("unknown transform key: '{0}'")]
    UnknownKey(String),

    #[error("duplicate transform key: '{0}'")]
    DuplicateKey(String),

    #[error("invalid {field} value: '{value}' (expected a positive integer)")]
    InvalidNumber { field: &'static str, value: String },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: u32,
        max: u32,
    },

    #[error("unsupported format: '{0}'")]
    UnknownFormat(String),

    #[error("unsupported crop mode: '{0}'")]
    UnknownCropMode(String),

    #[error("watermark text must be at most {max} characters")]
    WatermarkTooLong { max: usize },

    #[error("watermark text must not be empty or contain ','")]
    InvalidWatermark,

    #[error("requested dimensions exceed {max} pixels")]
    TooManyPixels { max: u64 },

    #[error("crop mode '{0}' requires both width and height")]
    CropNeedsBothDimensions(CropMode),
}

/// Whether a raw transform string means "serve the source unmodified".
pub fn is_original_alias(raw: &str) -> bool {
    matches!(raw, "" | "_" | ORIGINAL)
}

/// Parsed, typed form of a transform string.
///
/// Every field is optional; the all-`None` descriptor means "serve original".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct TransformDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl TransformDescriptor {
    /// The "serve original" descriptor.
    pub fn original() -> Self {
        Self::default()
    }

    /// Parse a transform string.
    pub fn parse(raw: &str) -> Result<Self, TransformError> {
        if is_original_alias(raw) {
            return Ok(Self::original());
        }

        let mut descriptor = Self::default();

        for pair in raw.split(',') {
            let (key, value) = match pair.split_once('_') {
                Some((k, v)) if !k.is_empty() && !v.is_empty() => (k, v),
                _ => return Err(TransformError::MalformedPair(pair.to_string())),
            };

            match key {
                "w" => {
                    let v = parse_bounded("width", value, 1, MAX_DIMENSION)?;
                    set_once(&mut descriptor.width, v, key)?;
                }
                "h" => {
                    let v = parse_bounded("height", value, 1, MAX_DIMENSION)?;
                    set_once(&mut descriptor.height, v, key)?;
                }
                "q" => {
                    let v = parse_bounded("quality", value, 1, MAX_QUALITY)?;
                    set_once(&mut descriptor.quality, v, key)?;
                }
                "p" => {
                    let v = parse_bounded("page", value, 1, MAX_PAGE)?;
                    set_once(&mut descriptor.page, v, key)?;
                }
                "f" => {
                    let v = value
                        .parse::<OutputFormat>()
                        .map_err(|_| TransformError::UnknownFormat(value.to_string()))?;
                    set_once(&mut descriptor.format, v, key)?;
                }
                "c" => {
                    let v = value
                        .parse::<CropMode>()
                        .map_err(|_| TransformError::UnknownCropMode(value.to_string()))?;
                    set_once(&mut descriptor.crop, v, key)?;
                }
                "wm" => {
                    if value.chars().count() > MAX_WATERMARK_CHARS {
                        return Err(TransformError::WatermarkTooLong {
                            max: MAX_WATERMARK_CHARS,
                        });
                    }
                    set_once(&mut descriptor.watermark, value.to_string(), key)?;
                }
                _ => return Err(TransformError::UnknownKey(key.to_string())),
            }
        }

        Ok(descriptor)
    }

    /// Check cross-field constraints that parsing alone cannot.
    ///
    /// Also re-checks the watermark, which a directly built descriptor may
    /// carry in a form the canonical string cannot represent.
    pub fn validate(&self) -> Result<(), TransformError> {
        if let Some(wm) = &self.watermark {
            if wm.is_empty() || wm.contains(',') {
                return Err(TransformError::InvalidWatermark);
            }
            if wm.chars().count() > MAX_WATERMARK_CHARS {
                return Err(TransformError::WatermarkTooLong {
                    max: MAX_WATERMARK_CHARS,
                });
            }
        }

        if let (Some(w), Some(h)) = (self.width, self.height) {
            if u64::from(w) * u64::from(h) > MAX_TOTAL_PIXELS {
                return Err(TransformError::TooManyPixels {
                    max: MAX_TOTAL_PIXELS,
                });
            }
        }

        if let Some(crop) = self.crop {
            let has_one = self.width.is_some() != self.height.is_some();
            if crop.requires_both_dimensions() && has_one {
                return Err(TransformError::CropNeedsBothDimensions(crop));
            }
        }

        Ok(())
    }

    /// Parse and validate in one step.
    pub fn parse_validated(raw: &str) -> Result<Self, TransformError> {
        let descriptor = Self::parse(raw)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// True iff any field differs from the default.
    pub fn requires_processing(&self) -> bool {
        *self != Self::default()
    }

    /// Deterministic short digest of the canonical form.
    ///
    /// Truncation makes collisions theoretically possible; lookups treat keys
    /// as authoritative.
    pub fn cache_key(&self) -> String {
        let digest = Sha256::digest(self.to_string().as_bytes());
        let mut hex = format!("{:x}", digest);
        hex.truncate(CACHE_KEY_LEN);
        hex
    }

    /// Name of the processor that should produce this rendition.
    pub fn processor_name(&self, content_type: &str) -> &'static str {
        // Lossy web formats have a processor of the same name.
        if let Some(format) = self.format.filter(OutputFormat::is_lossy_web) {
            return format.as_str();
        }

        if self.watermark.as_deref().is_some_and(|w| !w.is_empty()) {
            return processors::WATERMARK;
        }

        if is_paginated(content_type) {
            return processors::DOCUMENT;
        }

        if self.is_small_box() {
            return processors::THUMBNAIL;
        }

        processors::RESIZE
    }

    /// Every supplied dimension is within the thumbnail bound, and at least
    /// one is supplied.
    fn is_small_box(&self) -> bool {
        let dims = [self.width, self.height];
        dims.iter().any(Option::is_some)
            && dims
                .iter()
                .flatten()
                .all(|d| *d <= THUMBNAIL_MAX_DIMENSION)
    }
}

impl fmt::Display for TransformDescriptor {
    /// Canonical form: fixed key order `w,h,q,f,c,wm,p`, unset fields omitted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::with_capacity(7);
        if let Some(w) = self.width {
            parts.push(format!("w_{}", w));
        }
        if let Some(h) = self.height {
            parts.push(format!("h_{}", h));
        }
        if let Some(q) = self.quality {
            parts.push(format!("q_{}", q));
        }
        if let Some(format) = self.format {
            parts.push(format!("f_{}", format));
        }
        if let Some(crop) = self.crop {
            parts.push(format!("c_{}", crop));
        }
        if let Some(wm) = &self.watermark {
            parts.push(format!("wm_{}", wm));
        }
        if let Some(p) = self.page {
            parts.push(format!("p_{}", p));
        }

        if parts.is_empty() {
            f.write_str(ORIGINAL)
        } else {
            f.write_str(&parts.join(","))
        }
    }
}

impl FromStr for TransformDescriptor {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_paginated(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    PAGINATED_CONTENT_TYPES.contains(&essence.as_str())
}

fn parse_bounded(
    field: &'static str,
    value: &str,
    min: u32,
    max: u32,
) -> Result<u32, TransformError> {
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TransformError::InvalidNumber {
            field,
            value: value.to_string(),
        });
    }

    let parsed: u64 = value.parse().map_err(|_| TransformError::OutOfRange { field, min, max })?;
    if parsed < u64::from(min) || parsed > u64::from(max) {
        return Err(TransformError::OutOfRange { field, min, max });
    }
    Ok(parsed as u32)
}

fn set_once<T>(slot: &mut Option<T>, value: T, key: &str) -> Result<(), TransformError> {
    if slot.is_some() {
        return Err(TransformError::DuplicateKey(key.to_string()));
    }
    *slot = Some(value);
    Ok(())
}
