//! Input validation for externally supplied session and frame data
//!
//! Bounds every string that crosses the HTTP boundary so a misbehaving
//! camera client cannot grow pipeline memory without limit.

use anyhow::{anyhow, Result};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ocr::OcrFrame;

// ============================================================================
// CONSTANTS: Input Size Limits
// ============================================================================

/// Maximum length for session and device identifiers
pub const MAX_ID_LENGTH: usize = 256;

/// Maximum length for the opaque site identifier
pub const MAX_SITE_ID_LENGTH: usize = 512;

/// Maximum length of the whole-frame OCR text
pub const MAX_FRAME_TEXT_LENGTH: usize = 64 * 1024;

/// Maximum number of lines accepted in one OCR frame
pub const MAX_FRAME_LINES: usize = 1024;

/// Maximum size of a base64 frame image
pub const MAX_IMAGE_BASE64_LENGTH: usize = 16 * 1024 * 1024;

// ============================================================================
// Safe Time Operations
// ============================================================================

/// Current Unix timestamp in milliseconds, 0 if the clock is before the epoch
pub fn safe_unix_timestamp_ms() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis() as u64,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "System clock is before UNIX epoch (1970-01-01), using timestamp 0"
            );
            0
        }
    }
}

// ============================================================================
// String Validation
// ============================================================================

/// Validate string length against a maximum
pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            max_length,
            value.len()
        ));
    }
    Ok(())
}

/// Validate non-empty string
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }
    Ok(())
}

/// Validate a session or device identifier
pub fn validate_id(id: &str, field_name: &str) -> Result<()> {
    validate_non_empty(id, field_name)?;
    validate_length(id, MAX_ID_LENGTH, field_name)?;

    if id.contains("..") || id.contains('/') || id.contains('\\') {
        return Err(anyhow!(
            "{} contains invalid characters (no path separators or '..' allowed)",
            field_name
        ));
    }

    Ok(())
}

/// Validate the site identifier (may be any non-empty text)
pub fn validate_site_id(site_id: &str) -> Result<()> {
    validate_non_empty(site_id, "site_id")?;
    validate_length(site_id, MAX_SITE_ID_LENGTH, "site_id")
}

/// Validate OCR frame size limits
pub fn validate_ocr_frame(frame: &OcrFrame) -> Result<()> {
    validate_length(&frame.text, MAX_FRAME_TEXT_LENGTH, "ocr.text")?;

    let line_count = frame.lines().count();
    if line_count > MAX_FRAME_LINES {
        return Err(anyhow!(
            "ocr frame has {} lines, maximum is {}",
            line_count,
            MAX_FRAME_LINES
        ));
    }

    for line in frame.lines() {
        validate_length(&line.text, MAX_FRAME_TEXT_LENGTH, "ocr line text")?;
    }

    Ok(())
}

// ============================================================================
// Numeric Validation
// ============================================================================

/// Validate value is within range
pub fn validate_range<T: PartialOrd + std::fmt::Display>(
    value: T,
    min: T,
    max: T,
    field_name: &str,
) -> Result<()> {
    if value < min || value > max {
        return Err(anyhow!(
            "{} must be between {} and {}, got {}",
            field_name,
            min,
            max,
            value
        ));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
