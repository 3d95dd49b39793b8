//! # Primitives
//!
//! Fixed runtime constants for the Rombel core.
//!
//! These values are compiled into the binary and are immutable at runtime.

/// How many times a command is re-run after losing a concurrency race.
///
/// Persistent conflict indicates a real capacity race, so the last
/// `Conflict` surfaces to the caller after this many retries.
pub const MAX_CONFLICT_RETRIES: usize = 3;

/// Maximum number of students in a single bulk assignment call.
pub const MAX_BULK_ASSIGN: usize = 1000;

/// Maximum length for free-text fields (notes, reasons, approvers, destinations).
pub const MAX_TEXT_LENGTH: usize = 1024;

/// Maximum length for class names, tracks and teacher names.
pub const MAX_NAME_LENGTH: usize = 128;

/// Magic bytes for the Rombel snapshot header.
pub const MAGIC_BYTES: &[u8; 4] = b"RMBL";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the record encoding.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// INPUT VALIDATION
// =============================================================================

use crate::RombelError;

/// Reject free text longer than `MAX_TEXT_LENGTH`.
pub fn validate_text(field: &str, value: &str) -> Result<(), RombelError> {
    if value.len() > MAX_TEXT_LENGTH {
        return Err(RombelError::InvalidRequest(format!(
            "{} length {} exceeds maximum {} bytes",
            field,
            value.len(),
            MAX_TEXT_LENGTH
        )));
    }
    Ok(())
}

/// Reject empty or oversized names.
pub fn validate_name(field: &str, value: &str) -> Result<(), RombelError> {
    if value.trim().is_empty() {
        return Err(RombelError::InvalidRequest(format!(
            "{} must not be empty",
            field
        )));
    }
    if value.len() > MAX_NAME_LENGTH {
        return Err(RombelError::InvalidRequest(format!(
            "{} length {} exceeds maximum {} bytes",
            field,
            value.len(),
            MAX_NAME_LENGTH
        )));
    }
    Ok(())
}
