//! Input validation for configuration and request values.
//!
//! Everything that reaches the recognition pipeline goes through these checks
//! first, so the pipeline itself can assume well-formed ids, ranges and paths.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

// ============================================================================
// CONSTANTS: Input Size Limits
// ============================================================================

/// Maximum length for resource IDs (collection ids, source ids)
pub const MAX_ID_LENGTH: usize = 255;

/// Maximum length for URIs (snapshot URLs, webhooks, brokers)
pub const MAX_URI_LENGTH: usize = 4096;

/// Maximum length for file paths
pub const MAX_PATH_LENGTH: usize = 4096;

/// Maximum length for display names
pub const MAX_NAME_LENGTH: usize = 512;

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

/// Validate resource ID. Rekognition collection ids allow `[a-zA-Z0-9_.\-]+`.
pub fn validate_id(id: &str, field_name: &str) -> Result<()> {
    validate_non_empty(id, field_name)?;
    validate_length(id, MAX_ID_LENGTH, field_name)?;

    if id.contains("..") {
        return Err(anyhow!("{} cannot contain '..'", field_name));
    }

    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(anyhow!(
            "{} contains invalid character '{}' (allowed: letters, digits, '_', '.', '-')",
            field_name,
            c
        ));
    }

    Ok(())
}

/// Validate display name
pub fn validate_name(name: &str, field_name: &str) -> Result<()> {
    validate_non_empty(name, field_name)?;
    validate_length(name, MAX_NAME_LENGTH, field_name)?;
    Ok(())
}

/// Validate an http(s) or mqtt URI
pub fn validate_uri(uri: &str, field_name: &str) -> Result<()> {
    validate_non_empty(uri, field_name)?;
    validate_length(uri, MAX_URI_LENGTH, field_name)?;

    if uri.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(anyhow!("{} contains whitespace or control characters", field_name));
    }

    if !uri.contains("://") {
        return Err(anyhow!("{} must include a scheme (e.g. http://)", field_name));
    }

    Ok(())
}

/// Derive a lowercase `[a-z0-9_]` slug from a display name or entity id, the
/// same way the host platform derives object ids.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_separator = false;

    for c in value.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(c);
        } else {
            pending_separator = true;
        }
    }

    slug
}

// ============================================================================
// Path Validation
// ============================================================================

/// Validate a directory path that may not exist yet
pub fn validate_path_components(path: &Path, field_name: &str) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow!("{} contains invalid UTF-8", field_name))?;

    validate_non_empty(path_str, field_name)?;
    validate_length(path_str, MAX_PATH_LENGTH, field_name)?;

    for component in path.components() {
        if component.as_os_str() == ".." {
            return Err(anyhow!(
                "{} contains '..' component (path traversal attempt)",
                field_name
            ));
        }
    }

    if path.exists() && !path.is_dir() {
        return Err(anyhow!(
            "{} exists but is not a directory: {}",
            field_name,
            path.display()
        ));
    }

    Ok(path.to_path_buf())
}

// ============================================================================
// Numeric Validation
// ============================================================================

/// Validate positive duration in seconds
pub fn validate_duration_secs(secs: u64, field_name: &str) -> Result<()> {
    if secs == 0 {
        return Err(anyhow!("{} must be greater than 0", field_name));
    }
    Ok(())
}

/// Validate value is within range (inclusive)
pub fn validate_range<T: PartialOrd + std::fmt::Display>(
    value: T,
    min: T,
    max: T,
    field_name: &str,
) -> Result<()> {
    // NaN compares false both ways, reject it explicitly
    if !(value >= min && value <= max) {
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
