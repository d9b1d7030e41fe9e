//! Cache key and file name generation
//!
//! Keys look like `beach-sunset_enhance_1718000000000_3f2a9c1e`: a fragment
//! of the source file name, the operation tag, the creation time and eight
//! hex digits of a random UUID. The random suffix keeps keys produced in the
//! same millisecond from the same source apart.

use std::path::Path;
use uuid::Uuid;

/// Longest source-name fragment kept in a key
const MAX_STEM_LEN: usize = 24;

/// Tag used when the caller does not name the operation
pub const DEFAULT_TAG: &str = "cache";

/// Extension used when the source has none
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Generate a fresh cache key for `source`
pub fn generate_key(source: &Path, tag: Option<&str>, now_millis: u64) -> String {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| sanitize(s, MAX_STEM_LEN))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "image".to_string());
    let tag = tag
        .map(|t| sanitize(t, MAX_STEM_LEN))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TAG.to_string());
    format!("{}_{}_{}_{}", stem, tag, now_millis, short_id())
}

/// Lower-case extension of `source`, or the default
pub fn extension_of(source: &Path) -> String {
    source
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| sanitize(e, 8).to_lowercase())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// File name for a cached copy of `source` stored under `key`
pub fn cache_file_name(key: &str, source: &Path) -> String {
    format!("{}.{}", key, extension_of(source))
}

/// File name for a saved edit.
///
/// A caller-supplied name is sanitized and gets the source extension when it
/// has none; otherwise a timestamped name is generated.
pub fn saved_file_name(name: Option<&str>, source: &Path, now_millis: u64) -> String {
    let ext = extension_of(source);
    let requested = name.map(Path::new).and_then(|n| {
        let stem = n
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| sanitize(s, 64))
            .filter(|s| !s.is_empty())?;
        let ext = n
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| sanitize(e, 8).to_lowercase())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| ext.clone());
        Some(format!("{}.{}", stem, ext))
    });
    requested.unwrap_or_else(|| format!("edit_{}_{}.{}", now_millis, short_id(), ext))
}

/// Keep ASCII alphanumerics and dashes; everything else becomes a dash
fn sanitize(raw: &str, max_len: usize) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .take(max_len)
        .collect();
    mapped.trim_matches('-').to_string()
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
