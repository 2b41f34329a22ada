//! Path normalization for cache keys.
//!
//! macOS reports file names in NFD (decomposed) Unicode form while Windows and
//! Linux typically use NFC. The same visual path can therefore have two byte
//! representations, and a cache keyed on raw path strings would miss entries
//! written under the other form. Every cache key goes through
//! [`canonical_key`], which makes the path absolute and folds the string to
//! NFC.

use std::path::Path;

use unicode_normalization::UnicodeNormalization;

/// Normalize a string to NFC (composed) form.
#[must_use]
pub fn normalize_path_str(s: &str) -> String {
    s.nfc().collect()
}

/// Build the canonical cache key for a path: absolute, NFC-normalized.
///
/// Relative and absolute spellings of the same file collapse to one key.
/// If the path cannot be made absolute (current directory vanished), it is
/// used as given.
#[must_use]
pub fn canonical_key(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    normalize_path_str(&absolute.to_string_lossy())
}
