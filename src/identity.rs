//! Stable identity keys for matching scraped items to catalog listings.

const SEPARATOR: &str = "|||";

/// Builds the identity key for a (source URL, display name) pair.
///
/// A missing source URL contributes the empty string, so two listings without
/// a URL match on name alone.
pub fn identity_key(source_url: Option<&str>, name: &str) -> String {
    format!("{}{}{}", source_url.unwrap_or(""), SEPARATOR, name)
}
