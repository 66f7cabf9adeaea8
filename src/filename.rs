//! Filename derivation: Content-Disposition, URI path, sanitisation.

mod content_disposition;
mod sanitize;

pub use content_disposition::content_disposition_filename;
pub use sanitize::filter_filename;

/// Last non-empty path segment of the URI, if any.
pub fn filename_from_uri(uri: &str) -> Option<String> {
    let parsed = url::Url::parse(uri).ok()?;
    let segment = parsed.path().split('/').filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}
