//! Probed resource metadata and filename inference.

mod sniff;

pub use sniff::sniff_extension;

use crate::filename::{content_disposition_filename, filename_from_uri};
use crate::util::{random_alnum, split_extension};
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of bytes the probe requests (`Range: bytes=0-261`). Covers every
/// magic-byte signature the sniffer knows, tar's offset-257 magic included.
pub const PROBE_SIZE: u64 = 262;

/// Result of probing the resource.
#[derive(Debug, Clone, Default)]
pub struct ResourceInfo {
    /// Requested URI.
    pub uri: String,
    /// Declared total size in bytes; 0 when the server did not say.
    pub filesize: u64,
    /// Server advertises byte-range retrieval, so blocks can be fetched in
    /// parallel and a checkpoint can resume.
    pub multithread: bool,
    /// Raw Content-Disposition header value, if any.
    pub content_disposition: String,
    /// Opaque resource identifier used for resume compatibility.
    pub etag: String,
    /// Extension guessed from the probe body's magic bytes.
    pub extension_guess: String,
}

impl ResourceInfo {
    /// Build from a probe response: status line code, raw header lines and
    /// the first [`PROBE_SIZE`] bytes of the body.
    pub(crate) fn from_probe(uri: &str, status: u32, headers: &[String], body: &[u8]) -> Self {
        let mut info = ResourceInfo {
            uri: uri.to_string(),
            ..ResourceInfo::default()
        };
        let mut content_range = String::new();
        let mut content_length = String::new();
        let mut accept_ranges = false;

        for line in headers {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("etag") {
                info.etag = value.trim_matches('"').to_string();
            } else if name.eq_ignore_ascii_case("content-disposition") {
                info.content_disposition = value.to_string();
            } else if name.eq_ignore_ascii_case("content-range") {
                content_range = value.to_string();
            } else if name.eq_ignore_ascii_case("content-length") {
                content_length = value.to_string();
            } else if name.eq_ignore_ascii_case("accept-ranges") {
                accept_ranges = true;
            }
        }

        // Prefer the "/<total>" suffix of Content-Range; a 200 answer means
        // the server ignored the range and Content-Length is the full size.
        if let Some((_, total)) = content_range.split_once('/') {
            info.filesize = total.trim().parse().unwrap_or(0);
        }
        if info.filesize == 0 && status == 200 {
            info.filesize = content_length.parse().unwrap_or(0);
        }

        info.multithread = accept_ranges
            || content_range.contains("bytes")
            || content_length == PROBE_SIZE.to_string();

        if let Some(ext) = sniff_extension(body) {
            info.extension_guess = ext.to_string();
        }
        info
    }

    /// Choose an output filename: Content-Disposition parameter, else the
    /// URI's last path segment, else a synthesised `file_<id><nanos>` name.
    /// When the choice has no extension the sniffed one is appended.
    pub fn filename(&self) -> String {
        let name = content_disposition_filename(&self.content_disposition)
            .filter(|s| !s.is_empty())
            .or_else(|| filename_from_uri(&self.uri))
            .unwrap_or_else(|| {
                let nanos = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos();
                format!("file_{}{}", random_alnum(5), nanos)
            });
        let (_, ext) = split_extension(&name);
        if ext.is_empty() && !self.extension_guess.is_empty() {
            format!("{}.{}", name, self.extension_guess)
        } else {
            name
        }
    }
}
