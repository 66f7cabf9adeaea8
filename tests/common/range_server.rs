//! Minimal HTTP/1.1 server with Range support for integration tests.
//!
//! Serves one static body. Ranged GETs get 206 Partial Content with a
//! Content-Range; full GETs get 200. Behaviour knobs cover the scenarios:
//! range support on/off, ETag, Content-Disposition, and a delay applied to
//! data requests (everything past the 262-byte probe window).

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Requests asking for this window or less count as probes and are never
/// delayed.
const PROBE_WINDOW: u64 = 262;

#[derive(Debug, Clone)]
pub struct RangeServerOptions {
    /// Honour Range headers with 206 responses.
    pub support_ranges: bool,
    /// Send `Accept-Ranges: bytes` on responses.
    pub advertise_ranges: bool,
    /// ETag header value (sent quoted); empty disables the header.
    pub etag: String,
    /// Content-Disposition header value; empty disables the header.
    pub content_disposition: String,
    /// Sleep before answering data requests (not probes).
    pub data_delay: Duration,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            support_ranges: true,
            advertise_ranges: true,
            etag: "it-test-etag".to_string(),
            content_disposition: String::new(),
            data_delay: Duration::ZERO,
        }
    }
}

/// Start a server for `body` with default options; returns the base URL.
pub fn start(body: Vec<u8>) -> String {
    start_with_options(body, RangeServerOptions::default())
}

/// Start a server in a background thread; it runs until the process exits.
/// The returned URL points at `/file.bin`.
pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let opts = Arc::new(opts);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let opts = Arc::clone(&opts);
            thread::spawn(move || handle(stream, &body, &opts));
        }
    });
    format!("http://127.0.0.1:{port}/file.bin")
}

fn handle(mut stream: TcpStream, body: &[u8], opts: &RangeServerOptions) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));

    let request = match read_request(&mut stream) {
        Some(r) => r,
        None => return,
    };
    let (method, range) = parse_request(&request);
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
        return;
    }

    let total = body.len() as u64;
    let ranged = opts.support_ranges && range.is_some();
    let (status, slice, content_range) = if ranged {
        let (start, end_incl) = range.unwrap();
        let end_incl = end_incl.min(total.saturating_sub(1));
        if start >= total || start > end_incl {
            let _ = stream.write_all(
                format!(
                    "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{total}\r\nConnection: close\r\n\r\n"
                )
                .as_bytes(),
            );
            return;
        }
        let slice = &body[start as usize..=end_incl as usize];
        (
            "206 Partial Content",
            slice,
            Some(format!("bytes {start}-{end_incl}/{total}")),
        )
    } else {
        ("200 OK", body, None)
    };

    let is_probe = (slice.len() as u64) <= PROBE_WINDOW && range.is_some();
    if !is_probe && !opts.data_delay.is_zero() {
        thread::sleep(opts.data_delay);
    }

    let mut head = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n",
        slice.len()
    );
    if let Some(cr) = content_range {
        head.push_str(&format!("Content-Range: {cr}\r\n"));
    }
    if opts.advertise_ranges && opts.support_ranges {
        head.push_str("Accept-Ranges: bytes\r\n");
    }
    if !opts.etag.is_empty() {
        head.push_str(&format!("ETag: \"{}\"\r\n", opts.etag));
    }
    if !opts.content_disposition.is_empty() {
        head.push_str(&format!("Content-Disposition: {}\r\n", opts.content_disposition));
    }
    head.push_str("\r\n");

    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(slice);
    let _ = stream.flush();
}

fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if buf.len() > 64 * 1024 {
            return None;
        }
    }
    String::from_utf8(buf).ok()
}

/// Returns (method, optional (start, end_inclusive)) from `Range: bytes=X-Y`.
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut method = "";
    let mut range = None;
    for (i, line) in request.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if i == 0 {
            method = line.split_whitespace().next().unwrap_or("");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim().to_ascii_lowercase();
                if let Some(spec) = value.strip_prefix("bytes=") {
                    if let Some((a, b)) = spec.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = if b.trim().is_empty() {
                            u64::MAX
                        } else {
                            b.trim().parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end));
                    }
                }
            }
        }
    }
    (method, range)
}
