//! HTTP requester: probe + ranged/full transfers with retry.
//!
//! One `Requester` per job, built from the downloader's defaults. Every
//! operation retries up to `retry_number` attempts with a `retry_time`
//! pause, on transport failure or any status >= 400. A configured request
//! body is replayed from the start on every attempt.

mod replay;

pub use replay::ReplayBody;

use crate::cancel::CancelToken;
use crate::error::{DownloadError, Result};
use crate::resource::{ResourceInfo, PROBE_SIZE};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scratch-buffer size libcurl delivers body chunks in.
pub(crate) const COPY_BUFFER: usize = 32 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-job request template and retry policy.
#[derive(Debug, Clone)]
pub struct Requester {
    uri: String,
    method: String,
    headers: Vec<(String, String)>,
    body: Option<Arc<Mutex<ReplayBody>>>,
    retry_number: u32,
    retry_time: Duration,
    accept_invalid_certs: bool,
}

impl Requester {
    /// Template with the default request shape: GET, browser-style accept
    /// headers, five attempts.
    pub fn new(uri: impl Into<String>) -> Self {
        Requester {
            uri: uri.into(),
            method: "GET".to_string(),
            headers: default_headers(),
            body: None,
            retry_number: 5,
            retry_time: Duration::ZERO,
            accept_invalid_certs: false,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn set_method(&mut self, method: impl Into<String>) {
        self.method = method.into();
    }

    /// Add or replace one request header.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if let Some(slot) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            slot.1 = value.into();
        } else {
            self.headers.push((name, value.into()));
        }
    }

    /// Drop the defaults and use exactly these headers.
    pub fn replace_headers(&mut self, headers: Vec<(String, String)>) {
        self.headers = headers;
    }

    pub fn set_body(&mut self, body: Option<ReplayBody>) {
        self.body = body.map(|b| Arc::new(Mutex::new(b)));
    }

    pub fn set_retry(&mut self, number: u32, pause: Duration) {
        self.retry_number = number;
        self.retry_time = pause;
    }

    pub fn set_accept_invalid_certs(&mut self, accept: bool) {
        self.accept_invalid_certs = accept;
    }

    /// Probe the resource: configured method with `Range: bytes=0-261`,
    /// deriving size, range support, ETag, Content-Disposition and a
    /// magic-byte extension guess from the response.
    pub fn probe(&self, cancel: &CancelToken) -> Result<ResourceInfo> {
        self.with_attempts(cancel, || self.probe_once(cancel))
            .map_err(|e| match e {
                DownloadError::Cancelled => DownloadError::Cancelled,
                other => DownloadError::Probe(Box::new(other)),
            })
    }

    fn probe_once(&self, cancel: &CancelToken) -> Result<ResourceInfo> {
        let mut easy = self.prepare(cancel)?;
        easy.range(&format!("0-{}", PROBE_SIZE - 1))?;

        let mut headers: Vec<String> = Vec::new();
        let mut body: Vec<u8> = Vec::new();
        let body_full = std::cell::Cell::new(false);
        {
            let body_full = &body_full;
            let body = &mut body;
            let mut transfer = easy.transfer();
            transfer.header_function(|line| {
                if let Ok(s) = std::str::from_utf8(line) {
                    headers.push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.write_function(move |data| {
                let room = PROBE_SIZE as usize - body.len();
                if room == 0 {
                    body_full.set(true);
                    return Ok(0); // abort: the window is enough
                }
                let take = room.min(data.len());
                body.extend_from_slice(&data[..take]);
                if take < data.len() {
                    body_full.set(true);
                }
                Ok(take)
            })?;
            if let Err(e) = transfer.perform() {
                // Aborting after the probe window is not a failure.
                if !(body_full.get() && (e.is_write_error() || e.is_aborted_by_callback())) {
                    return Err(e.into());
                }
            }
        }

        let code = easy.response_code()?;
        if code >= 400 {
            return Err(DownloadError::Http(code));
        }
        let info = ResourceInfo::from_probe(&self.uri, code, &headers, &body);
        tracing::debug!(
            uri = %self.uri,
            filesize = info.filesize,
            multithread = info.multithread,
            etag = %info.etag,
            "probe complete"
        );
        Ok(info)
    }

    /// Stream one transfer into `on_body`, retrying failed attempts.
    ///
    /// `range()` is consulted before every attempt so a retry continues from
    /// the caller's live cursor instead of refetching completed bytes;
    /// `None` means a full, un-ranged GET. `on_retry` runs before each new
    /// attempt so the caller can unwind partial buffering.
    pub(crate) fn fetch<R, F, P>(
        &self,
        cancel: &CancelToken,
        mut range: R,
        mut on_body: F,
        mut on_retry: P,
    ) -> Result<()>
    where
        R: FnMut() -> Option<(u64, u64)>,
        F: FnMut(&[u8]) -> Result<()>,
        P: FnMut(),
    {
        let mut first = true;
        self.with_attempts(cancel, move || {
            if !first {
                on_retry();
            }
            first = false;
            self.fetch_once(cancel, range(), &mut on_body)
        })
    }

    fn fetch_once<F>(
        &self,
        cancel: &CancelToken,
        range: Option<(u64, u64)>,
        on_body: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let mut easy = self.prepare(cancel)?;
        if let Some((start, end)) = range {
            easy.range(&format!("{start}-{end}"))?;
        }

        let sink_error: std::cell::RefCell<Option<DownloadError>> = std::cell::RefCell::new(None);
        {
            let mut transfer = easy.transfer();
            transfer.progress_function(|_, _, _, _| !cancel.is_cancelled())?;
            transfer.write_function(|data| match on_body(data) {
                Ok(()) => Ok(data.len()),
                Err(e) => {
                    *sink_error.borrow_mut() = Some(e);
                    Ok(0) // abort the transfer
                }
            })?;
            if let Err(e) = transfer.perform() {
                if let Some(cause) = sink_error.borrow_mut().take() {
                    return Err(cause);
                }
                if e.is_aborted_by_callback() && cancel.is_cancelled() {
                    return Err(DownloadError::Cancelled);
                }
                return Err(e.into());
            }
        }

        let code = easy.response_code()?;
        if code >= 400 {
            return Err(DownloadError::Http(code));
        }
        // A ranged request must be honoured with 206; a 200 body starts at
        // byte zero and would land at the wrong offset.
        if range.is_some() && code != 206 {
            return Err(DownloadError::Http(code));
        }
        Ok(())
    }

    /// Common per-attempt handle setup.
    fn prepare(&self, cancel: &CancelToken) -> Result<curl::easy::Easy> {
        let mut easy = curl::easy::Easy::new();
        easy.url(&self.uri)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(CONNECT_TIMEOUT)?;
        easy.buffer_size(COPY_BUFFER)?;
        easy.progress(true)?;
        if let Some(remaining) = cancel.remaining() {
            easy.timeout(remaining.max(Duration::from_millis(1)))?;
        }
        if self.accept_invalid_certs {
            easy.ssl_verify_peer(false)?;
            easy.ssl_verify_host(false)?;
        }

        let mut list = curl::easy::List::new();
        for (name, value) in &self.headers {
            list.append(&format!("{}: {}", name.trim(), value.trim()))?;
        }
        if !self.headers.is_empty() {
            easy.http_headers(list)?;
        }

        if let Some(body) = &self.body {
            body.lock().unwrap().reset().map_err(DownloadError::from)?;
            easy.upload(true)?;
            easy.custom_request(&self.method)?;
            let body = Arc::clone(body);
            easy.read_function(move |buf| {
                use std::io::Read;
                body.lock().unwrap().read(buf).map_err(|_| curl::easy::ReadError::Abort)
            })?;
        } else if !self.method.eq_ignore_ascii_case("GET") {
            easy.custom_request(&self.method)?;
        }
        Ok(easy)
    }

    /// Attempt loop shared by probe and transfers.
    fn with_attempts<T>(&self, cancel: &CancelToken, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        let max_attempts = self.retry_number.max(1);
        let mut attempt = 1u32;
        loop {
            match f() {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if !e.retryable() || attempt >= max_attempts || cancel.is_cancelled() {
                        return Err(e);
                    }
                    tracing::debug!(uri = %self.uri, attempt, error = %e, "request retry");
                    std::thread::sleep(self.retry_time);
                    attempt += 1;
                }
            }
        }
    }
}

fn default_headers() -> Vec<(String, String)> {
    vec![
        ("accept".to_string(), "*/*".to_string()),
        (
            "accept-language".to_string(),
            "en-US,en;q=0.9,*;q=0.5".to_string(),
        ),
        (
            "user-agent".to_string(),
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
             Chrome/124.0.0.0 Safari/537.36"
                .to_string(),
        ),
    ]
}
