//! Worker: consumes blocks and streams their ranges into the file.

use super::Shared;
use crate::block::Block;
use crate::cancel::CancelToken;
use crate::error::{DownloadError, Result};
use crate::request::Requester;
use crate::sink::FileSink;
use std::cell::RefCell;
use std::fs::File;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};

pub(super) struct Worker {
    pub id: usize,
    pub requester: Requester,
    pub file: Arc<File>,
    pub shared: Arc<Shared>,
    pub cancel: Arc<CancelToken>,
    pub disk_cache: usize,
    pub total_size: u64,
    pub multithread: bool,
}

/// How long a worker parks in `recv` before re-checking cancellation.
const RECV_SLICE: std::time::Duration = std::time::Duration::from_millis(100);

impl Worker {
    /// Pull blocks until the channel closes or the run is cancelled. The
    /// first failure ends this worker; a clean drain returns `None`.
    pub fn run(&self, rx: Arc<Mutex<Receiver<Arc<Block>>>>) -> Option<DownloadError> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            let block = match rx.lock().unwrap().recv_timeout(RECV_SLICE) {
                Ok(b) => b,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            };
            tracing::debug!(
                worker = self.id,
                start = block.start(),
                end = block.end(),
                "block accepted"
            );
            if let Err(e) = self.download(&block) {
                tracing::debug!(worker = self.id, error = %e, "block failed");
                return Some(e);
            }
        }
    }

    /// Stream one block: full GET when it covers the whole resource, ranged
    /// GET otherwise, through the limiter into a positional sink.
    fn download(&self, block: &Arc<Block>) -> Result<()> {
        // Ranged retries resume mid-block; servers without range support
        // (and unknown sizes) have to restart the stream from byte zero.
        let rangeable = self.multithread && self.total_size > 0;
        if !rangeable && block.start() > 0 {
            // partial progress from an earlier run cannot be continued
            let rewound = block.start();
            block.reset();
            self.shared.completed.fetch_sub(rewound, Ordering::Relaxed);
        }

        let mut cap = self.disk_cache.max(1);
        if self.total_size > 0 {
            cap = cap.min(block.uncompleted().max(1) as usize);
        }
        let rate = self.shared.limiter.rate();
        if rate > 0 {
            cap = cap.min(rate as usize);
        }

        let sink = RefCell::new(FileSink::new(
            Arc::clone(&self.file),
            Arc::clone(block),
            cap,
        ));
        let completed = &self.shared.completed;
        let limiter = &self.shared.limiter;
        let cancel = &self.cancel;
        let total = self.total_size;

        let outcome = self.requester.fetch(
            cancel,
            || {
                if !rangeable || block.covers_all(total) {
                    None
                } else {
                    Some((block.start(), block.end()))
                }
            },
            |data| {
                limiter.wait_n(data.len() as u64, cancel)?;
                sink.borrow_mut().write(data)?;
                completed.fetch_add(data.len() as u64, Ordering::Relaxed);
                Ok(())
            },
            || {
                // Unwind what the failed attempt buffered but never flushed;
                // un-rangeable transfers additionally rewind to byte zero.
                let mut dropped = sink.borrow_mut().discard_buffered();
                if !rangeable {
                    dropped += block.start();
                    block.reset();
                }
                completed.fetch_sub(dropped, Ordering::Relaxed);
            },
        );

        let mut sink = sink.into_inner();
        match outcome {
            Ok(()) => {
                sink.flush()?;
                Ok(())
            }
            Err(e) => {
                // counted but never flushed
                let dropped = sink.discard_buffered();
                completed.fetch_sub(dropped, Ordering::Relaxed);
                Err(e)
            }
        }
    }
}
