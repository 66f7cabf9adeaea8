//! Positional file writing.
//!
//! A `FileSink` binds the shared output file to one block: every flush lands
//! at the block's current cursor and advances it. Workers write disjoint
//! ranges, so no ordering between sinks is needed; the write buffer itself
//! is per-sink and must not be shared.

use crate::block::Block;
use std::fs::File;
use std::io;
use std::sync::Arc;

/// Buffered positional writer for one block.
pub struct FileSink {
    file: Arc<File>,
    block: Arc<Block>,
    buf: Vec<u8>,
    cap: usize,
}

impl FileSink {
    /// `cap` is the buffered-write ceiling; at least one byte.
    pub fn new(file: Arc<File>, block: Arc<Block>, cap: usize) -> Self {
        let cap = cap.max(1);
        FileSink {
            file,
            block,
            buf: Vec::with_capacity(cap),
            cap,
        }
    }

    /// Buffer `data`, flushing to the file whenever the cap is reached.
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if self.buf.len() + data.len() > self.cap {
            self.flush()?;
        }
        if data.len() >= self.cap {
            // oversized chunk: straight to the file
            return self.write_at_cursor(data);
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Write buffered bytes at the block cursor and advance it.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.write_at_cursor(&self.buf)?;
        self.buf.clear();
        Ok(())
    }

    /// Drop un-flushed bytes (a retry refetches them); returns the count.
    pub fn discard_buffered(&mut self) -> u64 {
        let n = self.buf.len() as u64;
        self.buf.clear();
        n
    }

    fn write_at_cursor(&self, mut data: &[u8]) -> io::Result<()> {
        let mut offset = self.block.start();
        while !data.is_empty() {
            let n = write_at(&self.file, data, offset)?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "zero-length positional write",
                ));
            }
            self.block.advance(n as u64);
            offset += n as u64;
            data = &data[n..];
        }
        Ok(())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(unix)]
fn write_at(file: &File, data: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(data, offset)
}

/// Non-Unix fallback: seek + write on a cloned handle.
#[cfg(not(unix))]
fn write_at(file: &File, data: &[u8], offset: u64) -> io::Result<usize> {
    use std::io::{Seek, SeekFrom, Write};
    let mut f = file.try_clone()?;
    f.seek(SeekFrom::Start(offset))?;
    f.write(data)
}

/// Reserve space for the whole resource up front. On Unix tries
/// `posix_fallocate` for real block allocation, falling back to `set_len`.
pub fn preallocate(file: &File, size: u64) -> io::Result<()> {
    if size == 0 {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let r = unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, size as libc::off_t) };
        if r == 0 {
            return Ok(());
        }
        tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
    }
    file.set_len(size)
}
