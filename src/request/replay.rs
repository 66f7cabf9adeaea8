//! Replayable request body.
//!
//! Retried requests must re-send the configured body from the beginning.
//! A seekable source is rewound in place; anything else is buffered as it
//! is read so a reset can replay the recorded prefix before draining the
//! rest of the source.

use std::io::{self, Read, Seek, SeekFrom};

pub trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

pub enum ReplayBody {
    Seekable(Box<dyn ReadSeek>),
    Buffered {
        inner: Box<dyn Read + Send>,
        recorded: Vec<u8>,
        pos: usize,
    },
}

impl ReplayBody {
    /// Wrap a source that supports rewinding.
    pub fn seekable(inner: impl ReadSeek + 'static) -> Self {
        ReplayBody::Seekable(Box::new(inner))
    }

    /// Wrap a one-shot source; bytes are recorded for replay.
    pub fn buffered(inner: impl Read + Send + 'static) -> Self {
        ReplayBody::Buffered {
            inner: Box::new(inner),
            recorded: Vec::new(),
            pos: 0,
        }
    }

    /// Body from an in-memory byte string.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        ReplayBody::seekable(io::Cursor::new(bytes.into()))
    }

    /// Restart the body from its first byte.
    pub fn reset(&mut self) -> io::Result<()> {
        match self {
            ReplayBody::Seekable(inner) => {
                inner.seek(SeekFrom::Start(0))?;
            }
            ReplayBody::Buffered { pos, .. } => *pos = 0,
        }
        Ok(())
    }
}

impl Read for ReplayBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ReplayBody::Seekable(inner) => inner.read(buf),
            ReplayBody::Buffered {
                inner,
                recorded,
                pos,
            } => {
                if *pos < recorded.len() {
                    let n = (recorded.len() - *pos).min(buf.len());
                    buf[..n].copy_from_slice(&recorded[*pos..*pos + n]);
                    *pos += n;
                    return Ok(n);
                }
                let n = inner.read(buf)?;
                recorded.extend_from_slice(&buf[..n]);
                *pos += n;
                Ok(n)
            }
        }
    }
}

impl std::fmt::Debug for ReplayBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayBody::Seekable(_) => f.write_str("ReplayBody::Seekable"),
            ReplayBody::Buffered { recorded, pos, .. } => f
                .debug_struct("ReplayBody::Buffered")
                .field("recorded", &recorded.len())
                .field("pos", pos)
                .finish(),
        }
    }
}
