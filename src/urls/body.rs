//! Spooled response body
//!
//! Bodies stay in memory up to [`SPOOL_THRESHOLD`] bytes and spill to an
//! anonymous temp file beyond that. Every read goes through a guard that
//! rewinds the body when it is dropped, so the position is back at zero on
//! every exit path.

use std::io::{self, Read, Seek, SeekFrom, Write};
use tempfile::SpooledTempFile;

/// In-memory size limit before the body spills to disk
pub const SPOOL_THRESHOLD: usize = 2 * 1024 * 1024;

/// Restartable buffered body
#[derive(Debug)]
pub struct Body {
    file: SpooledTempFile,
    len: u64,
}

impl Body {
    /// Buffer a body from a reader
    pub fn from_reader(mut reader: impl Read) -> io::Result<Self> {
        let mut file = SpooledTempFile::new(SPOOL_THRESHOLD);
        let len = io::copy(&mut reader, &mut file)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(Self { file, len })
    }

    /// Buffer a body from bytes
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> io::Result<Self> {
        let bytes = bytes.as_ref();
        let mut file = SpooledTempFile::new(SPOOL_THRESHOLD);
        file.write_all(bytes)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(Self {
            file,
            len: bytes.len() as u64,
        })
    }

    /// Body size in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the body has spilled to disk
    pub fn is_spilled(&self) -> bool {
        self.file.is_rolled()
    }

    /// Current read position
    pub fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    /// Seek back to the start
    pub fn rewind(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Borrow a reader that rewinds the body when dropped
    pub fn reader(&mut self) -> io::Result<RewindGuard<'_>> {
        self.rewind()?;
        Ok(RewindGuard { body: self })
    }

    /// Read the whole body
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut guard = self.reader()?;
        let mut buf = Vec::with_capacity(guard.body.len.min(SPOOL_THRESHOLD as u64) as usize);
        guard.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Read at most `limit` bytes from the start
    pub fn read_prefix(&mut self, limit: usize) -> io::Result<Vec<u8>> {
        let guard = self.reader()?;
        let mut buf = Vec::with_capacity(limit);
        guard.take(limit as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// Reader over a [`Body`] that rewinds on drop
pub struct RewindGuard<'a> {
    body: &'a mut Body,
}

impl Read for RewindGuard<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.file.read(buf)
    }
}

impl Drop for RewindGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.body.rewind() {
            tracing::warn!("Failed to rewind body: {}", e);
        }
    }
}
