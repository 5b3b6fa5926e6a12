//! Compressed byte sources and the read-head token.
//!
//! [`Source`] is the runtime witness for seekability: a BGZF reader over a
//! socket or pipe can stream sequentially, while virtual-offset seeks need a
//! [`Source::seekable`] underlying store. [`CountReader`] wraps the source
//! with the absolute-offset bookkeeping that block addressing depends on,
//! and [`HeadSlot`] is the single-slot rendezvous that serializes access to
//! the compressed stream.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::errors::{Error, Result};

trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

enum Inner {
    Stream(Box<dyn Read + Send>),
    Seekable(Box<dyn ReadSeek>),
}

/// An underlying compressed byte source.
///
/// Construct with [`Source::seekable`] when the source supports random
/// access (files, in-memory cursors) and [`Source::stream`] otherwise.
/// Only seekable sources support [`Reader::seek`](crate::Reader::seek).
pub struct Source {
    inner: Inner,
}

impl Source {
    /// Wraps a forward-only byte stream.
    pub fn stream<R>(r: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self { inner: Inner::Stream(Box::new(r)) }
    }

    /// Wraps a random-access byte source.
    pub fn seekable<R>(r: R) -> Self
    where
        R: Read + Seek + Send + 'static,
    {
        Self { inner: Inner::Seekable(Box::new(r)) }
    }

    pub(crate) fn is_seekable(&self) -> bool {
        matches!(self.inner, Inner::Seekable(_))
    }
}

impl From<File> for Source {
    fn from(f: File) -> Self {
        Self::seekable(f)
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            Inner::Stream(r) => r.read(buf),
            Inner::Seekable(r) => r.read(buf),
        }
    }
}

/// A buffered source tracking its absolute offset in the compressed stream.
///
/// The offset counts bytes delivered to callers, not bytes pulled from the
/// underlying source; after a [`seek`](CountReader::seek) the buffered
/// read-ahead is discarded so the two agree again.
pub(crate) struct CountReader {
    inner: BufReader<Source>,
    off: u64,
}

impl CountReader {
    pub(crate) fn new(src: Source) -> Self {
        Self { inner: BufReader::new(src), off: 0 }
    }

    /// Current offset in the underlying compressed stream.
    pub(crate) fn offset(&self) -> u64 {
        self.off
    }

    /// Repositions the source to absolute offset `off`.
    ///
    /// Fails with [`Error::NotASeeker`] when the source is a plain stream.
    pub(crate) fn seek(&mut self, off: u64) -> Result<()> {
        match &mut self.inner.get_mut().inner {
            Inner::Seekable(rs) => {
                rs.seek(SeekFrom::Start(off))?;
            }
            Inner::Stream(_) => return Err(Error::NotASeeker),
        }
        // Anything the buffered layer read ahead is now stale.
        let buffered = self.inner.buffer().len();
        self.inner.consume(buffered);
        self.off = off;
        Ok(())
    }
}

impl Read for CountReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.off += n as u64;
        Ok(n)
    }
}

/// Single-slot rendezvous carrying the count reader.
///
/// Exactly one agent may hold the read head at a time; the decompressor
/// acquires it to advance the compressed stream and releases it as soon as a
/// member's bytes have been staged, before inflation begins.
pub(crate) struct HeadSlot {
    tx: Sender<CountReader>,
    rx: Receiver<CountReader>,
}

impl HeadSlot {
    pub(crate) fn new(cr: CountReader) -> Self {
        let (tx, rx) = bounded(1);
        let slot = Self { tx, rx };
        slot.release(cr);
        slot
    }

    /// Takes the read head, blocking until the current holder releases it.
    pub(crate) fn acquire(&self) -> Result<CountReader> {
        self.rx
            .recv()
            .map_err(|_| Error::Io(io::Error::other("read head rendezvous disconnected")))
    }

    pub(crate) fn release(&self, cr: CountReader) {
        // Cannot fail while the slot owns the receiving end.
        let _ = self.tx.send(cr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_offset_tracks_bytes_delivered() {
        let mut cr = CountReader::new(Source::seekable(Cursor::new(vec![1u8; 100])));
        let mut buf = [0u8; 30];
        cr.read_exact(&mut buf).unwrap();
        assert_eq!(cr.offset(), 30);
        let mut one = [0u8; 1];
        cr.read_exact(&mut one).unwrap();
        assert_eq!(cr.offset(), 31);
    }

    #[test]
    fn test_seek_discards_read_ahead() {
        let data: Vec<u8> = (0..=255u8).cycle().take(16 * 1024).collect();
        let mut cr = CountReader::new(Source::seekable(Cursor::new(data.clone())));

        // Pull one byte; the buffered layer will have read far ahead.
        let mut b = [0u8; 1];
        cr.read_exact(&mut b).unwrap();
        assert_eq!(b[0], data[0]);

        cr.seek(1000).unwrap();
        assert_eq!(cr.offset(), 1000);
        cr.read_exact(&mut b).unwrap();
        assert_eq!(b[0], data[1000]);
        assert_eq!(cr.offset(), 1001);
    }

    #[test]
    fn test_seek_on_stream_fails() {
        let mut cr = CountReader::new(Source::stream(Cursor::new(vec![0u8; 8])));
        assert!(matches!(cr.seek(4), Err(Error::NotASeeker)));
    }

    #[test]
    fn test_head_slot_round_trip() {
        let slot = HeadSlot::new(CountReader::new(Source::stream(Cursor::new(vec![9u8; 4]))));
        let mut cr = slot.acquire().unwrap();
        let mut buf = [0u8; 4];
        cr.read_exact(&mut buf).unwrap();
        slot.release(cr);

        let cr = slot.acquire().unwrap();
        assert_eq!(cr.offset(), 4);
    }
}
