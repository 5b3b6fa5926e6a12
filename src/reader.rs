//! Streaming BGZF reader.
//!
//! [`Reader`] is the public face of the decoder: sequential reads over the
//! concatenated decompressed payloads, virtual-offset seeks over a seekable
//! source, and `last_chunk` bookkeeping for index builders. One member is
//! decoded at a time by the decompression worker; the single read-head
//! token guarantees that at most one agent advances the compressed stream.

use std::io::{self, Read};

use crate::block::{Block, ReaderId};
use crate::cache::SharedCache;
use crate::decompress::Decompressor;
use crate::errors::{Error, Result};
use crate::header::MemberHeader;
use crate::offset::{Chunk, Offset};
use crate::source::{CountReader, HeadSlot, Source};

/// A BGZF blocked-gzip decompressor.
///
/// Reads yield decompressed bytes in compressed-stream order, skipping the
/// empty members a well-formed file ends with. A `Reader` is not safe for
/// concurrent use; wrap it externally if calls must be interleaved.
///
/// # Examples
///
/// ```no_run
/// use std::fs::File;
/// use std::io::Read;
///
/// use bgzf_read::{Reader, Source};
///
/// # fn main() -> bgzf_read::Result<()> {
/// let file = File::open("alignments.bam")?;
/// let mut reader = Reader::new(Source::from(file), 1)?;
///
/// let mut magic = [0u8; 4];
/// reader.read(&mut magic)?;
/// # Ok(())
/// # }
/// ```
pub struct Reader {
    id: ReaderId,
    seekable: bool,
    head: HeadSlot,
    dec: Decompressor,
    current: Option<Box<dyn Block>>,
    header: MemberHeader,
    cache: Option<SharedCache>,
    last_chunk: Chunk,
    err: Option<Error>,
    eof: bool,
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader").finish_non_exhaustive()
    }
}

impl Reader {
    /// Opens a BGZF stream and eagerly decodes its first member, so a
    /// malformed head of file fails here rather than at the first read.
    ///
    /// `rd` is the desired decode-ahead worker count; the current
    /// implementation runs a single worker regardless.
    pub fn new(src: Source, rd: usize) -> Result<Self> {
        if rd > 1 {
            log::debug!("requested {rd} concurrent decoders; running a single worker");
        }

        let seekable = src.is_seekable();
        let mut reader = Self {
            id: ReaderId::next(),
            seekable,
            head: HeadSlot::new(CountReader::new(src)),
            dec: Decompressor::new(),
            current: None,
            header: MemberHeader::default(),
            cache: None,
            last_chunk: Chunk::default(),
            err: None,
            eof: false,
        };

        match reader.dec.next_block_at(0, reader.id, &reader.head, None).wait()? {
            Some(blk) => {
                reader.header = blk.header().clone();
                reader.current = Some(blk);
                Ok(reader)
            }
            None => Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "BGZF stream contains no members",
            ))),
        }
    }

    /// Installs (or removes) a block cache. The cache is consulted before
    /// any I/O when a member is requested by base offset, and may be shared
    /// between readers.
    pub fn set_cache(&mut self, cache: Option<SharedCache>) {
        self.cache = cache;
    }

    /// The gzip header of the most recently surfaced member.
    #[must_use]
    pub fn header(&self) -> &MemberHeader {
        &self.header
    }

    /// The virtual-offset region touched by the last successful read, or
    /// the degenerate point set by the last successful seek.
    #[must_use]
    pub fn last_chunk(&self) -> Chunk {
        self.last_chunk
    }

    /// Reads decompressed bytes into `buf`.
    ///
    /// Returns `Ok(0)` at the clean end of the stream. A call that produced
    /// bytes before hitting an error returns the byte count; the error is
    /// sticky and surfaces on the next call.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Some(err) = &self.err {
            return Err(err.duplicate());
        }
        if self.eof {
            return Ok(0);
        }

        // Discard leading empty members: indexes must never point at them,
        // and the terminal empty member doubles as the end-of-stream mark.
        loop {
            match self.current.as_ref() {
                None => {
                    self.eof = true;
                    return Ok(0);
                }
                Some(blk) if blk.has_data() => break,
                Some(_) => {}
            }
            if !self.advance()? {
                return Ok(0);
            }
        }

        if let Some(blk) = self.current.as_ref() {
            self.last_chunk.begin = blk.tx_offset();
        }

        let mut n = 0;
        while n < buf.len() {
            let Some(blk) = self.current.as_mut() else { break };
            let copied = blk.read(&mut buf[n..]);
            if copied > 0 {
                n += copied;
                self.last_chunk.end = blk.tx_offset();
            }
            if n == buf.len() {
                // Fully satisfied: stop without advancing, so last_chunk.end
                // stays inside the member that produced the final byte.
                break;
            }
            if !blk.has_data() {
                match self.advance() {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) if n == 0 => return Err(e),
                    Err(_) => break, // sticky; surfaces on the next call
                }
            }
        }

        Ok(n)
    }

    /// Repositions the reader to a virtual offset.
    ///
    /// Requires a [`Source::seekable`] underlying source. On success the
    /// last chunk collapses to the target offset and any sticky error is
    /// cleared.
    pub fn seek(&mut self, off: Offset) -> Result<()> {
        if !self.seekable {
            return Err(Error::NotASeeker);
        }

        let need_block = match self.current.as_ref() {
            Some(blk) => off.file != blk.base() || !blk.has_data(),
            None => true,
        };
        if need_block {
            if let Some(cur) = self.current.take() {
                self.dec.using(cur);
            }
            let outcome = self
                .dec
                .next_block_at(off.file, self.id, &self.head, self.cache.as_ref())
                .wait();
            match outcome {
                Ok(Some(blk)) => {
                    self.header = blk.header().clone();
                    self.current = Some(blk);
                }
                Ok(None) => {
                    return self.stick(Error::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("no gzip member at offset {}", off.file),
                    )));
                }
                Err(e) => return self.stick(e),
            }
        }

        let Some(blk) = self.current.as_mut() else {
            return self.stick(Error::InvalidOffset { offset: off.block as usize, len: 0 });
        };
        match blk.seek(off.block as usize) {
            Ok(()) => {
                self.last_chunk = Chunk { begin: off, end: off };
                self.err = None;
                self.eof = false;
                Ok(())
            }
            Err(e) => self.stick(e),
        }
    }

    /// Releases the cache reference and reports the sticky error state.
    ///
    /// A clean end-of-stream is success: running off the last member never
    /// sets the sticky error, so anything stored here, including an
    /// unexpected-EOF from a member truncated mid-body, is a real failure.
    pub fn close(mut self) -> Result<()> {
        self.cache = None;
        match self.err.take() {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Decodes the member following `current`, updating the surfaced
    /// header. Returns `Ok(false)` at the clean end of the stream.
    fn advance(&mut self) -> Result<bool> {
        let Some(cur) = self.current.take() else {
            self.eof = true;
            return Ok(false);
        };
        let base = cur.next_base();
        self.dec.using(cur);
        let outcome =
            self.dec.next_block_at(base, self.id, &self.head, self.cache.as_ref()).wait();
        match outcome {
            Ok(Some(blk)) => {
                self.header = blk.header().clone();
                self.current = Some(blk);
                Ok(true)
            }
            Ok(None) => {
                self.eof = true;
                Ok(false)
            }
            Err(e) => {
                self.err = Some(e.duplicate());
                Err(e)
            }
        }
    }

    fn stick(&mut self, e: Error) -> Result<()> {
        self.err = Some(e.duplicate());
        Err(e)
    }
}

impl Read for Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Reader::read(self, buf).map_err(io::Error::from)
    }
}
