//! Single-member decompression.
//!
//! The decompressor owns one in-flight gzip member. It positions the count
//! reader, parses the member header, stages the member's remaining
//! compressed bytes into a fixed buffer sized by the BGZF block-size
//! subfield, and only then inflates. The read head is released the moment
//! staging completes, so the compressed stream is never held hostage to
//! inflation. That is the property that admits decode-ahead workers later.

use std::io::{self, Read};

use flate2::read::DeflateDecoder;

use crate::block::{Block, BlockBuf, ReaderId};
use crate::cache::{self, SharedCache};
use crate::errors::{Error, Result};
use crate::header::MemberHeader;
use crate::source::{CountReader, HeadSlot};
use crate::MAX_BLOCK_SIZE;

/// CRC32 + ISIZE trailer, RFC 1952 §2.3.
const MEMBER_TRAILER_LEN: usize = 8;

// ============================================================================
// Stage buffer
// ============================================================================

/// Fixed-capacity store for the compressed bytes of exactly one member.
///
/// `0 <= off <= size <= MAX_BLOCK_SIZE`.
pub(crate) struct StageBuffer {
    data: Box<[u8; MAX_BLOCK_SIZE]>,
    size: usize,
    off: usize,
}

impl StageBuffer {
    fn new() -> Self {
        Self { data: Box::new([0u8; MAX_BLOCK_SIZE]), size: 0, off: 0 }
    }

    fn has_data(&self) -> bool {
        self.size != 0
    }

    fn reset(&mut self) {
        self.size = 0;
        self.off = 0;
    }

    /// Reads exactly `n` bytes from `src` into the buffer.
    ///
    /// # Panics
    ///
    /// Panics if data from a previous member is still staged.
    fn read_limited(&mut self, n: usize, src: &mut CountReader) -> Result<()> {
        assert!(!self.has_data(), "bgzf: read into non-empty stage buffer");
        debug_assert!(n <= MAX_BLOCK_SIZE);
        src.read_exact(&mut self.data[..n])?;
        self.off = 0;
        self.size = n;
        Ok(())
    }

    /// CRC32 and ISIZE fields from the staged member's trailer.
    fn trailer(&self) -> Result<(u32, usize)> {
        if self.size < MEMBER_TRAILER_LEN {
            return Err(Error::InvalidMember {
                reason: format!("member trailer truncated: {} bytes staged", self.size),
            });
        }
        let tail = &self.data[self.size - MEMBER_TRAILER_LEN..self.size];
        let crc = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        let isize_ = u32::from_le_bytes([tail[4], tail[5], tail[6], tail[7]]);
        Ok((crc, isize_ as usize))
    }
}

impl Read for StageBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.size - self.off);
        buf[..n].copy_from_slice(&self.data[self.off..self.off + n]);
        self.off += n;
        Ok(n)
    }
}

// ============================================================================
// CRC accounting
// ============================================================================

/// Pass-through reader hashing everything it yields.
struct CrcReader<R> {
    inner: R,
    hasher: crc32fast::Hasher,
}

impl<R: Read> CrcReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, hasher: crc32fast::Hasher::new() }
    }

    fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

impl<R: Read> Read for CrcReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

// ============================================================================
// Decompressor
// ============================================================================

/// Worker that decodes one gzip member per `next_block_at` call.
///
/// The worker keeps a block vessel between members so payload allocations
/// are reused, and records its outcome for a subsequent [`wait`].
///
/// [`wait`]: Decompressor::wait
pub(crate) struct Decompressor {
    stage: StageBuffer,
    blk: Option<Box<dyn Block>>,
    outcome: Option<Result<Option<Box<dyn Block>>>>,
}

impl Decompressor {
    pub(crate) fn new() -> Self {
        Self { stage: StageBuffer::new(), blk: None, outcome: None }
    }

    /// Hands a not-yet-cached block to the worker as a reusable vessel.
    pub(crate) fn using(&mut self, blk: Box<dyn Block>) -> &mut Self {
        self.blk = Some(blk);
        self
    }

    /// Yields the outcome of the most recent `next_block_at`:
    /// `Ok(Some(block))` for a decoded member, `Ok(None)` at the clean end
    /// of the compressed stream.
    pub(crate) fn wait(&mut self) -> Result<Option<Box<dyn Block>>> {
        self.outcome.take().unwrap_or(Ok(None))
    }

    /// Makes the worker ready to yield the member starting at compressed
    /// offset `base`: from the cache when possible, otherwise by seeking,
    /// staging and inflating. The decode runs to completion here; `wait`
    /// reports it.
    pub(crate) fn next_block_at(
        &mut self,
        base: u64,
        owner: ReaderId,
        head: &HeadSlot,
        cache: Option<&SharedCache>,
    ) -> &mut Self {
        self.outcome = Some(self.run(base, owner, head, cache));
        self
    }

    fn run(
        &mut self,
        base: u64,
        owner: ReaderId,
        head: &HeadSlot,
        cache: Option<&SharedCache>,
    ) -> Result<Option<Box<dyn Block>>> {
        if let Some(shared) = cache {
            if let Some(blk) = cache::cached_block_for(shared, owner, base)? {
                log::trace!("cache hit for member at offset {base}");
                // The displaced vessel goes to the cache; if declined it is
                // dropped in favor of the adopted block.
                let _ = cache::cache_put(cache, self.blk.take());
                return Ok(Some(blk));
            }
        }

        self.blk = cache::cache_put(cache, self.blk.take());
        let mut blk = self.lazy_block(owner, cache);

        let mut cr = head.acquire()?;
        if cr.offset() != base {
            // Only an explicit seek can leave the count reader out of
            // register with the requested base.
            log::trace!("re-seating count reader from {} to {base}", cr.offset());
            if let Err(e) = cr.seek(base) {
                head.release(cr);
                self.blk = Some(blk);
                return Err(e);
            }
        }

        match self.fill(blk.as_mut(), cr, head) {
            Ok(true) => Ok(Some(blk)),
            Ok(false) => {
                self.blk = Some(blk);
                Ok(None)
            }
            Err(e) => {
                self.blk = Some(blk);
                Err(e)
            }
        }
    }

    /// Conditionally allocates a ready-to-use block, wrapping a fresh one
    /// through the cache's `Wrapper` capability and re-homing a vessel that
    /// belonged to another reader.
    fn lazy_block(&mut self, owner: ReaderId, cache: Option<&SharedCache>) -> Box<dyn Block> {
        match self.blk.take() {
            Some(mut blk) => {
                if !blk.owned_by(owner) {
                    blk.set_owner(owner);
                }
                blk
            }
            None => {
                let raw: Box<dyn Block> = Box::new(BlockBuf::new(owner));
                match cache {
                    Some(shared) => {
                        let guard =
                            shared.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                        match guard.wrapper() {
                            Some(w) => w.wrap(raw),
                            None => raw,
                        }
                    }
                    None => raw,
                }
            }
        }
    }

    /// Decodes the member under the read head into `blk`. Returns
    /// `Ok(false)` when the stream ends cleanly at the member boundary.
    ///
    /// The head is released on every path, as soon as the member's bytes
    /// have been staged (or the attempt failed).
    fn fill(&mut self, blk: &mut dyn Block, mut cr: CountReader, head: &HeadSlot) -> Result<bool> {
        blk.set_base(cr.offset());

        let staged = self.stage_member(&mut cr);
        head.release(cr);
        let header = match staged? {
            Some(header) => header,
            None => return Ok(false),
        };

        // Inflation proceeds without the head: the whole member is staged.
        let (want_crc, want_len) = self.stage.trailer()?;
        let mut inflater = CrcReader::new(DeflateDecoder::new(&mut self.stage));
        let n = blk.read_from(&mut inflater)?;
        let got_crc = inflater.finalize();

        if n != want_len {
            return Err(Error::InvalidMember {
                reason: format!("uncompressed size mismatch: trailer says {want_len}, got {n}"),
            });
        }
        if got_crc != want_crc {
            return Err(Error::CrcMismatch { expected: want_crc, actual: got_crc });
        }

        blk.set_header(header);
        Ok(true)
    }

    /// Parses the member header and stages the rest of the member, leaving
    /// the count reader positioned exactly past the member.
    fn stage_member(&mut self, cr: &mut CountReader) -> Result<Option<MemberHeader>> {
        self.stage.reset();
        let mark = cr.offset();

        let header = match MemberHeader::read_from(cr)? {
            Some(header) => header,
            None => return Ok(None),
        };

        let size = header.member_size().ok_or(Error::NoBlockSize)?;
        let consumed = (cr.offset() - mark) as usize;
        if size > MAX_BLOCK_SIZE {
            return Err(Error::InvalidMember {
                reason: format!("member size {size} exceeds {MAX_BLOCK_SIZE}"),
            });
        }
        if size < consumed + MEMBER_TRAILER_LEN {
            return Err(Error::InvalidMember {
                reason: format!("member size {size} is smaller than its own framing"),
            });
        }

        self.stage.read_limited(size - consumed, cr)?;
        Ok(Some(header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;
    use crate::testutil;
    use std::io::Cursor;

    fn head_over(bytes: Vec<u8>) -> HeadSlot {
        HeadSlot::new(CountReader::new(Source::seekable(Cursor::new(bytes))))
    }

    #[test]
    fn test_stage_buffer_read_limited() {
        let mut cr = CountReader::new(Source::stream(Cursor::new(vec![7u8; 100])));
        let mut stage = StageBuffer::new();
        stage.read_limited(40, &mut cr).unwrap();
        assert!(stage.has_data());
        assert_eq!(cr.offset(), 40);

        let mut out = Vec::new();
        stage.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![7u8; 40]);
        // Exhausted: further reads yield end-of-stream.
        let mut buf = [0u8; 4];
        assert_eq!(stage.read(&mut buf).unwrap(), 0);

        stage.reset();
        assert!(!stage.has_data());
    }

    #[test]
    fn test_stage_buffer_short_source() {
        let mut cr = CountReader::new(Source::stream(Cursor::new(vec![1u8; 10])));
        let mut stage = StageBuffer::new();
        let err = stage.read_limited(20, &mut cr).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    #[should_panic(expected = "non-empty stage buffer")]
    fn test_stage_buffer_double_fill_panics() {
        let mut cr = CountReader::new(Source::stream(Cursor::new(vec![1u8; 64])));
        let mut stage = StageBuffer::new();
        stage.read_limited(8, &mut cr).unwrap();
        let _ = stage.read_limited(8, &mut cr);
    }

    #[test]
    fn test_crc_reader_hashes_stream() {
        let data = b"the quick brown fox";
        let mut crc = CrcReader::new(Cursor::new(data.to_vec()));
        let mut out = Vec::new();
        crc.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(crc.finalize(), crc32fast::hash(data));
    }

    #[test]
    fn test_decode_single_member() {
        let owner = ReaderId::next();
        let head = head_over(testutil::member(b"hello block"));
        let mut dec = Decompressor::new();

        let blk = dec.next_block_at(0, owner, &head, None).wait().unwrap().expect("a block");
        assert_eq!(blk.base(), 0);
        assert_eq!(blk.len(), 11);
        assert!(blk.owned_by(owner));

        // The count reader consumed exactly BSIZE + 1 bytes.
        let cr = head.acquire().unwrap();
        assert_eq!(cr.offset(), blk.next_base());
    }

    #[test]
    fn test_clean_end_of_stream() {
        let owner = ReaderId::next();
        let head = head_over(Vec::new());
        let mut dec = Decompressor::new();
        assert!(dec.next_block_at(0, owner, &head, None).wait().unwrap().is_none());
    }

    #[test]
    fn test_missing_block_size() {
        let owner = ReaderId::next();
        // A plain gzip member: valid framing, no BC subfield.
        let head = head_over(testutil::plain_gzip_member(b"plain"));
        let mut dec = Decompressor::new();
        let err = dec.next_block_at(0, owner, &head, None).wait().unwrap_err();
        assert!(matches!(err, Error::NoBlockSize));
    }

    #[test]
    fn test_corrupt_crc() {
        let owner = ReaderId::next();
        let mut bytes = testutil::member(b"checksummed");
        let crc_at = bytes.len() - 8;
        bytes[crc_at] ^= 0xff;
        let head = head_over(bytes);
        let mut dec = Decompressor::new();
        let err = dec.next_block_at(0, owner, &head, None).wait().unwrap_err();
        assert!(matches!(err, Error::CrcMismatch { .. }));
    }

    #[test]
    fn test_wait_without_pending_decode() {
        let mut dec = Decompressor::new();
        assert!(dec.wait().unwrap().is_none());
    }
}
