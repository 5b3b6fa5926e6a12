#![deny(unsafe_code)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::len_without_is_empty,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

//! # bgzf-read: streaming BGZF decompression
//!
//! BGZF (Blocked GZip Format) is the container underlying BAM and friends:
//! a concatenation of independent gzip members, each at most 64 KiB
//! compressed, each recording its own compressed size in a gzip extra
//! subfield. Because members are independent, a consumer holding a
//! "virtual offset", the pair of a member's file offset and a position
//! inside its decompressed payload, can seek straight to it.
//!
//! One member, on disk:
//!
//! ```text
//! gzip fixed header   10 bytes   magic 0x1f 0x8b, DEFLATE, FEXTRA set
//! XLEN + "BC" field    8 bytes   subfield payload BSIZE = member len - 1
//! DEFLATE stream       ...       the compressed payload
//! trailer              8 bytes   CRC32 and ISIZE of the payload
//! ```
//!
//! This crate implements the read path:
//!
//! - [`Reader`]: streaming decompression with eager first-block
//!   validation, virtual-offset [`seek`](Reader::seek), and
//!   [`last_chunk`](Reader::last_chunk) region reporting for index
//!   builders.
//! - [`Offset`] / [`Chunk`]: virtual-offset addressing, including the
//!   packed `u64` form BAM indexes store.
//! - [`Cache`] / [`Wrapper`]: the contract for pluggable block caches,
//!   with cross-reader contamination guarded by block ownership.
//!
//! Writing BGZF, BAM record parsing and index file formats are out of
//! scope; this crate is the layer those sit on.
//!
//! ## Reading sequentially
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::Read;
//!
//! use bgzf_read::{Reader, Source};
//!
//! # fn main() -> bgzf_read::Result<()> {
//! let mut reader = Reader::new(Source::from(File::open("calls.vcf.gz")?), 1)?;
//! let mut text = String::new();
//! reader.read_to_string(&mut text)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Seeking to a virtual offset
//!
//! ```no_run
//! use std::fs::File;
//!
//! use bgzf_read::{Offset, Reader, Source};
//!
//! # fn main() -> bgzf_read::Result<()> {
//! let mut reader = Reader::new(Source::from(File::open("alignments.bam")?), 1)?;
//! // An index supplied this packed virtual offset.
//! reader.seek(Offset::from(0x1b_3039_0010u64))?;
//! # Ok(())
//! # }
//! ```

pub mod block;
pub mod cache;
mod decompress;
pub mod errors;
pub mod header;
pub mod offset;
pub mod reader;
mod source;

#[cfg(test)]
pub(crate) mod testutil;

pub use block::{Block, BlockBuf, ReaderId};
pub use cache::{Cache, SharedCache, Wrapper};
pub use errors::{Error, Result};
pub use header::MemberHeader;
pub use offset::{Chunk, Offset};
pub use reader::Reader;
pub use source::Source;

/// Hard limit on a BGZF member, compressed and decompressed: the BSIZE
/// subfield counts `total - 1` in a u16, so no member exceeds 64 KiB.
pub const MAX_BLOCK_SIZE: usize = 65_536;

/// The canonical BGZF EOF marker: an empty member appended to well-formed
/// files. Decoders treat any zero-length member as the end-of-stream
/// sentinel; this constant is the byte-exact block standard writers emit.
pub const BGZF_EOF: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02,
    0x00, 0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];
