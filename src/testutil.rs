//! Test-only BGZF member assembly.
//!
//! Members are framed by hand (18-byte header with the `"BC"` subfield, a
//! DEFLATE stream, CRC32 + ISIZE trailer) so the decoder is exercised
//! against exactly the layout the format prescribes.

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::BGZF_EOF;

const HEADER_LEN: usize = 18;
const TRAILER_LEN: usize = 8;

pub(crate) fn deflate(payload: &[u8]) -> Vec<u8> {
    let mut enc = DeflateEncoder::new(Vec::new(), Compression::new(6));
    enc.write_all(payload).expect("in-memory deflate");
    enc.finish().expect("in-memory deflate")
}

/// One BGZF member holding `payload`.
pub(crate) fn member(payload: &[u8]) -> Vec<u8> {
    let cdata = deflate(payload);
    let total = HEADER_LEN + cdata.len() + TRAILER_LEN;
    assert!(total <= crate::MAX_BLOCK_SIZE, "member of {total} bytes overflows BGZF limit");
    let bsize = (total - 1) as u16;

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&[0x1f, 0x8b, 0x08, 0x04]); // magic, DEFLATE, FEXTRA
    out.extend_from_slice(&[0, 0, 0, 0]); // MTIME
    out.extend_from_slice(&[0x00, 0xff]); // XFL, OS
    out.extend_from_slice(&6u16.to_le_bytes()); // XLEN
    out.extend_from_slice(&[66, 67]); // 'B' 'C'
    out.extend_from_slice(&2u16.to_le_bytes()); // SLEN
    out.extend_from_slice(&bsize.to_le_bytes());
    out.extend_from_slice(&cdata);
    out.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out
}

/// A gzip member with valid framing but no BGZF subfield.
pub(crate) fn plain_gzip_member(payload: &[u8]) -> Vec<u8> {
    let cdata = deflate(payload);
    let mut out = vec![0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0x00, 0xff];
    out.extend_from_slice(&cdata);
    out.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out
}

/// A complete BGZF stream: one member per payload plus the EOF marker.
pub(crate) fn stream(payloads: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for payload in payloads {
        out.extend_from_slice(&member(payload));
    }
    out.extend_from_slice(&BGZF_EOF);
    out
}
