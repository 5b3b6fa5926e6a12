//! Gzip member header parsing and the BGZF block-size subfield.
//!
//! Each BGZF block is a standard gzip member (RFC 1952) whose FEXTRA field
//! carries a `"BC"` subfield recording the total compressed size of the
//! member. Parsing the header byte-for-byte leaves the source positioned at
//! the start of the DEFLATE stream, which is what lets the decompressor
//! stage the exact remainder of the member before inflating.

use std::io::{self, Read};

use crate::errors::{Error, Result};

/// Gzip magic bytes.
const GZIP_ID1: u8 = 0x1f;
const GZIP_ID2: u8 = 0x8b;

/// DEFLATE compression method.
const GZIP_CM_DEFLATE: u8 = 0x08;

// FLG bits, RFC 1952 §2.3.1.
const FLG_FHCRC: u8 = 0x02;
const FLG_FEXTRA: u8 = 0x04;
const FLG_FNAME: u8 = 0x08;
const FLG_FCOMMENT: u8 = 0x10;

/// BGZF subfield identifier bytes, `'B'` `'C'`.
const BGZF_SUBFIELD_ID: [u8; 2] = [66, 67];

/// Parsed gzip member header.
///
/// BGZF members almost always carry only the FEXTRA field, but FNAME,
/// FCOMMENT and FHCRC are consumed correctly so that a conforming-but-odd
/// writer does not desynchronize the compressed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberHeader {
    mtime: u32,
    xfl: u8,
    os: u8,
    extra: Option<Vec<u8>>,
    name: Option<Vec<u8>>,
    comment: Option<Vec<u8>>,
}

impl Default for MemberHeader {
    fn default() -> Self {
        Self { mtime: 0, xfl: 0, os: 0xff, extra: None, name: None, comment: None }
    }
}

impl MemberHeader {
    /// Modification time, seconds since the Unix epoch.
    #[must_use]
    pub fn mtime(&self) -> u32 {
        self.mtime
    }

    /// Extra flags byte.
    #[must_use]
    pub fn xfl(&self) -> u8 {
        self.xfl
    }

    /// Operating system byte (0xff = unknown).
    #[must_use]
    pub fn operating_system(&self) -> u8 {
        self.os
    }

    /// Raw FEXTRA payload, if the member carried one.
    #[must_use]
    pub fn extra(&self) -> Option<&[u8]> {
        self.extra.as_deref()
    }

    /// Original file name, if the member carried one.
    #[must_use]
    pub fn name(&self) -> Option<&[u8]> {
        self.name.as_deref()
    }

    /// Comment field, if the member carried one.
    #[must_use]
    pub fn comment(&self) -> Option<&[u8]> {
        self.comment.as_deref()
    }

    /// Total compressed size of the member this header belongs to, taken
    /// from the BGZF `"BC"` subfield (`BSIZE + 1`). Returns `None` when the
    /// subfield is absent or truncated.
    #[must_use]
    pub fn member_size(&self) -> Option<usize> {
        let extra = self.extra.as_deref()?;
        let mut rest = extra;
        while rest.len() >= 4 {
            let id = [rest[0], rest[1]];
            let len = u16::from_le_bytes([rest[2], rest[3]]) as usize;
            let body = rest.get(4..4 + len)?;
            if id == BGZF_SUBFIELD_ID && len == 2 {
                return Some(u16::from_le_bytes([body[0], body[1]]) as usize + 1);
            }
            rest = &rest[4 + len..];
        }
        None
    }

    /// Reads and validates a member header from `src`, leaving `src`
    /// positioned at the first byte of the DEFLATE stream.
    ///
    /// Returns `Ok(None)` when the source is exhausted at the member
    /// boundary, the clean end of a BGZF stream.
    pub(crate) fn read_from<R: Read>(src: &mut R) -> Result<Option<Self>> {
        let mut fixed = [0u8; 10];
        match src.read_exact(&mut fixed) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        if fixed[0] != GZIP_ID1 || fixed[1] != GZIP_ID2 {
            return Err(Error::InvalidMember {
                reason: format!(
                    "bad gzip magic: expected 0x1f 0x8b, got {:#04x} {:#04x}",
                    fixed[0], fixed[1]
                ),
            });
        }
        if fixed[2] != GZIP_CM_DEFLATE {
            return Err(Error::InvalidMember {
                reason: format!("compression method {:#04x} is not DEFLATE", fixed[2]),
            });
        }

        let flg = fixed[3];
        let mtime = u32::from_le_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]);
        let xfl = fixed[8];
        let os = fixed[9];

        let extra = if flg & FLG_FEXTRA != 0 {
            let mut len = [0u8; 2];
            src.read_exact(&mut len)?;
            let mut extra = vec![0u8; u16::from_le_bytes(len) as usize];
            src.read_exact(&mut extra)?;
            Some(extra)
        } else {
            None
        };

        let name = if flg & FLG_FNAME != 0 { Some(read_cstr(src)?) } else { None };
        let comment = if flg & FLG_FCOMMENT != 0 { Some(read_cstr(src)?) } else { None };

        if flg & FLG_FHCRC != 0 {
            // Accepted but not verified; the member trailer CRC covers the
            // payload and BGZF writers do not emit FHCRC.
            let mut crc = [0u8; 2];
            src.read_exact(&mut crc)?;
        }

        Ok(Some(Self { mtime, xfl, os, extra, name, comment }))
    }
}

/// Reads a NUL-terminated latin-1 field, excluding the terminator.
fn read_cstr<R: Read>(src: &mut R) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let mut b = [0u8; 1];
        src.read_exact(&mut b)?;
        if b[0] == 0 {
            return Ok(out);
        }
        if out.len() >= crate::MAX_BLOCK_SIZE {
            return Err(Error::InvalidMember {
                reason: "unterminated name or comment field".to_string(),
            });
        }
        out.push(b[0]);
    }
}
