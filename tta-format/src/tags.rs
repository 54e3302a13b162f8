// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Skips APEv2 and ID3v2 tags that some encoders prepend before a
//! TTA1/WAV/W64 stream. This crate never parses tag contents — a
//! player that wants metadata reads it elsewhere — it only needs to
//! find where the actual audio container begins.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::Result;

const APE_PREAMBLE: &[u8; 8] = b"APETAGEX";
const APE_HEADER_LEN: usize = 32;
const ID3_PREAMBLE: &[u8; 3] = b"ID3";
const ID3_HEADER_LEN: usize = 10;

/// Repeatedly skips leading APEv2 and ID3v2 tags, in either order and
/// any combination, until neither matches. Leaves the stream positioned
/// at the first byte that isn't part of a recognized tag.
pub fn skip_leading_tags<R: Read + Seek>(reader: &mut R) -> Result<()> {
    loop {
        if try_skip_ape(reader)? {
            continue;
        }
        if try_skip_id3(reader)? {
            continue;
        }
        break;
    }
    Ok(())
}

fn try_skip_ape<R: Read + Seek>(reader: &mut R) -> Result<bool> {
    let start = reader.stream_position()?;
    let mut header = [0u8; APE_HEADER_LEN];
    if reader.read_exact(&mut header).is_err() {
        reader.seek(SeekFrom::Start(start))?;
        return Ok(false);
    }
    if &header[0..8] != APE_PREAMBLE {
        reader.seek(SeekFrom::Start(start))?;
        return Ok(false);
    }
    let size = LittleEndian::read_u32(&header[12..16]);
    reader.seek(SeekFrom::Current(i64::from(size)))?;
    Ok(true)
}

fn try_skip_id3<R: Read + Seek>(reader: &mut R) -> Result<bool> {
    let start = reader.stream_position()?;
    let mut header = [0u8; ID3_HEADER_LEN];
    if reader.read_exact(&mut header).is_err() {
        reader.seek(SeekFrom::Start(start))?;
        return Ok(false);
    }
    if &header[0..3] != ID3_PREAMBLE {
        reader.seek(SeekFrom::Start(start))?;
        return Ok(false);
    }
    let size = id3_syncsafe(header[6], header[7], header[8], header[9]);
    reader.seek(SeekFrom::Current(i64::from(size)))?;
    Ok(true)
}

/// ID3v2's size field packs 28 bits into 4 bytes, using only the low 7
/// bits of each so the value never collides with the sync marker `0xFF`.
fn id3_syncsafe(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (u32::from(a) & 0x7F) << 21
        | (u32::from(b) & 0x7F) << 14
        | (u32::from(c) & 0x7F) << 7
        | (u32::from(d) & 0x7F)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ape_tag(body_size: u32) -> Vec<u8> {
        let mut tag = Vec::new();
        tag.extend_from_slice(APE_PREAMBLE);
        tag.extend_from_slice(&2000u32.to_le_bytes()); // version
        tag.extend_from_slice(&body_size.to_le_bytes());
        tag.extend_from_slice(&0u32.to_le_bytes()); // item count
        tag.extend_from_slice(&0u32.to_le_bytes()); // flags
        tag.extend_from_slice(&[0u8; 8]); // reserved
        tag.extend(std::iter::repeat(0u8).take(body_size as usize));
        tag
    }

    fn id3_tag(body_size: u32) -> Vec<u8> {
        let mut tag = Vec::new();
        tag.extend_from_slice(ID3_PREAMBLE);
        tag.extend_from_slice(&[3, 0]); // version
        tag.push(0); // flags
        let a = ((body_size >> 21) & 0x7F) as u8;
        let b = ((body_size >> 14) & 0x7F) as u8;
        let c = ((body_size >> 7) & 0x7F) as u8;
        let d = (body_size & 0x7F) as u8;
        tag.extend_from_slice(&[a, b, c, d]);
        tag.extend(std::iter::repeat(0u8).take(body_size as usize));
        tag
    }

    #[test]
    fn skips_single_ape_tag() {
        let mut buf = ape_tag(20);
        buf.extend_from_slice(b"TTA1REST");
        let mut cursor = Cursor::new(buf);
        skip_leading_tags(&mut cursor).unwrap();
        let mut rest = [0u8; 8];
        cursor.read_exact(&mut rest).unwrap();
        assert_eq!(&rest, b"TTA1REST");
    }

    #[test]
    fn skips_id3_then_ape() {
        let mut buf = id3_tag(5);
        buf.extend(ape_tag(3));
        buf.extend_from_slice(b"TTA1");
        let mut cursor = Cursor::new(buf);
        skip_leading_tags(&mut cursor).unwrap();
        let mut rest = [0u8; 4];
        cursor.read_exact(&mut rest).unwrap();
        assert_eq!(&rest, b"TTA1");
    }

    #[test]
    fn leaves_stream_untouched_when_no_tags_present() {
        let buf = b"TTA1NOPE".to_vec();
        let mut cursor = Cursor::new(buf);
        skip_leading_tags(&mut cursor).unwrap();
        assert_eq!(cursor.position(), 0);
    }
}
