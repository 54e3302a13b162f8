// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sony Wave64: RIFF/WAVE's big-file cousin. Same `fmt `/`data` shape,
//! but every chunk tag is a 16-byte GUID instead of a 4-byte FourCC, the
//! length field is a `u64` that counts the 24-byte chunk header itself,
//! and chunks are padded to an 8-byte boundary rather than a 2-byte one.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use log::info;

use crate::error::{FormatError, Result};
use crate::wav::PcmStreamInfo;

const CHUNK_HEADER_LEN: u64 = 24;
const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

// The low 4 bytes of each GUID spell the FourCC it replaces; the
// remaining 12 bytes are the fixed "wide FourCC" suffix Microsoft
// defined for Wave64's container GUIDs.
const GUID_RIFF: [u8; 16] =
    [b'r', b'i', b'f', b'f', 0x2E, 0x91, 0xCF, 0x11, 0xA5, 0xD6, 0x28, 0xDB, 0x04, 0xC1, 0x00, 0x00];
const GUID_WAVE: [u8; 16] =
    [b'w', b'a', b'v', b'e', 0xF3, 0xAC, 0xD3, 0x11, 0x8C, 0xD1, 0x00, 0xC0, 0x4F, 0x8E, 0xDB, 0x8A];
const GUID_FMT: [u8; 16] =
    [b'f', b'm', b't', b' ', 0xF3, 0xAC, 0xD3, 0x11, 0x8C, 0xD1, 0x00, 0xC0, 0x4F, 0x8E, 0xDB, 0x8A];
const GUID_DATA: [u8; 16] =
    [b'd', b'a', b't', b'a', 0xF3, 0xAC, 0xD3, 0x11, 0x8C, 0xD1, 0x00, 0xC0, 0x4F, 0x8E, 0xDB, 0x8A];

fn pad(body_len: u64) -> u64 {
    (8 - body_len % 8) % 8
}

/// Whether a 4-byte peek at a stream's start looks like a Wave64 RIFF
/// GUID (its low 4 bytes are the lowercase ASCII `"riff"`, which is how
/// a demuxer tells it apart from a 32-bit RIFF/WAVE file at a glance).
pub fn has_magic(peek: &[u8; 4]) -> bool {
    peek == &GUID_RIFF[0..4]
}

pub fn read_header<R: Read + Seek>(reader: &mut R) -> Result<PcmStreamInfo> {
    let mut guid = [0u8; 16];
    reader.read_exact(&mut guid)?;
    let _riff_size = reader.read_u64::<LittleEndian>()?;
    if guid != GUID_RIFF {
        return Err(FormatError::NotWave64);
    }

    let mut wave_guid = [0u8; 16];
    reader.read_exact(&mut wave_guid)?;
    if wave_guid != GUID_WAVE {
        return Err(FormatError::NotWave64);
    }

    let mut fmt_info = None;
    let mut data_len = None;

    loop {
        let mut tag = [0u8; 16];
        match reader.read_exact(&mut tag) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let chunk_len = reader.read_u64::<LittleEndian>()?;
        let body_len = chunk_len.saturating_sub(CHUNK_HEADER_LEN);

        if tag == GUID_FMT {
            let mut body = vec![0u8; body_len as usize];
            reader.read_exact(&mut body)?;
            if body.len() < 16 {
                return Err(FormatError::MissingFmtChunk);
            }
            let format = LittleEndian::read_u16(&body[0..2]);
            if format != WAVE_FORMAT_PCM && format != WAVE_FORMAT_EXTENSIBLE {
                return Err(FormatError::UnsupportedWaveFormat(format));
            }
            let channels = LittleEndian::read_u16(&body[2..4]);
            let sample_rate = LittleEndian::read_u32(&body[4..8]);
            let bits_per_sample = LittleEndian::read_u16(&body[14..16]);
            fmt_info = Some((channels, bits_per_sample, sample_rate));
            reader.seek(SeekFrom::Current(pad(body_len) as i64))?;
        } else if tag == GUID_DATA {
            data_len = Some(body_len as u32);
            break;
        } else {
            info!("ignoring unknown chunk: guid={tag:02x?}, len={body_len}.");
            reader.seek(SeekFrom::Current((body_len + pad(body_len)) as i64))?;
        }
    }

    let (channels, bits_per_sample, sample_rate) = fmt_info.ok_or(FormatError::MissingFmtChunk)?;
    let data_len = data_len.ok_or(FormatError::MissingDataChunk)?;
    Ok(PcmStreamInfo { channels, bits_per_sample, sample_rate, data_len })
}

pub fn write_header<W: Write>(
    writer: &mut W,
    channels: u16,
    bits_per_sample: u16,
    sample_rate: u32,
    data_len: u32,
) -> Result<()> {
    const FMT_BODY_LEN: u64 = 16;
    let fmt_chunk_len = CHUNK_HEADER_LEN + FMT_BODY_LEN;
    let data_chunk_len = CHUNK_HEADER_LEN + u64::from(data_len);
    let riff_size = CHUNK_HEADER_LEN + 16 + fmt_chunk_len + data_chunk_len;

    writer.write_all(&GUID_RIFF)?;
    writer.write_u64::<LittleEndian>(riff_size)?;
    writer.write_all(&GUID_WAVE)?;

    writer.write_all(&GUID_FMT)?;
    writer.write_u64::<LittleEndian>(fmt_chunk_len)?;
    let block_align = channels * (bits_per_sample / 8);
    let byte_rate = sample_rate * u32::from(block_align);
    writer.write_u16::<LittleEndian>(WAVE_FORMAT_PCM)?;
    writer.write_u16::<LittleEndian>(channels)?;
    writer.write_u32::<LittleEndian>(sample_rate)?;
    writer.write_u32::<LittleEndian>(byte_rate)?;
    writer.write_u16::<LittleEndian>(block_align)?;
    writer.write_u16::<LittleEndian>(bits_per_sample)?;

    writer.write_all(&GUID_DATA)?;
    writer.write_u64::<LittleEndian>(data_chunk_len)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_header() {
        let mut buf = Vec::new();
        write_header(&mut buf, 2, 24, 48000, 12000).unwrap();
        buf.extend(std::iter::repeat(0u8).take(12000));

        let mut cursor = Cursor::new(buf);
        let info = read_header(&mut cursor).unwrap();
        assert_eq!(info, PcmStreamInfo { channels: 2, bits_per_sample: 24, sample_rate: 48000, data_len: 12000 });
    }

    #[test]
    fn rejects_non_wave64() {
        let buf = vec![0u8; 40];
        let mut cursor = Cursor::new(buf);
        let err = read_header(&mut cursor).unwrap_err();
        assert!(matches!(err, FormatError::NotWave64));
    }
}
