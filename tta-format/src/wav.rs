// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A minimal RIFF/WAVE reader and writer: just enough to pull PCM shape
//! and sample data out of a `.wav` file for encoding, and to wrap
//! decoded PCM back into one. Chunks are walked one at a time, the way
//! a streaming demuxer does it, skipping anything that isn't `fmt ` or
//! `data`; the walk stops the instant `data` is found so the caller can
//! read samples directly from the stream's current position.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use log::info;

use crate::error::{FormatError, Result};

const RIFF: &[u8; 4] = b"RIFF";
const WAVE: &[u8; 4] = b"WAVE";
const FMT: &[u8; 4] = b"fmt ";
const DATA: &[u8; 4] = b"data";
const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// The PCM shape and data-chunk extent recovered from a WAVE or Wave64
/// header, handed to the encoder front-end without needing a full
/// demuxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmStreamInfo {
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
    /// Size of the `data` chunk's payload, in bytes.
    pub data_len: u32,
}

/// Whether a 4-byte peek at a stream's start looks like RIFF/WAVE.
pub fn has_magic(peek: &[u8; 4]) -> bool {
    peek == RIFF
}

/// Reads chunks up to and including the `data` chunk's header, leaving
/// the stream positioned at the first PCM byte.
pub fn read_header<R: Read + Seek>(reader: &mut R) -> Result<PcmStreamInfo> {
    let mut riff_header = [0u8; 12];
    reader.read_exact(&mut riff_header)?;
    if &riff_header[0..4] != RIFF || &riff_header[8..12] != WAVE {
        return Err(FormatError::NotRiffWave);
    }

    let mut fmt_info = None;
    let mut data_len = None;

    loop {
        let mut tag = [0u8; 4];
        match reader.read_exact(&mut tag) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let len = reader.read_u32::<LittleEndian>()?;

        if &tag == FMT {
            let mut body = vec![0u8; len as usize];
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
            if len % 2 == 1 {
                reader.seek(SeekFrom::Current(1))?;
            }
        } else if &tag == DATA {
            data_len = Some(len);
            break;
        } else {
            info!("ignoring unknown chunk: tag={}, len={}.", String::from_utf8_lossy(&tag), len);
            let skip = i64::from(len) + i64::from(len % 2);
            reader.seek(SeekFrom::Current(skip))?;
        }
    }

    let (channels, bits_per_sample, sample_rate) = fmt_info.ok_or(FormatError::MissingFmtChunk)?;
    let data_len = data_len.ok_or(FormatError::MissingDataChunk)?;
    Ok(PcmStreamInfo { channels, bits_per_sample, sample_rate, data_len })
}

/// Writes a canonical 44-byte `RIFF`/`WAVE`/`fmt `/`data` header. The
/// caller must already know `data_len` (TTA1's header carries the total
/// sample count up front, so a decoder always does).
pub fn write_header<W: Write>(
    writer: &mut W,
    channels: u16,
    bits_per_sample: u16,
    sample_rate: u32,
    data_len: u32,
) -> Result<()> {
    let block_align = channels * (bits_per_sample / 8);
    let byte_rate = sample_rate * u32::from(block_align);

    writer.write_all(RIFF)?;
    writer.write_u32::<LittleEndian>(36 + data_len)?;
    writer.write_all(WAVE)?;

    writer.write_all(FMT)?;
    writer.write_u32::<LittleEndian>(16)?;
    writer.write_u16::<LittleEndian>(WAVE_FORMAT_PCM)?;
    writer.write_u16::<LittleEndian>(channels)?;
    writer.write_u32::<LittleEndian>(sample_rate)?;
    writer.write_u32::<LittleEndian>(byte_rate)?;
    writer.write_u16::<LittleEndian>(block_align)?;
    writer.write_u16::<LittleEndian>(bits_per_sample)?;

    writer.write_all(DATA)?;
    writer.write_u32::<LittleEndian>(data_len)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_header() {
        let mut buf = Vec::new();
        write_header(&mut buf, 2, 16, 44100, 8000).unwrap();
        buf.extend(std::iter::repeat(0u8).take(8000));

        let mut cursor = Cursor::new(buf);
        let info = read_header(&mut cursor).unwrap();
        assert_eq!(info, PcmStreamInfo { channels: 2, bits_per_sample: 16, sample_rate: 44100, data_len: 8000 });
        assert_eq!(cursor.position(), 44);
    }

    #[test]
    fn skips_unknown_chunks_before_fmt() {
        let mut header_only = Vec::new();
        write_header(&mut header_only, 1, 8, 22050, 10).unwrap();

        let mut buf = Vec::new();
        buf.extend_from_slice(RIFF);
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(WAVE);
        buf.extend_from_slice(b"JUNK");
        buf.extend_from_slice(&4u32.to_le_bytes());
        buf.extend_from_slice(&[0xAA; 4]);
        // Skip past the synthetic RIFF/WAVE prefix in `header_only` and
        // splice in its `fmt `/`data` chunks.
        buf.extend_from_slice(&header_only[12..]);
        buf.extend(std::iter::repeat(0u8).take(10));

        let mut cursor = Cursor::new(buf);
        let info = read_header(&mut cursor).unwrap();
        assert_eq!(info.channels, 1);
        assert_eq!(info.bits_per_sample, 8);
        assert_eq!(info.data_len, 10);
    }

    #[test]
    fn rejects_non_riff() {
        let buf = vec![0u8; 12];
        let mut cursor = Cursor::new(buf);
        let err = read_header(&mut cursor).unwrap_err();
        assert!(matches!(err, FormatError::NotRiffWave));
    }
}
