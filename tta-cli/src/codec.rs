// TTA-rs
// Copyright (c) 2024 The TTA-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Drives a single [`FrameCodec`] to completion over an in-memory
//! buffer. The codec itself is resumable at any buffer boundary; this
//! is the simplest possible driver, feeding it a fixed-size scratch
//! buffer in a loop until the frame reports `Done`.

use tta_core::{CoreError, FrameCodec, FrameDescriptor, Mode, Status};

const SCRATCH_LEN: usize = 8192;

pub fn encode_frame(descriptor: FrameDescriptor, pcm: &[u8]) -> tta_core::Result<Vec<u8>> {
    let mut codec = FrameCodec::new(descriptor, Mode::Encode)?;
    let mut out = Vec::with_capacity(pcm.len());
    let mut scratch = [0u8; SCRATCH_LEN];
    let mut pcm_pos = 0usize;

    loop {
        let (progress, status) = codec.encode_step(&pcm[pcm_pos..], &mut scratch);
        pcm_pos += progress.pcm_bytes;
        out.extend_from_slice(&scratch[..progress.tta_bytes]);
        if status == Status::Done {
            return Ok(out);
        }
        if progress.pcm_bytes == 0 && progress.tta_bytes == 0 {
            // Both buffers had room and the codec still made no progress;
            // driving further would spin forever.
            return Ok(out);
        }
    }
}

/// Decodes one frame. The second element of the returned tuple carries
/// a trailer CRC mismatch, if any — the PCM in the first element is
/// already complete by the time that can be detected, so it's still
/// usable.
pub fn decode_frame(
    descriptor: FrameDescriptor,
    tta: &[u8],
) -> tta_core::Result<(Vec<u8>, Option<CoreError>)> {
    let mut codec = FrameCodec::new(descriptor, Mode::Decode)?;
    let mut pcm = Vec::new();
    let mut scratch = [0u8; SCRATCH_LEN];
    let mut tta_pos = 0usize;

    loop {
        let (progress, status) = codec.decode_step(&tta[tta_pos..], &mut scratch);
        tta_pos += progress.tta_bytes;
        pcm.extend_from_slice(&scratch[..progress.pcm_bytes]);
        match status {
            Ok(Status::Done) => return Ok((pcm, None)),
            Ok(Status::Suspended) => {
                if progress.pcm_bytes == 0 && progress.tta_bytes == 0 {
                    return Ok((pcm, None));
                }
            }
            Err(e) => return Ok((pcm, Some(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tta_core::SampleDepth;

    #[test]
    fn encode_then_decode_round_trips() {
        let descriptor = FrameDescriptor { channels: 2, depth: SampleDepth::Sixteen, samples_per_channel: 64 };
        let mut pcm = Vec::new();
        for i in 0..64i32 {
            let l = (i * 37 % 2000 - 1000) as i16;
            let r = (i * 53 % 1500 - 750) as i16;
            pcm.extend_from_slice(&l.to_le_bytes());
            pcm.extend_from_slice(&r.to_le_bytes());
        }

        let tta_bytes = encode_frame(descriptor, &pcm).unwrap();
        let (decoded, crc_err) = decode_frame(descriptor, &tta_bytes).unwrap();
        assert!(crc_err.is_none());
        assert_eq!(decoded, pcm);
    }
}
