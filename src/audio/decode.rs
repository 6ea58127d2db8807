// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Decodes compressed note samples held in memory.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use super::DecodedSample;

/// Errors produced while turning compressed bytes into a decoded sample.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("no audio data")]
    Empty,

    #[error("unrecognised audio format: {0}")]
    Format(String),

    #[error("no audio track found")]
    NoTrack,

    #[error("sample rate not specified")]
    NoSampleRate,

    #[error("audio decode error: {0}")]
    Audio(#[from] SymphoniaError),
}

/// Decodes an in-memory audio file (MP3, OGG, WAV, ...) into interleaved f32 samples,
/// resampled to the target rate.
pub fn decode_bytes(data: Vec<u8>, target_sample_rate: u32) -> Result<DecodedSample, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());
    let probed = get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Format(e.to_string()))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let source_sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(DecodeError::NoSampleRate)?;
    let mut channel_count = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    while let Some(packet) = next_packet(format_reader.as_mut())? {
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            // A corrupt frame is skipped rather than failing the whole sample.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if channel_count == 0 {
            channel_count = decoded.spec().channels.count() as u16;
        }
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if samples.is_empty() {
        return Err(DecodeError::Empty);
    }
    let channel_count = channel_count.max(1);

    let samples = if source_sample_rate != target_sample_rate {
        debug!(
            source_rate = source_sample_rate,
            target_rate = target_sample_rate,
            "Transcoding sample"
        );
        transcode_samples(
            &samples,
            channel_count,
            source_sample_rate,
            target_sample_rate,
        )
    } else {
        samples
    };

    Ok(DecodedSample::new(
        samples,
        channel_count,
        target_sample_rate,
    ))
}

/// Reads the next packet, treating end of stream as `None`.
fn next_packet(format_reader: &mut dyn FormatReader) -> Result<Option<Packet>, DecodeError> {
    match format_reader.next_packet() {
        Ok(packet) => Ok(Some(packet)),
        Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Ok(None)
        }
        // Some readers report a decode error at the end of the stream.
        Err(SymphoniaError::DecodeError(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Transcodes samples from one sample rate to another using linear interpolation.
/// Note samples are short one-shots, so this is sufficient.
fn transcode_samples(
    samples: &[f32],
    channel_count: u16,
    source_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    let ratio = target_rate as f64 / source_rate as f64;
    let channels = channel_count as usize;
    let source_frames = samples.len() / channels;
    let target_frames = (source_frames as f64 * ratio).ceil() as usize;

    let mut output = Vec::with_capacity(target_frames * channels);

    for target_frame in 0..target_frames {
        let source_pos = target_frame as f64 / ratio;
        let source_frame = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        for channel in 0..channels {
            let s0 = samples
                .get(source_frame * channels + channel)
                .copied()
                .unwrap_or(0.0);
            let s1 = samples
                .get((source_frame + 1) * channels + channel)
                .copied()
                .unwrap_or(s0);
            output.push(s0 + (s1 - s0) * frac);
        }
    }

    output
}
