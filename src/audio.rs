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
use std::{error::Error, fmt, sync::Arc};

use futures_util::future::BoxFuture;

use crate::config;

pub mod buffer;
pub mod cpal;
pub mod decode;
pub mod mixer;
pub mod mock;

pub use buffer::DecodedSample;
pub use decode::DecodeError;

/// Identifies one scheduled playback within an audio context.
pub type VoiceId = u64;

/// The playback context every voice is started on. There is one per process,
/// created after the first user gesture and never torn down.
pub trait AudioContext: fmt::Display + Send + Sync {
    /// The current time of the audio clock in seconds.
    fn current_time(&self) -> f64;

    /// The output sample rate. Decoded samples are produced at this rate.
    fn sample_rate(&self) -> u32;

    /// Schedules the sample to start at the given audio clock time.
    fn start(&self, sample: Arc<DecodedSample>, at: f64) -> VoiceId;

    /// Schedules the voice to stop at the given audio clock time. Stopping a voice
    /// that has already finished does nothing.
    fn stop(&self, voice: VoiceId, at: f64);

    /// Decodes compressed audio into a playback-ready sample.
    fn decode_audio_data(
        &self,
        data: Vec<u8>,
    ) -> BoxFuture<'static, Result<DecodedSample, DecodeError>>;
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    cpal::Context::list()
}

/// Opens the audio context described by the configuration.
pub fn get_context(
    config: &config::Audio,
    gain: f32,
) -> Result<Arc<dyn AudioContext>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Context::new(
            device,
            config.sample_rate().unwrap_or(mock::DEFAULT_SAMPLE_RATE),
        )));
    };

    Ok(Arc::new(cpal::Context::open(config, gain)?))
}
