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
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use futures_util::{future::BoxFuture, FutureExt};
use parking_lot::Mutex;
use tracing::info;

use super::{decode, DecodeError, DecodedSample, VoiceId};

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Something the mock context was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Start { voice: VoiceId, frames: usize, at: f64 },
    Stop { voice: VoiceId, at: f64 },
}

/// A mock context. Doesn't actually play anything; it records every start and
/// stop against a manually advanced clock. By default it treats audio data as
/// raw PCM; a [`Context::decoding`] context decodes it like a real device does.
#[derive(Clone)]
pub struct Context {
    name: String,
    sample_rate: u32,
    decodes_audio: bool,
    /// Current time in microseconds.
    clock: Arc<AtomicU64>,
    next_voice: Arc<AtomicU64>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Context {
    /// Creates a new mock context.
    pub fn new(name: &str, sample_rate: u32) -> Context {
        Context {
            name: name.to_string(),
            sample_rate,
            decodes_audio: false,
            clock: Arc::new(AtomicU64::new(0)),
            next_voice: Arc::new(AtomicU64::new(1)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Creates a mock context that decodes audio data with the same decoder the
    /// cpal context uses, so bad files fail here as they would on a device.
    pub fn decoding(name: &str, sample_rate: u32) -> Context {
        Context {
            decodes_audio: true,
            ..Context::new(name, sample_rate)
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, seconds: f64) {
        self.clock
            .fetch_add((seconds * 1_000_000.0).round() as u64, Ordering::SeqCst);
    }

    /// Returns every call made so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Returns the number of voices started.
    pub fn starts(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::Start { .. }))
            .count()
    }

    /// Returns the number of voices stopped.
    pub fn stops(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::Stop { .. }))
            .count()
    }
}

impl super::AudioContext for Context {
    fn current_time(&self) -> f64 {
        self.clock.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&self, sample: Arc<DecodedSample>, at: f64) -> VoiceId {
        let voice = self.next_voice.fetch_add(1, Ordering::SeqCst);
        info!(
            context = self.name,
            voice,
            frames = sample.frame_count(),
            at,
            "Starting voice."
        );
        self.calls.lock().push(Call::Start {
            voice,
            frames: sample.frame_count(),
            at,
        });
        voice
    }

    fn stop(&self, voice: VoiceId, at: f64) {
        info!(context = self.name, voice, at, "Stopping voice.");
        self.calls.lock().push(Call::Stop { voice, at });
    }

    /// Treats the bytes as unsigned 8-bit mono PCM unless the context decodes.
    fn decode_audio_data(
        &self,
        data: Vec<u8>,
    ) -> BoxFuture<'static, Result<DecodedSample, DecodeError>> {
        let sample_rate = self.sample_rate;
        let decodes_audio = self.decodes_audio;
        async move {
            tokio::task::yield_now().await;
            if decodes_audio {
                return decode::decode_bytes(data, sample_rate);
            }
            if data.is_empty() {
                return Err(DecodeError::Empty);
            }
            let samples = data.iter().map(|b| (*b as f32 - 128.0) / 128.0).collect();
            Ok(DecodedSample::new(samples, 1, sample_rate))
        }
        .boxed()
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::super::AudioContext;
    use super::*;

    #[tokio::test]
    async fn test_mock_decode() {
        let context = Context::new("mock", 8000);
        let sample = context.decode_audio_data(vec![128, 255, 0]).await.unwrap();
        assert_eq!(sample.frame_count(), 3);
        assert_eq!(sample.sample(0, 0), Some(0.0));
        assert_eq!(sample.sample(2, 0), Some(-1.0));

        assert!(matches!(
            context.decode_audio_data(Vec::new()).await,
            Err(DecodeError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_decoding_mock_rejects_raw_bytes() {
        let context = Context::decoding("mock", 8000);
        assert!(matches!(
            context.decode_audio_data(vec![128, 255, 0]).await,
            Err(DecodeError::Format(_))
        ));
    }

    #[test]
    fn test_mock_records_calls() {
        let context = Context::new("mock", 8000);
        context.advance(1.5);
        assert_eq!(context.current_time(), 1.5);

        let voice = context.start(Arc::new(DecodedSample::new(vec![0.0; 4], 1, 8000)), 1.5);
        context.stop(voice, 1.8);
        assert_eq!(
            context.calls(),
            vec![
                Call::Start {
                    voice,
                    frames: 4,
                    at: 1.5
                },
                Call::Stop { voice, at: 1.8 },
            ]
        );
        assert_eq!(context.starts(), 1);
        assert_eq!(context.stops(), 1);
    }
}
