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
// Core audio mixing logic that's independent of any audio backend
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{DecodedSample, VoiceId};

/// Global counter for generating unique voice IDs
static VOICE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A sample scheduled on the mixer.
struct ScheduledVoice {
    /// Unique ID for this voice
    id: VoiceId,
    /// The shared sample data
    sample: Arc<DecodedSample>,
    /// Frame on the mixer clock at which playback begins
    start_frame: u64,
    /// Frame on the mixer clock at which playback is cut, if scheduled
    stop_frame: Option<u64>,
    /// Next frame of the sample to play
    position: usize,
    /// Whether this voice has finished playing
    finished: bool,
}

/// Mixes scheduled samples into interleaved output through a single gain stage
/// and keeps the audio clock.
pub struct Mixer {
    /// Active voices
    voices: Vec<ScheduledVoice>,
    /// Number of output channels
    num_channels: u16,
    /// Sample rate
    sample_rate: u32,
    /// The fixed output gain applied to the summed mix
    gain: f32,
    /// Frames rendered so far; this is the audio clock.
    frames_rendered: u64,
}

impl Mixer {
    /// Creates a new mixer
    pub fn new(num_channels: u16, sample_rate: u32, gain: f32) -> Self {
        Self {
            voices: Vec::new(),
            num_channels: num_channels.max(1),
            sample_rate,
            gain,
            frames_rendered: 0,
        }
    }

    /// The current audio clock time in seconds.
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    fn to_frame(&self, at: f64) -> u64 {
        (at.max(0.0) * self.sample_rate as f64).round() as u64
    }

    /// Schedules a sample to start at the given time. Times in the past start
    /// with the next rendered frame.
    pub fn start(&mut self, sample: Arc<DecodedSample>, at: f64) -> VoiceId {
        let id = VOICE_ID_COUNTER.fetch_add(1, Ordering::SeqCst);
        let start_frame = self.to_frame(at);
        self.voices.push(ScheduledVoice {
            id,
            sample,
            start_frame,
            stop_frame: None,
            position: 0,
            finished: false,
        });
        id
    }

    /// Schedules a voice to be cut at the given time.
    pub fn stop(&mut self, id: VoiceId, at: f64) {
        let stop_frame = self.to_frame(at);
        if let Some(voice) = self.voices.iter_mut().find(|v| v.id == id) {
            voice.stop_frame = Some(stop_frame);
        }
    }

    /// Renders interleaved frames into the output buffer and advances the clock.
    pub fn render(&mut self, output: &mut [f32]) {
        output.fill(0.0);

        let channels = self.num_channels as usize;
        let frames = output.len() / channels;
        let block_start = self.frames_rendered;

        for voice in self.voices.iter_mut() {
            for frame in 0..frames {
                let clock = block_start + frame as u64;
                if clock < voice.start_frame {
                    continue;
                }
                if voice.stop_frame.is_some_and(|stop| clock >= stop)
                    || voice.position >= voice.sample.frame_count()
                {
                    voice.finished = true;
                    break;
                }

                let out = &mut output[frame * channels..(frame + 1) * channels];
                for (channel, value) in out.iter_mut().enumerate() {
                    *value += voice.sample.sample(voice.position, channel).unwrap_or(0.0);
                }
                voice.position += 1;
            }
        }

        if self.gain != 1.0 {
            for value in output.iter_mut() {
                *value *= self.gain;
            }
        }

        self.voices.retain(|v| !v.finished);
        self.frames_rendered += frames as u64;
    }

    /// Returns the number of voices still scheduled or sounding.
    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    /// Gets the number of output channels
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Gets the sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ones(frames: usize) -> Arc<DecodedSample> {
        Arc::new(DecodedSample::new(vec![1.0; frames], 1, 10))
    }

    #[test]
    fn test_clock_advances() {
        let mut mixer = Mixer::new(2, 10, 1.0);
        assert_eq!(mixer.current_time(), 0.0);

        let mut output = vec![0.0; 20];
        mixer.render(&mut output);
        assert_eq!(mixer.current_time(), 1.0);
    }

    #[test]
    fn test_gain_and_channel_fanout() {
        let mut mixer = Mixer::new(2, 10, 0.5);
        mixer.start(ones(2), 0.0);
        mixer.start(ones(2), 0.0);

        let mut output = vec![0.0; 6];
        mixer.render(&mut output);
        assert_eq!(output, vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0]);
        assert_eq!(mixer.active_count(), 0);
    }

    #[test]
    fn test_scheduled_start_and_stop() {
        let mut mixer = Mixer::new(1, 10, 1.0);
        let id = mixer.start(ones(100), 0.2);
        mixer.stop(id, 0.5);

        let mut output = vec![0.0; 10];
        mixer.render(&mut output);
        assert_eq!(
            output,
            vec![0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]
        );
        assert_eq!(mixer.active_count(), 0);
    }

    #[test]
    fn test_stop_unknown_voice() {
        let mut mixer = Mixer::new(1, 10, 1.0);
        mixer.stop(12345, 0.0);
        assert_eq!(mixer.active_count(), 0);
    }
}
