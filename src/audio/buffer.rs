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
use std::time::Duration;

/// A decoded, playback-ready sample. Voices share it through an `Arc`, so the
/// data is never copied per playback.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSample {
    /// The sample data as f32 samples, interleaved if multi-channel.
    data: Vec<f32>,
    /// Number of channels in the sample.
    channel_count: u16,
    /// Sample rate of the audio data.
    sample_rate: u32,
}

impl DecodedSample {
    /// Creates a new decoded sample from interleaved data.
    pub fn new(data: Vec<f32>, channel_count: u16, sample_rate: u32) -> Self {
        Self {
            data,
            channel_count: channel_count.max(1),
            sample_rate,
        }
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of frames.
    pub fn frame_count(&self) -> usize {
        self.data.len() / self.channel_count as usize
    }

    /// Returns the playback duration.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }

    /// Returns the sample at the given frame for an output channel. Mono samples
    /// feed every output channel; wider samples wrap around.
    #[inline]
    pub fn sample(&self, frame: usize, output_channel: usize) -> Option<f32> {
        let channels = self.channel_count as usize;
        self.data
            .get(frame * channels + output_channel % channels)
            .copied()
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_and_duration() {
        let sample = DecodedSample::new(vec![0.0; 800], 2, 400);
        assert_eq!(sample.frame_count(), 400);
        assert_eq!(sample.duration(), Duration::from_secs(1));
        assert_eq!(sample.memory_size(), 3200);
    }

    #[test]
    fn test_channel_wrapping() {
        let mono = DecodedSample::new(vec![0.1, 0.2], 1, 44100);
        assert_eq!(mono.sample(1, 0), Some(0.2));
        assert_eq!(mono.sample(1, 1), Some(0.2));
        assert_eq!(mono.sample(2, 0), None);

        let stereo = DecodedSample::new(vec![1.0, -1.0, 0.5, -0.5], 2, 44100);
        assert_eq!(stereo.sample(0, 1), Some(-1.0));
        assert_eq!(stereo.sample(1, 2), Some(0.5));
    }
}
