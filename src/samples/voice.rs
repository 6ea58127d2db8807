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

//! Voice management for note playback.
//!
//! At most one voice is active per note. Stopping a voice removes it from the
//! active set straight away while its sound keeps going for the release tail.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::audio::{AudioContext, DecodedSample, VoiceId};

/// Default release tail between a stop request and the end of the sound.
pub const DEFAULT_STOP_DELAY: Duration = Duration::from_millis(300);

/// One sounding instance of a note.
pub struct Voice {
    /// The note being played.
    note: String,
    /// The sample being played.
    sample: Arc<DecodedSample>,
    /// When this voice started, on the audio clock.
    started_at: f64,
    /// The playback scheduled on the audio context.
    id: VoiceId,
}

impl Voice {
    /// Returns the note being played.
    pub fn note(&self) -> &str {
        &self.note
    }

    /// Returns the sample being played.
    pub fn sample(&self) -> &Arc<DecodedSample> {
        &self.sample
    }

    /// Returns when the voice started, on the audio clock.
    pub fn started_at(&self) -> f64 {
        self.started_at
    }
}

/// Manages active voices, keyed by note.
pub struct VoiceManager {
    /// The context voices play on.
    context: Arc<dyn AudioContext>,
    /// Active voices by note.
    voices: HashMap<String, Voice>,
    /// Release tail applied on stop.
    stop_delay: Duration,
}

impl VoiceManager {
    /// Creates a new voice manager.
    pub fn new(context: Arc<dyn AudioContext>, stop_delay: Duration) -> Self {
        Self {
            context,
            voices: HashMap::new(),
            stop_delay,
        }
    }

    /// Starts a voice for the note now. Does nothing and returns false if the
    /// note already has an active voice.
    pub fn start(&mut self, note: &str, sample: Arc<DecodedSample>) -> bool {
        if self.voices.contains_key(note) {
            debug!(note, "Voice already active");
            return false;
        }

        let started_at = self.context.current_time();
        let id = self.context.start(sample.clone(), started_at);
        debug!(note, voice = id, started_at, "Voice started");
        self.voices.insert(
            note.to_string(),
            Voice {
                note: note.to_string(),
                sample,
                started_at,
                id,
            },
        );
        true
    }

    /// Schedules the note's voice to stop after the release tail and removes it
    /// from the active set. Does nothing and returns false if the note has no
    /// active voice.
    pub fn stop(&mut self, note: &str) -> bool {
        match self.voices.remove(note) {
            Some(voice) => {
                self.release(voice);
                true
            }
            None => false,
        }
    }

    /// Stops every active voice. Returns how many were stopped.
    pub fn stop_all(&mut self) -> usize {
        let voices: Vec<Voice> = self.voices.drain().map(|(_, voice)| voice).collect();
        let count = voices.len();
        for voice in voices {
            self.release(voice);
        }
        count
    }

    fn release(&self, voice: Voice) {
        let at = self.context.current_time() + self.stop_delay.as_secs_f64();
        debug!(note = voice.note, voice = voice.id, at, "Voice released");
        self.context.stop(voice.id, at);
    }

    /// Returns the active voice for a note.
    pub fn voice(&self, note: &str) -> Option<&Voice> {
        self.voices.get(note)
    }

    /// Returns true if the note has an active voice.
    pub fn is_active(&self, note: &str) -> bool {
        self.voices.contains_key(note)
    }

    /// Returns the current number of active voices.
    pub fn active_count(&self) -> usize {
        self.voices.len()
    }
}

impl std::fmt::Debug for VoiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceManager")
            .field("active_voices", &self.voices.len())
            .field("stop_delay", &self.stop_delay)
            .finish()
    }
}
