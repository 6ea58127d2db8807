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

//! The instrument routes input events to the sample bank, the voices and the
//! note log.
//!
//! The instrument starts out waiting for a user gesture. The first gesture (or
//! the first key press) opens the audio context and hands back a [`LoadJob`] for
//! the caller to run. When the job's outcome is handed back through
//! [`Instrument::finish_loading`] the instrument is ready to play. A failed load
//! leaves it loading for good.

use std::{error::Error, fmt, sync::Arc, time::Duration};

use tracing::{debug, error, info, warn};

use crate::{
    assets::AssetSource,
    audio::AudioContext,
    keys::KeyState,
    layout::NoteMapping,
    notelog::{NoteLog, OutputMode},
    samples::{LoadJob, LoadOutcome, SampleBank, VoiceManager, DEFAULT_STOP_DELAY},
    storage::Storage,
};

/// Opens the audio context. Called once, on the first user gesture.
pub type ContextOpener =
    Box<dyn FnMut() -> Result<Arc<dyn AudioContext>, Box<dyn Error>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentState {
    /// No audio context yet. A user gesture is needed to start.
    Waiting,
    /// The samples are loading, or failed to load.
    Loading,
    /// Ready to play.
    Running,
}

impl fmt::Display for InstrumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentState::Waiting => write!(f, "waiting"),
            InstrumentState::Loading => write!(f, "loading"),
            InstrumentState::Running => write!(f, "running"),
        }
    }
}

pub struct Instrument {
    state: InstrumentState,
    open_context: ContextOpener,
    assets: Arc<dyn AssetSource>,
    /// None while a load job owns the bank.
    bank: Option<SampleBank>,
    /// Created along with the audio context.
    voices: Option<VoiceManager>,
    keys: KeyState,
    mapping: NoteMapping,
    log: NoteLog,
    storage: Box<dyn Storage>,
    output_mode: OutputMode,
    stop_delay: Duration,
    load_error: Option<String>,
}

impl Instrument {
    /// Creates a waiting instrument. The note log is restored from storage.
    pub fn new(
        assets: Arc<dyn AssetSource>,
        manifest: &str,
        open_context: ContextOpener,
        storage: Box<dyn Storage>,
    ) -> Instrument {
        let log = NoteLog::restore(storage.as_ref());
        Instrument {
            state: InstrumentState::Waiting,
            open_context,
            assets,
            bank: Some(SampleBank::new(manifest)),
            voices: None,
            keys: KeyState::new(),
            mapping: NoteMapping::default(),
            log,
            storage,
            output_mode: OutputMode::default(),
            stop_delay: DEFAULT_STOP_DELAY,
            load_error: None,
        }
    }

    pub fn with_mapping(mut self, mapping: NoteMapping) -> Instrument {
        self.mapping = mapping;
        self
    }

    pub fn with_output_mode(mut self, output_mode: OutputMode) -> Instrument {
        self.output_mode = output_mode;
        self
    }

    /// Sets the release tail applied when a note stops.
    pub fn with_stop_delay(mut self, stop_delay: Duration) -> Instrument {
        self.stop_delay = stop_delay;
        self
    }

    /// Handles an explicit start gesture. Returns the load to run if this
    /// started loading.
    pub fn gesture(&mut self) -> Option<LoadJob> {
        match self.state {
            InstrumentState::Waiting => self.begin_loading(),
            _ => None,
        }
    }

    /// Handles a key press. While waiting, any key press acts as the start
    /// gesture and the load to run is returned.
    pub fn key_down(&mut self, code: &str, repeat: bool) -> Option<LoadJob> {
        match self.state {
            InstrumentState::Waiting => return self.begin_loading(),
            InstrumentState::Loading => return None,
            InstrumentState::Running => {}
        }
        if repeat {
            return None;
        }
        let note = self.mapping.get(code)?.to_string();
        if !self.keys.press(code, &note) {
            return None;
        }

        match (self.bank.as_ref().and_then(|bank| bank.get(&note)), self.voices.as_mut()) {
            (Some(sample), Some(voices)) => {
                voices.start(&note, sample);
            }
            _ => warn!(code, note = %note, "No sample for note"),
        }

        let rendered = self.log.push_note(&note, self.output_mode).to_string();
        debug!(code, note = %note, rendered = %rendered, "Note played");
        self.persist_log();
        None
    }

    /// Handles a key release. The note stopped is the one the key was pressed as.
    pub fn key_up(&mut self, code: &str, repeat: bool) {
        if self.state != InstrumentState::Running || repeat {
            return;
        }
        let Some(note) = self.keys.release(code) else {
            return;
        };
        if let Some(voices) = self.voices.as_mut() {
            voices.stop(&note);
        }
    }

    /// Handles a visibility change. Key releases aren't delivered while hidden,
    /// so hiding stops every voice and releases every key.
    pub fn visibility_changed(&mut self, hidden: bool) {
        if !hidden || self.state != InstrumentState::Running {
            return;
        }
        let stopped = self.voices.as_mut().map(VoiceManager::stop_all).unwrap_or(0);
        let released = self.keys.release_all().len();
        info!(stopped, released, "Hidden, silenced the instrument");
    }

    /// Replaces the key mapping. Held keys keep the note they were pressed as.
    pub fn set_mapping(&mut self, mapping: NoteMapping) {
        info!(keys = mapping.len(), "Key mapping replaced");
        self.mapping = mapping;
    }

    pub fn set_output_mode(&mut self, output_mode: OutputMode) {
        info!(%output_mode, "Output mode changed");
        self.output_mode = output_mode;
    }

    /// Takes back the bank from a finished load job.
    pub fn finish_loading(&mut self, outcome: LoadOutcome) {
        if self.state != InstrumentState::Loading || self.bank.is_some() {
            debug!(state = %self.state, "Discarding stale load outcome");
            return;
        }

        self.bank = Some(outcome.bank);
        match outcome.result {
            Ok(()) => {
                self.state = InstrumentState::Running;
                self.load_error = None;
                if let Some(bank) = self.bank.as_ref() {
                    info!(
                        samples = bank.len(),
                        memory_bytes = bank.total_memory_usage(),
                        "Samples loaded, instrument running"
                    );
                }
            }
            Err(e) => {
                error!(err = %e, "Failed to load samples");
                self.load_error = Some(e.to_string());
            }
        }
    }

    fn begin_loading(&mut self) -> Option<LoadJob> {
        let context = match (self.open_context)() {
            Ok(context) => context,
            Err(e) => {
                error!(err = %e, "Unable to open audio context");
                self.load_error = Some(e.to_string());
                return None;
            }
        };
        let bank = self.bank.take()?;

        info!(context = %context, manifest = bank.manifest_path(), "Loading samples");
        self.voices = Some(VoiceManager::new(context.clone(), self.stop_delay));
        self.state = InstrumentState::Loading;
        self.load_error = None;
        Some(LoadJob::new(bank, self.assets.clone(), context))
    }

    /// Appends a space to the log.
    pub fn log_space(&mut self) {
        self.log.push_space();
        self.persist_log();
    }

    /// Appends a newline to the log.
    pub fn log_newline(&mut self) {
        self.log.push_newline();
        self.persist_log();
    }

    /// Removes the last token from the log.
    pub fn log_backspace(&mut self) {
        if self.log.backspace().is_some() {
            self.persist_log();
        }
    }

    pub fn log_clear(&mut self) {
        self.log.clear();
        self.persist_log();
    }

    fn persist_log(&mut self) {
        if let Err(e) = self.log.persist(self.storage.as_mut()) {
            warn!(err = %e, "Unable to persist note log");
        }
    }

    pub fn state(&self) -> InstrumentState {
        self.state
    }

    /// The reason the last load failed, if it did.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn log(&self) -> &NoteLog {
        &self.log
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// The sample bank, unless a load job holds it.
    pub fn bank(&self) -> Option<&SampleBank> {
        self.bank.as_ref()
    }

    pub fn voices(&self) -> Option<&VoiceManager> {
        self.voices.as_ref()
    }

    pub fn keys(&self) -> &KeyState {
        &self.keys
    }

    pub fn mapping(&self) -> &NoteMapping {
        &self.mapping
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }
}

impl fmt::Debug for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("state", &self.state)
            .field("bank", &self.bank)
            .field("voices", &self.voices)
            .field("keys", &self.keys)
            .field("output_mode", &self.output_mode)
            .field("load_error", &self.load_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assets::{FetchError, MemoryAssetSource},
        audio::mock,
        notelog::LOG_KEY,
        samples::LoadError,
        storage::MemoryStorage,
    };

    const MANIFEST: &str = "samples/piano.json";
    const PIANO: &str = r#"{
        "C4": "data:audio/mp3;base64,AAAAAAAA",
        "D4": "data:audio/mp3;base64,gICAgICA",
        "E4": "data:audio/mp3;base64,////"
    }"#;

    fn opener(context: &mock::Context) -> ContextOpener {
        let context = context.clone();
        Box::new(move || -> Result<Arc<dyn AudioContext>, Box<dyn Error>> {
            Ok(Arc::new(context.clone()))
        })
    }

    fn instrument(assets: MemoryAssetSource, context: &mock::Context) -> Instrument {
        Instrument::new(
            Arc::new(assets),
            MANIFEST,
            opener(context),
            Box::new(MemoryStorage::new()),
        )
        .with_mapping(NoteMapping::from([
            ("KeyA", "C4"),
            ("KeyS", "D4"),
            ("KeyD", "E4"),
            ("KeyF", "F4"),
        ]))
    }

    async fn running(context: &mock::Context) -> Instrument {
        let mut instrument = instrument(MemoryAssetSource::new().with(MANIFEST, PIANO), context);
        let job = instrument.gesture().expect("gesture should start loading");
        instrument.finish_loading(job.run().await);
        assert_eq!(instrument.state(), InstrumentState::Running);
        instrument
    }

    #[tokio::test]
    async fn test_press_repeat_release() {
        let context = mock::Context::new("mock", 8000);
        let mut instrument = running(&context).await;

        assert!(instrument.key_down("KeyA", false).is_none());
        instrument.key_down("KeyA", true);
        instrument.key_up("KeyA", false);

        assert_eq!(context.starts(), 1);
        assert_eq!(context.stops(), 1);
        assert_eq!(instrument.log().tokens(), ["1"]);
        assert!(instrument.keys().is_empty());
        assert_eq!(instrument.voices().unwrap().active_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_press_is_ignored() {
        let context = mock::Context::new("mock", 8000);
        let mut instrument = running(&context).await;

        instrument.key_down("KeyS", false);
        instrument.key_down("KeyS", false);
        assert_eq!(context.starts(), 1);
        assert_eq!(instrument.log().len(), 1);

        instrument.key_up("KeyS", false);
        instrument.key_up("KeyS", false);
        assert_eq!(context.stops(), 1);
    }

    #[tokio::test]
    async fn test_unmapped_key_is_ignored() {
        let context = mock::Context::new("mock", 8000);
        let mut instrument = running(&context).await;

        instrument.key_down("KeyZ", false);
        instrument.key_up("KeyZ", false);
        assert!(context.calls().is_empty());
        assert!(instrument.log().is_empty());
    }

    #[tokio::test]
    async fn test_missing_sample_still_logs() {
        let context = mock::Context::new("mock", 8000);
        let mut instrument = running(&context).await;

        instrument.key_down("KeyF", false);
        assert_eq!(context.starts(), 0);
        assert_eq!(instrument.log().tokens(), ["4"]);
        assert!(instrument.keys().is_held("KeyF"));
    }

    #[tokio::test]
    async fn test_first_key_starts_loading() {
        let context = mock::Context::new("mock", 8000);
        let mut instrument = instrument(MemoryAssetSource::new().with(MANIFEST, PIANO), &context);
        assert_eq!(instrument.state(), InstrumentState::Waiting);

        let job = instrument.key_down("KeyA", false).expect("should start loading");
        assert_eq!(instrument.state(), InstrumentState::Loading);
        assert!(instrument.bank().is_none());

        // Nothing plays and nothing restarts the load while loading.
        assert!(instrument.key_down("KeyA", false).is_none());
        assert!(instrument.gesture().is_none());
        assert!(instrument.log().is_empty());

        instrument.finish_loading(job.run().await);
        assert_eq!(instrument.state(), InstrumentState::Running);
        assert!(instrument.bank().unwrap().is_ready());
        assert_eq!(context.starts(), 0);
    }

    #[tokio::test]
    async fn test_missing_manifest_stays_loading() {
        let context = mock::Context::new("mock", 8000);
        let mut instrument = instrument(MemoryAssetSource::new(), &context);

        let job = instrument.gesture().unwrap();
        let outcome = job.run().await;
        assert!(matches!(
            outcome.result,
            Err(LoadError::Fetch(FetchError::Status { status: 404, .. }))
        ));
        instrument.finish_loading(outcome);

        assert_eq!(instrument.state(), InstrumentState::Loading);
        assert!(instrument.load_error().unwrap().contains("404"));
        assert!(instrument.gesture().is_none());
        assert!(instrument.key_down("KeyA", false).is_none());
        assert_eq!(instrument.state(), InstrumentState::Loading);
        assert_eq!(context.starts(), 0);
    }

    #[tokio::test]
    async fn test_stale_outcome_is_discarded() {
        let context = mock::Context::new("mock", 8000);
        let mut instrument = running(&context).await;

        instrument.finish_loading(LoadOutcome {
            bank: SampleBank::new(MANIFEST),
            result: Err(LoadError::Fetch(FetchError::Status {
                path: MANIFEST.to_string(),
                status: 500,
            })),
        });
        assert_eq!(instrument.state(), InstrumentState::Running);
        assert!(instrument.load_error().is_none());
        assert!(instrument.bank().unwrap().is_ready());
    }

    #[test]
    fn test_context_open_failure() {
        let mut instrument = Instrument::new(
            Arc::new(MemoryAssetSource::new()),
            MANIFEST,
            Box::new(|| -> Result<Arc<dyn AudioContext>, Box<dyn Error>> {
                Err("no output device".into())
            }),
            Box::new(MemoryStorage::new()),
        );

        assert!(instrument.gesture().is_none());
        assert_eq!(instrument.state(), InstrumentState::Waiting);
        assert_eq!(instrument.load_error(), Some("no output device"));
    }

    #[tokio::test]
    async fn test_hidden_silences_everything() {
        let context = mock::Context::new("mock", 8000);
        let mut instrument = running(&context).await;

        instrument.key_down("KeyA", false);
        instrument.key_down("KeyS", false);
        instrument.visibility_changed(false);
        assert_eq!(instrument.voices().unwrap().active_count(), 2);

        instrument.visibility_changed(true);
        assert_eq!(context.stops(), 2);
        assert_eq!(instrument.voices().unwrap().active_count(), 0);
        assert!(!instrument.keys().is_held("KeyA"));
        assert!(!instrument.keys().is_held("KeyS"));

        // The key up that arrives after returning does nothing.
        instrument.key_up("KeyA", false);
        assert_eq!(context.stops(), 2);
    }

    #[tokio::test]
    async fn test_layout_change_mid_press() {
        let context = mock::Context::new("mock", 8000);
        let mut instrument = running(&context).await;

        instrument.key_down("KeyA", false);
        instrument.set_mapping(NoteMapping::from([("KeyA", "D4")]));
        instrument.key_up("KeyA", false);

        assert!(!instrument.voices().unwrap().is_active("C4"));
        assert_eq!(context.stops(), 1);

        instrument.key_down("KeyA", false);
        assert!(instrument.voices().unwrap().is_active("D4"));
        assert_eq!(instrument.log().tokens(), ["1", "2"]);
    }

    #[tokio::test]
    async fn test_output_mode_and_log_editing() {
        let context = mock::Context::new("mock", 8000);
        let mut instrument = running(&context).await;

        instrument.key_down("KeyA", false);
        instrument.key_up("KeyA", false);
        instrument.log_space();
        instrument.set_output_mode(OutputMode::Symbolic);
        instrument.key_down("KeyD", false);
        instrument.log_newline();
        assert_eq!(instrument.log().export(), "1 E4\n");

        instrument.log_backspace();
        assert_eq!(
            instrument.storage().get(LOG_KEY).unwrap().as_deref(),
            Some(r#"["1"," ","E4"]"#)
        );

        instrument.log_clear();
        assert_eq!(
            instrument.storage().get(LOG_KEY).unwrap().as_deref(),
            Some("[]")
        );
    }

    #[test]
    fn test_log_is_restored() {
        let mut storage = MemoryStorage::new();
        storage.set(LOG_KEY, r#"["5","\n"]"#).unwrap();

        let context = mock::Context::new("mock", 8000);
        let instrument = Instrument::new(
            Arc::new(MemoryAssetSource::new()),
            MANIFEST,
            opener(&context),
            Box::new(storage),
        );
        assert_eq!(instrument.log().export(), "5\n");
    }
}
