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

//! The sample bank: every note's sample, decoded into memory before play starts.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, warn};

use super::error::LoadError;
use crate::assets::AssetSource;
use crate::audio::{AudioContext, DecodedSample};
use crate::codec;

/// A bank entry. Entries start out encoded and are replaced exactly once by their
/// decoded form; only decoded entries are playable.
#[derive(Debug, Clone)]
pub enum SampleEntry {
    /// The manifest text, data-URI header included.
    Encoded(Arc<str>),
    /// The decoded sample, shared by every voice that plays it.
    Decoded(Arc<DecodedSample>),
}

impl SampleEntry {
    /// Returns true if the entry has been decoded.
    pub fn is_decoded(&self) -> bool {
        matches!(self, SampleEntry::Decoded(_))
    }
}

/// Maps note identifiers to their samples.
pub struct SampleBank {
    /// Path of the manifest within the asset source.
    manifest_path: String,
    /// Entries by note identifier.
    entries: BTreeMap<String, SampleEntry>,
    /// Set once every entry has decoded.
    ready: bool,
}

impl SampleBank {
    /// Creates an empty bank that will load from the given manifest.
    pub fn new(manifest_path: &str) -> SampleBank {
        SampleBank {
            manifest_path: manifest_path.to_string(),
            entries: BTreeMap::new(),
            ready: false,
        }
    }

    pub fn manifest_path(&self) -> &str {
        &self.manifest_path
    }

    /// Fetches the manifest and decodes every entry concurrently. Resolves once all
    /// entries have decoded. A failed entry doesn't cancel its siblings: they run
    /// to completion and keep their decoded form, the first failure is returned and
    /// the bank is not ready. Decoded entries are never decoded again.
    pub async fn load(
        &mut self,
        assets: &dyn AssetSource,
        context: &dyn AudioContext,
    ) -> Result<(), LoadError> {
        if self.ready {
            debug!(manifest = self.manifest_path, "Sample bank already loaded");
            return Ok(());
        }

        let started = Instant::now();
        info!(manifest = self.manifest_path, "Loading sample manifest");

        let bytes = assets.fetch(&self.manifest_path).await?;
        let manifest: BTreeMap<String, String> =
            serde_json::from_slice(&bytes).map_err(|source| LoadError::Manifest {
                path: self.manifest_path.clone(),
                source,
            })?;

        for (note, encoded) in manifest {
            if self.entries.get(&note).is_some_and(SampleEntry::is_decoded) {
                continue;
            }
            self.entries
                .insert(note, SampleEntry::Encoded(Arc::from(encoded)));
        }

        let mut pending: FuturesUnordered<_> = self
            .entries
            .iter()
            .filter_map(|(note, entry)| match entry {
                SampleEntry::Encoded(text) => {
                    Some(decode_entry(note.clone(), text.clone(), context))
                }
                SampleEntry::Decoded(_) => None,
            })
            .collect();
        debug!(pending = pending.len(), "Decoding samples");

        let mut first_error = None;
        while let Some(result) = pending.next().await {
            let (note, sample) = match result {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(error = %e, "Sample decode failed");
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            debug!(
                note,
                frames = sample.frame_count(),
                channels = sample.channel_count(),
                "Sample decoded"
            );
            self.entries
                .insert(note, SampleEntry::Decoded(Arc::new(sample)));
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        self.ready = true;
        info!(
            manifest = self.manifest_path,
            samples = self.entries.len(),
            memory_kb = self.total_memory_usage() / 1024,
            elapsed_ms = started.elapsed().as_millis(),
            "Sample bank loaded"
        );
        Ok(())
    }

    /// Returns true once every entry has decoded.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Returns the decoded sample for a note, if there is one.
    pub fn get(&self, note: &str) -> Option<Arc<DecodedSample>> {
        match self.entries.get(note) {
            Some(SampleEntry::Decoded(sample)) => Some(sample.clone()),
            _ => None,
        }
    }

    /// Returns the entry for a note.
    pub fn entry(&self, note: &str) -> Option<&SampleEntry> {
        self.entries.get(note)
    }

    /// Iterates over the entries in note order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &SampleEntry)> {
        self.entries.iter().map(|(note, entry)| (note.as_str(), entry))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the bank has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the total memory used by decoded samples.
    pub fn total_memory_usage(&self) -> usize {
        self.entries
            .values()
            .map(|entry| match entry {
                SampleEntry::Decoded(sample) => sample.memory_size(),
                SampleEntry::Encoded(_) => 0,
            })
            .sum()
    }
}

impl std::fmt::Debug for SampleBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleBank")
            .field("manifest_path", &self.manifest_path)
            .field("entries", &self.entries.len())
            .field("ready", &self.ready)
            .finish()
    }
}

/// Decodes one entry: text to bytes, then bytes to a sample on the audio context.
async fn decode_entry(
    note: String,
    text: Arc<str>,
    context: &dyn AudioContext,
) -> Result<(String, DecodedSample), LoadError> {
    let data = codec::decode_async(codec::strip_header(&text)).await;
    match context.decode_audio_data(data).await {
        Ok(sample) => Ok((note, sample)),
        Err(source) => Err(LoadError::Decode { note, source }),
    }
}

/// A bank load that owns everything it needs, so it can be spawned and hand the
/// bank back when it finishes.
pub struct LoadJob {
    bank: SampleBank,
    assets: Arc<dyn AssetSource>,
    context: Arc<dyn AudioContext>,
}

/// The bank and the result of its load.
pub struct LoadOutcome {
    pub bank: SampleBank,
    pub result: Result<(), LoadError>,
}

impl LoadJob {
    /// Creates a new load job.
    pub fn new(
        bank: SampleBank,
        assets: Arc<dyn AssetSource>,
        context: Arc<dyn AudioContext>,
    ) -> LoadJob {
        LoadJob {
            bank,
            assets,
            context,
        }
    }

    /// Loads the bank.
    pub async fn run(mut self) -> LoadOutcome {
        let result = self
            .bank
            .load(self.assets.as_ref(), self.context.as_ref())
            .await;
        LoadOutcome {
            bank: self.bank,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::FutureExt;

    use futures_util::future::BoxFuture;

    use super::*;
    use crate::assets::{FetchError, MemoryAssetSource};
    use crate::audio::{mock, DecodeError, VoiceId};

    /// Rejects empty data at once and holds everything else for a few turns.
    struct SlowContext(mock::Context);

    impl std::fmt::Display for SlowContext {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "slow {}", self.0)
        }
    }

    impl AudioContext for SlowContext {
        fn current_time(&self) -> f64 {
            self.0.current_time()
        }

        fn sample_rate(&self) -> u32 {
            self.0.sample_rate()
        }

        fn start(&self, sample: Arc<DecodedSample>, at: f64) -> VoiceId {
            self.0.start(sample, at)
        }

        fn stop(&self, voice: VoiceId, at: f64) {
            self.0.stop(voice, at)
        }

        fn decode_audio_data(
            &self,
            data: Vec<u8>,
        ) -> BoxFuture<'static, Result<DecodedSample, DecodeError>> {
            if data.is_empty() {
                return async { Err(DecodeError::Empty) }.boxed();
            }
            let decode = self.0.decode_audio_data(data);
            async move {
                for _ in 0..5 {
                    tokio::task::yield_now().await;
                }
                decode.await
            }
            .boxed()
        }
    }

    const MANIFEST: &str = "samples/piano.json";

    fn manifest_source(manifest: &str) -> MemoryAssetSource {
        MemoryAssetSource::new().with(MANIFEST, manifest)
    }

    #[tokio::test]
    async fn test_load_decodes_every_entry() {
        let assets = manifest_source(
            r#"{"C4": "data:audio/mp3;base64,AAAA", "D4": "data:audio/mp3;base64,gICA"}"#,
        );
        let context = mock::Context::new("mock", 8000);
        let mut bank = SampleBank::new(MANIFEST);

        let mut load = Box::pin(bank.load(&assets, &context));
        assert!((&mut load).now_or_never().is_none());
        load.await.unwrap();

        assert!(bank.is_ready());
        assert_eq!(bank.len(), 2);
        for note in ["C4", "D4"] {
            assert!(bank.entry(note).unwrap().is_decoded(), "{}", note);
            assert_eq!(bank.get(note).unwrap().frame_count(), 3);
        }
        assert_eq!(bank.get("D4").unwrap().sample(0, 0), Some(0.0));
        assert!(bank.get("E4").is_none());
    }

    #[tokio::test]
    async fn test_load_missing_manifest() {
        let assets = MemoryAssetSource::new();
        let context = mock::Context::new("mock", 8000);
        let mut bank = SampleBank::new(MANIFEST);

        match bank.load(&assets, &context).await {
            Err(LoadError::Fetch(FetchError::Status { path, status })) => {
                assert_eq!(path, MANIFEST);
                assert_eq!(status, 404);
            }
            other => panic!("expected a fetch failure, got {:?}", other),
        }
        assert!(!bank.is_ready());
        assert!(bank.is_empty());
    }

    #[tokio::test]
    async fn test_load_bad_manifest() {
        let assets = manifest_source(r#"["C4"]"#);
        let context = mock::Context::new("mock", 8000);
        let mut bank = SampleBank::new(MANIFEST);

        let err = bank.load(&assets, &context).await.unwrap_err();
        assert!(matches!(err, LoadError::Manifest { ref path, .. } if path == MANIFEST));
        assert!(!bank.is_ready());
    }

    #[tokio::test]
    async fn test_load_decode_failure_names_note() {
        // A header with no payload decodes to nothing, which the context rejects.
        let assets = manifest_source(
            r#"{"C4": "data:audio/mp3;base64,AAAA", "E4": "data:audio/mp3;base64,"}"#,
        );
        let context = mock::Context::new("mock", 8000);
        let mut bank = SampleBank::new(MANIFEST);

        match bank.load(&assets, &context).await {
            Err(LoadError::Decode { note, source }) => {
                assert_eq!(note, "E4");
                assert!(matches!(source, DecodeError::Empty));
            }
            other => panic!("expected a decode failure, got {:?}", other),
        }
        assert!(!bank.is_ready());
        assert!(!bank.entry("E4").unwrap().is_decoded());
        assert!(bank.get("E4").is_none());
        assert!(bank.entry("C4").unwrap().is_decoded());
    }

    #[tokio::test]
    async fn test_load_failure_keeps_sibling_decodes() {
        let assets = manifest_source(
            r#"{"C4": "data:audio/mp3;base64,AAAA", "D4": "data:audio/mp3;base64,gICA", "E4": "data:audio/mp3;base64,"}"#,
        );
        let context = SlowContext(mock::Context::new("mock", 8000));
        let mut bank = SampleBank::new(MANIFEST);

        let err = bank.load(&assets, &context).await.unwrap_err();
        assert!(matches!(err, LoadError::Decode { ref note, .. } if note == "E4"));
        assert!(!bank.is_ready());

        // E4 failed first, but C4 and D4 still finished and stayed decoded.
        for note in ["C4", "D4"] {
            assert!(bank.entry(note).unwrap().is_decoded(), "{}", note);
        }
        assert!(!bank.entry("E4").unwrap().is_decoded());

        // A retry only decodes what is still encoded.
        let c4 = bank.get("C4").unwrap();
        assert!(bank.load(&assets, &context).await.is_err());
        assert!(Arc::ptr_eq(&c4, &bank.get("C4").unwrap()));
    }

    #[tokio::test]
    async fn test_load_after_ready_does_nothing() {
        let context = mock::Context::new("mock", 8000);
        let mut bank = SampleBank::new(MANIFEST);
        bank.load(&manifest_source(r#"{"C4": "data:audio/mp3;base64,AAAA"}"#), &context)
            .await
            .unwrap();

        let before = bank.get("C4").unwrap();
        bank.load(&MemoryAssetSource::new(), &context).await.unwrap();
        assert!(Arc::ptr_eq(&before, &bank.get("C4").unwrap()));
    }

    #[tokio::test]
    async fn test_load_job_returns_bank() {
        let job = LoadJob::new(
            SampleBank::new(MANIFEST),
            Arc::new(manifest_source(r#"{"C4": "data:audio/mp3;base64,AAAA"}"#)),
            Arc::new(mock::Context::new("mock", 8000)),
        );

        let outcome = tokio::spawn(job.run()).await.unwrap();
        assert!(outcome.result.is_ok());
        assert!(outcome.bank.is_ready());
        assert_eq!(outcome.bank.len(), 1);
    }
}
