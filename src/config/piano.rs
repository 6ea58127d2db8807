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
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, Environment, File, Source};
use duration_string::DurationString;
use serde::Deserialize;

use super::{audio::Audio, error::ConfigError};
use crate::{notelog::OutputMode, samples::DEFAULT_STOP_DELAY};

/// Prefix of environment variables that override the config file. Nested keys
/// are separated by a double underscore, e.g. `TYPIANO_AUDIO__DEVICE`.
pub const ENV_PREFIX: &str = "TYPIANO";

const DEFAULT_MANIFEST: &str = "samples/piano.json";
const DEFAULT_LAYOUTS_DIR: &str = "layouts";
const DEFAULT_LAYOUT: &str = "qwerty";
const DEFAULT_STORAGE: &str = "typiano.json";
const DEFAULT_GAIN: f32 = 1.0;

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

/// The configuration for the instrument.
#[derive(Deserialize, Clone, Debug)]
pub struct Piano {
    /// The directory assets are fetched from.
    assets: String,

    /// The sample manifest, relative to the assets directory.
    manifest: Option<String>,

    /// The layouts directory, relative to the assets directory.
    layouts_dir: Option<String>,

    /// The name of the active layout.
    layout: Option<String>,

    /// How notes are written to the log.
    output_mode: Option<OutputMode>,

    /// The release tail applied when a note stops, e.g. "300ms".
    stop_delay: Option<String>,

    /// The gain applied to the mix.
    gain: Option<f32>,

    /// The file the note log is persisted to.
    storage: Option<String>,

    /// The audio configuration.
    #[serde(default)]
    audio: Audio,

    /// The directory relative paths resolve against.
    #[serde(skip)]
    base: PathBuf,
}

impl Piano {
    /// Creates a configuration with every optional value at its default.
    pub fn new(assets: &str, audio: Audio) -> Piano {
        Piano {
            assets: assets.to_string(),
            manifest: None,
            layouts_dir: None,
            layout: None,
            output_mode: None,
            stop_delay: None,
            gain: None,
            storage: None,
            audio,
            base: PathBuf::new(),
        }
    }

    /// Parses the configuration from a YAML file, applying environment overrides.
    /// Relative paths resolve against the file's directory.
    pub fn deserialize(path: &Path) -> Result<Piano, ConfigError> {
        let mut piano = Piano::from_sources(
            File::from(path),
            environment(),
        )?;
        piano.base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(piano)
    }

    fn from_sources<F>(file: F, env: Environment) -> Result<Piano, ConfigError>
    where
        F: Source + Send + Sync + 'static,
    {
        let piano = Config::builder()
            .add_source(file)
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize::<Piano>()?;
        piano.validate()?;
        Ok(piano)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.stop_delay()?;
        let gain = self.gain();
        if !(0.0..=1.0).contains(&gain) {
            return Err(ConfigError::Gain(gain));
        }
        Ok(())
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base.join(path)
    }

    /// Returns the assets directory.
    pub fn assets(&self) -> PathBuf {
        self.resolve(&self.assets)
    }

    /// Returns the manifest path within the assets directory.
    pub fn manifest(&self) -> &str {
        self.manifest.as_deref().unwrap_or(DEFAULT_MANIFEST)
    }

    pub fn layouts_dir(&self) -> &str {
        self.layouts_dir.as_deref().unwrap_or(DEFAULT_LAYOUTS_DIR)
    }

    pub fn layout(&self) -> &str {
        self.layout.as_deref().unwrap_or(DEFAULT_LAYOUT)
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output_mode.unwrap_or_default()
    }

    /// Returns the release tail (default: 300ms).
    pub fn stop_delay(&self) -> Result<Duration, ConfigError> {
        match &self.stop_delay {
            Some(stop_delay) => Ok(DurationString::from_string(stop_delay.clone())
                .map_err(|e| ConfigError::StopDelay {
                    value: stop_delay.clone(),
                    reason: e.to_string(),
                })?
                .into()),
            None => Ok(DEFAULT_STOP_DELAY),
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain.unwrap_or(DEFAULT_GAIN)
    }

    /// Returns the file the note log is persisted to.
    pub fn storage(&self) -> PathBuf {
        self.resolve(self.storage.as_deref().unwrap_or(DEFAULT_STORAGE))
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }
}
