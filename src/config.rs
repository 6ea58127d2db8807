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
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::assets::{AssetSource, FileAssetSource};
use crate::controller::{Controller, Driver};
use crate::instrument::Instrument;
use crate::layout::{Layout, NoteMapping};
use crate::storage::FileStorage;

mod audio;
mod error;
mod piano;

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::piano::Piano;

/// Initializes the instrument and controller from the given config file and
/// returns the controller. The initial layout is loaded before the controller
/// starts. The audio context isn't opened until the first gesture.
pub async fn init_instrument_and_controller(
    path: &Path,
    driver: Arc<dyn Driver>,
) -> Result<Controller, Box<dyn Error>> {
    let piano = Piano::deserialize(path)?;
    let assets: Arc<dyn AssetSource> = Arc::new(FileAssetSource::new(piano.assets()));
    let layout = Layout::fetch(
        assets.as_ref(),
        &Layout::path(piano.layouts_dir(), piano.layout()),
    )
    .await?;

    let audio = piano.audio().clone();
    let gain = piano.gain();
    let instrument = Instrument::new(
        assets.clone(),
        piano.manifest(),
        Box::new(move || crate::audio::get_context(&audio, gain)),
        Box::new(FileStorage::new(piano.storage())),
    )
    .with_mapping(NoteMapping::from(&layout))
    .with_output_mode(piano.output_mode())
    .with_stop_delay(piano.stop_delay()?);

    info!(
        config = ?path,
        assets = ?piano.assets(),
        layout = piano.layout(),
        output_mode = %piano.output_mode(),
        "Instrument configured"
    );
    Ok(Controller::new(
        instrument,
        assets,
        piano.layouts_dir(),
        piano.layout(),
        driver,
    ))
}
