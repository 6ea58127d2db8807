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
use std::path::PathBuf;
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use typiano::assets::FileAssetSource;
use typiano::audio::{self, mock};
use typiano::config::{self, Piano};
use typiano::controller::keyboard;
use typiano::instrument::InstrumentState;
use typiano::layout::Layout;
use typiano::notelog::NoteLog;
use typiano::storage::FileStorage;
use typiano::verify;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A computer-keyboard piano."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plays the piano, reading key events from the terminal.
    Play {
        /// The path to the piano config.
        config_path: PathBuf,
    },
    /// Loads and checks the sample manifest and layout without an audio device.
    Verify {
        /// The path to the piano config.
        config_path: PathBuf,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Prints the persisted note log.
    ExportLog {
        /// The path to the piano config.
        config_path: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play { config_path } => {
            let controller = config::init_instrument_and_controller(
                &config_path,
                Arc::new(keyboard::Driver::new()),
            )
            .await?;

            let mut status_rx = controller.subscribe();
            tokio::spawn(async move {
                while status_rx.changed().await.is_ok() {
                    let status = status_rx.borrow_and_update().clone();
                    match (status.state, status.load_error) {
                        (_, Some(load_error)) => eprintln!("\nFailed to load: {}", load_error),
                        (InstrumentState::Running, None) => eprintln!("\nReady."),
                        (InstrumentState::Loading, None) => eprintln!("\nLoading samples..."),
                        (InstrumentState::Waiting, None) => {}
                    }
                }
            });

            let instrument = controller.join().await?;
            println!();
            println!("{}", instrument.log().export());
        }
        Commands::Verify { config_path } => {
            let piano = Piano::deserialize(&config_path)?;
            let assets = FileAssetSource::new(piano.assets());
            let context = mock::Context::decoding(
                "verify",
                piano
                    .audio()
                    .sample_rate()
                    .unwrap_or(mock::DEFAULT_SAMPLE_RATE),
            );

            let layout_path = Layout::path(piano.layouts_dir(), piano.layout());
            let layout = match Layout::fetch(&assets, &layout_path).await {
                Ok(layout) => Some(layout),
                Err(e) => {
                    println!("Unable to load layout {}: {}", layout_path, e);
                    None
                }
            };

            let report =
                verify::verify(&assets, piano.manifest(), layout.as_ref(), &context).await;
            verify::print_report(&report);
            if report.has_errors() {
                return Err("verification failed".into());
            }
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::ExportLog { config_path } => {
            let piano = Piano::deserialize(&config_path)?;
            let log = NoteLog::restore(&FileStorage::new(piano.storage()));
            print!("{}", log.export());
        }
    }

    Ok(())
}
