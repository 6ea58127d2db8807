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
use std::io;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{debug, error, info, span, warn, Level};

use crate::assets::AssetSource;
use crate::instrument::{Instrument, InstrumentState};
use crate::layout::{Layout, LayoutError, NoteMapping};
use crate::notelog::OutputMode;
use crate::samples::{LoadJob, LoadOutcome};

pub mod keyboard;

/// Input events that drive the instrument.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A key was pressed. Auto-repeated presses have repeat set.
    KeyDown { code: String, repeat: bool },

    /// A key was released.
    KeyUp { code: String, repeat: bool },

    /// An explicit start gesture.
    Gesture,

    /// The instrument was hidden or shown.
    Visibility { hidden: bool },

    /// Switches to the named layout.
    Layout(String),

    /// Changes how notes are written to the log.
    OutputMode(OutputMode),

    /// Appends a space to the log.
    Space,

    /// Appends a newline to the log.
    Newline,

    /// Removes the last log token.
    Backspace,

    /// Clears the log.
    Clear,
}

/// Work spawned by the event loop reporting back.
enum Completion {
    Loaded(LoadOutcome),
    Layout {
        request: u64,
        name: String,
        result: Result<Layout, LayoutError>,
    },
}

/// What the controller publishes about the instrument after every event.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub state: InstrumentState,
    pub load_error: Option<String>,
    /// The name of the active layout.
    pub layout: String,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Runs the instrument's event loop.
pub struct Controller {
    handle: JoinHandle<Instrument>,
    status_rx: watch::Receiver<Status>,
}

struct EventLoop {
    instrument: Instrument,
    assets: Arc<dyn AssetSource>,
    layouts_dir: String,
    layout: String,
    /// Counts layout requests. Only the latest request's fetch is applied.
    layout_request: u64,
    done_tx: mpsc::UnboundedSender<Completion>,
    status_tx: watch::Sender<Status>,
}

impl Controller {
    /// Creates a new controller with the given driver. The instrument's current
    /// mapping is taken to be the named layout.
    pub fn new(
        instrument: Instrument,
        assets: Arc<dyn AssetSource>,
        layouts_dir: &str,
        layout: &str,
        driver: Arc<dyn Driver>,
    ) -> Controller {
        let (status_tx, status_rx) = watch::channel(Status {
            state: instrument.state(),
            load_error: instrument.load_error().map(str::to_string),
            layout: layout.to_string(),
        });
        let layouts_dir = layouts_dir.to_string();
        let layout = layout.to_string();
        Controller {
            handle: tokio::spawn(async move {
                Controller::trigger_events(instrument, assets, layouts_dir, layout, status_tx, driver)
                    .await
            }),
            status_rx,
        }
    }

    /// Returns a receiver that sees every status change.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status_rx.clone()
    }

    /// Returns the latest status.
    pub fn status(&self) -> Status {
        self.status_rx.borrow().clone()
    }

    /// Waits until the driver closes, returning the instrument.
    pub async fn join(self) -> Result<Instrument, JoinError> {
        self.handle.await
    }

    /// Feeds driver events to the instrument until the driver closes.
    async fn trigger_events(
        instrument: Instrument,
        assets: Arc<dyn AssetSource>,
        layouts_dir: String,
        layout: String,
        status_tx: watch::Sender<Status>,
        driver: Arc<dyn Driver>,
    ) -> Instrument {
        let span = span!(Level::INFO, "controller");
        let _enter = span.enter();

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let join_handle = driver.monitor_events(events_tx);

        let mut event_loop = EventLoop {
            instrument,
            assets,
            layouts_dir,
            layout,
            layout_request: 0,
            done_tx,
            status_tx,
        };
        info!(layout = event_loop.layout, "Controller started.");

        loop {
            tokio::select! {
                event = events_rx.recv() => match event {
                    Some(event) => {
                        info!(event = format!("{:?}", event), "Received event.");
                        event_loop.handle_event(event);
                    }
                    None => break,
                },
                Some(completion) = done_rx.recv() => event_loop.handle_completion(completion),
            }
            event_loop.publish();
        }

        info!("Controller closing.");
        match join_handle.await {
            Ok(Err(e)) => error!("Event monitor failed: {}", e),
            Err(e) => error!("Error waiting for event monitor to stop: {}", e),
            Ok(Ok(())) => {}
        }
        event_loop.instrument
    }
}

impl EventLoop {
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::KeyDown { code, repeat } => {
                if let Some(job) = self.instrument.key_down(&code, repeat) {
                    self.spawn_load(job);
                }
            }
            Event::KeyUp { code, repeat } => self.instrument.key_up(&code, repeat),
            Event::Gesture => {
                if let Some(job) = self.instrument.gesture() {
                    self.spawn_load(job);
                }
            }
            Event::Visibility { hidden } => self.instrument.visibility_changed(hidden),
            Event::Layout(name) => self.spawn_layout_fetch(name),
            Event::OutputMode(mode) => self.instrument.set_output_mode(mode),
            Event::Space => self.instrument.log_space(),
            Event::Newline => self.instrument.log_newline(),
            Event::Backspace => self.instrument.log_backspace(),
            Event::Clear => self.instrument.log_clear(),
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Loaded(outcome) => self.instrument.finish_loading(outcome),
            Completion::Layout { request, name, .. } if request != self.layout_request => {
                debug!(layout = name, "Discarding superseded layout fetch");
            }
            Completion::Layout { name, result, .. } => match result {
                Ok(layout) => {
                    self.instrument.set_mapping(NoteMapping::from(&layout));
                    self.layout = name;
                }
                Err(e) => warn!(layout = name, err = %e, "Unable to switch layout"),
            },
        }
    }

    /// Loads run as their own task. The outcome is handed back even if the
    /// instrument has moved on, and is discarded there.
    fn spawn_load(&self, job: LoadJob) {
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let _ = done_tx.send(Completion::Loaded(job.run().await));
        });
    }

    fn spawn_layout_fetch(&mut self, name: String) {
        self.layout_request += 1;
        let request = self.layout_request;
        let path = Layout::path(&self.layouts_dir, &name);
        let assets = self.assets.clone();
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = Layout::fetch(assets.as_ref(), &path).await;
            let _ = done_tx.send(Completion::Layout {
                request,
                name,
                result,
            });
        });
    }

    fn publish(&self) {
        let state = self.instrument.state();
        let load_error = self.instrument.load_error();
        self.status_tx.send_if_modified(|status| {
            if status.state == state
                && status.load_error.as_deref() == load_error
                && status.layout == self.layout
            {
                return false;
            }
            status.state = state;
            status.load_error = load_error.map(str::to_string);
            status.layout = self.layout.clone();
            true
        });
    }
}
