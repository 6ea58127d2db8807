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
use std::{error::Error, fmt, sync::mpsc, sync::Arc, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use futures_util::{future::BoxFuture, FutureExt};
use parking_lot::Mutex;
use tracing::{error, info, span, Level};

use super::{decode, mixer::Mixer, DecodeError, DecodedSample, VoiceId};
use crate::config;

/// An audio context backed by a cpal output stream. The stream lives on its own
/// output thread and renders straight from the shared mixer.
pub struct Context {
    /// The name of the device.
    name: String,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The mixer shared with the output thread.
    mixer: Arc<Mutex<Mixer>>,
    /// The output sample rate.
    sample_rate: u32,
    /// Handle to the output thread (keeps the stream alive).
    _output_thread: thread::JoinHandle<()>,
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Rate={}) ({})",
            self.name,
            self.sample_rate,
            self.host_id.name()
        )
    }
}

/// Renders the mixer into a cpal buffer, converting from f32 as needed.
fn create_callback<T>(
    mixer: Arc<Mutex<Mixer>>,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        scratch.resize(data.len(), 0.0);
        mixer.lock().render(&mut scratch);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

impl Context {
    /// Lists the names of all output devices across the available hosts.
    pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
        let mut devices = Vec::new();
        for host_id in cpal::available_hosts() {
            let host = cpal::host_from_id(host_id)?;
            for device in host.output_devices()? {
                #[allow(deprecated)]
                let name = device.name()?;
                devices.push(format!("{} ({})", name, host_id.name()));
            }
        }
        Ok(devices)
    }

    /// Opens the configured output device and starts the output stream.
    pub fn open(config: &config::Audio, gain: f32) -> Result<Context, Box<dyn Error>> {
        let host = cpal::default_host();
        let host_id = host.id();
        let device = if config.device() == "default" {
            host.default_output_device()
                .ok_or("no default audio output device found")?
        } else {
            let mut found = None;
            for device in host.output_devices()? {
                #[allow(deprecated)]
                let name = device.name()?;
                if name == config.device() {
                    found = Some(device);
                    break;
                }
            }
            found.ok_or_else(|| format!("no audio output device named {}", config.device()))?
        };

        let output_config = device.default_output_config()?;
        let sample_rate = config.sample_rate().unwrap_or(output_config.sample_rate());
        let channels = output_config.channels();
        let sample_format = output_config.sample_format();
        let mut stream_config: cpal::StreamConfig = output_config.into();
        stream_config.sample_rate = sample_rate;

        let mixer = Arc::new(Mutex::new(Mixer::new(channels, sample_rate, gain)));

        // The stream is created and kept inside the output thread.
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let output_thread = {
            let mixer = mixer.clone();
            thread::spawn(move || {
                let span = span!(Level::INFO, "audio output");
                let _enter = span.enter();

                let on_error = |err: cpal::StreamError| error!("CPAL output stream error: {}", err);
                let stream = match sample_format {
                    cpal::SampleFormat::F32 => device.build_output_stream(
                        &stream_config,
                        create_callback::<f32>(mixer),
                        on_error,
                        None,
                    ),
                    cpal::SampleFormat::I16 => device.build_output_stream(
                        &stream_config,
                        create_callback::<i16>(mixer),
                        on_error,
                        None,
                    ),
                    cpal::SampleFormat::I32 => device.build_output_stream(
                        &stream_config,
                        create_callback::<i32>(mixer),
                        on_error,
                        None,
                    ),
                    other => {
                        let _ = ready_tx.send(Err(format!("unsupported sample format {:?}", other)));
                        return;
                    }
                };

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("failed to create stream: {}", e)));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(format!("failed to start stream: {}", e)));
                    return;
                }
                info!("CPAL output stream started successfully");
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive for the life of the process.
                loop {
                    thread::park();
                }
            })
        };
        ready_rx.recv()??;

        let name = device_name(&host, config.device());
        Ok(Context {
            name,
            host_id,
            mixer,
            sample_rate,
            _output_thread: output_thread,
        })
    }
}

#[allow(deprecated)]
fn device_name(host: &cpal::Host, configured: &str) -> String {
    if configured != "default" {
        return configured.to_string();
    }
    host.default_output_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_else(|| configured.to_string())
}

impl super::AudioContext for Context {
    fn current_time(&self) -> f64 {
        self.mixer.lock().current_time()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&self, sample: Arc<DecodedSample>, at: f64) -> VoiceId {
        self.mixer.lock().start(sample, at)
    }

    fn stop(&self, voice: VoiceId, at: f64) {
        self.mixer.lock().stop(voice, at)
    }

    fn decode_audio_data(
        &self,
        data: Vec<u8>,
    ) -> BoxFuture<'static, Result<DecodedSample, DecodeError>> {
        let sample_rate = self.sample_rate;
        async move {
            tokio::task::yield_now().await;
            decode::decode_bytes(data, sample_rate)
        }
        .boxed()
    }
}
