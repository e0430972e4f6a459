//! CPAL audio backend implementation
//!
//! cpal is callback driven while the engine worker pulls and pushes whole
//! chunks, so every stream is bridged through a lock-free SPSC ring:
//!
//! ```text
//!  ┌───────────────┐  push()  ┌──────────────┐  read_chunk()  ┌───────────────┐
//!  │ Input callback│─────────►│  input ring  │───────────────►│ Engine worker │
//!  │ (cpal thread) │          │ (6ch frames) │                │  (RT thread)  │
//!  └───────────────┘          └──────────────┘                └───────┬───────┘
//!                                                                     │ write_chunk()
//!                             ┌──────────────┐   pop()   ┌────────────▼──────┐
//!                             │Output callback│◄─────────│ destination ring  │
//!                             │ (cpal thread) │          │ (stereo frames)   │
//!                             └──────────────┘           └───────────────────┘
//! ```
//!
//! A cpal `Stream` is not `Send`, so each stream is built and kept alive by a
//! small owner thread that parks until the matching handle is dropped.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    BufferSize as CpalBufferSize, SampleFormat, SampleRate, Stream, StreamConfig,
    SupportedBufferSize,
};
use crossbeam::channel::{bounded, Sender};

use crate::types::{InputChunk, StereoSample, INPUT_CHANNELS};

use super::backend::{AudioBackend, AudioDevice, DeviceDirection, InputSource, OutputSink};
use super::config::{DeviceId, StreamSettings, INPUT_RING_CHUNKS, OUTPUT_RING_CHUNKS};
use super::device::{find_cpal_device, get_devices, supported_configs};
use super::error::{AudioError, AudioResult};

/// How long the worker sleeps between checks while waiting for input
const INPUT_POLL_INTERVAL: Duration = Duration::from_micros(250);

/// Audio backend using cpal on every host it can initialize
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn input_devices(&self) -> AudioResult<Vec<AudioDevice>> {
        get_devices(DeviceDirection::Input)
    }

    fn output_devices(&self) -> AudioResult<Vec<AudioDevice>> {
        get_devices(DeviceDirection::Output)
    }

    fn open_input(
        &self,
        id: &DeviceId,
        settings: &StreamSettings,
    ) -> AudioResult<Box<dyn InputSource>> {
        let capacity = settings.chunk_samples() * INPUT_RING_CHUNKS;
        let (producer, consumer) = rtrb::RingBuffer::<f32>::new(capacity);

        let device_id = id.clone();
        let stream_settings = *settings;
        let owner = StreamOwner::spawn(format!("router-in {}", id.name), move || {
            build_input_stream(&device_id, &stream_settings, producer)
        })?;

        log::info!(
            "Input stream open: {} ({} Hz, {} frames/chunk)",
            id,
            settings.sample_rate,
            settings.chunk_frames
        );

        Ok(Box::new(CpalInput {
            consumer,
            period: settings.chunk_period(),
            _owner: owner,
        }))
    }

    fn open_output(
        &self,
        id: &DeviceId,
        settings: &StreamSettings,
    ) -> AudioResult<Box<dyn OutputSink>> {
        let capacity = settings.chunk_frames * OUTPUT_RING_CHUNKS;
        let (producer, consumer) = rtrb::RingBuffer::<StereoSample>::new(capacity);

        let device_id = id.clone();
        let stream_settings = *settings;
        let owner = StreamOwner::spawn(format!("router-out {}", id.name), move || {
            build_output_stream(&device_id, &stream_settings, consumer)
        })?;

        log::info!(
            "Output stream open: {} ({} Hz, {} frames/chunk)",
            id,
            settings.sample_rate,
            settings.chunk_frames
        );

        Ok(Box::new(CpalOutput {
            producer,
            _owner: owner,
        }))
    }
}

/// Thread that owns one cpal stream for its whole lifetime
struct StreamOwner {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl StreamOwner {
    /// Build and start a stream on a dedicated thread
    ///
    /// Returns once the stream is playing, or with the build/play error.
    fn spawn<F>(name: String, build: F) -> AudioResult<Self>
    where
        F: FnOnce() -> AudioResult<Stream> + Send + 'static,
    {
        let (ready_tx, ready_rx) = bounded::<AudioResult<()>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let thread = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let stream = match build().and_then(|stream| {
                    stream
                        .play()
                        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
                    Ok(stream)
                }) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Parks until the handle drops its sender
                let _ = shutdown_rx.recv();
                drop(stream);
            })
            .map_err(|e| AudioError::StreamThread(e.to_string()))?;

        let mut owner = Self {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(owner),
            Ok(Err(e)) => {
                owner.close();
                Err(e)
            }
            Err(_) => {
                owner.close();
                Err(AudioError::StreamThread("stream thread exited during open".to_string()))
            }
        }
    }

    fn close(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Audio stream thread panicked");
            }
        }
    }
}

impl Drop for StreamOwner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Input side of a session: drains 6-channel frames from the input ring
struct CpalInput {
    consumer: rtrb::Consumer<f32>,
    period: Duration,
    _owner: StreamOwner,
}

impl InputSource for CpalInput {
    fn read_chunk(&mut self, chunk: &mut InputChunk) -> AudioResult<()> {
        let needed = chunk.as_interleaved().len();
        let deadline = Instant::now() + self.period;

        loop {
            if self.consumer.slots() >= needed {
                let read = self
                    .consumer
                    .read_chunk(needed)
                    .map_err(|_| AudioError::Timeout)?;
                let (first, second) = read.as_slices();
                let out = chunk.as_interleaved_mut();
                out[..first.len()].copy_from_slice(first);
                out[first.len()..].copy_from_slice(second);
                read.commit_all();
                return Ok(());
            }
            if self.consumer.is_abandoned() {
                return Err(AudioError::Disconnected);
            }
            if Instant::now() >= deadline {
                return Err(AudioError::Timeout);
            }
            thread::sleep(INPUT_POLL_INTERVAL);
        }
    }
}

/// One destination's queue towards its output device
struct CpalOutput {
    producer: rtrb::Producer<StereoSample>,
    _owner: StreamOwner,
}

impl OutputSink for CpalOutput {
    fn write_chunk(&mut self, frames: &[StereoSample]) -> AudioResult<()> {
        if self.producer.is_abandoned() {
            return Err(AudioError::Disconnected);
        }
        let mut write = self
            .producer
            .write_chunk(frames.len())
            .map_err(|_| AudioError::BufferFull)?;
        let (first, second) = write.as_mut_slices();
        let split = first.len();
        first.copy_from_slice(&frames[..split]);
        second.copy_from_slice(&frames[split..]);
        write.commit_all();
        Ok(())
    }
}

/// Pick an f32 configuration with enough channels that supports the rate
///
/// Requests a fixed chunk-sized device buffer when the device allows it.
fn select_config(
    device: &cpal::Device,
    direction: DeviceDirection,
    settings: &StreamSettings,
) -> AudioResult<StreamConfig> {
    let configs = supported_configs(device, direction)?;
    if configs.is_empty() {
        return Err(AudioError::ConfigError(
            "No supported stream configurations".to_string(),
        ));
    }

    let required = settings.channels as u16;
    let rate = settings.sample_rate;

    let best = configs
        .iter()
        .filter(|c| c.channels() >= required)
        .filter(|c| rate >= c.min_sample_rate().0 && rate <= c.max_sample_rate().0)
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .min_by_key(|c| c.channels())
        .ok_or_else(|| {
            let formats: Vec<String> = configs
                .iter()
                .map(|c| format!("{}ch {:?}", c.channels(), c.sample_format()))
                .collect();
            AudioError::UnsupportedFormat(format!(
                "need f32, >= {} channels at {} Hz; device offers {}",
                required,
                rate,
                formats.join(", ")
            ))
        })?;

    let frames = settings.chunk_frames as u32;
    let buffer_size = match best.buffer_size() {
        SupportedBufferSize::Range { min, max } if frames >= *min && frames <= *max => {
            CpalBufferSize::Fixed(frames)
        }
        SupportedBufferSize::Unknown => CpalBufferSize::Fixed(frames),
        SupportedBufferSize::Range { min, max } => {
            log::warn!(
                "Device buffer range {}..={} excludes {} frames, using device default",
                min,
                max,
                frames
            );
            CpalBufferSize::Default
        }
    };

    Ok(StreamConfig {
        channels: best.channels(),
        sample_rate: SampleRate(rate),
        buffer_size,
    })
}

fn build_input_stream(
    id: &DeviceId,
    settings: &StreamSettings,
    producer: rtrb::Producer<f32>,
) -> AudioResult<Stream> {
    let device = find_cpal_device(id, DeviceDirection::Input)?;
    let config = select_config(&device, DeviceDirection::Input, settings)?;
    let device_channels = config.channels as usize;
    let name = id.to_string();
    let mut producer = producer;

    device
        .build_input_stream(
            &config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                for frame in data.chunks_exact(device_channels) {
                    // Overruns drop whole frames so channel alignment survives
                    if producer.slots() < INPUT_CHANNELS {
                        break;
                    }
                    for &sample in &frame[..INPUT_CHANNELS] {
                        let _ = producer.push(sample);
                    }
                }
            },
            move |err| {
                log::error!("Input stream error on {}: {}", name, err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

fn build_output_stream(
    id: &DeviceId,
    settings: &StreamSettings,
    consumer: rtrb::Consumer<StereoSample>,
) -> AudioResult<Stream> {
    let device = find_cpal_device(id, DeviceDirection::Output)?;
    let config = select_config(&device, DeviceDirection::Output, settings)?;
    let device_channels = config.channels as usize;
    let name = id.to_string();
    let mut consumer = consumer;

    device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(device_channels) {
                    match consumer.pop() {
                        Ok(sample) => {
                            frame[0] = sample.left;
                            if device_channels > 1 {
                                frame[1] = sample.right;
                            }
                            for ch in frame.iter_mut().skip(2) {
                                *ch = 0.0;
                            }
                        }
                        Err(_) => {
                            // Worker behind or chunk dropped - play silence
                            frame.fill(0.0);
                        }
                    }
                }
            },
            move |err| {
                log::error!("Output stream error on {}: {}", name, err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}
