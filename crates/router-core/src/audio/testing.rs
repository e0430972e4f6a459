//! In-memory audio backend for router and worker tests
//!
//! Input chunks are fed through a crossbeam channel and every chunk written
//! to a sink is forwarded to a per-device receiver.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::types::{InputChunk, StereoSample};

use super::backend::{AudioBackend, AudioDevice, InputSource, OutputSink};
use super::config::{DeviceId, StreamSettings};
use super::error::{AudioError, AudioResult};

pub(crate) const MOCK_HOST: &str = "Mock";

/// Build a device entry on the mock host
pub(crate) fn mock_device(name: &str, channels: u16, sample_rate: u32) -> AudioDevice {
    AudioDevice {
        id: DeviceId::with_host(name, MOCK_HOST),
        name: name.to_string(),
        host: MOCK_HOST.to_string(),
        is_default: false,
        channels,
        sample_rate,
    }
}

#[derive(Default)]
struct SinkControl {
    receivers: HashMap<DeviceId, Sender<Vec<StereoSample>>>,
    fail_open: HashSet<DeviceId>,
    full: HashSet<DeviceId>,
    panic_on_write: HashSet<DeviceId>,
    opened: Vec<DeviceId>,
}

pub(crate) struct MockBackend {
    inputs: Vec<AudioDevice>,
    outputs: Vec<AudioDevice>,
    feed_tx: Sender<InputChunk>,
    feed_rx: Receiver<InputChunk>,
    sinks: Mutex<SinkControl>,
}

impl MockBackend {
    /// One 5.1 input, one stereo input, two stereo outputs and a mono output
    pub(crate) fn new() -> Self {
        Self::with_devices(
            vec![
                mock_device("Surround In", 6, 48000),
                mock_device("Stereo In", 2, 48000),
            ],
            vec![
                mock_device("Out A", 2, 48000),
                mock_device("Out B", 2, 48000),
                mock_device("Mono Out", 1, 48000),
            ],
        )
    }

    pub(crate) fn with_devices(inputs: Vec<AudioDevice>, outputs: Vec<AudioDevice>) -> Self {
        let (feed_tx, feed_rx) = unbounded();
        Self {
            inputs,
            outputs,
            feed_tx,
            feed_rx,
            sinks: Mutex::new(SinkControl::default()),
        }
    }

    pub(crate) fn id(name: &str) -> DeviceId {
        DeviceId::with_host(name, MOCK_HOST)
    }

    /// Sender every opened input source reads from
    pub(crate) fn feed(&self) -> Sender<InputChunk> {
        self.feed_tx.clone()
    }

    /// Receive every chunk written to the named device from now on
    pub(crate) fn capture(&self, id: &DeviceId) -> Receiver<Vec<StereoSample>> {
        let (tx, rx) = unbounded();
        self.sinks.lock().unwrap().receivers.insert(id.clone(), tx);
        rx
    }

    pub(crate) fn fail_open(&self, id: &DeviceId) {
        self.sinks.lock().unwrap().fail_open.insert(id.clone());
    }

    /// Make every write to the device report a full buffer
    pub(crate) fn refuse_writes(&self, id: &DeviceId) {
        self.sinks.lock().unwrap().full.insert(id.clone());
    }

    pub(crate) fn panic_on_write(&self, id: &DeviceId) {
        self.sinks.lock().unwrap().panic_on_write.insert(id.clone());
    }

    /// Devices opened so far, in open order
    pub(crate) fn opened(&self) -> Vec<DeviceId> {
        self.sinks.lock().unwrap().opened.clone()
    }
}

impl AudioBackend for MockBackend {
    fn input_devices(&self) -> AudioResult<Vec<AudioDevice>> {
        Ok(self.inputs.clone())
    }

    fn output_devices(&self) -> AudioResult<Vec<AudioDevice>> {
        Ok(self.outputs.clone())
    }

    fn open_input(
        &self,
        id: &DeviceId,
        settings: &StreamSettings,
    ) -> AudioResult<Box<dyn InputSource>> {
        let mut sinks = self.sinks.lock().unwrap();
        if sinks.fail_open.contains(id) {
            return Err(AudioError::StreamBuildError(format!("mock refused {}", id)));
        }
        sinks.opened.push(id.clone());
        Ok(Box::new(MockInput {
            rx: self.feed_rx.clone(),
            period: settings.chunk_period(),
        }))
    }

    fn open_output(
        &self,
        id: &DeviceId,
        _settings: &StreamSettings,
    ) -> AudioResult<Box<dyn OutputSink>> {
        let mut sinks = self.sinks.lock().unwrap();
        if sinks.fail_open.contains(id) {
            return Err(AudioError::StreamBuildError(format!("mock refused {}", id)));
        }
        sinks.opened.push(id.clone());
        Ok(Box::new(MockOutput {
            tx: sinks.receivers.get(id).cloned(),
            full: sinks.full.contains(id),
            panic_on_write: sinks.panic_on_write.contains(id),
        }))
    }
}

struct MockInput {
    rx: Receiver<InputChunk>,
    period: Duration,
}

impl InputSource for MockInput {
    fn read_chunk(&mut self, chunk: &mut InputChunk) -> AudioResult<()> {
        match self.rx.recv_timeout(self.period) {
            Ok(next) if next.frames() == chunk.frames() => {
                chunk
                    .as_interleaved_mut()
                    .copy_from_slice(next.as_interleaved());
                Ok(())
            }
            Ok(next) => Err(AudioError::UnsupportedFormat(format!(
                "fed {} frames, expected {}",
                next.frames(),
                chunk.frames()
            ))),
            Err(RecvTimeoutError::Timeout) => Err(AudioError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(AudioError::Disconnected),
        }
    }
}

struct MockOutput {
    tx: Option<Sender<Vec<StereoSample>>>,
    full: bool,
    panic_on_write: bool,
}

impl OutputSink for MockOutput {
    fn write_chunk(&mut self, frames: &[StereoSample]) -> AudioResult<()> {
        if self.panic_on_write {
            panic!("mock sink panicked");
        }
        if self.full {
            return Err(AudioError::BufferFull);
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(frames.to_vec());
        }
        Ok(())
    }
}
