// Microphone backend using cpal
//
// cpal streams are not Send on every platform, so the stream lives on a
// dedicated thread for its whole life. The thread reports the negotiated
// sample rate once the stream plays, forwards fixed-size mono blocks, and
// drops the stream (releasing the device) when told to stop.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SizedSample, StreamConfig};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};

/// Blocks buffered between the audio callback and the consumer
const FRAME_CHANNEL_CAPACITY: usize = 256;

pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    worker: Option<CaptureWorker>,
    sample_rate: u32,
}

struct CaptureWorker {
    stop_tx: std_mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            worker: None,
            sample_rate: 0,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.worker.is_some() {
            anyhow::bail!("Already capturing");
        }

        info!("Starting microphone capture");

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let device_name = self.config.device.clone();
        let block_size = self.config.block_size.max(1);

        let handle = std::thread::Builder::new()
            .name("council-microphone".to_string())
            .spawn(move || run_capture(device_name, block_size, frame_tx, ready_tx, stop_rx))
            .context("Failed to spawn capture thread")?;

        let sample_rate = match ready_rx.await {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                anyhow::bail!("Capture thread exited before the stream started");
            }
        };

        self.sample_rate = sample_rate;
        self.worker = Some(CaptureWorker { stop_tx, handle });

        info!("Microphone capture started at {}Hz", sample_rate);

        Ok(frame_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        info!("Stopping microphone capture");

        // A send error means the thread already exited; joining still applies.
        let _ = worker.stop_tx.send(());
        tokio::task::spawn_blocking(move || worker.handle.join())
            .await
            .context("Failed to join capture thread")?
            .map_err(|_| anyhow!("Capture thread panicked"))?;

        info!("Microphone released");

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

impl Drop for MicrophoneBackend {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            if worker.handle.join().is_err() {
                warn!("Capture thread panicked during drop");
            }
        }
    }
}

fn select_device(device_name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();
    debug!("Audio host: {:?}", host.id());

    match device_name {
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow!("No default input device found")),
        Some(target) => host
            .input_devices()
            .context("Failed to enumerate input devices")?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .ok_or_else(|| anyhow!("Input device not found: {}", target)),
    }
}

/// Samples carried between callbacks until a full block is available
struct BlockAccumulator {
    pending: Vec<f32>,
    block_size: usize,
    sample_rate: u32,
    emitted: u64,
    tx: mpsc::Sender<AudioFrame>,
}

impl BlockAccumulator {
    fn push(&mut self, mono: impl Iterator<Item = f32>) {
        self.pending.extend(mono);
        while self.pending.len() >= self.block_size {
            let rest = self.pending.split_off(self.block_size);
            let block = std::mem::replace(&mut self.pending, rest);
            self.emit(block);
        }
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            let block = std::mem::take(&mut self.pending);
            self.emit(block);
        }
    }

    fn emit(&mut self, samples: Vec<f32>) {
        let timestamp_ms = self.emitted * 1000 / self.sample_rate.max(1) as u64;
        self.emitted += samples.len() as u64;

        let frame = AudioFrame {
            samples,
            sample_rate: self.sample_rate,
            channels: 1,
            timestamp_ms,
        };

        // The audio callback must never block.
        if let Err(e) = self.tx.try_send(frame) {
            warn!("Dropping audio block: {}", e);
        }
    }
}

fn run_capture(
    device_name: Option<String>,
    block_size: usize,
    frame_tx: mpsc::Sender<AudioFrame>,
    ready_tx: oneshot::Sender<Result<u32>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let opened = open_stream(device_name.as_deref(), block_size, frame_tx);

    let (stream, accumulator) = match opened {
        Ok(parts) => parts,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let sample_rate = accumulator
        .lock()
        .map(|acc| acc.sample_rate)
        .unwrap_or_default();
    if ready_tx.send(Ok(sample_rate)).is_err() {
        return;
    }

    // Blocks until stop() signals or the backend is dropped.
    let _ = stop_rx.recv();
    drop(stream);

    match accumulator.lock() {
        Ok(mut acc) => acc.flush(),
        Err(_) => error!("Block accumulator poisoned; trailing samples lost"),
    }
}

fn open_stream(
    device_name: Option<&str>,
    block_size: usize,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> Result<(cpal::Stream, Arc<Mutex<BlockAccumulator>>)> {
    let device = select_device(device_name)?;
    let supported = device
        .default_input_config()
        .context("Failed to query input configuration")?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();

    info!(
        "Input device: {} ({}ch, {}Hz, {:?})",
        device.name().unwrap_or_else(|_| "<unnamed>".to_string()),
        config.channels,
        config.sample_rate.0,
        sample_format
    );

    let accumulator = Arc::new(Mutex::new(BlockAccumulator {
        pending: Vec::with_capacity(block_size * 2),
        block_size,
        sample_rate: config.sample_rate.0,
        emitted: 0,
        tx: frame_tx,
    }));

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, Arc::clone(&accumulator))?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, Arc::clone(&accumulator))?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, Arc::clone(&accumulator))?,
        cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, Arc::clone(&accumulator))?,
        other => anyhow::bail!("Unsupported sample format: {:?}", other),
    };

    stream.play().context("Failed to start input stream")?;

    Ok((stream, accumulator))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    accumulator: Arc<Mutex<BlockAccumulator>>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono = data.chunks_exact(channels).map(|frame| {
                    frame.iter().map(|&s| s.to_sample::<f32>()).sum::<f32>() / channels as f32
                });
                if let Ok(mut acc) = accumulator.lock() {
                    acc.push(mono);
                }
            },
            |err| error!("Input stream error: {}", err),
            None,
        )
        .context("Failed to open input stream")?;

    Ok(stream)
}
