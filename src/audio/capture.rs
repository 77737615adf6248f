use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioFrame};
use super::wav::encode_wav;
use crate::error::CaptureError;

/// Capture lifecycle. Failures in `Starting` or `Stopping` fall back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Starting,
    Recording,
    Stopping,
}

/// A finished capture: all blocks concatenated in arrival order
#[derive(Debug, Clone)]
pub struct Recording {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channel_count: u16,
}

impl Recording {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channel_count.max(1) as f64)
    }

    /// Encode as a 16-bit PCM WAV buffer
    pub fn to_wav(&self) -> Vec<u8> {
        encode_wav(&self.samples, self.sample_rate, self.channel_count)
    }
}

struct Collected {
    blocks: Vec<Vec<f32>>,
    sample_rate: Option<u32>,
}

struct Collector {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<Collected>,
}

/// Owns one capture session at a time over an [`AudioBackend`].
///
/// `start` while a session is starting or active is ignored; `stop` outside
/// `Recording` fails with [`CaptureError::NoActiveSession`].
pub struct AudioCapturer {
    backend: Mutex<Box<dyn AudioBackend>>,
    state: Mutex<CaptureState>,
    collector: Mutex<Option<Collector>>,
}

impl AudioCapturer {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            backend: Mutex::new(backend),
            state: Mutex::new(CaptureState::Idle),
            collector: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> CaptureState {
        *self.state.lock().await
    }

    pub async fn is_recording(&self) -> bool {
        self.state().await == CaptureState::Recording
    }

    /// Acquire the input device and begin accumulating blocks
    pub async fn start(&self) -> Result<(), CaptureError> {
        {
            let mut state = self.state.lock().await;
            match *state {
                CaptureState::Idle => *state = CaptureState::Starting,
                other => {
                    warn!("Ignoring start request while {:?}", other);
                    return Ok(());
                }
            }
        }

        let mut backend = self.backend.lock().await;
        info!("Starting capture on {}", backend.name());

        let frames = match backend.start().await {
            Ok(rx) => rx,
            Err(e) => {
                error!("Failed to start capture: {:#}", e);
                *self.state.lock().await = CaptureState::Idle;
                return Err(CaptureError::Permission(format!("{:#}", e)));
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(collect_blocks(frames, stop_rx));
        *self.collector.lock().await = Some(Collector { stop_tx, handle });
        *self.state.lock().await = CaptureState::Recording;

        info!("Capture started");
        Ok(())
    }

    /// Release the device and return everything captured since `start`
    pub async fn stop(&self) -> Result<Recording, CaptureError> {
        {
            let mut state = self.state.lock().await;
            if *state != CaptureState::Recording {
                return Err(CaptureError::NoActiveSession);
            }
            *state = CaptureState::Stopping;
        }

        info!("Stopping capture");

        // Release the device first; it happens regardless of what follows.
        let (released, fallback_rate) = {
            let mut backend = self.backend.lock().await;
            (backend.stop().await, backend.sample_rate())
        };

        let collected = match self.collector.lock().await.take() {
            Some(collector) => {
                let _ = collector.stop_tx.send(());
                collector.handle.await
            }
            None => Ok(Collected {
                blocks: Vec::new(),
                sample_rate: None,
            }),
        };

        *self.state.lock().await = CaptureState::Idle;

        if let Err(e) = released {
            error!("Failed to release audio device: {:#}", e);
            return Err(CaptureError::Device(e));
        }

        let collected = collected
            .map_err(|e| CaptureError::Device(anyhow::anyhow!("Block collector failed: {}", e)))?;

        let block_count = collected.blocks.len();
        let samples = collected.blocks.concat();
        let recording = Recording {
            samples,
            sample_rate: collected.sample_rate.unwrap_or(fallback_rate),
            channel_count: 1,
        };

        info!(
            "Capture stopped: {} blocks, {} samples ({:.1}s at {}Hz)",
            block_count,
            recording.samples.len(),
            recording.duration_secs(),
            recording.sample_rate
        );

        Ok(recording)
    }
}

async fn collect_blocks(mut frames: mpsc::Receiver<AudioFrame>, mut stop_rx: oneshot::Receiver<()>) -> Collected {
    let mut collected = Collected {
        blocks: Vec::new(),
        sample_rate: None,
    };

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => push_frame(&mut collected, frame),
                None => break,
            },
            _ = &mut stop_rx => {
                // Blocks already queued still belong to the recording.
                while let Ok(frame) = frames.try_recv() {
                    push_frame(&mut collected, frame);
                }
                break;
            }
        }
    }

    debug!("Collector finished with {} blocks", collected.blocks.len());
    collected
}

fn push_frame(collected: &mut Collected, frame: AudioFrame) {
    collected.sample_rate.get_or_insert(frame.sample_rate);
    collected.blocks.push(frame.into_mono());
}
