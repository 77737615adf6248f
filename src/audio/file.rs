use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{downmix_to_mono, AudioBackend, AudioBackendConfig, AudioFrame};
use super::capture::Recording;

/// A WAV file decoded to mono f32 samples
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    /// Channel count of the source file (samples are already mono)
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?
            }
        };

        let samples = downmix_to_mono(interleaved, spec.channels);
        let duration_seconds = samples.len() as f64 / spec.sample_rate as f64;

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} mono samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    pub fn into_recording(self) -> Recording {
        Recording {
            samples: self.samples,
            sample_rate: self.sample_rate,
            channel_count: 1,
        }
    }
}

/// Replays a WAV file through the [`AudioBackend`] interface in fixed-size blocks
pub struct FileBackend {
    config: AudioBackendConfig,
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    capturing: Arc<AtomicBool>,
    replayed: Arc<watch::Sender<bool>>,
    feeder: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn open(path: impl AsRef<Path>, config: AudioBackendConfig) -> Result<Self> {
        let audio = AudioFile::open(path)?;
        Ok(Self::from_samples(audio.samples, audio.sample_rate, config))
    }

    /// Backend over in-memory mono samples
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, config: AudioBackendConfig) -> Self {
        Self {
            config,
            samples: Arc::new(samples),
            sample_rate,
            capturing: Arc::new(AtomicBool::new(false)),
            replayed: Arc::new(watch::channel(false).0),
            feeder: None,
        }
    }

    /// Flips to `true` once the current replay has handed every block to the channel
    pub fn replay_finished(&self) -> watch::Receiver<bool> {
        self.replayed.subscribe()
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            anyhow::bail!("Already capturing");
        }

        let (tx, rx) = mpsc::channel(64);
        let samples = Arc::clone(&self.samples);
        let capturing = Arc::clone(&self.capturing);
        let block_size = self.config.block_size.max(1);
        let sample_rate = self.sample_rate;
        let replayed = Arc::clone(&self.replayed);

        capturing.store(true, Ordering::SeqCst);
        replayed.send_replace(false);

        let feeder = tokio::spawn(async move {
            let mut offset = 0usize;
            for block in samples.chunks(block_size) {
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }

                let frame = AudioFrame {
                    samples: block.to_vec(),
                    sample_rate,
                    channels: 1,
                    timestamp_ms: offset as u64 * 1000 / sample_rate.max(1) as u64,
                };
                offset += block.len();

                if tx.send(frame).await.is_err() {
                    warn!("Frame receiver dropped, stopping file replay");
                    break;
                }
            }

            debug!("File replay finished at sample {}", offset);
            replayed.send_replace(true);
        });

        self.feeder = Some(feeder);
        info!("File replay started ({} samples)", self.samples.len());

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);

        if let Some(feeder) = self.feeder.take() {
            feeder.await.context("File replay task panicked")?;
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn name(&self) -> &str {
        "WAV file replay"
    }
}
