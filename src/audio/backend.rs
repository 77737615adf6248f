use anyhow::Result;
use tokio::sync::mpsc;

/// One block of captured audio (f32 samples in `[-1, 1]`, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (f32, interleaved)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Samples of this frame folded down to a single channel.
    pub fn into_mono(self) -> Vec<f32> {
        downmix_to_mono(self.samples, self.channels)
    }
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Samples per delivered block (per channel, after downmix)
    pub block_size: usize,
    /// Input device name; the platform default when `None`
    pub device: Option<String>,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            block_size: 4096,
            device: None,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal input stream (behind the `microphone` feature)
/// - File: replay a WAV file (batch transcription and tests)
///
/// Blocks must be delivered in arrival order. `stop` releases the device and
/// closes the frame channel.
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Sample rate of the active (or last) capture
    fn sample_rate(&self) -> u32;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create audio backend based on source and configuration
    pub fn create(source: AudioSource, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    use super::microphone::MicrophoneBackend;
                    Ok(Box::new(MicrophoneBackend::new(config)))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    let _ = config;
                    anyhow::bail!("Microphone capture requires the `microphone` feature")
                }
            }

            AudioSource::File(path) => {
                let backend = super::file::FileBackend::open(path, config)?;
                Ok(Box::new(backend))
            }
        }
    }
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Microphone input
    Microphone,
    /// File input (batch transcription, tests)
    File(String),
}

/// Average interleaved channels into one.
pub fn downmix_to_mono(samples: Vec<f32>, channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }

    samples
        .chunks_exact(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
