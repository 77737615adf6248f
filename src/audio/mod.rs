pub mod backend;
pub mod capture;
pub mod file;
pub mod wav;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
pub use capture::{AudioCapturer, CaptureState, Recording};
pub use file::{AudioFile, FileBackend};
pub use wav::encode_wav;
