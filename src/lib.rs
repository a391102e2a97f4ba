//! # dictate-rs
//!
//! On-device speech-to-text inference for dictation: raw PCM in, text out.
//!
//! The pipeline converts audio samples into mean-normalized log-mel
//! features, runs them through a lazily cached ONNX Runtime session, and
//! greedily decodes the per-frame output CTC-style. Model families share the
//! sample reader, feature extractor, and session cache, and differ only in
//! model-file discovery, frame stacking, tensor naming, and special-token
//! handling:
//!
//! - **FastConformer** — NeMo CTC exports (requires the `fast-conformer` feature)
//! - **SenseVoice** — FunASR exports with low-frame-rate input (`sense-voice`)
//! - **Parakeet** — NVIDIA exports, some of which decode in-graph (`parakeet`)
//!
//! ## Model directory layout
//!
//! Each model variant lives in its own directory containing `tokens.txt` and
//! an `.onnx` model file. SenseVoice expects the file to be named
//! `model.onnx` exactly; the other families use the first `.onnx` file
//! found.
//!
//! ## Quick start
//!
//! ```ignore
//! use std::path::PathBuf;
//! use dictate_rs::{engines::FastConformer, ModelDescriptor, Transcriber};
//!
//! let transcriber = Transcriber::new(FastConformer);
//! let descriptor = ModelDescriptor::new("fast-conformer-en", "models/fast-conformer-en");
//!
//! let text = transcriber.transcribe_file(&PathBuf::from("audio.wav"), &descriptor)?;
//! println!("{text}");
//! # Ok::<(), dictate_rs::TranscribeError>(())
//! ```
//!
//! ## Audio requirements
//!
//! Input is a 44-byte WAV-style header followed by little-endian 16-bit PCM,
//! mono, at 16 kHz. Convert anything else before it reaches this crate.
//!
//! Transcription calls are synchronous and block on session loading and
//! inference; run them off any latency-sensitive thread. Calls are not
//! individually cancellable — cancel at a higher level by abandoning the
//! caller.

pub mod audio;
pub mod decoder;
pub mod engines;
pub mod features;
pub mod session;
pub mod tokens;
pub mod transcriber;
pub mod vad;

pub use session::{ModelDescriptor, ModelLoader, SessionCache, SessionError};
pub use tokens::SymbolTable;
pub use transcriber::{LoadedModel, ModelHandle, OrtLoader, Transcriber};
pub use vad::{SpeechSegment, SpeechSegmenter};

/// Errors surfaced to transcription callers.
///
/// Lower-level failures are mapped onto these three kinds at the
/// orchestrator boundary; callers never see engine-internal error types.
/// Nothing is retried automatically — retry, if any, is a caller-level
/// policy.
#[derive(thiserror::Error, Debug)]
pub enum TranscribeError {
    /// The audio source was malformed or unreadable.
    #[error("invalid audio data: {0}")]
    InvalidAudioData(#[from] audio::AudioError),
    /// No model file was found, or the session could not be constructed.
    #[error("model load failed: {0}")]
    ModelLoadFailed(#[from] session::SessionError),
    /// Feature extraction, inference, or decoding produced nothing usable.
    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),
}

pub type Result<T> = std::result::Result<T, TranscribeError>;
