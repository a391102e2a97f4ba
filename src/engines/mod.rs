//! Model family strategies.
//!
//! Each supported family shares the sample reader, feature extractor, and
//! session cache, and differs only in model-file discovery, frame stacking,
//! tensor naming, and special-token handling. Enable families via Cargo
//! features:
//! - `fast-conformer` - FastConformer CTC exports (NeMo format)
//! - `sense-voice` - FunASR SenseVoice (ONNX format)
//! - `parakeet` - NVIDIA Parakeet (ONNX format)

#[cfg(feature = "fast-conformer")]
pub mod fast_conformer;
#[cfg(feature = "parakeet")]
pub mod parakeet;
#[cfg(feature = "sense-voice")]
pub mod sense_voice;

#[cfg(feature = "fast-conformer")]
pub use fast_conformer::FastConformer;
#[cfg(feature = "parakeet")]
pub use parakeet::Parakeet;
#[cfg(feature = "sense-voice")]
pub use sense_voice::SenseVoice;

use ndarray::{Array3, ArrayView2};
use ort::session::Session;
use ort::value::DynValue;
use std::fs;
use std::path::{Path, PathBuf};

use crate::features::LfrConfig;

/// Transcription language selection, for families that take one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Language {
    /// Auto-detect language.
    #[default]
    Auto,
    /// Chinese (Mandarin).
    Chinese,
    /// English.
    English,
    /// Japanese.
    Japanese,
    /// Korean.
    Korean,
    /// Cantonese.
    Cantonese,
}

/// Per-call inference parameters.
#[derive(Debug, Clone)]
pub struct InferenceOptions {
    /// Language to transcribe in, for families with a language input.
    pub language: Language,
    /// Whether to request inverse text normalization from the model.
    pub use_itn: bool,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            language: Language::Auto,
            use_itn: true,
        }
    }
}

/// Input/output tensor names declared by a loaded session, recorded at
/// load time and kept with the session for the lifetime of its cache entry.
#[derive(Debug, Clone, Default)]
pub struct TensorNames {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// What one inference call produced.
pub enum InferenceOutput {
    /// Per-frame vocabulary logits, shape `[1, frames, vocab]`, to be fed
    /// to the greedy decoder.
    Logits(Array3<f32>),
    /// Token ids the model graph already decoded; only blank/sentinel
    /// filtering remains.
    TokenIds(Vec<i64>),
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),
    #[error("ndarray shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("model input not found: {0}")]
    InputNotFound(String),
    #[error("model output not found: {0}")]
    OutputNotFound(String),
    #[error("unexpected output shape: {0:?}")]
    OutputShape(Vec<usize>),
}

/// One model family's capability set.
///
/// Strategies are stateless; everything per-model lives in the session
/// cache entry they are handed at call time.
pub trait EngineStrategy: Send + Sync {
    /// Short family tag used in logs.
    fn id(&self) -> &'static str;

    /// Locate the model file within a model directory.
    fn locate_model_file(&self, dir: &Path) -> Option<PathBuf>;

    /// Frame stacking to apply to extracted features, if the family's
    /// models expect low-frame-rate input.
    fn frame_stacking(&self) -> Option<LfrConfig> {
        None
    }

    /// Whether start/end sentinel ids are suppressed during decoding.
    fn suppress_sentinels(&self) -> bool {
        false
    }

    /// Run one inference call over a `[frames, bands]` feature matrix.
    fn infer(
        &self,
        session: &mut Session,
        names: &TensorNames,
        features: ArrayView2<f32>,
        opts: &InferenceOptions,
    ) -> Result<InferenceOutput, EngineError>;
}

/// First `.onnx` file in a model directory, in name order.
pub(crate) fn find_onnx_model(dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"))
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Extract `[1, frames, vocab]` logits from an output value.
pub(crate) fn logits_from_value(value: &DynValue) -> Result<Array3<f32>, EngineError> {
    let view = value.try_extract_array::<f32>()?;
    let shape = view.shape().to_vec();
    view.to_owned()
        .into_dimensionality::<ndarray::Ix3>()
        .map_err(|_| EngineError::OutputShape(shape))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_first_onnx_by_name() {
        let dir = std::env::temp_dir().join(format!("dictate-rs-discovery-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("zeta.onnx"), b"").unwrap();
        std::fs::write(dir.join("alpha.onnx"), b"").unwrap();
        std::fs::write(dir.join("tokens.txt"), b"").unwrap();

        let found = find_onnx_model(&dir).unwrap();
        assert_eq!(found.file_name().unwrap(), "alpha.onnx");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_directory_yields_none() {
        assert!(find_onnx_model(Path::new("/nonexistent/model/dir")).is_none());
    }
}
