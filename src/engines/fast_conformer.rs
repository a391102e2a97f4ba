//! FastConformer-style CTC models (NeMo exports).
//!
//! Single-file ONNX graphs taking a `[batch, bands, frames]` feature tensor
//! plus a frame count, and emitting per-frame log probabilities.

use ndarray::{ArrayView2, Axis};
use ort::inputs;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};

use super::{
    find_onnx_model, logits_from_value, EngineError, EngineStrategy, InferenceOptions,
    InferenceOutput, TensorNames,
};

pub struct FastConformer;

impl EngineStrategy for FastConformer {
    fn id(&self) -> &'static str {
        "fast-conformer"
    }

    fn locate_model_file(&self, dir: &Path) -> Option<PathBuf> {
        find_onnx_model(dir)
    }

    fn infer(
        &self,
        session: &mut Session,
        names: &TensorNames,
        features: ArrayView2<f32>,
        _opts: &InferenceOptions,
    ) -> Result<InferenceOutput, EngineError> {
        let num_frames = features.nrows() as i64;

        // [frames, bands] -> [1, bands, frames]
        let feats = features.t().to_owned().insert_axis(Axis(0)).into_dyn();
        let lengths = ndarray::arr1(&[num_frames]).into_dyn();

        let inputs = inputs! {
            "features" => TensorRef::from_array_view(feats.view())?,
            "feature_lengths" => TensorRef::from_array_view(lengths.view())?,
        };
        let outputs = session.run(inputs)?;

        let value = match names.outputs.first() {
            Some(name) => outputs
                .get(name.as_str())
                .ok_or_else(|| EngineError::OutputNotFound(name.clone()))?,
            None => &outputs[0],
        };
        let logits = logits_from_value(value)?;
        log::debug!("fast-conformer logits shape: {:?}", logits.shape());

        Ok(InferenceOutput::Logits(logits))
    }
}
