//! NVIDIA Parakeet models.
//!
//! Some published exports decode in-graph and emit an `i64` id tensor;
//! others emit `f32` logits for external greedy decoding. The output is
//! inspected by dtype and rank to decide which path applies.

use ndarray::{ArrayView2, Axis};
use ort::inputs;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};

use super::{
    find_onnx_model, logits_from_value, EngineError, EngineStrategy, InferenceOptions,
    InferenceOutput, TensorNames,
};

pub struct Parakeet;

impl EngineStrategy for Parakeet {
    fn id(&self) -> &'static str {
        "parakeet"
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
        let length = ndarray::arr1(&[num_frames]).into_dyn();

        let inputs = inputs! {
            "audio_signal" => TensorRef::from_array_view(feats.view())?,
            "length" => TensorRef::from_array_view(length.view())?,
        };
        let outputs = session.run(inputs)?;

        let value = match names.outputs.first() {
            Some(name) => outputs
                .get(name.as_str())
                .ok_or_else(|| EngineError::OutputNotFound(name.clone()))?,
            None => &outputs[0],
        };

        // Pre-decoded exports emit int64 ids, [tokens] or [1, tokens].
        if let Ok(ids) = value.try_extract_array::<i64>() {
            return match ids.ndim() {
                1 | 2 => {
                    log::debug!("parakeet pre-decoded ids: {}", ids.len());
                    Ok(InferenceOutput::TokenIds(ids.iter().copied().collect()))
                }
                _ => Err(EngineError::OutputShape(ids.shape().to_vec())),
            };
        }

        let logits = logits_from_value(value)?;
        log::debug!("parakeet logits shape: {:?}", logits.shape());

        Ok(InferenceOutput::Logits(logits))
    }
}
