//! FunASR SenseVoice models.
//!
//! Low-frame-rate family: extracted features are stacked 7-wide with stride
//! 6 before inference, and the graph takes scalar language / text-norm
//! selectors alongside the feature tensor. The graph prepends sentinel
//! tokens to its output, so start/end ids are suppressed during decoding.

use ndarray::{ArrayView2, Axis};
use ort::inputs;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};

use super::{
    logits_from_value, EngineError, EngineStrategy, InferenceOptions, InferenceOutput, Language,
    TensorNames,
};
use crate::features::LfrConfig;

/// This family ships one canonical graph name rather than a per-variant one.
const MODEL_FILE: &str = "model.onnx";

// Scalar selector ids baked into the published graphs.
const WITH_ITN_ID: i32 = 14;
const WITHOUT_ITN_ID: i32 = 15;

fn language_id(language: Language) -> i32 {
    match language {
        Language::Auto => 0,
        Language::Chinese => 3,
        Language::English => 4,
        Language::Cantonese => 7,
        Language::Japanese => 11,
        Language::Korean => 12,
    }
}

pub struct SenseVoice;

impl EngineStrategy for SenseVoice {
    fn id(&self) -> &'static str {
        "sense-voice"
    }

    fn locate_model_file(&self, dir: &Path) -> Option<PathBuf> {
        let path = dir.join(MODEL_FILE);
        path.exists().then_some(path)
    }

    fn frame_stacking(&self) -> Option<LfrConfig> {
        Some(LfrConfig::default())
    }

    fn suppress_sentinels(&self) -> bool {
        true
    }

    fn infer(
        &self,
        session: &mut Session,
        names: &TensorNames,
        features: ArrayView2<f32>,
        opts: &InferenceOptions,
    ) -> Result<InferenceOutput, EngineError> {
        if names.inputs.len() < 4 {
            return Err(EngineError::InputNotFound("text_norm".to_string()));
        }
        let num_frames = features.nrows() as i32;

        let feats = features.to_owned().insert_axis(Axis(0)).into_dyn();
        let x_length = ndarray::arr1(&[num_frames]).into_dyn();
        let language = ndarray::arr1(&[language_id(opts.language)]).into_dyn();
        let text_norm = ndarray::arr1(&[if opts.use_itn {
            WITH_ITN_ID
        } else {
            WITHOUT_ITN_ID
        }])
        .into_dyn();

        let inputs = inputs![
            names.inputs[0].as_str() => TensorRef::from_array_view(feats.view())?,
            names.inputs[1].as_str() => TensorRef::from_array_view(x_length.view())?,
            names.inputs[2].as_str() => TensorRef::from_array_view(language.view())?,
            names.inputs[3].as_str() => TensorRef::from_array_view(text_norm.view())?,
        ];
        let outputs = session.run(inputs)?;

        let value = match names.outputs.first() {
            Some(name) => outputs
                .get(name.as_str())
                .ok_or_else(|| EngineError::OutputNotFound(name.clone()))?,
            None => &outputs[0],
        };
        let logits = logits_from_value(value)?;
        log::debug!("sense-voice logits shape: {:?}", logits.shape());

        Ok(InferenceOutput::Logits(logits))
    }
}
