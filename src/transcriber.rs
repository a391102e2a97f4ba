//! Transcription orchestration.
//!
//! The public entry point per model family: reads samples, optionally trims
//! them to speech via an injected voice-activity segmenter, extracts log-mel
//! features, runs the cached inference session, and greedily decodes the
//! output into text. The session/tokenizer cache is owned here; invalidation
//! and cleanup are forwarded to it.

use ndarray::ArrayView2;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use parking_lot::Mutex;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::audio::{self, SAMPLE_RATE};
use crate::decoder::{ctc_greedy_decode, filter_token_ids};
use crate::engines::{EngineError, EngineStrategy, InferenceOptions, InferenceOutput, TensorNames};
use crate::features::{stack_frames, FeatureExtractor};
use crate::session::{ModelDescriptor, ModelLoader, SessionCache, SessionError};
use crate::tokens::SymbolTable;
use crate::vad::{collect_segments, SpeechSegmenter};
use crate::TranscribeError;

/// Inputs longer than this go through voice-activity segmentation when a
/// segmenter is installed.
const VAD_MIN_SAMPLES: usize = 20 * SAMPLE_RATE as usize;

/// What the orchestrator needs from a cached model entry.
pub trait ModelHandle: Send + Sync {
    fn symbols(&self) -> &SymbolTable;

    /// Run one inference call over a `[frames, bands]` feature matrix.
    fn infer(
        &self,
        features: ArrayView2<f32>,
        opts: &InferenceOptions,
    ) -> Result<InferenceOutput, EngineError>;
}

/// A loaded model variant: the session, its declared tensor names, and the
/// symbol table matching this on-disk model version. The three are only
/// valid as a set, so the cache evicts them as one unit.
pub struct LoadedModel {
    engine: Arc<dyn EngineStrategy>,
    session: Mutex<Session>,
    names: TensorNames,
    symbols: SymbolTable,
}

impl ModelHandle for LoadedModel {
    fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    fn infer(
        &self,
        features: ArrayView2<f32>,
        opts: &InferenceOptions,
    ) -> Result<InferenceOutput, EngineError> {
        // Session::run needs exclusive access, so calls on one variant
        // serialize here; calls on different variants run in parallel.
        let mut session = self.session.lock();
        self.engine.infer(&mut session, &self.names, features, opts)
    }
}

/// Production loader: builds an ONNX Runtime session and the matching
/// symbol table from a model directory.
pub struct OrtLoader {
    engine: Arc<dyn EngineStrategy>,
}

impl OrtLoader {
    pub fn new(engine: Arc<dyn EngineStrategy>) -> Self {
        Self { engine }
    }
}

impl ModelLoader for OrtLoader {
    type Handle = LoadedModel;

    fn load(&self, descriptor: &ModelDescriptor) -> Result<LoadedModel, SessionError> {
        let model_path = self
            .engine
            .locate_model_file(&descriptor.dir)
            .ok_or_else(|| SessionError::ModelNotFound(descriptor.dir.clone()))?;
        let tokens_path = descriptor.dir.join("tokens.txt");
        if !tokens_path.exists() {
            return Err(SessionError::TokensNotFound(tokens_path));
        }

        log::info!("loading {} model from {:?}", self.engine.id(), model_path);
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers([CPUExecutionProvider::default().build()])?
            .with_parallel_execution(true)?
            .commit_from_file(&model_path)?;

        let names = TensorNames {
            inputs: session.inputs.iter().map(|i| i.name.clone()).collect(),
            outputs: session.outputs.iter().map(|o| o.name.clone()).collect(),
        };
        log::debug!("model inputs {:?}, outputs {:?}", names.inputs, names.outputs);

        let mut symbols = SymbolTable::load(&tokens_path)?;
        if has_base64_tokens(&session) {
            log::info!("base64-encoded token table detected, decoding");
            symbols.apply_base64_decode();
        }

        Ok(LoadedModel {
            engine: Arc::clone(&self.engine),
            session: Mutex::new(session),
            names,
            symbols,
        })
    }
}

/// FunASR Nano exports ship their token table base64-encoded and mark it in
/// the graph's comment metadata.
fn has_base64_tokens(session: &Session) -> bool {
    session
        .metadata()
        .ok()
        .and_then(|meta| meta.custom("comment").ok().flatten())
        .is_some_and(|comment| comment.contains("Nano"))
}

/// Per-model-family transcription orchestrator.
///
/// Owns the session/tokenizer cache and an optional voice-activity
/// segmenter. Calls are synchronous and block on session loading and
/// inference; run them off any latency-sensitive thread.
pub struct Transcriber<L: ModelLoader = OrtLoader> {
    engine: Arc<dyn EngineStrategy>,
    cache: SessionCache<L>,
    extractor: FeatureExtractor,
    segmenter: Option<Box<dyn SpeechSegmenter>>,
}

impl Transcriber<OrtLoader> {
    /// Build an orchestrator for one model family.
    pub fn new(engine: impl EngineStrategy + 'static) -> Self {
        let engine: Arc<dyn EngineStrategy> = Arc::new(engine);
        let loader = OrtLoader::new(Arc::clone(&engine));
        Self::with_loader(engine, loader)
    }
}

impl<L: ModelLoader> Transcriber<L>
where
    L::Handle: ModelHandle,
{
    /// Build an orchestrator with an injected loader.
    pub fn with_loader(engine: Arc<dyn EngineStrategy>, loader: L) -> Self {
        Self {
            engine,
            cache: SessionCache::new(loader),
            extractor: FeatureExtractor::new(),
            segmenter: None,
        }
    }

    /// Install a best-effort voice-activity segmenter for long inputs.
    pub fn with_segmenter(mut self, segmenter: Box<dyn SpeechSegmenter>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    /// Transcribe a raw audio stream (44-byte header + 16-bit PCM mono).
    pub fn transcribe<R: Read>(
        &self,
        audio: R,
        descriptor: &ModelDescriptor,
    ) -> Result<String, TranscribeError> {
        self.transcribe_with_options(audio, descriptor, &InferenceOptions::default())
    }

    pub fn transcribe_with_options<R: Read>(
        &self,
        audio: R,
        descriptor: &ModelDescriptor,
        opts: &InferenceOptions,
    ) -> Result<String, TranscribeError> {
        let samples = audio::read_pcm_samples(audio, None)?;
        self.transcribe_samples(samples, descriptor, opts)
    }

    /// Transcribe a WAV file from disk.
    pub fn transcribe_file(
        &self,
        path: &Path,
        descriptor: &ModelDescriptor,
    ) -> Result<String, TranscribeError> {
        let samples = audio::read_wav_samples(path)?;
        self.transcribe_samples(samples, descriptor, &InferenceOptions::default())
    }

    /// Transcribe already-decoded samples (16 kHz mono, values in [-1, 1]).
    pub fn transcribe_samples(
        &self,
        samples: Vec<f32>,
        descriptor: &ModelDescriptor,
        opts: &InferenceOptions,
    ) -> Result<String, TranscribeError> {
        log::debug!(
            "transcribing {} samples ({:.2}s) with {}",
            samples.len(),
            samples.len() as f32 / SAMPLE_RATE as f32,
            self.engine.id(),
        );

        let samples = self.trim_to_speech(samples);

        let mut features = self.extractor.extract(&samples);
        if let Some(lfr) = self.engine.frame_stacking() {
            features = stack_frames(&features, lfr);
        }
        if features.nrows() == 0 {
            return Err(TranscribeError::TranscriptionFailed(
                "audio too short to produce any feature frames".to_string(),
            ));
        }
        log::debug!("features: [{}, {}]", features.nrows(), features.ncols());

        let model = self.cache.get(descriptor)?;
        let output = model
            .infer(features.view(), opts)
            .map_err(|e| TranscribeError::TranscriptionFailed(e.to_string()))?;

        let symbols = model.symbols();
        let suppress = if self.engine.suppress_sentinels() {
            vec![symbols.start_id(), symbols.end_id()]
        } else {
            Vec::new()
        };

        let ids = match output {
            InferenceOutput::Logits(logits) => {
                let frames = logits.shape()[1];
                if frames == 0 {
                    return Err(TranscribeError::TranscriptionFailed(
                        "inference produced no output frames".to_string(),
                    ));
                }
                ctc_greedy_decode(&logits.view(), frames, symbols.blank_id(), &suppress)
            }
            InferenceOutput::TokenIds(ids) => {
                filter_token_ids(ids, symbols.blank_id(), &suppress)
            }
        };

        // Silence decodes to no tokens; that is an empty transcription, not
        // an error.
        Ok(symbols.decode(&ids))
    }

    /// Drop the cached session and tokenizer for one model variant.
    ///
    /// Call this before loading a different variant when both cannot coexist
    /// in memory, and whenever the variant's files on disk change. In-flight
    /// calls keep their handle until they finish.
    pub fn invalidate(&self, name: &str) -> bool {
        self.cache.invalidate(name)
    }

    /// Release every cached session and tokenizer for this family.
    pub fn cleanup(&self) {
        self.cache.invalidate_all();
    }

    fn trim_to_speech(&self, samples: Vec<f32>) -> Vec<f32> {
        let Some(segmenter) = &self.segmenter else {
            return samples;
        };
        if samples.len() <= VAD_MIN_SAMPLES {
            return samples;
        }
        match segmenter.segment(&samples) {
            Ok(segments) => {
                if segments.is_empty() {
                    return samples;
                }
                let speech = collect_segments(&samples, &segments);
                if speech.is_empty() {
                    return samples;
                }
                log::debug!(
                    "voice-activity segmentation kept {} of {} samples",
                    speech.len(),
                    samples.len(),
                );
                speech
            }
            Err(err) => {
                log::warn!("voice-activity segmentation failed, using full audio: {err}");
                samples
            }
        }
    }
}
