// IntelliPest 🌿 AGPL-3.0 License

//! Detection engine and model lifecycle.
//!
//! [`InferenceEngine`] owns at most one loaded model at a time and walks
//! it through a two-state lifecycle: unloaded and loaded. Every public
//! method takes `&self`; interior state lives behind an async mutex so the
//! engine can be shared across tasks. A failed load always lands back in
//! the unloaded state with the previous model's resources released.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::backend::{self, InferenceBackend};
use crate::decoder;
use crate::error::{InferenceError, Result};
use crate::inference::InferenceConfig;
use crate::labels;
use crate::normalizer::{self, FrameBuffer};
use crate::preprocessing;
use crate::results::{DetectionOutcome, Speed};
use crate::validation::{self, QualityReport};

/// Receives engine diagnostics.
///
/// The engine never writes to a global logger; callers inject whatever
/// sink fits their host (stderr, a test recorder, nothing). `stage` is a
/// short stable identifier, `message` is human-readable detail.
pub trait DiagnosticSink: Send + Sync {
    /// Record one diagnostic event.
    fn event(&self, stage: &str, message: &str);
}

/// Sink that discards every event. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn event(&self, _stage: &str, _message: &str) {}
}

/// Mutable engine state, guarded by one mutex so lifecycle transitions
/// and forward passes are serialized.
struct EngineState {
    backend: Option<Box<dyn InferenceBackend>>,
    model_path: Option<PathBuf>,
}

/// Pest detection engine.
///
/// # Example
///
/// ```rust,no_run
/// use intellipest_inference::{FrameBuffer, InferenceConfig, InferenceEngine};
///
/// # async fn run() -> intellipest_inference::Result<()> {
/// let engine = InferenceEngine::new(InferenceConfig::default());
/// engine.load_model("models/sugarcane.onnx").await?;
///
/// let image = image::open("leaf.jpg")?;
/// let outcome = engine.detect(&FrameBuffer::from(image)).await?;
/// if let Some(top) = &outcome.top_prediction {
///     println!("{top}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct InferenceEngine {
    state: Mutex<EngineState>,
    config: InferenceConfig,
    sink: Arc<dyn DiagnosticSink>,
}

impl InferenceEngine {
    /// Create an unloaded engine with a discarding diagnostic sink.
    #[must_use]
    pub fn new(config: InferenceConfig) -> Self {
        Self::with_sink(config, Arc::new(NullSink))
    }

    /// Create an unloaded engine that reports diagnostics to `sink`.
    #[must_use]
    pub fn with_sink(config: InferenceConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            state: Mutex::new(EngineState {
                backend: None,
                model_path: None,
            }),
            config,
            sink,
        }
    }

    /// The configuration this engine was built with.
    #[must_use]
    pub const fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Load a model from disk into the configured runtime.
    ///
    /// Reloading the path that is already loaded is a no-op. Loading a
    /// different path releases the current model before anything else
    /// runs, so every failure (read or initialize) leaves the engine
    /// unloaded, never with a stale handle.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Io`] if the file cannot be read,
    /// [`InferenceError::ModelLoadError`] if the runtime rejects it, or
    /// [`InferenceError::FeatureNotEnabled`] for a compiled-out runtime.
    pub async fn load_model(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut state = self.state.lock().await;

        if state.backend.is_some() && state.model_path.as_deref() == Some(path) {
            self.sink.event(
                "model_load",
                &format!("'{}' already loaded, skipping", path.display()),
            );
            return Ok(());
        }

        // The old handle must be gone before the first fallible step.
        Self::release_current(&mut state);

        let bytes = tokio::fs::read(path).await?;
        let backend =
            backend::load_backend(self.config.runtime, &bytes, &self.config, self.sink.as_ref())?;
        state.backend = Some(backend);
        state.model_path = Some(path.to_path_buf());

        self.sink.event(
            "model_load",
            &format!(
                "loaded '{}' into {}",
                path.display(),
                self.config.runtime.display_name()
            ),
        );
        Ok(())
    }

    /// Load a model from an in-memory buffer.
    ///
    /// Behaves like [`load_model`](Self::load_model) but tracks no path,
    /// so a subsequent load is never skipped as a reload.
    ///
    /// # Errors
    ///
    /// Same as [`load_model`](Self::load_model), minus file I/O.
    pub async fn load_model_bytes(&self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::release_current(&mut state);

        let backend =
            backend::load_backend(self.config.runtime, bytes, &self.config, self.sink.as_ref())?;
        state.backend = Some(backend);

        self.sink.event(
            "model_load",
            &format!(
                "loaded in-memory model into {}",
                self.config.runtime.display_name()
            ),
        );
        Ok(())
    }

    /// Free the current handle (if any) and land in the unloaded state.
    fn release_current(state: &mut EngineState) {
        if let Some(mut old) = state.backend.take() {
            old.release();
        }
        state.model_path = None;
    }

    /// Install a caller-provided backend, releasing any current model.
    ///
    /// This is the seam for embedding a custom runtime behind the same
    /// engine orchestration.
    pub async fn attach_backend(&self, backend: Box<dyn InferenceBackend>) {
        let mut state = self.state.lock().await;
        Self::release_current(&mut state);
        state.backend = Some(backend);
    }

    /// Run one detection pass over a frame.
    ///
    /// The frame is normalized, preprocessed to the backend's declared
    /// input size and channel order, run through the model, and decoded
    /// into the full ranked prediction list. `top_prediction` is set only
    /// when the best-ranked entry reaches the configured confidence
    /// threshold; the list itself is never filtered, so callers can
    /// always inspect every class. Undecodable model output is not an
    /// error; it produces an outcome with no predictions.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ModelLoadError`] if no model is loaded,
    /// or [`InferenceError::InferenceError`] if the forward pass fails.
    pub async fn detect(&self, frame: &FrameBuffer) -> Result<DetectionOutcome> {
        self.detect_with_threshold(frame, self.config.confidence_threshold)
            .await
    }

    /// Like [`detect`](Self::detect) with a caller-supplied confidence
    /// threshold, overriding the configured one for this call only.
    ///
    /// # Errors
    ///
    /// Same as [`detect`](Self::detect).
    pub async fn detect_with_threshold(
        &self,
        frame: &FrameBuffer,
        threshold: f32,
    ) -> Result<DetectionOutcome> {
        let mut state = self.state.lock().await;
        let backend = state.backend.as_mut().ok_or_else(|| {
            InferenceError::ModelLoadError("No model loaded".to_string())
        })?;

        let start = Instant::now();
        let rgb = normalizer::normalize(frame);
        let tensor =
            preprocessing::preprocess(&rgb, backend.input_size()).to_order(backend.channel_order());
        let preprocess_ms = Speed::ms(start.elapsed());

        let infer_start = Instant::now();
        // The native pass can run long; on a multi-thread runtime, mark
        // this worker as blocking so the executor stays responsive.
        let handle = tokio::runtime::Handle::current();
        let raw = if matches!(
            handle.runtime_flavor(),
            tokio::runtime::RuntimeFlavor::MultiThread
        ) {
            tokio::task::block_in_place(|| backend.run(&tensor))?
        } else {
            backend.run(&tensor)?
        };
        let inference_ms = Speed::ms(infer_start.elapsed());

        let decode_start = Instant::now();
        let expected = backend.class_count().unwrap_or(labels::CLASS_COUNT);
        let predictions = decoder::decode(&raw, expected);
        let decode_ms = Speed::ms(decode_start.elapsed());

        let speed = Speed {
            preprocess_ms,
            inference_ms,
            decode_ms,
        };
        let top_prediction = predictions
            .first()
            .filter(|top| top.confidence >= threshold)
            .cloned();
        let outcome = DetectionOutcome {
            top_prediction,
            predictions,
            backend_used: backend.name().to_string(),
            processing_time_ms: Speed::ms(start.elapsed()),
            speed,
        };

        self.sink.event("detect", &outcome.to_string());
        Ok(outcome)
    }

    /// Run the advisory quality heuristics over a frame.
    ///
    /// Never fails and needs no loaded model; a frame the checks dislike
    /// can still be detected on.
    pub fn validate_image(&self, frame: &FrameBuffer) -> QualityReport {
        validation::validate(&normalizer::normalize(frame))
    }

    /// Cheap resolution-and-exposure gate, without the crop heuristics.
    #[must_use]
    pub fn check_image_quality(&self, frame: &FrameBuffer) -> bool {
        preprocessing::is_quality_sufficient(&normalizer::normalize(frame))
    }

    /// Release the loaded model and return to the unloaded state.
    /// Idempotent; releasing an unloaded engine does nothing.
    pub async fn release(&self) {
        let mut state = self.state.lock().await;
        if let Some(mut backend) = state.backend.take() {
            backend.release();
            self.sink.event("release", "model released");
        }
        state.model_path = None;
    }

    /// Whether a model is currently loaded.
    pub async fn is_loaded(&self) -> bool {
        self.state.lock().await.backend.is_some()
    }

    /// Path of the loaded model, if it was loaded from disk.
    pub async fn model_path(&self) -> Option<PathBuf> {
        self.state.lock().await.model_path.clone()
    }
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::backend::RawOutput;
    use crate::preprocessing::{ChannelOrder, ImageTensor};

    struct StubBackend {
        released: Arc<AtomicBool>,
    }

    impl InferenceBackend for StubBackend {
        fn run(&mut self, _tensor: &ImageTensor) -> Result<RawOutput> {
            Ok(RawOutput::Flat(vec![1.0]))
        }

        fn input_size(&self) -> usize {
            224
        }

        fn class_count(&self) -> Option<usize> {
            Some(1)
        }

        fn channel_order(&self) -> ChannelOrder {
            ChannelOrder::Chw
        }

        fn name(&self) -> &'static str {
            "Stub"
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    /// Put the engine in the loaded state with a disk path, as if
    /// `load_model` had succeeded for that path.
    async fn install_loaded(engine: &InferenceEngine, path: &str) -> Arc<AtomicBool> {
        let released = Arc::new(AtomicBool::new(false));
        let mut state = engine.state.lock().await;
        state.backend = Some(Box::new(StubBackend {
            released: Arc::clone(&released),
        }));
        state.model_path = Some(PathBuf::from(path));
        released
    }

    #[tokio::test]
    async fn test_reload_same_path_is_noop() {
        let engine = InferenceEngine::new(InferenceConfig::default());
        let released = install_loaded(&engine, "/models/cane.onnx").await;

        // The path does not exist on disk, so anything other than the
        // early no-op return would fail; the handle must survive as-is.
        engine.load_model("/models/cane.onnx").await.unwrap();
        assert!(!released.load(Ordering::SeqCst));
        assert!(engine.is_loaded().await);
        assert_eq!(
            engine.model_path().await,
            Some(PathBuf::from("/models/cane.onnx"))
        );
    }

    #[tokio::test]
    async fn test_failed_reload_releases_old_model() {
        let engine = InferenceEngine::new(InferenceConfig::default());
        let released = install_loaded(&engine, "/models/cane.onnx").await;

        // A read failure on a different path must not leave the previous
        // model installed.
        let result = engine.load_model("/nonexistent/other.onnx").await;
        assert!(matches!(result, Err(InferenceError::Io(_))));
        assert!(released.load(Ordering::SeqCst));
        assert!(!engine.is_loaded().await);
        assert_eq!(engine.model_path().await, None);
    }

    #[tokio::test]
    async fn test_new_engine_is_unloaded() {
        let engine = InferenceEngine::new(InferenceConfig::default());
        assert!(!engine.is_loaded().await);
        assert_eq!(engine.model_path().await, None);
    }

    #[tokio::test]
    async fn test_detect_without_model_fails() {
        let engine = InferenceEngine::new(InferenceConfig::default());
        let frame = FrameBuffer::from(image::DynamicImage::new_rgb8(32, 32));
        let result = engine.detect(&frame).await;
        assert!(matches!(result, Err(InferenceError::ModelLoadError(_))));
    }

    #[tokio::test]
    async fn test_load_missing_file_fails_with_io() {
        let engine = InferenceEngine::new(InferenceConfig::default());
        let result = engine.load_model("/nonexistent/model.onnx").await;
        assert!(matches!(result, Err(InferenceError::Io(_))));
        assert!(!engine.is_loaded().await);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let engine = InferenceEngine::new(InferenceConfig::default());
        engine.release().await;
        engine.release().await;
        assert!(!engine.is_loaded().await);
    }

    #[tokio::test]
    async fn test_validate_needs_no_model() {
        let engine = InferenceEngine::new(InferenceConfig::default());
        let frame = FrameBuffer::from(image::DynamicImage::new_rgb8(200, 200));
        let report = engine.validate_image(&frame);
        assert!(report.checks_passed <= 4);
    }
}
