// IntelliPest 🌿 AGPL-3.0 License

//! Inference configuration.
//!
//! This module defines the [`InferenceConfig`] struct, which controls the
//! detection pipeline: confidence thresholding, runtime selection, input
//! sizing, and execution options.

use crate::backend::RuntimeKind;

/// Configuration for pest detection inference.
///
/// This struct is used to customize the behavior of the inference engine.
/// It uses a builder pattern for convenient construction.
///
/// # Example
///
/// ```rust
/// use intellipest_inference::{InferenceConfig, RuntimeKind};
///
/// let config = InferenceConfig::new()
///     .with_confidence(0.5)
///     .with_runtime(RuntimeKind::GraphSession)
///     .with_input_size(224);
/// ```
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Confidence threshold for predictions (0.0 to 1.0).
    /// Predictions with confidence scores lower than this value are discarded.
    pub confidence_threshold: f32,
    /// Runtime to load models into.
    pub runtime: RuntimeKind,
    /// Explicit square input size.
    /// If `None`, the size declared by the model is used, falling back to 224.
    pub input_size: Option<usize>,
    /// Number of intra-op threads for the graph-session runtime.
    /// Setting this to `0` lets the runtime choose the optimal number.
    pub num_threads: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            runtime: RuntimeKind::GraphSession,
            input_size: None,
            num_threads: 0, // 0 = let the runtime decide
        }
    }
}

impl InferenceConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the confidence threshold.
    ///
    /// Predictions with a confidence score below this threshold are
    /// filtered out.
    #[must_use]
    pub const fn with_confidence(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Select the runtime to load models into.
    #[must_use]
    pub const fn with_runtime(mut self, runtime: RuntimeKind) -> Self {
        self.runtime = runtime;
        self
    }

    /// Set an explicit square input size, overriding whatever the model
    /// declares.
    #[must_use]
    pub const fn with_input_size(mut self, size: usize) -> Self {
        self.input_size = Some(size);
        self
    }

    /// Set the number of intra-op threads for the graph-session runtime.
    #[must_use]
    pub const fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InferenceConfig::default();
        assert!((config.confidence_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.runtime, RuntimeKind::GraphSession);
        assert_eq!(config.input_size, None);
        assert_eq!(config.num_threads, 0);
    }

    #[test]
    fn test_builder_pattern() {
        let config = InferenceConfig::new()
            .with_confidence(0.5)
            .with_runtime(RuntimeKind::Interpreter)
            .with_input_size(256)
            .with_threads(4);
        assert!((config.confidence_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.runtime, RuntimeKind::Interpreter);
        assert_eq!(config.input_size, Some(256));
        assert_eq!(config.num_threads, 4);
    }
}
