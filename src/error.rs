// IntelliPest 🌿 AGPL-3.0 License

//! Error types for the inference library.

use std::fmt;

/// Result type alias for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;

/// Main error type for the inference library.
#[derive(Debug)]
pub enum InferenceError {
    /// Model bytes unavailable or the runtime rejected the graph.
    /// Terminal per load attempt; `load_backend` retries a bounded number
    /// of times before surfacing this.
    ModelLoadError(String),
    /// The forward pass failed. Not retried; the engine stays loaded.
    InferenceError(String),
    /// Error reading or converting an image.
    ImageError(String),
    /// Invalid configuration provided.
    ConfigError(String),
    /// IO error (file not found, permission denied, etc.).
    IoError(String),
    /// Wrapped `std::io::Error`
    Io(std::io::Error),
    /// The requested runtime is not compiled into this build.
    FeatureNotEnabled(String),
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelLoadError(msg) => write!(f, "Model load error: {msg}"),
            Self::InferenceError(msg) => write!(f, "Inference error: {msg}"),
            Self::ImageError(msg) => write!(f, "Image error: {msg}"),
            Self::ConfigError(msg) => write!(f, "Config error: {msg}"),
            Self::IoError(msg) => write!(f, "IO error: {msg}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
            Self::FeatureNotEnabled(msg) => write!(f, "Feature not enabled: {msg}"),
        }
    }
}

impl std::error::Error for InferenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for InferenceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<image::ImageError> for InferenceError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageError(err.to_string())
    }
}
