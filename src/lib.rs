// IntelliPest 🌿 AGPL-3.0 License

#![allow(clippy::multiple_crate_versions)]

//! # IntelliPest Inference Library
//!
//! On-device sugarcane pest classification in Rust: a safe, small pipeline
//! that takes an arbitrary crop photo, normalizes it into a model tensor,
//! runs it through one of several interchangeable inference runtimes, and
//! returns ranked predictions over the 11-class pest taxonomy, with the
//! top result gated by a confidence threshold.
//!
//! ## Features
//!
//! - **Heterogeneous inputs** - decoded images or raw camera buffers
//!   (RGBA, packed RGB565, grayscale) are all normalized to a canonical
//!   CPU pixel buffer before any pixel math
//! - **Training-faithful preprocessing** - aspect-preserving shorter-side
//!   resize, center crop, and ImageNet mean/std normalization
//! - **Multiple runtimes** - ONNX Runtime sessions by default, plus an
//!   optional graph interpreter (`candle` feature) and TorchScript modules
//!   (`torch` feature) behind one backend trait
//! - **Defensive decoding** - flat buffers, tagged tensors, and nested
//!   arrays are all reconciled against the known class count; softmax is
//!   applied only when the output is not already a probability distribution
//! - **Serialized engine** - one async engine owns one loaded model at a
//!   time; loads, detections, and releases never race
//!
//! ## Quick Start
//!
//! ```no_run
//! use intellipest_inference::{InferenceEngine, InferenceConfig, FrameBuffer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = InferenceEngine::new(InferenceConfig::new().with_confidence(0.7));
//!     engine.load_model("student_model.onnx").await?;
//!
//!     let img = image::open("leaf.jpg")?;
//!     let outcome = engine.detect(&FrameBuffer::from(img)).await?;
//!
//!     match &outcome.top_prediction {
//!         Some(top) => println!("{}: {:.1}%", top.label, top.confidence * 100.0),
//!         None => println!("no prediction above threshold"),
//!     }
//!     for p in &outcome.predictions {
//!         println!("  {} {:.4}", p.label, p.confidence);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Classify a single image
//! intellipest-inference predict --model student_model.onnx --source leaf.jpg
//!
//! # Classify every image in a directory, custom threshold
//! intellipest-inference predict -m student_model.onnx -s photos/ --conf 0.5
//!
//! # TorchScript runtime (requires the `torch` build feature)
//! intellipest-inference predict -m student_model.pt -s leaf.jpg --runtime module
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`engine`] | [`InferenceEngine`] orchestrator (load/detect/validate/release) |
//! | [`backend`] | [`InferenceBackend`] trait and per-runtime adapters |
//! | [`normalizer`] | [`FrameBuffer`] → canonical RGB pixel buffer |
//! | [`preprocessing`] | [`ImageTensor`] construction (resize, crop, normalize) |
//! | [`validation`] | Advisory crop-image quality heuristics |
//! | [`decoder`] | Raw output → ranked [`ClassPrediction`] list |
//! | [`results`] | [`DetectionOutcome`] and timing types |
//! | [`labels`] | [`PestClass`] taxonomy and label table |
//! | [`inference`] | [`InferenceConfig`] builder |
//! | [`error`] | Error types ([`InferenceError`], [`Result`]) |
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `candle` | Fixed-graph interpreter runtime (candle-onnx) |
//! | `torch` | TorchScript script-module runtime (libtorch) |

// Modules
pub mod backend;
pub mod cli;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod inference;
pub mod labels;
pub mod normalizer;
pub mod preprocessing;
pub mod results;
pub mod validation;

// Re-export main types for convenience
pub use backend::{InferenceBackend, RawOutput, RuntimeKind};
pub use engine::{DiagnosticSink, InferenceEngine, NullSink};
pub use error::{InferenceError, Result};
pub use inference::InferenceConfig;
pub use labels::PestClass;
pub use normalizer::{FrameBuffer, RawFormat, RawFrame};
pub use preprocessing::{ChannelOrder, ImageTensor, DEFAULT_INPUT_SIZE};
pub use results::{ClassPrediction, DetectionOutcome, Speed};
pub use validation::QualityReport;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "intellipest-inference");
    }
}
