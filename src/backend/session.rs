// IntelliPest 🌿 AGPL-3.0 License

//! ONNX Runtime graph-session backend.
//!
//! The default runtime. Loads the model graph into an `ort` session,
//! detects the declared input size and class count from the graph's
//! tensor descriptors, and runs channel-first float32 forward passes.

use ort::session::Session;
use ort::value::TensorRef;

use crate::backend::{detect_square_size, InferenceBackend, RawOutput};
use crate::error::{InferenceError, Result};
use crate::inference::InferenceConfig;
use crate::preprocessing::{ChannelOrder, ImageTensor, DEFAULT_INPUT_SIZE};

/// Graph-session execution context.
pub struct SessionBackend {
    /// Live session; `None` after release.
    session: Option<Session>,
    /// First input tensor name.
    input_name: String,
    /// First output tensor name.
    output_name: String,
    /// Declared square input size.
    input_size: usize,
    /// Class count from the declared output shape, if static.
    class_count: Option<usize>,
}

impl SessionBackend {
    /// Build a session from model bytes and verify it is usable.
    ///
    /// The post-load self-check requires at least one input and one output
    /// descriptor; the input's declared spatial size is preferred over the
    /// 224 default, and an explicit config override beats both.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ModelLoadError`] if the session cannot be
    /// built or the graph exposes no usable descriptors.
    pub fn initialize(bytes: &[u8], config: &InferenceConfig) -> Result<Self> {
        let session = Session::builder()
            .map_err(|e| {
                InferenceError::ModelLoadError(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| {
                InferenceError::ModelLoadError(format!("Failed to set optimization level: {e}"))
            })?
            .with_intra_threads(config.num_threads)
            .map_err(|e| {
                InferenceError::ModelLoadError(format!("Failed to set intra-thread count: {e}"))
            })?
            .commit_from_memory(bytes)
            .map_err(|e| InferenceError::ModelLoadError(format!("Failed to load model: {e}")))?;

        // Self-check: a model with no inputs or outputs is not runnable.
        let input = session.inputs.first().ok_or_else(|| {
            InferenceError::ModelLoadError("Invalid model: no input tensors".to_string())
        })?;
        let output = session.outputs.first().ok_or_else(|| {
            InferenceError::ModelLoadError("Invalid model: no output tensors".to_string())
        })?;

        let input_name = input.name.clone();
        let output_name = output.name.clone();

        let declared = input
            .input_type
            .tensor_shape()
            .and_then(|dims| detect_square_size(dims));
        let input_size = config
            .input_size
            .or(declared)
            .unwrap_or(DEFAULT_INPUT_SIZE);

        let class_count = output
            .output_type
            .tensor_shape()
            .and_then(|dims| dims.last().copied())
            .and_then(|n| if n > 0 { usize::try_from(n).ok() } else { None });

        Ok(Self {
            session: Some(session),
            input_name,
            output_name,
            input_size,
            class_count,
        })
    }
}

impl InferenceBackend for SessionBackend {
    fn run(&mut self, tensor: &ImageTensor) -> Result<RawOutput> {
        let session = self.session.as_mut().ok_or_else(|| {
            InferenceError::InferenceError("session already released".to_string())
        })?;

        let input = tensor.to_chw_array4();
        let input_contiguous = input.as_standard_layout();
        let input_tensor = TensorRef::from_array_view(&input_contiguous).map_err(|e| {
            InferenceError::InferenceError(format!("Failed to create input tensor: {e}"))
        })?;

        let inputs = ort::inputs![&self.input_name => input_tensor];

        let outputs = session
            .run(inputs)
            .map_err(|e| InferenceError::InferenceError(format!("Inference failed: {e}")))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            InferenceError::InferenceError(format!("Output '{}' not found", self.output_name))
        })?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::InferenceError(format!("Failed to extract output: {e}")))?;

        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let shape_vec: Vec<usize> = shape.iter().map(|&d| d as usize).collect();

        Ok(RawOutput::Shaped {
            data: data.to_vec(),
            shape: shape_vec,
        })
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn class_count(&self) -> Option<usize> {
        self.class_count
    }

    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Chw
    }

    fn name(&self) -> &'static str {
        "ONNX Runtime"
    }

    fn release(&mut self) {
        // Dropping the session frees the native execution context.
        self.session = None;
    }
}

impl std::fmt::Debug for SessionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBackend")
            .field("loaded", &self.session.is_some())
            .field("input_size", &self.input_size)
            .field("class_count", &self.class_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_rejected() {
        let result = SessionBackend::initialize(b"not a model", &InferenceConfig::default());
        assert!(matches!(
            result,
            Err(InferenceError::ModelLoadError(_))
        ));
    }
}
