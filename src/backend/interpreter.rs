// IntelliPest 🌿 AGPL-3.0 License

//! Fixed-graph interpreter backend (candle-onnx).
//!
//! Decodes the ONNX proto once at load time and interprets the graph
//! node-by-node per forward pass. Slower than a compiled session but has
//! no native runtime dependency, which is why mobile deployments favor
//! this style. Enabled with the `candle` cargo feature.

use std::collections::HashMap;

use candle_core::{Device, Tensor};
use candle_onnx::onnx::ModelProto;
use prost::Message;

use crate::backend::{detect_square_size, InferenceBackend, RawOutput};
use crate::error::{InferenceError, Result};
use crate::inference::InferenceConfig;
use crate::preprocessing::{ChannelOrder, ImageTensor, DEFAULT_INPUT_SIZE};

/// Interpreter execution context over a decoded graph proto.
pub struct InterpreterBackend {
    /// Decoded model; `None` after release.
    model: Option<ModelProto>,
    /// Graph input name.
    input_name: String,
    /// Graph output name.
    output_name: String,
    /// Declared square input size.
    input_size: usize,
    /// Class count from the declared output shape, if static.
    class_count: Option<usize>,
}

impl InterpreterBackend {
    /// Decode the model proto and verify the graph is runnable.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ModelLoadError`] if the proto does not
    /// decode or the graph declares no inputs or outputs.
    pub fn initialize(bytes: &[u8], config: &InferenceConfig) -> Result<Self> {
        let model = ModelProto::decode(bytes)
            .map_err(|e| InferenceError::ModelLoadError(format!("Failed to decode model: {e}")))?;

        let graph = model.graph.as_ref().ok_or_else(|| {
            InferenceError::ModelLoadError("Invalid model: no graph".to_string())
        })?;

        let input = graph.input.first().ok_or_else(|| {
            InferenceError::ModelLoadError("Invalid model: no input tensors".to_string())
        })?;
        let output = graph.output.first().ok_or_else(|| {
            InferenceError::ModelLoadError("Invalid model: no output tensors".to_string())
        })?;

        let input_name = input.name.clone();
        let output_name = output.name.clone();

        let declared = declared_dims(input).and_then(|dims| detect_square_size(&dims));
        let input_size = config
            .input_size
            .or(declared)
            .unwrap_or(DEFAULT_INPUT_SIZE);

        let class_count = declared_dims(output)
            .and_then(|dims| dims.last().copied())
            .and_then(|n| if n > 0 { usize::try_from(n).ok() } else { None });

        Ok(Self {
            model: Some(model),
            input_name,
            output_name,
            input_size,
            class_count,
        })
    }
}

/// Read the declared tensor dimensions from a graph value descriptor.
/// Symbolic (named) dimensions come back as -1.
fn declared_dims(value: &candle_onnx::onnx::ValueInfoProto) -> Option<Vec<i64>> {
    use candle_onnx::onnx::tensor_shape_proto::dimension::Value as DimValue;
    use candle_onnx::onnx::type_proto::Value as TypeValue;

    let tensor = match value.r#type.as_ref()?.value.as_ref()? {
        TypeValue::TensorType(t) => t,
        _ => return None,
    };

    let dims = tensor
        .shape
        .as_ref()?
        .dim
        .iter()
        .map(|d| match d.value.as_ref() {
            Some(DimValue::DimValue(v)) => *v,
            _ => -1,
        })
        .collect();

    Some(dims)
}

impl InferenceBackend for InterpreterBackend {
    fn run(&mut self, tensor: &ImageTensor) -> Result<RawOutput> {
        let model = self.model.as_ref().ok_or_else(|| {
            InferenceError::InferenceError("interpreter already released".to_string())
        })?;

        let chw = tensor.to_order(ChannelOrder::Chw);
        let s = chw.size;
        let input = Tensor::from_vec(chw.data, (1, 3, s, s), &Device::Cpu)
            .map_err(|e| InferenceError::InferenceError(format!("Failed to build input: {e}")))?;

        let mut inputs = HashMap::new();
        inputs.insert(self.input_name.clone(), input);

        let mut outputs = candle_onnx::simple_eval(model, inputs)
            .map_err(|e| InferenceError::InferenceError(format!("Inference failed: {e}")))?;

        let output = outputs.remove(&self.output_name).ok_or_else(|| {
            InferenceError::InferenceError(format!("Output '{}' not found", self.output_name))
        })?;

        // Rank-2 outputs keep their batch nesting; anything else flattens.
        if output.dims().len() == 2 {
            let rows = output.to_vec2::<f32>().map_err(|e| {
                InferenceError::InferenceError(format!("Failed to extract output: {e}"))
            })?;
            Ok(RawOutput::Nested(rows))
        } else {
            let flat = output
                .flatten_all()
                .and_then(|t| t.to_vec1::<f32>())
                .map_err(|e| {
                    InferenceError::InferenceError(format!("Failed to extract output: {e}"))
                })?;
            Ok(RawOutput::Flat(flat))
        }
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
        "Graph Interpreter"
    }

    fn release(&mut self) {
        self.model = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_rejected() {
        let result =
            InterpreterBackend::initialize(&[0xFF, 0xFE, 0x01], &InferenceConfig::default());
        assert!(matches!(result, Err(InferenceError::ModelLoadError(_))));
    }
}
