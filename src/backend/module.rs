// IntelliPest 🌿 AGPL-3.0 License

//! TorchScript script-module backend (tch).
//!
//! Loads a scripted program from bytes and runs channel-first forward
//! passes through LibTorch. TorchScript archives do not declare an input
//! spatial size, so this backend honors the config override and otherwise
//! assumes the 224 default. Enabled with the `torch` cargo feature.

use std::io::Cursor;

use tch::{CModule, Tensor};

use crate::backend::{InferenceBackend, RawOutput};
use crate::error::{InferenceError, Result};
use crate::inference::InferenceConfig;
use crate::preprocessing::{ChannelOrder, ImageTensor, DEFAULT_INPUT_SIZE};

/// Script-module execution context.
pub struct ModuleBackend {
    /// Loaded scripted program; `None` after release.
    module: Option<CModule>,
    /// Square input size (config override or the 224 default).
    input_size: usize,
}

impl ModuleBackend {
    /// Load a scripted program from an in-memory archive.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ModelLoadError`] if LibTorch rejects the
    /// archive.
    pub fn initialize(bytes: &[u8], config: &InferenceConfig) -> Result<Self> {
        let module = CModule::load_data(&mut Cursor::new(bytes))
            .map_err(|e| InferenceError::ModelLoadError(format!("Failed to load module: {e}")))?;

        Ok(Self {
            module: Some(module),
            input_size: config.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
        })
    }
}

impl InferenceBackend for ModuleBackend {
    fn run(&mut self, tensor: &ImageTensor) -> Result<RawOutput> {
        let module = self.module.as_ref().ok_or_else(|| {
            InferenceError::InferenceError("module already released".to_string())
        })?;

        let chw = tensor.to_order(ChannelOrder::Chw);
        let s = i64::try_from(chw.size)
            .map_err(|_| InferenceError::InferenceError("input size overflow".to_string()))?;
        let input = Tensor::from_slice(&chw.data).reshape([1, 3, s, s]);

        let output = module
            .forward_ts(&[input])
            .map_err(|e| InferenceError::InferenceError(format!("Inference failed: {e}")))?;

        let flattened = output.flatten(0, -1);
        let flat = Vec::<f32>::try_from(&flattened).map_err(|e| {
            InferenceError::InferenceError(format!("Failed to extract output: {e}"))
        })?;

        Ok(RawOutput::Flat(flat))
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn class_count(&self) -> Option<usize> {
        // TorchScript archives carry no static output shape.
        None
    }

    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Chw
    }

    fn name(&self) -> &'static str {
        "TorchScript"
    }

    fn release(&mut self) {
        self.module = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_rejected() {
        let result = ModuleBackend::initialize(b"not an archive", &InferenceConfig::default());
        assert!(matches!(result, Err(InferenceError::ModelLoadError(_))));
    }
}
