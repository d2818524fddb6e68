// IntelliPest 🌿 AGPL-3.0 License

//! Inference backend abstraction.
//!
//! Every runtime the engine can drive sits behind [`InferenceBackend`]:
//! an ONNX Runtime graph session (always available), a fixed-graph
//! interpreter (`candle` feature), and a TorchScript script module
//! (`torch` feature). The engine never sees runtime-specific types; it
//! hands a tensor in and gets a [`RawOutput`] back.

pub mod session;

#[cfg(feature = "candle")]
pub mod interpreter;

#[cfg(feature = "torch")]
pub mod module;

use std::fmt;
use std::str::FromStr;

use crate::engine::DiagnosticSink;
use crate::error::{InferenceError, Result};
use crate::inference::InferenceConfig;
use crate::preprocessing::{ChannelOrder, ImageTensor};

/// Bounded retry count for backend initialization. Partially-built state
/// is fully dropped between attempts.
pub const MAX_INIT_ATTEMPTS: usize = 2;

/// The inference runtimes a model can be loaded into.
///
/// Each variant names what the runtime actually is; selection happens at
/// `load_model` time and never changes the orchestration logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RuntimeKind {
    /// General graph execution via an ONNX Runtime session.
    #[default]
    GraphSession,
    /// Mobile-style fixed-graph interpreter over the ONNX proto.
    Interpreter,
    /// TorchScript scripted-program execution.
    ScriptModule,
}

impl RuntimeKind {
    /// Short identifier used on the CLI and in config.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GraphSession => "session",
            Self::Interpreter => "interpreter",
            Self::ScriptModule => "module",
        }
    }

    /// Human-readable runtime name.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::GraphSession => "ONNX Runtime",
            Self::Interpreter => "Graph Interpreter",
            Self::ScriptModule => "TorchScript",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RuntimeKind {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "session" | "onnx" | "ort" => Ok(Self::GraphSession),
            "interpreter" | "candle" => Ok(Self::Interpreter),
            "module" | "torchscript" | "torch" => Ok(Self::ScriptModule),
            _ => Err(InferenceError::ConfigError(format!(
                "unknown runtime '{s}', expected one of: session, interpreter, module"
            ))),
        }
    }
}

/// Backend-native forward-pass output.
///
/// Runtimes report results in different shapes; the decoder flattens this
/// closed set and treats anything it cannot recognize as a decode failure.
#[derive(Debug, Clone)]
pub enum RawOutput {
    /// A flat score buffer with no shape information.
    Flat(Vec<f32>),
    /// A buffer tagged with its tensor shape.
    Shaped {
        /// Flat tensor values in row-major order.
        data: Vec<f32>,
        /// Dimensions, outermost first.
        shape: Vec<usize>,
    },
    /// Row-nested output (e.g. one row per batch element).
    Nested(Vec<Vec<f32>>),
}

impl RawOutput {
    /// Element count as reported by the producing runtime.
    #[must_use]
    pub fn reported_len(&self) -> usize {
        match self {
            Self::Flat(data) => data.len(),
            Self::Shaped { data, .. } => data.len(),
            Self::Nested(rows) => rows.iter().map(Vec::len).sum(),
        }
    }
}

/// A loaded model execution context.
///
/// One live backend per engine at a time. `run` must not retain or mutate
/// the input tensor; `release` is idempotent and safe to call at any time.
pub trait InferenceBackend: Send {
    /// Execute one forward pass.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::InferenceError`] if the native runtime
    /// rejects the input or the backend was already released.
    fn run(&mut self, tensor: &ImageTensor) -> Result<RawOutput>;

    /// Square input size this model expects, detected from model metadata
    /// where the runtime declares it.
    fn input_size(&self) -> usize;

    /// Class count declared by the model's output shape, if detectable.
    fn class_count(&self) -> Option<usize>;

    /// Tensor layout this runtime consumes.
    fn channel_order(&self) -> ChannelOrder;

    /// Short runtime name for outcome reporting.
    fn name(&self) -> &'static str;

    /// Free all native execution resources. Idempotent.
    fn release(&mut self);
}

/// Construct a backend for `kind` from model bytes, with bounded retry.
///
/// Transient initialization failures are retried up to
/// [`MAX_INIT_ATTEMPTS`] times; each failed attempt drops its partial
/// state before the next one starts, so a handle is never half-built.
/// A runtime compiled out of this build fails immediately.
///
/// # Errors
///
/// Returns the last [`InferenceError::ModelLoadError`] once all attempts
/// are exhausted, or [`InferenceError::FeatureNotEnabled`] for a runtime
/// this build does not include.
pub fn load_backend(
    kind: RuntimeKind,
    bytes: &[u8],
    config: &InferenceConfig,
    sink: &dyn DiagnosticSink,
) -> Result<Box<dyn InferenceBackend>> {
    let mut last_err = None;

    for attempt in 1..=MAX_INIT_ATTEMPTS {
        match build_backend(kind, bytes, config) {
            Ok(backend) => {
                sink.event(
                    "backend_init",
                    &format!("{} initialized on attempt {attempt}", kind.display_name()),
                );
                return Ok(backend);
            }
            Err(err @ InferenceError::FeatureNotEnabled(_)) => return Err(err),
            Err(err) => {
                sink.event(
                    "backend_init_retry",
                    &format!("attempt {attempt} failed: {err}"),
                );
                last_err = Some(err);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        InferenceError::ModelLoadError("backend initialization failed".to_string())
    }))
}

/// Single initialization attempt, dispatched on runtime kind.
fn build_backend(
    kind: RuntimeKind,
    bytes: &[u8],
    config: &InferenceConfig,
) -> Result<Box<dyn InferenceBackend>> {
    match kind {
        RuntimeKind::GraphSession => Ok(Box::new(session::SessionBackend::initialize(
            bytes, config,
        )?)),
        RuntimeKind::Interpreter => {
            #[cfg(feature = "candle")]
            {
                Ok(Box::new(interpreter::InterpreterBackend::initialize(
                    bytes, config,
                )?))
            }
            #[cfg(not(feature = "candle"))]
            {
                let _ = (bytes, config);
                Err(InferenceError::FeatureNotEnabled(
                    "interpreter runtime requires the `candle` feature".to_string(),
                ))
            }
        }
        RuntimeKind::ScriptModule => {
            #[cfg(feature = "torch")]
            {
                Ok(Box::new(module::ModuleBackend::initialize(bytes, config)?))
            }
            #[cfg(not(feature = "torch"))]
            {
                let _ = (bytes, config);
                Err(InferenceError::FeatureNotEnabled(
                    "module runtime requires the `torch` feature".to_string(),
                ))
            }
        }
    }
}

/// Detect the square spatial input size from declared tensor dimensions.
///
/// Recognizes channel-first `[N, 3, H, W]` and channel-last `[N, H, W, 3]`
/// layouts. Non-square declarations fall back to the height, matching the
/// defensive behavior callers expect; dynamic (≤ 0) dims yield `None`.
#[must_use]
pub fn detect_square_size(dims: &[i64]) -> Option<usize> {
    if dims.len() < 4 {
        return None;
    }

    let (h, w) = if dims[1] == 3 {
        (dims[2], dims[3])
    } else if dims[3] == 3 {
        (dims[1], dims[2])
    } else {
        (dims[2], dims[3])
    };

    if h > 0 && w > 0 {
        usize::try_from(h).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_kind_parse() {
        assert_eq!(
            "session".parse::<RuntimeKind>().unwrap(),
            RuntimeKind::GraphSession
        );
        assert_eq!(
            "onnx".parse::<RuntimeKind>().unwrap(),
            RuntimeKind::GraphSession
        );
        assert_eq!(
            "interpreter".parse::<RuntimeKind>().unwrap(),
            RuntimeKind::Interpreter
        );
        assert_eq!(
            "torch".parse::<RuntimeKind>().unwrap(),
            RuntimeKind::ScriptModule
        );
        assert!("vulkan".parse::<RuntimeKind>().is_err());
    }

    #[test]
    fn test_detect_square_size() {
        assert_eq!(detect_square_size(&[1, 3, 224, 224]), Some(224));
        assert_eq!(detect_square_size(&[1, 256, 256, 3]), Some(256));
        // Non-square falls back to height.
        assert_eq!(detect_square_size(&[1, 3, 240, 320]), Some(240));
        // Dynamic dims are undetectable.
        assert_eq!(detect_square_size(&[1, 3, -1, -1]), None);
        assert_eq!(detect_square_size(&[1, 11]), None);
    }

    #[test]
    fn test_raw_output_reported_len() {
        assert_eq!(RawOutput::Flat(vec![0.0; 11]).reported_len(), 11);
        assert_eq!(
            RawOutput::Shaped {
                data: vec![0.0; 22],
                shape: vec![2, 11],
            }
            .reported_len(),
            22
        );
        assert_eq!(
            RawOutput::Nested(vec![vec![0.0; 11], vec![0.0; 4]]).reported_len(),
            15
        );
    }
}
