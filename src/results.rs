// IntelliPest 🌿 AGPL-3.0 License

//! Detection result types.

use std::fmt;
use std::time::Duration;

/// One class with its decoded confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassPrediction {
    /// Model output index of the class.
    pub class_index: usize,
    /// Display label for the class.
    pub label: String,
    /// Normalized confidence in [0, 1].
    pub confidence: f32,
}

impl fmt::Display for ClassPrediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.1}%", self.label, self.confidence * 100.0)
    }
}

/// Per-stage timing for one detection, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Speed {
    /// Normalization plus tensor preparation time.
    pub preprocess_ms: f64,
    /// Backend forward-pass time.
    pub inference_ms: f64,
    /// Output decoding and ranking time.
    pub decode_ms: f64,
}

impl Speed {
    /// Total wall time across all stages.
    #[must_use]
    pub fn total_ms(&self) -> f64 {
        self.preprocess_ms + self.inference_ms + self.decode_ms
    }

    pub(crate) fn ms(d: Duration) -> f64 {
        d.as_secs_f64() * 1000.0
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}ms preprocess, {:.1}ms inference, {:.1}ms decode",
            self.preprocess_ms, self.inference_ms, self.decode_ms
        )
    }
}

/// The complete outcome of one detection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionOutcome {
    /// Best-ranked prediction, if it cleared the confidence threshold.
    pub top_prediction: Option<ClassPrediction>,
    /// Every class, ranked by descending confidence. Never filtered by
    /// the threshold, so callers can inspect sub-threshold results.
    pub predictions: Vec<ClassPrediction>,
    /// Display name of the runtime that produced the output.
    pub backend_used: String,
    /// Total wall time for the pass, in milliseconds.
    pub processing_time_ms: f64,
    /// Per-stage timing breakdown.
    pub speed: Speed,
}

impl DetectionOutcome {
    /// Whether the best-ranked prediction cleared the threshold.
    #[must_use]
    pub fn has_detection(&self) -> bool {
        self.top_prediction.is_some()
    }

    /// The `k` highest-confidence predictions.
    #[must_use]
    pub fn top_k(&self, k: usize) -> &[ClassPrediction] {
        &self.predictions[..k.min(self.predictions.len())]
    }
}

impl fmt::Display for DetectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.top_prediction {
            Some(top) => write!(
                f,
                "{top} ({} predictions, {:.1}ms, {})",
                self.predictions.len(),
                self.processing_time_ms,
                self.backend_used
            ),
            None => write!(
                f,
                "no detection ({:.1}ms, {})",
                self.processing_time_ms, self.backend_used
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(index: usize, confidence: f32) -> ClassPrediction {
        ClassPrediction {
            class_index: index,
            label: format!("class_{index}"),
            confidence,
        }
    }

    #[test]
    fn test_speed_total() {
        let speed = Speed {
            preprocess_ms: 4.0,
            inference_ms: 20.0,
            decode_ms: 1.0,
        };
        assert!((speed.total_ms() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_top_k_clamps_to_len() {
        let outcome = DetectionOutcome {
            top_prediction: Some(prediction(0, 0.9)),
            predictions: vec![prediction(0, 0.9), prediction(1, 0.1)],
            backend_used: "ONNX Runtime".to_string(),
            processing_time_ms: 10.0,
            speed: Speed::default(),
        };
        assert_eq!(outcome.top_k(1).len(), 1);
        assert_eq!(outcome.top_k(5).len(), 2);
        assert!(outcome.has_detection());
    }

    #[test]
    fn test_empty_outcome_displays_no_detection() {
        let outcome = DetectionOutcome {
            top_prediction: None,
            predictions: Vec::new(),
            backend_used: "ONNX Runtime".to_string(),
            processing_time_ms: 3.2,
            speed: Speed::default(),
        };
        assert!(!outcome.has_detection());
        assert!(outcome.to_string().contains("no detection"));
    }
}
