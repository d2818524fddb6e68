// IntelliPest 🌿 AGPL-3.0 License

use std::path::{Path, PathBuf};
use std::sync::Arc;

use colored::Colorize;

use crate::cli::args::PredictArgs;
use crate::engine::{DiagnosticSink, InferenceEngine};
use crate::error::{InferenceError, Result};
use crate::normalizer::FrameBuffer;
use crate::{info, success, verbose, warn, InferenceConfig, VERSION};

/// File extensions treated as input images.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp", "tif", "tiff"];

/// Diagnostic sink that forwards engine events to verbose console output.
struct ConsoleSink;

impl DiagnosticSink for ConsoleSink {
    fn event(&self, stage: &str, message: &str) {
        verbose!("[{stage}] {message}");
    }
}

/// Run pest detection over the requested source.
///
/// # Errors
///
/// Returns an error if the model cannot be loaded, the source resolves to
/// no images, or a forward pass fails. Images that fail to decode are
/// skipped with a warning rather than aborting the run.
pub async fn run_prediction(args: &PredictArgs) -> Result<()> {
    crate::cli::logging::set_verbose(args.verbose);

    let mut config = InferenceConfig::new()
        .with_confidence(args.conf)
        .with_runtime(args.runtime)
        .with_threads(args.threads);
    if let Some(size) = args.input_size {
        config = config.with_input_size(size);
    }

    verbose!("IntelliPest v{VERSION}");
    let engine = InferenceEngine::with_sink(config, Arc::new(ConsoleSink));
    engine.load_model(&args.model).await?;
    success!(
        "Loaded '{}' into {}",
        args.model,
        args.runtime.display_name()
    );

    let sources = collect_sources(Path::new(&args.source))?;
    if sources.is_empty() {
        return Err(InferenceError::ConfigError(format!(
            "no images found in '{}'",
            args.source
        )));
    }

    let mut detections = 0usize;
    for path in &sources {
        let image = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                warn!("Skipping '{}': {e}", path.display());
                continue;
            }
        };
        let frame = FrameBuffer::from(image);

        if !args.skip_validation {
            let report = engine.validate_image(&frame);
            if !report.is_valid {
                warn!(
                    "'{}' does not look like a crop photo ({}/4 checks passed); detecting anyway",
                    path.display(),
                    report.checks_passed
                );
            }
        }

        let outcome = engine.detect(&frame).await?;
        print_outcome(path, &outcome);
        if outcome.has_detection() {
            detections += 1;
        }
    }

    engine.release().await;
    info!(
        "{} of {} image(s) had a prediction at or above {:.0}% confidence",
        detections,
        sources.len(),
        args.conf * 100.0
    );
    Ok(())
}

/// Print one detection outcome.
fn print_outcome(path: &Path, outcome: &crate::results::DetectionOutcome) {
    match &outcome.top_prediction {
        Some(top) => {
            info!(
                "{}: {} {} ({:.1}ms, {})",
                path.display(),
                top.label.green().bold(),
                format!("{:.1}%", top.confidence * 100.0).bold(),
                outcome.processing_time_ms,
                outcome.backend_used
            );
            for prediction in outcome.top_k(5).iter().skip(1) {
                verbose!(
                    "  {} {:.1}%",
                    prediction.label,
                    prediction.confidence * 100.0
                );
            }
            verbose!("  Speed: {}", outcome.speed);
        }
        None => {
            info!(
                "{}: {} ({:.1}ms, {})",
                path.display(),
                "no prediction above threshold".dimmed(),
                outcome.processing_time_ms,
                outcome.backend_used
            );
        }
    }
}

/// Resolve a source path into an ordered list of image files.
///
/// A directory contributes every file with a recognized image extension,
/// sorted by name; anything else is taken as a single image path.
fn collect_sources(source: &Path) -> Result<Vec<PathBuf>> {
    if !source.is_dir() {
        return Ok(vec![source.to_path_buf()]);
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(source)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_sources_single_file() {
        let paths = collect_sources(Path::new("leaf.jpg")).unwrap();
        assert_eq!(paths, vec![PathBuf::from("leaf.jpg")]);
    }

    #[test]
    fn test_collect_sources_directory_filters_and_sorts() {
        let dir = std::env::temp_dir().join("intellipest_predict_test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("b.jpg"), b"x").unwrap();
        std::fs::write(dir.join("a.PNG"), b"x").unwrap();
        std::fs::write(dir.join("notes.txt"), b"x").unwrap();

        let paths = collect_sources(&dir).unwrap();
        let names: Vec<_> = paths
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.jpg"]);

        std::fs::remove_dir_all(&dir).ok();
    }
}
