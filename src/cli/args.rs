// IntelliPest 🌿 AGPL-3.0 License

use clap::{Args, Parser, Subcommand};

use crate::backend::RuntimeKind;

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Predict Options:
    --model, -m <MODEL>      Path to model file
    --source, -s <SOURCE>    Input image or directory of images
    --conf <CONF>            Confidence threshold [default: 0.7]
    --runtime <RUNTIME>      Runtime (session, interpreter, module) [default: session]
    --input-size <SIZE>      Square model input size (overrides model metadata)
    --threads <THREADS>      Intra-op threads, 0 = runtime decides [default: 0]
    --skip-validation        Skip the advisory crop-image quality checks
    --verbose                Show verbose output

Examples:
    intellipest-inference predict --model sugarcane.onnx --source leaf.jpg
    intellipest-inference predict -m sugarcane.onnx -s photos/ --conf 0.5
    intellipest-inference predict -m sugarcane.pt -s leaf.jpg --runtime module
    intellipest-inference predict -m sugarcane.onnx -s leaf.jpg --input-size 256"#)]
pub struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run pest detection on an image or directory of images
    Predict(PredictArgs),
}

/// Arguments for the predict command.
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Path to model file
    #[arg(short, long)]
    pub model: String,

    /// Input image or directory of images
    #[arg(short, long)]
    pub source: String,

    /// Confidence threshold
    #[arg(long, default_value_t = 0.7)]
    pub conf: f32,

    /// Runtime to load the model into (session, interpreter, module)
    #[arg(long, default_value = "session")]
    pub runtime: RuntimeKind,

    /// Square model input size (overrides model metadata)
    #[arg(long)]
    pub input_size: Option<usize>,

    /// Intra-op threads for the graph-session runtime (0 = runtime decides)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Skip the advisory crop-image quality checks
    #[arg(long, default_value_t = false)]
    pub skip_validation: bool,

    /// Show verbose output
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_predict_args_defaults() {
        let args = Cli::parse_from([
            "app",
            "predict",
            "--model",
            "sugarcane.onnx",
            "--source",
            "leaf.jpg",
        ]);
        match args.command {
            Commands::Predict(predict_args) => {
                assert_eq!(predict_args.model, "sugarcane.onnx");
                assert_eq!(predict_args.source, "leaf.jpg");
                assert!((predict_args.conf - 0.7).abs() < f32::EPSILON);
                assert_eq!(predict_args.runtime, RuntimeKind::GraphSession);
                assert_eq!(predict_args.input_size, None);
                assert!(!predict_args.skip_validation);
                assert!(predict_args.verbose);
            }
        }
    }

    #[test]
    fn test_predict_args_custom() {
        let args = Cli::parse_from([
            "app",
            "predict",
            "--model",
            "custom.pt",
            "--source",
            "photos",
            "--conf",
            "0.5",
            "--runtime",
            "torch",
            "--input-size",
            "256",
            "--verbose",
            "false",
        ]);
        match args.command {
            Commands::Predict(predict_args) => {
                assert_eq!(predict_args.model, "custom.pt");
                assert_eq!(predict_args.source, "photos");
                assert!((predict_args.conf - 0.5).abs() < f32::EPSILON);
                assert_eq!(predict_args.runtime, RuntimeKind::ScriptModule);
                assert_eq!(predict_args.input_size, Some(256));
                assert!(!predict_args.verbose);
            }
        }
    }
}
