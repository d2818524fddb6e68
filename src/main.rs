// IntelliPest 🌿 AGPL-3.0 License

use std::process;

use clap::Parser;

use intellipest_inference::cli::args::{Cli, Commands};
use intellipest_inference::cli::predict;
use intellipest_inference::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Predict(args) => predict::run_prediction(&args).await,
    };

    if let Err(e) = result {
        error!("{e}");
        process::exit(1);
    }
}
