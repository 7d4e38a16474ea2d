mod config;
mod telemetry;

use clap::Parser;
use config::Config;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(clap::Args)]
struct Args {
    /// Path to the YAML config file
    #[arg(long, short, default_value = "config.yaml")]
    config: PathBuf,
}

#[derive(Parser)]
#[command(name = "dashboard", about = "Country reference data dashboard")]
enum CliCommand {
    /// Serve the JSON API
    Serve(Args),
    /// Fetch, normalize and store every country once, then exit
    Refresh(Args),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliCommand::parse();
    let args = match &cli {
        CliCommand::Serve(args) | CliCommand::Refresh(args) => args,
    };

    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load {}: {err}", args.config.display());
            return ExitCode::FAILURE;
        }
    };

    let _sentry = telemetry::init_logging(config.common.logging.as_ref());
    if let Some(metrics) = &config.common.metrics
        && let Err(err) = telemetry::init_metrics(metrics)
    {
        tracing::warn!(error = %err, "Metrics disabled");
    }

    match cli {
        CliCommand::Serve(_) => {
            tracing::info!("Starting country API");
            if let Err(err) = countries::run(config.countries).await {
                tracing::error!(error = %err, "Country API stopped");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        CliCommand::Refresh(_) => match countries::refresh_once(config.countries).await {
            Ok(outcome) => {
                match serde_json::to_string_pretty(&outcome) {
                    Ok(json) => println!("{json}"),
                    Err(err) => tracing::error!(error = %err, "Could not encode outcome"),
                }
                if outcome.success {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "Refresh failed");
                ExitCode::FAILURE
            }
        },
    }
}
