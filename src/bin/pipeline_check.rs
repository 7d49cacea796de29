//! CLI tool for validating a pipeline configuration
//!
//! Usage:
//!   cargo run --features cli --bin pipeline-check -- -c config/pipeline.yaml
//!   LEAD_PIPELINE_CONFIG=config/pipeline.yaml cargo run --features cli --bin pipeline-check
//!   cargo run --features cli --bin pipeline-check -- --format json

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lead_pipeline::config::CONFIG_ENV_VAR;
use lead_pipeline::PipelineConfig;

#[derive(Parser)]
#[command(name = "pipeline-check")]
#[command(about = "Validate a lead pipeline configuration and print its stages")]
struct Args {
    /// Path to the pipeline YAML file
    #[arg(short = 'c', long, env = CONFIG_ENV_VAR)]
    config: PathBuf,

    /// Output format (text, json)
    #[arg(short = 'f', long, default_value = "text")]
    format: String,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lead_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = match PipelineConfig::load_from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(path = %args.config.display(), error = %e, "invalid pipeline configuration");
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(path = %args.config.display(), stages = config.stages.len(), "configuration loaded");

    let pipeline = config.pipeline();
    match args.format.as_str() {
        "json" => match serde_json::to_string_pretty(pipeline.stages()) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        _ => {
            println!("Pipeline ({} stages)", pipeline.stages().len());
            for stage in pipeline.stages() {
                println!(
                    "  {:>3}  {:<24} {} mandatory",
                    stage.order_index,
                    stage.id,
                    stage.mandatory_activities.len()
                );
                for template in &stage.mandatory_activities {
                    println!("         - [{}] {}", template.activity_type, template.description);
                }
            }
            println!();
            println!("gate policy:       {:?}", config.engine.gate_policy);
            println!("generation policy: {:?}", config.engine.generation_policy);
            println!("thread resolution: {:?}", config.threads.resolution);
        }
    }

    ExitCode::SUCCESS
}
