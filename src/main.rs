//! MockWire - CLI entry point.
//!
//! Loads a rule configuration and either validates it or runs a single
//! request through the pipeline as a dry run. Wiring the pipeline into
//! a concrete transport is left to the embedding application; the CLI
//! exists for authoring and debugging rule files.

use anyhow::Result;
use clap::Parser;
use mockwire::{
    InterceptOutcome, InterceptRequest, InterceptionPipeline, Interceptor, MockWireConfig,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "mockwire",
    about = "HTTP interception engine - rule matching and synthetic response generation",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mockwire.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Dry-run method, e.g. GET (requires --path)
    #[arg(short, long)]
    method: Option<String>,

    /// Dry-run request path, e.g. /api/user/123
    #[arg(short, long)]
    path: Option<String>,

    /// Dry-run content type
    #[arg(long)]
    content_type: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let default_config = include_str!("../demos/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockWireConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no rules)");
        MockWireConfig::default()
    };

    if args.validate {
        config.validate()?;
        println!("Configuration is valid ({} rules defined)", config.rules.len());
        return Ok(());
    }

    let Some(path) = args.path else {
        anyhow::bail!("Nothing to do: pass --validate, --print-config, or --path for a dry run");
    };

    let pipeline = InterceptionPipeline::new(config);
    pipeline.install();

    let mut request = InterceptRequest::new(args.method.as_deref().unwrap_or("GET"), path);
    if let Some(content_type) = args.content_type {
        request = request.with_content_type(content_type);
    }

    let cancel = CancellationToken::new();
    match pipeline.intercept(&request, &cancel).await {
        InterceptOutcome::PassThrough => println!("pass-through (no rule applies)"),
        InterceptOutcome::Mocked(response) => {
            println!("HTTP {}", response.status);
            println!("{}", serde_json::to_string_pretty(&response.body)?);
        }
        InterceptOutcome::Failed(failure) => println!("transport failure: {}", failure),
        InterceptOutcome::Aborted => println!("aborted"),
    }

    Ok(())
}
