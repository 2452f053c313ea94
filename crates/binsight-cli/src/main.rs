use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use binsight_contracts::verify::{needs_verification, verification_catalog};
use binsight_engine::{
    CaptureHints, CaptureInput, DetectError, DetectionSession, DetectionState, DryrunGateway,
    GatewayConfig, HistorySink, HttpHistorySink, NullHistorySink, OpenAiCompatGateway,
    SessionConfig, StartOutcome, VisionGateway,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "binsight", version, about = "Waste classification scanner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify one image file and print the canonical result as JSON.
    Scan(ScanArgs),
    /// Print the manual-verification catalog.
    Catalog,
}

#[derive(Debug, Parser)]
struct ScanArgs {
    /// Path to the captured image.
    image: PathBuf,
    /// Use the offline dry-run gateway instead of the real vision model.
    #[arg(long)]
    dry_run: bool,
    /// Override the vision model id.
    #[arg(long)]
    model: Option<String>,
    /// Approximate item weight, recorded with the history entry.
    #[arg(long)]
    weight: Option<String>,
    /// Approximate item size, recorded with the history entry.
    #[arg(long)]
    size: Option<String>,
    /// Perceptual scanning pause in milliseconds.
    #[arg(long, default_value_t = 400)]
    scan_delay_ms: u64,
    #[arg(long, default_value = "anonymous")]
    user: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Scan(args) => run_scan(args),
        Command::Catalog => {
            print_catalog();
            Ok(())
        }
    }
}

fn run_scan(args: ScanArgs) -> Result<()> {
    let bytes = fs::read(&args.image)
        .with_context(|| format!("failed reading image {}", args.image.display()))?;

    let gateway_config = GatewayConfig::from_env();
    let model = args
        .model
        .clone()
        .unwrap_or_else(|| gateway_config.model.clone());

    let gateway: Arc<dyn VisionGateway> = if args.dry_run {
        Arc::new(DryrunGateway)
    } else {
        Arc::new(OpenAiCompatGateway::new(&gateway_config)?)
    };
    let history: Arc<dyn HistorySink> = match std::env::var("BINSIGHT_HISTORY_URL") {
        Ok(url) if !url.trim().is_empty() => Arc::new(HttpHistorySink::new(url.trim())),
        _ => Arc::new(NullHistorySink),
    };

    let session = DetectionSession::new(
        gateway,
        history,
        SessionConfig {
            scan_delay: Duration::from_millis(args.scan_delay_ms),
            model,
            user_id: args.user.clone(),
        },
    );

    let outcome = session.start(CaptureInput {
        image: Some(bytes),
        hints: CaptureHints {
            weight: args.weight.clone(),
            size: args.size.clone(),
        },
    })?;
    if outcome == StartOutcome::IgnoredNoImage {
        bail!("{}", DetectError::MissingImage.user_message());
    }
    session.wait();

    match session.state() {
        DetectionState::Success(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            if needs_verification(result.confidence) {
                eprintln!("Low confidence. Consider verifying manually (binsight catalog).");
            }
            Ok(())
        }
        DetectionState::Error => bail!("Analysis failed. Please try again."),
        state => bail!("capture ended in unexpected state {state:?}"),
    }
}

fn print_catalog() {
    for (category, items) in verification_catalog() {
        println!("{category}:");
        for item in items {
            println!("  - {item}");
        }
    }
}
