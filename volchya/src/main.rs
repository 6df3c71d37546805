//! Volchya Staya line-mode host.
//!
//! Reads the dossier and player turns from stdin and prints the narrative
//! to stdout. Logs go to stderr; set `RUST_LOG=volchya_core=debug` to see
//! every dispatch attempt.
//!
//! ```bash
//! GEMINI_API_KEY=... cargo run -p volchya
//! ```

mod headless;

use volchya_core::SessionConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config = SessionConfig::from_env()?;
    tracing::info!(models = ?config.dispatch.models, "starting session");

    headless::run_headless(config).await
}

fn print_help() {
    println!("volchya - narrative role-play in the Volchya Staya");
    println!();
    println!("USAGE:");
    println!("  volchya");
    println!();
    println!("ENVIRONMENT:");
    println!("  GEMINI_API_KEY         API key (falls back to API_KEY)");
    println!("  VOLCHYA_MODELS         Comma-separated candidate models, best first");
    println!("  VOLCHYA_TEMPERATURE    Sampling temperature");
    println!("  VOLCHYA_TIMEOUT_SECS   Per-attempt timeout");
    println!("  VOLCHYA_MAX_RETRIES    Retries on transient failures");
    println!("  RUST_LOG               Log filter (default: warn)");
    println!();
    println!("Type #help once running for the in-session commands.");
}
