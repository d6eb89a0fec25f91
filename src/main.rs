//! pagelift - multi-strategy OCR text recovery for scanned academic documents.
//!
//! A tool for recovering clean, analyzable text from scanned or
//! handwritten academic documents where a single fixed OCR configuration
//! fails unpredictably.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pagelift::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "pagelift=info"
    } else {
        "pagelift=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Run CLI
    cli::run().await
}
