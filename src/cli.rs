//! CLI commands implementation.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::config::{CorrectionConfig, ExtractionConfig};
use crate::llm::{CorrectionService, OllamaCorrector};
use crate::pipeline::{CancelHandle, ExtractEvent, ExtractionPipeline};

#[derive(Parser)]
#[command(name = "pagelift")]
#[command(about = "Multi-strategy OCR text recovery for scanned academic documents")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text from a scanned PDF
    Extract {
        /// Document to process
        file: PathBuf,

        /// Rasterization resolution in DPI
        #[arg(long)]
        dpi: Option<u32>,

        /// Number of page workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Evaluate only the raw passthrough strategy
        #[arg(long)]
        no_preprocess: bool,

        /// Run the correction pass on winning page text
        #[arg(long)]
        correct: bool,

        /// Quality score below which a page is flagged unsuccessful
        #[arg(long)]
        min_score: Option<f64>,

        /// Recognition language
        #[arg(long, env = "PAGELIFT_LANG")]
        lang: Option<String>,

        /// Print the full result as JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// Write the JSON result to a file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report availability of external tools and services
    Check,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ExtractionConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ExtractionConfig::default(),
    };

    match cli.command {
        Commands::Extract {
            file,
            dpi,
            workers,
            no_preprocess,
            correct,
            min_score,
            lang,
            json,
            output,
        } => {
            let mut config = config;
            if let Some(dpi) = dpi {
                config.dpi = dpi;
            }
            if let Some(workers) = workers {
                config.parallel_workers = workers;
            }
            if no_preprocess {
                config.enable_preprocessing = false;
            }
            if correct {
                config.enable_correction = true;
            }
            if let Some(min_score) = min_score {
                config.min_usable_score = min_score;
            }
            if let Some(lang) = lang {
                config.language = lang;
            }
            config.validate()?;

            extract_command(config, &file, json, output.as_deref()).await
        }
        Commands::Check => check_command(&config.correction).await,
    }
}

async fn extract_command(
    config: ExtractionConfig,
    file: &std::path::Path,
    json: bool,
    output: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let pipeline = ExtractionPipeline::new(config);
    let (event_tx, event_rx) = mpsc::channel(64);
    let cancel = CancelHandle::new();

    // Ctrl-C cancels the job between pages; in-flight pages finish first.
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ncancelling after in-flight pages complete...");
            ctrl_c_cancel.cancel();
        }
    });

    let progress = tokio::spawn(drive_progress(event_rx, json));

    let result = pipeline.extract(&bytes, event_tx, cancel).await;
    let _ = progress.await;
    let result = result?;

    let serialized = serde_json::to_string_pretty(&result)?;
    if let Some(path) = output {
        tokio::fs::write(path, &serialized)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        println!(
            "  {} Result written to {}",
            style("✓").green(),
            path.display()
        );
    }

    if json {
        if output.is_none() {
            println!("{serialized}");
        }
        return Ok(());
    }

    println!();
    for page in &result.pages {
        let mark = if page.success {
            style("✓").green()
        } else {
            style("✗").red()
        };
        let corrected = if page.was_corrected { " corrected" } else { "" };
        println!(
            "  {} Page {}: score {:.2} via {}{} ({} chars)",
            mark,
            page.page_index + 1,
            page.quality_score,
            page.winning_strategy,
            corrected,
            page.character_count,
        );
    }

    println!();
    println!(
        "  {} pages, success rate {:.0}%, average score {:.2}, {} characters",
        result.page_count,
        result.success_rate * 100.0,
        result.average_quality_score,
        result.total_characters,
    );

    if result.success_rate < 1.0 {
        println!(
            "  {} Some pages scored below the usability threshold; their text is included but may be unreliable.",
            style("!").yellow()
        );
    }

    if output.is_none() {
        println!("\n{}", result.combined_text());
    }

    Ok(())
}

/// Render extraction events as a progress bar. Suppressed in JSON mode so
/// stdout stays machine-readable.
async fn drive_progress(mut events: mpsc::Receiver<ExtractEvent>, quiet: bool) {
    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    bar.set_style(
        ProgressStyle::with_template("  {bar:30} {pos}/{len} pages {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    while let Some(event) = events.recv().await {
        match event {
            ExtractEvent::Started { total_pages } => {
                bar.set_length(total_pages as u64);
            }
            ExtractEvent::PageStarted { .. } => {}
            ExtractEvent::PageCompleted {
                page_index,
                strategy,
                quality_score,
                ..
            } => {
                bar.inc(1);
                bar.set_message(format!(
                    "page {} {:.2} ({strategy})",
                    page_index + 1,
                    quality_score
                ));
            }
            ExtractEvent::Completed { .. } => {
                bar.finish_and_clear();
            }
        }
    }
    bar.finish_and_clear();
}

async fn check_command(correction: &CorrectionConfig) -> anyhow::Result<()> {
    println!("External tools:");
    for tool in ["pdfinfo", "pdftoppm", "tesseract"] {
        let found = which::which(tool).is_ok();
        let mark = if found {
            style("✓").green()
        } else {
            style("✗").red()
        };
        println!("  {mark} {tool}");
    }

    let corrector = OllamaCorrector::new(correction.clone());
    let reachable = corrector.is_available().await;
    let mark = if reachable {
        style("✓").green()
    } else {
        style("✗").red()
    };
    println!(
        "  {mark} correction service at {} (model {})",
        correction.endpoint, correction.model
    );

    if !reachable {
        println!(
            "  {} correction is optional; extraction degrades gracefully without it",
            style("!").yellow()
        );
    }

    Ok(())
}
