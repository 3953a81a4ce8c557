//! img2pdf CLI - Command line tool for combining images into a PDF.

use anyhow::{Context, Result};
use clap::Parser;
use img2pdf_core::util::pdf_output_path;
use img2pdf_core::{
    is_supported, AppConfig, ConversionOrchestrator, ConversionRequest, DecodePolicy, Error,
    InputItem, MemoryStore,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "img2pdf")]
#[command(author, version, about = "Combine images into a PDF, one image per page", long_about = None)]
struct Args {
    /// Input images, in page order
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output PDF file (".pdf" is appended if missing)
    #[arg(short, long, default_value = "output.pdf")]
    output: PathBuf,

    /// Skip images that fail to decode instead of aborting
    #[arg(long, env = "IMG2PDF_SKIP_INVALID")]
    skip_invalid: bool,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Drop repeated paths (first occurrence wins) and files without a
/// supported image extension.
fn collect_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut selected: Vec<PathBuf> = Vec::with_capacity(inputs.len());

    for input in inputs {
        if selected.contains(input) {
            info!("Ignoring duplicate input: {}", input.display());
            continue;
        }
        if !is_supported(&input.to_string_lossy()) {
            warn!("Skipping unsupported file: {}", input.display());
            continue;
        }
        selected.push(input.clone());
    }

    selected
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    // Template is hardcoded and valid, unwrap is safe
    #[allow(clippy::unwrap_used)]
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .context(format!("Failed to create output directory: {}", parent.display()))?;
    }
    std::fs::write(path, bytes).context(format!("Failed to write output: {}", path.display()))
}

fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load().context("Failed to load config")?
    };

    if args.skip_invalid {
        config.conversion.decode_policy = DecodePolicy::SkipInvalid;
    }

    let inputs = collect_inputs(&args.inputs);
    if inputs.is_empty() {
        return Err(Error::NoValidImages.into());
    }
    info!("Converting {} image(s)", inputs.len());

    let items = inputs
        .iter()
        .map(InputItem::from_path)
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read input images")?;

    let pb = progress_bar(items.len());
    let progress = pb.clone();

    // Files are already local, so staging stays in memory
    let document = ConversionOrchestrator::new(Arc::new(MemoryStore::new()), &config)
        .with_progress(Arc::new(move |done, _total| progress.set_position(done as u64)))
        .convert(ConversionRequest::new(items));

    let document = match document {
        Ok(document) => {
            pb.finish_with_message("Conversion complete");
            document
        }
        Err(e) => {
            pb.abandon();
            return Err(e).context("Failed to convert images");
        }
    };

    for label in &document.skipped {
        warn!("Skipped undecodable image: {}", label);
    }

    let output_path = pdf_output_path(&args.output);
    write_output(&output_path, &document.bytes)?;

    // CLI output is intentional
    #[allow(clippy::print_stdout)]
    {
        println!(
            "PDF with {} page(s) saved to: {}",
            document.page_count,
            output_path.display()
        );
    }

    Ok(())
}
