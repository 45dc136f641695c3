//! `flipbook-dl get <ID|URL>`: download a publication into a PDF.

use crate::config::PipelineConfig;
use crate::pipeline::{format_duration, Pipeline, PipelineOutcome};
use crate::progress;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use super::{output, progress_display};

/// Flags of the `get` subcommand. Unset flags keep the configured value.
#[derive(Debug, Args)]
pub struct GetArgs {
    /// Publication ID (e.g. "abcde/fghij") or viewer URL
    pub input: String,

    /// Concurrent image downloads
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Images per download batch
    #[arg(short = 'b', long)]
    pub batch_size: Option<usize>,

    /// Concurrent browser renders (capped at --concurrency)
    #[arg(long)]
    pub capture_concurrency: Option<usize>,

    /// Pages per browser session in interactive capture
    #[arg(long)]
    pub capture_batch_size: Option<usize>,

    /// Directory the PDF is written to
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Directory for downloaded images (default: per-publication temp dir)
    #[arg(long)]
    pub image_out: Option<PathBuf>,

    /// Overwrite an existing PDF
    #[arg(short, long)]
    pub force: bool,

    /// Also capture interactive pages in a headless browser
    #[arg(short, long)]
    pub interactive: bool,

    /// Download at most this many images
    #[arg(long, conflicts_with = "no_image_limit")]
    pub max_images: Option<usize>,

    /// Download every image the manifest lists
    #[arg(long)]
    pub no_image_limit: bool,
}

impl GetArgs {
    /// Overlay the flags on `config`.
    pub fn apply(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(n) = self.concurrency {
            config.concurrency = n;
        }
        if let Some(n) = self.batch_size {
            config.download_batch_size = n;
        }
        if let Some(n) = self.capture_concurrency {
            config.capture_concurrency = n;
        }
        if let Some(n) = self.capture_batch_size {
            config.capture_batch_size = n;
        }
        if let Some(dir) = &self.output {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &self.image_out {
            config.image_output_dir = Some(dir.clone());
        }
        if self.no_image_limit {
            config.max_images = None;
        } else if let Some(n) = self.max_images {
            config.max_images = Some(n);
        }
        config.force |= self.force;
        config.interactive |= self.interactive;
        config
    }
}

/// Run the get command.
pub async fn run(args: GetArgs) -> Result<()> {
    let config = args.apply(PipelineConfig::from_env()?);
    let (tx, rx) = progress::channel();
    let show_bars = !output::is_quiet() && !output::is_json();
    let display = show_bars.then(|| progress_display::spawn(rx));

    let pipeline = Pipeline::new(config)?.with_progress(tx);
    let result = pipeline.run(&args.input).await;
    drop(pipeline);
    if let Some(display) = display {
        let _ = display.await;
    }

    let outcome = result?;

    if output::is_json() {
        output::print_json(&serde_json::to_value(&outcome)?);
        return Ok(());
    }
    if output::is_quiet() {
        return Ok(());
    }

    match outcome {
        PipelineOutcome::Written(summary) => {
            println!(
                "  Wrote {} ({} pages) in {}",
                summary.path.display(),
                summary.pages,
                format_duration(Duration::from_millis(summary.timings.total_ms))
            );
            if output::is_verbose() {
                let t = &summary.timings;
                println!(
                    "  manifest {}  download {}  capture {}  assemble {}",
                    format_duration(Duration::from_millis(t.manifest_ms)),
                    format_duration(Duration::from_millis(t.download_ms)),
                    t.capture_ms
                        .map(|ms| format_duration(Duration::from_millis(ms)))
                        .unwrap_or_else(|| "-".to_string()),
                    format_duration(Duration::from_millis(t.assemble_ms)),
                );
            }
            if !summary.failed_captures.is_empty() {
                println!(
                    "  {} pages kept their plain images (capture failed): {:?}",
                    summary.failed_captures.len(),
                    summary.failed_captures
                );
            }
        }
        PipelineOutcome::Skipped { path, .. } => {
            println!(
                "  {} already exists, use --force to overwrite",
                path.display()
            );
        }
    }

    Ok(())
}
