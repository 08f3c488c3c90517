use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use neardup::config::{DEFAULT_COMPONENTS, DEFAULT_INPUT_SIZE, DEFAULT_THRESHOLD, PipelineConfig};
use neardup::embedder::{Embedder, HashEmbedder};
#[cfg(feature = "onnx")]
use neardup::onnx::OnnxEmbedder;
use neardup::pipeline::{DedupReport, Pipeline};

#[derive(Serialize, Debug)]
struct CullRecord {
    timestamp: String,
    retained: String,
    culled: Vec<String>,
}

#[derive(Parser, Debug)]
#[command(name = "neardup", version, about = "CLI for finding near-duplicate images")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Directory to scan
    #[arg(short, long, value_name = "DIR")]
    path: PathBuf,

    /// Cosine-similarity threshold in (-1, 1]
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,

    /// Number of projection components to keep
    #[arg(long, default_value_t = DEFAULT_COMPONENTS)]
    components: usize,

    /// Spatial size images are resized to before embedding
    #[arg(long, default_value_t = DEFAULT_INPUT_SIZE)]
    size: u32,

    /// Path to an ONNX embedding model
    #[cfg(feature = "onnx")]
    #[arg(long, value_name = "FILE")]
    model: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find and list near-duplicate groups
    Scan {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Write the full report as JSON
        #[arg(long, value_name = "FILE")]
        json: Option<PathBuf>,
    },

    /// Move duplicates into `<dir>/duplicates`, keeping each group's anchor
    Cull {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Only show what would be moved
        #[arg(long)]
        dry_run: bool,

        /// Directory to move duplicates into (default: `<dir>/duplicates`)
        #[arg(long, value_name = "DIR")]
        target_dir: Option<PathBuf>,
    },

    /// Copy unique images into a target directory, preserving subpaths
    Unique {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Directory to copy unique images into
        #[arg(long, value_name = "DIR")]
        target_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { pipeline, json } => {
            println!(
                "▶ Scanning for near-duplicates in: {}",
                pipeline.path.display()
            );
            let report = run_pipeline(&pipeline)?;
            print_report(&report);

            if let Some(json_path) = json {
                let rendered = serde_json::to_string_pretty(&report)?;
                fs::write(&json_path, rendered)
                    .with_context(|| format!("Failed to write report to {:?}", json_path))?;
                println!("✅ Wrote report to {}", json_path.display());
            }
        }

        Commands::Cull {
            pipeline,
            dry_run,
            target_dir,
        } => {
            println!("▶ Culling near-duplicates in: {}", pipeline.path.display());
            let report = run_pipeline(&pipeline)?;
            if report.groups.is_empty() {
                println!("No duplicates found.");
                return Ok(());
            }

            let dup_dir = target_dir.unwrap_or_else(|| pipeline.path.join("duplicates"));
            if !dry_run {
                fs::create_dir_all(&dup_dir)
                    .with_context(|| format!("Failed to create directory {:?}", dup_dir))?;
            }

            let manifest_path = pipeline.path.join(".neardup-cull.jsonl");
            let mut manifest = if dry_run {
                None
            } else {
                Some(
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&manifest_path)
                        .with_context(|| format!("Failed to open manifest {:?}", manifest_path))?,
                )
            };

            for (i, group) in report.groups.iter().enumerate() {
                let anchor = group.anchor();
                println!("\n✨ Group {}:", i + 1);
                println!("   🏆 Keeping → {}", anchor.path.display());

                let mut culled = Vec::new();
                for member in &group.members[1..] {
                    culled.push(member.path.to_string_lossy().into_owned());
                    if dry_run {
                        println!(
                            "   📦 [dry-run] MOVE {} ({:.2}%) → {}",
                            member.path.display(),
                            member.similarity,
                            dup_dir.display()
                        );
                    } else {
                        let file_name = member
                            .path
                            .file_name()
                            .with_context(|| format!("Invalid file name {:?}", member.path))?;
                        let dest = dup_dir.join(file_name);
                        fs::rename(&member.path, &dest).with_context(|| {
                            format!("Failed to move {:?} → {:?}", member.path, dest)
                        })?;
                        println!("   📦 Moved {} → {}", member.path.display(), dest.display());
                    }
                }

                if let Some(out) = manifest.as_mut() {
                    let record = CullRecord {
                        timestamp: Utc::now().to_rfc3339(),
                        retained: anchor.path.to_string_lossy().into_owned(),
                        culled,
                    };
                    writeln!(out, "{}", serde_json::to_string(&record)?)?;
                }
            }

            if dry_run {
                println!("\n⚠️  Dry-run only; no files were changed.");
            } else {
                println!("\n✅ Recorded cull manifest in {}", manifest_path.display());
            }
        }

        Commands::Unique {
            pipeline,
            target_dir,
        } => {
            println!(
                "▶ Collecting unique images from: {}",
                pipeline.path.display()
            );
            let report = run_pipeline(&pipeline)?;
            if report.unique.is_empty() {
                println!("No unique images found.");
                return Ok(());
            }

            fs::create_dir_all(&target_dir)
                .with_context(|| format!("Failed to create directory {:?}", target_dir))?;

            for path in &report.unique {
                let relative = path.strip_prefix(&pipeline.path).unwrap_or(path.as_path());
                let dest = target_dir.join(relative);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create directory {:?}", parent))?;
                }
                fs::copy(path, &dest)
                    .with_context(|| format!("Failed to copy {:?} → {:?}", path, dest))?;
                println!("📦 Copied {} → {}", path.display(), dest.display());
            }
            println!("\n✅ Copied {} unique image(s)", report.unique.len());
        }
    }

    Ok(())
}

/// Build the configured embedder, run the pipeline with a progress spinner,
/// and time the whole thing.
fn run_pipeline(args: &PipelineArgs) -> Result<DedupReport> {
    let config = PipelineConfig::default()
        .with_threshold(args.threshold)
        .with_components(args.components)
        .with_input_size(args.size);

    let embedder = build_embedder(args)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Scanning for images…");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let progress_spinner = spinner.clone();
    let pipeline = Pipeline::new(config, embedder.as_ref()).with_progress(move |progress| {
        progress_spinner.set_message(format!(
            "Embedding {}/{}: {}",
            progress.files_processed, progress.total_files, progress.current_file
        ));
    });

    let report = benchmark("embedding and grouping", || pipeline.run(&args.path))
        .with_context(|| format!("Failed to process {:?}", args.path))?;
    spinner.finish_with_message("Scan complete");

    if !report.failures.is_empty() {
        println!("⚠️  Skipped {} unreadable file(s)", report.failures.len());
    }

    Ok(report)
}

fn build_embedder(args: &PipelineArgs) -> Result<Box<dyn Embedder>> {
    #[cfg(feature = "onnx")]
    if let Some(model) = &args.model {
        let embedder = OnnxEmbedder::load(model, args.size)
            .with_context(|| format!("Failed to load model {:?}", model))?;
        return Ok(Box::new(embedder));
    }

    log::warn!("no embedding model configured; the hash embedder only groups byte-identical content");
    Ok(Box::new(HashEmbedder::new(args.size)))
}

fn print_report(report: &DedupReport) {
    if report.groups.is_empty() {
        println!("No duplicates found.");
    } else {
        println!("Found {} duplicate group(s):", report.groups.len());
        for (i, group) in report.groups.iter().enumerate() {
            println!(" Group {}:", i + 1);
            for member in &group.members {
                println!("   ▶ {} ({:.2}%)", member.path.display(), member.similarity);
            }
        }
    }

    if report.unique.is_empty() {
        println!("No unique images.");
    } else {
        println!("{} unique image(s):", report.unique.len());
        for path in &report.unique {
            println!("   ▶ {}", path.display());
        }
    }
}

/// Run `f()`, print how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    println!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
