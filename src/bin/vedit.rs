use std::{
    io::Write as _,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;
use vedit::MediaBackend as _;

#[derive(Parser, Debug)]
#[command(name = "vedit", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a composition JSON to MP4 (requires `ffmpeg` and `ffprobe` on PATH).
    Render(RenderArgs),
    /// Print the compiled render plan as JSON without executing it.
    Plan(PlanArgs),
    /// Print what `ffprobe` reports for a media file.
    Probe(ProbeArgs),
    /// Delete every cached transcode.
    ClearCache(ClearCacheArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input composition JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output MP4 path; overrides the composition's own.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Fingerprint cache directory.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Re-transcode every excerpt even when cached.
    #[arg(long)]
    force: bool,

    /// Maximum overlay layers per ffmpeg invocation.
    #[arg(long, default_value_t = vedit::DEFAULT_BATCH_LIMIT)]
    batch_limit: usize,

    /// Seed for randomized cascade placement.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Parallel transcode workers.
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// Input composition JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Fingerprint cache directory used to report cache hits.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Seed for randomized cascade placement.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Media file to inspect.
    file: PathBuf,
}

#[derive(Parser, Debug)]
struct ClearCacheArgs {
    /// Fingerprint cache directory.
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Plan(args) => cmd_plan(args),
        Command::Probe(args) => cmd_probe(args),
        Command::ClearCache(args) => cmd_clear_cache(args),
    }
}

fn read_comp_json(path: &Path) -> anyhow::Result<vedit::Composition> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("open composition '{}'", path.display()))?;
    let comp = vedit::CompositionDef::from_json(&text).context("parse composition JSON")?;
    Ok(comp)
}

fn ffmpeg_backend() -> anyhow::Result<Arc<vedit::FfmpegBackend>> {
    let backend = vedit::FfmpegBackend::new(vedit::FfmpegOpts::default());
    anyhow::ensure!(
        backend.is_available(),
        "ffmpeg and ffprobe must be installed and on PATH"
    );
    Ok(Arc::new(backend))
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut comp = read_comp_json(&args.in_path)?;
    if let Some(out) = args.out {
        comp.output.path = out;
    }

    let opts = vedit::RenderOpts {
        cache_dir: args.cache_dir,
        batch_limit: args.batch_limit,
        force: args.force,
        threads: args.threads,
        seed: args.seed,
    };
    let report = vedit::render(&comp, ffmpeg_backend()?, &opts)?;

    eprintln!(
        "wrote {} ({}x{}, {:.2}s; {} transcoded, {} cached, {} compose steps)",
        report.output.display(),
        report.width,
        report.height,
        report.duration,
        report.transcoded,
        report.cached,
        report.compose_steps,
    );
    Ok(())
}

fn cmd_plan(args: PlanArgs) -> anyhow::Result<()> {
    let comp = read_comp_json(&args.in_path)?;
    let opts = vedit::RenderOpts {
        cache_dir: args.cache_dir,
        seed: args.seed,
        ..vedit::RenderOpts::default()
    };
    let prepared = vedit::plan(&comp, ffmpeg_backend()?, &opts)?;
    print_json(&prepared)
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let report = ffmpeg_backend()?
        .probe(&args.file)
        .with_context(|| format!("probe '{}'", args.file.display()))?;
    print_json(&report)
}

fn cmd_clear_cache(args: ClearCacheArgs) -> anyhow::Result<()> {
    let dir = args
        .cache_dir
        .unwrap_or_else(vedit::FingerprintCache::default_dir);
    let removed = vedit::clear_dir(&dir)
        .with_context(|| format!("clear cache '{}'", dir.display()))?;
    eprintln!("removed {removed} files from {}", dir.display());
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).context("write JSON")?;
    writeln!(stdout).context("write JSON")?;
    Ok(())
}
