use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use clap::Parser;
use gif_pipe::pipe::Pipe;
use tokio::fs::File;
use tokio::io::BufReader;

mod config;

use config::LapseConfig;

/// Turn an ordered list of street-level viewpoints into one animated gif.
///
/// Each input line is one viewpoint, `lat,lng, size, fov, heading, pitch`:
///
///     40.721184,-69.988354, 400, 90, 90, 0
#[derive(Parser, Debug)]
#[command(name = "hyperlapse", version, verbatim_doc_comment)]
struct Cli {
    /// Input file with one viewpoint per line.
    input: PathBuf,

    /// Output gif path.
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Number of concurrent downloaders.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Per-frame delay in centiseconds.
    #[arg(short, long)]
    delay: Option<u16>,

    /// Animation repeat count, 0 loops forever.
    #[arg(long = "loop")]
    loop_count: Option<u16>,

    /// Also keep each fetched still as <seq>.jpg under this directory.
    #[arg(long)]
    save_frames: Option<PathBuf>,

    /// Url template for the imagery service.
    #[arg(long)]
    url_template: Option<String>,

    /// Json file with run defaults, overridden by the flags above.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(err) = run(Cli::parse()).await {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => LapseConfig::load(path)?,
        None => LapseConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(delay) = cli.delay {
        config.delay_cs = delay;
    }
    if let Some(loop_count) = cli.loop_count {
        config.loop_count = loop_count;
    }
    if let Some(url_template) = cli.url_template {
        config.url_template = url_template;
    }
    if let Some(out) = cli.out {
        config.output = out;
    }
    if let Some(dir) = cli.save_frames {
        config.save_frames_dir = Some(dir);
    }

    let file = File::open(&cli.input)
        .await
        .with_context(|| format!("open input '{}'", cli.input.display()))?;
    let input = BufReader::new(file);

    let pipe = Arc::new(Pipe::new(config.into())?);
    let started = Instant::now();

    let runner = pipe.clone();
    let mut run = tokio::spawn(async move { runner.run(input).await });

    let result = loop {
        tokio::select! {
            joined = &mut run => break joined?,
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupt, cancelling the run");
                pipe.cancel();
            },
        }
    };

    let summary = result?;
    log::info!(
        "wrote {} frames to {} in {:.2?}",
        summary.frames,
        summary.output.display(),
        started.elapsed()
    );
    Ok(())
}
