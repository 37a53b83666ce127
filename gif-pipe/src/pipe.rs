//! Download/convert/collect pipeline.
//!
//! ```text
//! input lines ──► FeederTask ──► [request queue] ──► DownloaderTask × N
//!                                                          │ fetch, decode,
//!                                                          │ palette
//!                                                          ▼
//!               final gif ◄── CollectorTask ◄──── [frame queue]
//! ```
//!
//! Both queues are bounded to the downloader count and neither preserves
//! order. Downloads finish in whatever order the network allows; the
//! collector re-keys frames by `seq` and the output is the only place where
//! input order is reconstructed.
//!
//! Every stage failure cancels the shared token and becomes the run's
//! result. There are no retries and no partial gifs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::encoder;
use crate::error::{PipeError, PipeResult};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::frame::{self, Frame, PalettedImage};
use crate::url::{DEFAULT_URL_TEMPLATE, UrlTemplate};
use crate::viewpoint::{Request, ViewpointParser};

/// The request queue end every downloader pulls from.
type RequestRx = Arc<Mutex<mpsc::Receiver<Request>>>;

/// Pipeline parameters. The defaults mirror the classic street-view run:
/// four downloaders, 3cs per frame, loop forever.
#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub workers: usize,
    pub delay_cs: u16,
    pub loop_count: u16,
    pub url_template: String,
    pub output: PathBuf,
    pub save_frames_dir: Option<PathBuf>,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            delay_cs: 3,
            loop_count: 0,
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            output: PathBuf::from("final-hyperlapse.gif"),
            save_frames_dir: None,
        }
    }
}

/// What a finished run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub frames: usize,
    pub output: PathBuf,
}

/// Pipeline: ordered viewpoint list in, one animated gif out.
pub struct Pipe {
    config: PipeConfig,
    template: UrlTemplate,
    fetcher: Arc<dyn Fetcher>,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl Pipe {
    pub fn new(config: PipeConfig) -> PipeResult<Self> {
        Self::with_fetcher(config, Arc::new(HttpFetcher::new()))
    }

    /// Same as [`Pipe::new`] with the transport swapped out. Tests use this
    /// to script the remote service.
    pub fn with_fetcher(config: PipeConfig, fetcher: Arc<dyn Fetcher>) -> PipeResult<Self> {
        if config.workers == 0 {
            return Err(PipeError::config("workers must be >= 1"));
        }
        let template = UrlTemplate::new(&config.url_template)?;
        Ok(Self {
            config,
            template,
            fetcher,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        })
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Check if the pipeline has been started
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }

    /// Check if the pipeline has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Runs the pipeline over `input` until the gif is on disk or a stage
    /// failed. One run per pipe.
    pub async fn run<R>(&self, input: R) -> PipeResult<RunSummary>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        if self.started.swap(true, Ordering::Relaxed) {
            log::warn!("Pipe already started");
            return Err(PipeError::config("pipe already started"));
        }

        if let Some(dir) = &self.config.save_frames_dir {
            tokio::fs::create_dir_all(dir).await?;
        }

        let workers = self.config.workers;
        log::info!("Pipe: start {} downloaders and the collector", workers);

        let (request_tx, request_rx) = mpsc::channel::<Request>(workers);
        let (frame_tx, frame_rx) = mpsc::channel::<Frame>(workers);
        let (expected_tx, expected_rx) = oneshot::channel::<usize>();

        let feeder = tokio::spawn(run_feeder_task(
            input,
            ViewpointParser::new(),
            request_tx,
            self.cancel.clone(),
        ));

        let request_rx: RequestRx = Arc::new(Mutex::new(request_rx));
        let mut downloaders = JoinSet::new();
        for _ in 0..workers {
            downloaders.spawn(run_downloader_task(
                Arc::clone(&request_rx),
                frame_tx.clone(),
                self.template.clone(),
                Arc::clone(&self.fetcher),
                self.config.save_frames_dir.clone(),
                self.cancel.clone(),
            ));
        }

        let collector = tokio::spawn(run_collector_task(
            frame_rx,
            expected_rx,
            self.config.clone(),
            self.cancel.clone(),
        ));

        // The first real failure out of any stage becomes the run's result;
        // `Cancelled` results are just the other stages shutting down.
        let mut failure: Option<PipeError> = None;

        match feeder.await {
            Ok(Ok(count)) => {
                log::debug!("Pipe: input drained, waiting for the downloaders");
                let _ = expected_tx.send(count);
            }
            Ok(Err(err)) => {
                self.cancel.cancel();
                drop(expected_tx);
                record_failure(&mut failure, err);
            }
            Err(err) => {
                self.cancel.cancel();
                drop(expected_tx);
                record_failure(&mut failure, PipeError::Io(std::io::Error::other(err)));
            }
        }

        while let Some(joined) = downloaders.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    record_failure(&mut failure, err);
                }
                Err(err) => {
                    self.cancel.cancel();
                    record_failure(&mut failure, PipeError::Io(std::io::Error::other(err)));
                }
            }
        }

        // Every downloader is done, this last sender closes the frame queue
        log::debug!("Pipe: downloaders done, closing the frame queue");
        drop(frame_tx);

        let collected = match collector.await {
            Ok(result) => result,
            Err(err) => Err(PipeError::Io(std::io::Error::other(err))),
        };

        let result = match (failure, collected) {
            (Some(err), _) => Err(err),
            (None, collected) => collected,
        };

        match &result {
            Ok(summary) => log::info!(
                "Pipe: wrote {} frames to {}",
                summary.frames,
                summary.output.display()
            ),
            Err(err) => log::error!("Pipe: run failed: {err}"),
        }
        result
    }
}

fn record_failure(failure: &mut Option<PipeError>, err: PipeError) {
    if err.is_cancelled() {
        return;
    }
    if failure.is_none() {
        *failure = Some(err);
    } else {
        log::debug!("Pipe: follow-up failure: {err}");
    }
}

/// Reads lines in input order and turns each into a `Request` numbered from
/// 0. A line that is not a viewpoint record kills the run, the count of a
/// fully fed input is the collector's assembly contract.
async fn run_feeder_task<R>(
    input: R,
    parser: ViewpointParser,
    request_tx: mpsc::Sender<Request>,
    cancel: CancellationToken,
) -> PipeResult<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut seq = 0usize;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => return Err(PipeError::Cancelled),
            read = lines.next_line() => match read {
                Ok(line) => line,
                Err(err) => {
                    cancel.cancel();
                    return Err(err.into());
                }
            },
        };
        let Some(line) = line else { break };

        let Some(viewpoint) = parser.parse(&line) else {
            cancel.cancel();
            return Err(PipeError::InputFormat {
                line: seq + 1,
                content: line,
            });
        };

        let request = Request { seq, viewpoint };
        tokio::select! {
            _ = cancel.cancelled() => return Err(PipeError::Cancelled),
            sent = request_tx.send(request) => {
                if sent.is_err() {
                    // every downloader is gone, the run is over
                    return Err(PipeError::Cancelled);
                }
            }
        }
        seq += 1;
    }

    log::info!("FeederTask: parsed {} lines", seq);
    Ok(seq)
}

/// One downloader: pull a request, fetch the still, decode and
/// palette-convert it, push the frame. Stateless; exits when the request
/// queue is closed and drained.
async fn run_downloader_task(
    requests: RequestRx,
    frame_tx: mpsc::Sender<Frame>,
    template: UrlTemplate,
    fetcher: Arc<dyn Fetcher>,
    save_frames_dir: Option<PathBuf>,
    cancel: CancellationToken,
) -> PipeResult<()> {
    loop {
        // The queue lock is held for the dequeue only
        let request = tokio::select! {
            _ = cancel.cancelled() => return Err(PipeError::Cancelled),
            request = async { requests.lock().await.recv().await } => request,
        };
        let Some(request) = request else {
            return Ok(());
        };

        let seq = request.seq;
        let url = template.render(&request.viewpoint);
        log::debug!("DownloaderTask: fetch frame {} from {}", seq, url);

        let bytes = tokio::select! {
            _ = cancel.cancelled() => return Err(PipeError::Cancelled),
            fetched = fetcher.fetch(&url) => match fetched {
                Ok(bytes) => bytes,
                Err(err) => {
                    cancel.cancel();
                    return Err(err);
                }
            },
        };

        if let Some(dir) = &save_frames_dir {
            if let Err(err) = save_still(dir, seq, &bytes).await {
                cancel.cancel();
                return Err(err);
            }
        }

        // Decode and quantization are pure CPU, keep them off the runtime
        let converted = tokio::task::spawn_blocking(move || -> PipeResult<PalettedImage> {
            let still = frame::decode_still(seq, &bytes)?;
            PalettedImage::from_rgb(&still)
        })
        .await;
        let image = match converted {
            Ok(Ok(image)) => image,
            Ok(Err(err)) => {
                cancel.cancel();
                return Err(err);
            }
            Err(err) => {
                cancel.cancel();
                return Err(PipeError::Io(std::io::Error::other(err)));
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(PipeError::Cancelled),
            sent = frame_tx.send(Frame { seq, image }) => {
                if sent.is_err() {
                    // collector is gone, the run is over
                    return Err(PipeError::Cancelled);
                }
            }
        }
    }
}

/// The raw still as the service sent it, kept next to the gif.
async fn save_still(dir: &Path, seq: usize, bytes: &[u8]) -> PipeResult<()> {
    let path = dir.join(format!("{seq}.jpg"));
    tokio::fs::write(&path, bytes).await?;
    Ok(())
}

/// Single owner of assembly: collects frames keyed by `seq` until the frame
/// queue closes, then rebuilds input order and writes the gif exactly once.
/// Arrival order is explicitly not sequence order.
async fn run_collector_task(
    mut frame_rx: mpsc::Receiver<Frame>,
    expected_rx: oneshot::Receiver<usize>,
    config: PipeConfig,
    cancel: CancellationToken,
) -> PipeResult<RunSummary> {
    let mut collected: HashMap<usize, PalettedImage> = HashMap::new();

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return Err(PipeError::Cancelled),
            frame = frame_rx.recv() => frame,
        };
        match frame {
            Some(frame) => {
                log::debug!("CollectorTask: collected frame {}", frame.seq);
                collected.insert(frame.seq, frame.image);
            }
            None => break,
        }
    }

    // A cancelled run never assembles, even when the queues drained cleanly
    if cancel.is_cancelled() {
        return Err(PipeError::Cancelled);
    }

    // The frame queue only closes after the feeder is done, so by now the
    // count was either sent or its sender dropped with the failed feeder.
    let expected = match expected_rx.await {
        Ok(count) => count,
        Err(_) => return Err(PipeError::Cancelled),
    };

    if expected == 0 {
        return Err(PipeError::assembly("no frames to assemble"));
    }

    // Strict input order; any gap is fatal, never a shorter gif
    let mut frames = Vec::with_capacity(expected);
    let mut missing = Vec::new();
    for seq in 0..expected {
        match collected.remove(&seq) {
            Some(image) => frames.push(image),
            None => missing.push(seq),
        }
    }
    if !missing.is_empty() {
        return Err(PipeError::assembly(format!(
            "missing frames {missing:?} of 0..{expected}"
        )));
    }

    let delays = vec![config.delay_cs; frames.len()];

    log::info!("CollectorTask: create outfile {}", config.output.display());
    log::info!("CollectorTask: encode {} frames into the final gif", expected);
    let output = config.output.clone();
    let loop_count = config.loop_count;
    let written = tokio::task::spawn_blocking(move || {
        encoder::write_gif_file(&output, frames, &delays, loop_count)
    })
    .await;
    match written {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return Err(err),
        Err(err) => return Err(PipeError::Io(std::io::Error::other(err))),
    }

    Ok(RunSummary {
        frames: expected,
        output: config.output,
    })
}

impl PipeConfig {
    pub fn builder() -> PipeConfigBuilder {
        PipeConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct PipeConfigBuilder {
    workers: Option<usize>,
    delay_cs: Option<u16>,
    loop_count: Option<u16>,
    url_template: Option<String>,
    output: Option<PathBuf>,
    save_frames_dir: Option<PathBuf>,
}

impl PipeConfigBuilder {
    /// Number of concurrent downloaders
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Per-frame delay in centiseconds
    pub fn delay_cs(mut self, delay_cs: u16) -> Self {
        self.delay_cs = Some(delay_cs);
        self
    }

    /// How often the gif loops, 0 means forever
    pub fn loop_count(mut self, loop_count: u16) -> Self {
        self.loop_count = Some(loop_count);
        self
    }

    /// Request url template, see [`DEFAULT_URL_TEMPLATE`]
    pub fn url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = Some(template.into());
        self
    }

    /// Output gif path
    pub fn output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Also keep every downloaded still as `<seq>.jpg` under this directory
    pub fn save_frames_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_frames_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> PipeConfig {
        let defaults = PipeConfig::default();
        PipeConfig {
            workers: self.workers.unwrap_or(defaults.workers),
            delay_cs: self.delay_cs.unwrap_or(defaults.delay_cs),
            loop_count: self.loop_count.unwrap_or(defaults.loop_count),
            url_template: self.url_template.unwrap_or(defaults.url_template),
            output: self.output.unwrap_or(defaults.output),
            save_frames_dir: self.save_frames_dir,
        }
    }
}

#[cfg(test)]
#[path = "pipe_test.rs"]
mod pipe_test;
