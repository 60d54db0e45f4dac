//! `fetch` command: download URLs concurrently with per-URL progress bars.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use multifetch::config::parse_size;
use multifetch::{DownloadEvent, DownloadManager, DownloaderConfig, EventReceiver, ResourceKey};
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::CliError;

/// Progress bar resolution.
const BAR_LENGTH: u64 = 1000;

/// Arguments for `multifetch fetch`.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// URLs to download
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Directory to save downloads into (nothing is written if omitted)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Maximum concurrent downloads
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Cache size limit, e.g. 64MB
    #[arg(long, value_parser = parse_size_arg)]
    pub cache_size: Option<u64>,

    /// Per-download timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Extra request header, e.g. "User-Agent: multifetch" (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Decode each download as an image and save it as PNG
    #[arg(long)]
    pub image: bool,
}

impl FetchArgs {
    /// Applies command-line overrides on top of file configuration.
    fn apply(&self, mut config: DownloaderConfig) -> DownloaderConfig {
        if let Some(threads) = self.threads {
            config = config.with_maximum_number_of_threads(threads);
        }
        if let Some(size) = self.cache_size {
            config = config.with_cache_size_limit(size);
        }
        if let Some(secs) = self.timeout {
            config = config.with_connection_timeout(Duration::from_secs(secs));
        }
        for (name, value) in &self.headers {
            config = config.with_header(name.clone(), value.clone());
        }
        config
    }
}

fn parse_size_arg(value: &str) -> Result<u64, String> {
    parse_size(value).ok_or_else(|| format!("invalid size '{}'", value))
}

fn parse_header(value: &str) -> Result<(String, String), String> {
    let (name, val) = value
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name: value', got '{}'", value))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing header name in '{}'", value));
    }
    Ok((name.to_string(), val.trim().to_string()))
}

/// Run the fetch command.
pub fn run(args: FetchArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let config = args.apply(super::load_config(config_path)?);

    if let Some(out) = &args.out {
        std::fs::create_dir_all(out).map_err(|source| CliError::Write {
            path: out.clone(),
            source,
        })?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Config(format!("Failed to start runtime: {}", e)))?;

    runtime.block_on(fetch_all(args, config))
}

/// Outcome of one URL.
enum Outcome {
    Saved(PathBuf, usize),
    Fetched(usize),
    Failed,
}

async fn fetch_all(args: FetchArgs, config: DownloaderConfig) -> Result<(), CliError> {
    let manager = DownloadManager::new(config)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let manager = manager.clone();
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
            manager.clear_queue();
        })
        .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;
    }

    let progress = MultiProgress::new();
    let bars = create_bars(&progress, &args.urls);
    let events = tokio::spawn(track_events(manager.subscribe(), bars.clone()));

    let started = Instant::now();
    let mut tasks = JoinSet::new();
    for (index, url) in args.urls.iter().enumerate() {
        let key = ResourceKey::new(url.as_str());
        let target = args.out.as_ref().map(|dir| dir.join(file_name_for(url, index, args.image)));
        let bar = bars.get(&key).cloned();

        if args.image {
            let handle = manager.image_with_path(key);
            tasks.spawn(async move {
                let outcome = match handle.await {
                    Some(fetched) => save_image(fetched.image, target).await?,
                    None => Outcome::Failed,
                };
                finish_bar(bar.as_ref(), &outcome);
                Ok::<_, CliError>(outcome)
            });
        } else {
            let handle = manager.queue_request(key);
            tasks.spawn(async move {
                let outcome = match handle.await {
                    Some(bytes) => save_bytes(&bytes, target).await?,
                    None => Outcome::Failed,
                };
                finish_bar(bar.as_ref(), &outcome);
                Ok::<_, CliError>(outcome)
            });
        }
    }

    let total = args.urls.len();
    let mut failed = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(Outcome::Failed)) | Err(_) => failed += 1,
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tasks.abort_all();
                return Err(e);
            }
        }
    }
    events.abort();

    if interrupted.load(Ordering::SeqCst) {
        return Err(CliError::Interrupted);
    }

    let status = manager.status();
    debug!(%status, "Fetch finished");
    println!(
        "{} {} of {} in {:.1}s (peak {} concurrent)",
        style("Done:").bold(),
        total - failed,
        total,
        started.elapsed().as_secs_f64(),
        status.peak_active
    );

    if failed > 0 {
        return Err(CliError::Incomplete { failed, total });
    }
    Ok(())
}

fn create_bars(progress: &MultiProgress, urls: &[String]) -> HashMap<ResourceKey, ProgressBar> {
    let style = ProgressStyle::with_template("{prefix:40!} [{bar:30.cyan/blue}] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

    urls.iter()
        .map(|url| {
            let bar = progress.add(ProgressBar::new(BAR_LENGTH));
            bar.set_style(style.clone());
            bar.set_prefix(url.clone());
            (ResourceKey::new(url.as_str()), bar)
        })
        .collect()
}

/// Moves bars as progress and error events arrive.
async fn track_events(
    mut events: EventReceiver,
    bars: HashMap<ResourceKey, ProgressBar>,
) {
    while let Some(event) = events.recv().await {
        match event {
            DownloadEvent::Progress { key, fraction } => {
                if let Some(bar) = bars.get(&key) {
                    bar.set_position((fraction * BAR_LENGTH as f64) as u64);
                }
            }
            DownloadEvent::Error(err) => {
                if let Some(bar) = err.key().and_then(|key| bars.get(key)) {
                    bar.abandon_with_message(style(err.to_string()).red().to_string());
                }
            }
            DownloadEvent::Activity(active) => {
                debug!(active, dropped_progress = events.dropped_progress(), "Network activity");
            }
        }
    }
}

fn finish_bar(bar: Option<&ProgressBar>, outcome: &Outcome) {
    let Some(bar) = bar else {
        return;
    };
    match outcome {
        Outcome::Saved(path, bytes) => {
            bar.finish_with_message(format!("{} bytes -> {}", bytes, path.display()))
        }
        Outcome::Fetched(bytes) => bar.finish_with_message(format!("{} bytes", bytes)),
        Outcome::Failed if !bar.is_finished() => {
            bar.abandon_with_message(style("failed").red().to_string())
        }
        Outcome::Failed => {}
    }
}

async fn save_bytes(bytes: &[u8], target: Option<PathBuf>) -> Result<Outcome, CliError> {
    match target {
        Some(path) => {
            tokio::fs::write(&path, bytes)
                .await
                .map_err(|source| CliError::Write {
                    path: path.clone(),
                    source,
                })?;
            Ok(Outcome::Saved(path, bytes.len()))
        }
        None => Ok(Outcome::Fetched(bytes.len())),
    }
}

async fn save_image(image: image::DynamicImage, target: Option<PathBuf>) -> Result<Outcome, CliError> {
    let size = image.as_bytes().len();
    let Some(path) = target else {
        return Ok(Outcome::Fetched(size));
    };

    let written = path.clone();
    tokio::task::spawn_blocking(move || image.save_with_format(&written, image::ImageFormat::Png))
        .await
        .map_err(|e| CliError::Write {
            path: path.clone(),
            source: std::io::Error::other(e.to_string()),
        })?
        .map_err(|e| CliError::Write {
            path: path.clone(),
            source: std::io::Error::other(e.to_string()),
        })?;

    let bytes = tokio::fs::metadata(&path)
        .await
        .map(|m| m.len() as usize)
        .unwrap_or(size);
    Ok(Outcome::Saved(path, bytes))
}

/// Derives an output file name from the URL's last path segment.
///
/// Falls back to `download-<index>` when the URL has no usable name. Image
/// downloads always get a `.png` extension.
fn file_name_for(url: &str, index: usize, image: bool) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => without_query,
    };
    let segment = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() || "._-".contains(c) { c } else { '_' })
                .collect::<String>()
        })
        .filter(|s| !s.trim_matches('.').is_empty())
        .unwrap_or_else(|| format!("download-{}", index));

    let name = format!("{:03}-{}", index, segment);
    if image && !name.to_ascii_lowercase().ends_with(".png") {
        format!("{}.png", name)
    } else {
        name
    }
}
