//! Batch orchestration
//!
//! [`ScreenshotBatch`] collects sources, plans them into jobs, captures every
//! job concurrently and optionally hands the streams to the
//! [`AtomicPersister`].

use crate::capture::{normalize_url, CaptureEvent, CaptureService, CaptureStream};
use crate::config::{Config, Options};
use crate::error::Result;
use crate::filename::render_filename;
use crate::lookup::{BuiltinViewports, ResolutionLookup, ViewportLookup, W3CounterLookup};
use crate::persist::AtomicPersister;
use crate::planner::{Job, JobPlanner, Source};
use crate::state::ProcessState;
use chrono::{DateTime, Local};
use futures::future::try_join_all;
use futures::StreamExt;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

const WARNING_CHANNEL_CAPACITY: usize = 64;

/// Where the image of a capture currently lives
pub enum CaptureOutput {
    /// Not yet drained. Non-fatal warnings are interleaved with the data.
    Stream(CaptureStream),
    /// Written to this path
    Saved(PathBuf),
}

impl fmt::Debug for CaptureOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureOutput::Stream(_) => f.write_str("Stream(..)"),
            CaptureOutput::Saved(path) => f.debug_tuple("Saved").field(path).finish(),
        }
    }
}

/// Output of one job, labeled with its target filename
#[derive(Debug)]
pub struct CaptureResult {
    pub url: String,
    pub size: String,
    pub filename: String,
    pub output: CaptureOutput,
}

impl CaptureResult {
    pub fn saved_path(&self) -> Option<&Path> {
        match &self.output {
            CaptureOutput::Saved(path) => Some(path),
            CaptureOutput::Stream(_) => None,
        }
    }

    /// Reads the whole image, draining the stream or loading the saved file.
    /// Warnings in the stream are dropped.
    pub async fn into_bytes(self) -> Result<Vec<u8>> {
        match self.output {
            CaptureOutput::Saved(path) => Ok(tokio::fs::read(&path).await?),
            CaptureOutput::Stream(mut stream) => {
                let mut bytes = Vec::new();
                while let Some(event) = stream.next().await {
                    if let CaptureEvent::Data(chunk) = event? {
                        bytes.extend_from_slice(&chunk);
                    }
                }
                Ok(bytes)
            }
        }
    }
}

/// Totals of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub urls: usize,
    pub sizes: usize,
    pub screenshots: usize,
}

impl RunStats {
    pub fn compute(sources: &[Source], jobs: &[Job]) -> Self {
        let urls: HashSet<&str> = sources.iter().map(|source| source.url.as_str()).collect();
        let sizes: HashSet<&str> = jobs.iter().map(|job| job.size.as_str()).collect();
        Self {
            urls: urls.len(),
            sizes: sizes.len(),
            screenshots: jobs.len(),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Generated {} from {} and {}",
            plural(self.screenshots, "screenshot"),
            plural(self.urls, "url"),
            plural(self.sizes, "size")
        )
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Screenshots of many URLs at many sizes
///
/// ```rust,no_run
/// use screenshot_batch::{ChromeCaptureService, Config, Options, ScreenshotBatch};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let service = Arc::new(ChromeCaptureService::launch(&config).await?);
///
///     let mut batch = ScreenshotBatch::from_config(&config, service.clone())?;
///     batch
///         .add_source("example.com", ["1024x768", "iphone"], Options::default())
///         .set_destination("screenshots");
///
///     let results = batch.run().await?;
///     println!("{} ({} files)", batch.stats().unwrap().summary(), results.len());
///     service.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ScreenshotBatch {
    defaults: Options,
    sources: Vec<Source>,
    destination: Option<PathBuf>,
    capture: Arc<dyn CaptureService>,
    planner: JobPlanner,
    state: Arc<ProcessState>,
    warnings: broadcast::Sender<String>,
    stats: Option<RunStats>,
}

impl ScreenshotBatch {
    pub fn new(
        defaults: Options,
        capture: Arc<dyn CaptureService>,
        resolutions: Arc<dyn ResolutionLookup>,
        viewports: Arc<dyn ViewportLookup>,
        state: Arc<ProcessState>,
    ) -> Self {
        let (warnings, _) = broadcast::channel(WARNING_CHANNEL_CAPACITY);
        Self {
            defaults,
            sources: Vec::new(),
            destination: None,
            capture,
            planner: JobPlanner::new(resolutions, viewports, state.clone()),
            state,
            warnings,
            stats: None,
        }
    }

    /// Batch backed by w3counter.com, the built-in device table and the
    /// process-wide state.
    pub fn from_config(config: &Config, capture: Arc<dyn CaptureService>) -> Result<Self> {
        let resolutions = W3CounterLookup::new(config.resolution_source.clone())?;
        Ok(Self::new(
            config.defaults.clone(),
            capture,
            Arc::new(resolutions),
            Arc::new(BuiltinViewports),
            ProcessState::global(),
        ))
    }

    pub fn add_source<I, S>(&mut self, url: impl Into<String>, sizes: I, options: Options) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources.push(Source {
            url: url.into(),
            sizes: sizes.into_iter().map(Into::into).collect(),
            options,
        });
        self
    }

    /// Sources in the order they were added.
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn set_destination(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.destination = Some(dir.into());
        self
    }

    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    /// Warnings reported by captures while they are saved.
    pub fn subscribe_warnings(&self) -> broadcast::Receiver<String> {
        self.warnings.subscribe()
    }

    /// Totals of the last successful run.
    pub fn stats(&self) -> Option<&RunStats> {
        self.stats.as_ref()
    }

    /// Plans, captures and, with a destination set, saves every source.
    ///
    /// Nothing is captured unless every source plans successfully. Any
    /// failure fails the whole run and leaves [`stats`](Self::stats) unset.
    pub async fn run(&mut self) -> Result<Vec<CaptureResult>> {
        self.stats = None;
        let jobs = self.planner.plan(&self.sources, &self.defaults).await?;
        info!(
            "Planned {} screenshots for {} sources",
            jobs.len(),
            self.sources.len()
        );

        let captured_at = Local::now();
        let results = try_join_all(jobs.iter().map(|job| self.capture_job(job, captured_at))).await?;
        let stats = RunStats::compute(&self.sources, &jobs);

        let results = match &self.destination {
            Some(dir) => {
                let persister = AtomicPersister::new(self.state.clone(), self.warnings.clone());
                persister.save(dir, results).await?
            }
            None => results,
        };

        self.stats = Some(stats);
        Ok(results)
    }

    async fn capture_job(&self, job: &Job, captured_at: DateTime<Local>) -> Result<CaptureResult> {
        let filename = render_filename(&job.url, &job.size, &job.options, captured_at);
        debug!("Capturing {} at {} as {}", job.url, job.size, filename);

        let stream = self
            .capture
            .capture(&normalize_url(&job.url), &job.size, &job.options)
            .await?;

        Ok(CaptureResult {
            url: job.url.clone(),
            size: job.size.clone(),
            filename,
            output: CaptureOutput::Stream(stream),
        })
    }
}
