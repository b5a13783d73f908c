use crate::{
    BatchError, ChromeCaptureService, Config, Options, OutputFormat, ScreenshotBatch, Source,
};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "screenshot-batch")]
#[command(about = "Capture website screenshots in many resolutions")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Capture timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Chrome executable path")]
    pub chrome_path: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Screenshot one URL in one or more sizes
    Capture {
        #[arg(help = "URL, host or local file to screenshot")]
        url: String,

        #[arg(required = true, help = "Sizes (1024x768) or keywords (iphone, w3counter)")]
        sizes: Vec<String>,

        #[arg(short, long, default_value = ".", help = "Output directory for screenshots")]
        dest: PathBuf,

        #[command(flatten)]
        options: CaptureArgs,
    },

    /// Screenshot every source listed in a JSON file
    Batch {
        #[arg(short, long, help = "JSON array of {url, sizes, options} objects")]
        input: PathBuf,

        #[arg(short, long, default_value = ".", help = "Output directory for screenshots")]
        dest: PathBuf,

        #[command(flatten)]
        options: CaptureArgs,
    },

    /// Validate configuration
    Validate {
        #[arg(help = "Configuration file to validate")]
        file: PathBuf,
    },
}

/// Capture options shared by the capture and batch commands
#[derive(Args, Debug, Clone, Default)]
pub struct CaptureArgs {
    #[arg(long, help = "Seconds to wait after load before capturing")]
    pub delay: Option<u64>,

    #[arg(long, help = "Capture only the viewport")]
    pub crop: bool,

    #[arg(long, help = "CSS injected into the page")]
    pub css: Option<String>,

    #[arg(long = "cookie", help = "Cookie as name=value (repeatable)")]
    pub cookies: Vec<String>,

    #[arg(long, help = "Filename template, e.g. '{date} - {url}-{size}{crop}'")]
    pub filename: Option<String>,

    #[arg(long, help = "Capture only the element matching this selector")]
    pub selector: Option<String>,

    #[arg(long = "hide", help = "Selector to hide (repeatable)")]
    pub hide: Vec<String>,

    #[arg(long, help = "Basic auth username")]
    pub username: Option<String>,

    #[arg(long, help = "Basic auth password")]
    pub password: Option<String>,

    #[arg(long, help = "Device scale factor")]
    pub scale: Option<f64>,

    #[arg(long, help = "Output format (png, jpg, webp)")]
    pub format: Option<String>,

    #[arg(long, help = "Custom user agent")]
    pub user_agent: Option<String>,

    #[arg(long = "header", help = "Extra request header as 'Name: value' (repeatable)")]
    pub headers: Vec<String>,
}

impl CaptureArgs {
    /// Options with only the flags that were actually given set.
    pub fn to_options(&self) -> crate::Result<Options> {
        let format = self
            .format
            .as_deref()
            .map(str::parse::<OutputFormat>)
            .transpose()?;

        let mut headers = BTreeMap::new();
        for raw in &self.headers {
            let (name, value) = raw.split_once(':').ok_or_else(|| {
                BatchError::Configuration(format!("header '{raw}' must look like 'Name: value'"))
            })?;
            headers.insert(name.trim().to_string(), value.trim().to_string());
        }

        let options = Options {
            delay: self.delay,
            crop: self.crop.then_some(true),
            css: self.css.clone(),
            cookies: non_empty(&self.cookies),
            filename: self.filename.clone(),
            selector: self.selector.clone(),
            hide: non_empty(&self.hide),
            username: self.username.clone(),
            password: self.password.clone(),
            scale: self.scale,
            format,
            user_agent: self.user_agent.clone(),
            headers,
            ..Default::default()
        };
        options.validate()?;
        Ok(options)
    }
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.to_vec())
    }
}

pub struct CliRunner {
    pub config: Config,
}

impl CliRunner {
    pub fn new(mut config: Config, args: &Cli) -> Self {
        // Override config with CLI args
        if let Some(timeout) = args.timeout {
            config.capture_timeout = Duration::from_secs(timeout);
        }
        if let Some(chrome_path) = &args.chrome_path {
            config.chrome_path = Some(chrome_path.clone());
        }

        Self { config }
    }

    pub async fn run(&self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Capture {
                url,
                sizes,
                dest,
                options,
            } => {
                let source = Source {
                    url,
                    sizes,
                    options: options.to_options()?,
                };
                self.run_sources(vec![source], &dest).await
            }
            Commands::Batch {
                input,
                dest,
                options,
            } => self.run_batch(&input, &dest, &options).await,
            Commands::Validate { file } => self.validate_config(&file).await,
        }
    }

    pub async fn run_batch(&self, input: &Path, dest: &Path, options: &CaptureArgs) -> anyhow::Result<()> {
        let mut sources = self.read_sources_from_file(input).await?;
        info!("Loaded {} sources from {}", sources.len(), input.display());

        // Flags apply to every source but lose to options in the file
        let flags = options.to_options()?;
        for source in &mut sources {
            source.options = flags.merged_with(&source.options);
        }

        self.run_sources(sources, dest).await
    }

    pub async fn run_sources(&self, sources: Vec<Source>, dest: &Path) -> anyhow::Result<()> {
        let service = Arc::new(ChromeCaptureService::launch(&self.config).await?);

        let mut batch = ScreenshotBatch::from_config(&self.config, service.clone())?;
        for source in sources {
            batch.add_source(source.url, source.sizes, source.options);
        }
        batch.set_destination(dest);

        let mut warnings = batch.subscribe_warnings();
        let reporter = tokio::spawn(async move {
            while let Ok(message) = warnings.recv().await {
                warn!("{}", message);
            }
        });

        let result = batch.run().await;
        service.shutdown().await;
        reporter.abort();

        let results = result?;
        for saved in results.iter().filter_map(|r| r.saved_path()) {
            info!("Saved screenshot: {}", saved.display());
        }
        if let Some(stats) = batch.stats() {
            println!("{}", stats.summary());
        }

        Ok(())
    }

    pub async fn validate_config(&self, config_path: &Path) -> anyhow::Result<()> {
        println!("Validating configuration: {}", config_path.display());

        let config_content = fs::read_to_string(config_path)
            .await
            .with_context(|| format!("could not read {}", config_path.display()))?;
        let config: Config = serde_json::from_str(&config_content)?;
        config.validate()?;

        println!("Configuration is valid:");
        println!("  Capture timeout: {:?}", config.capture_timeout);
        println!("  Resolution source: {}", config.resolution_source);
        println!("  Filename template: {}", config.defaults.filename_template());
        println!("  Output format: {:?}", config.defaults.output_format());
        if let Some(chrome_path) = &config.chrome_path {
            println!("  Chrome: {chrome_path}");
        }

        Ok(())
    }

    pub async fn read_sources_from_file(&self, path: &Path) -> anyhow::Result<Vec<Source>> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("could not read {}", path.display()))?;
        let sources: Vec<Source> = serde_json::from_str(&content)
            .with_context(|| format!("{} is not a list of sources", path.display()))?;
        Ok(sources)
    }
}

pub fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    Ok(())
}
