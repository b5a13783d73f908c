//! Screenshot capture service
//!
//! The batch engine only depends on the [`CaptureService`] trait: give it a
//! URL, a literal size and options, get back a stream of image bytes and
//! non-fatal warnings. [`ChromeCaptureService`] renders with headless Chrome.

use crate::config::{Config, Options, OutputFormat};
use crate::error::{BatchError, Result};
use crate::size_spec::dimensions;
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info};

/// One item of a capture stream
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// A chunk of the encoded image
    Data(Vec<u8>),
    /// Something went wrong that did not prevent the capture
    Warning(String),
}

pub type CaptureStream = BoxStream<'static, Result<CaptureEvent>>;

#[async_trait]
pub trait CaptureService: Send + Sync {
    /// Starts capturing `url` at `size` (a literal `WIDTHxHEIGHT`).
    ///
    /// Errors returned here mean the capture could not start; errors during
    /// rendering arrive through the stream.
    async fn capture(&self, url: &str, size: &str, options: &Options) -> Result<CaptureStream>;
}

/// Turns user input into something a browser can navigate to.
///
/// Existing filesystem paths become `file://` URLs and scheme-less hosts get
/// `http://`.
pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.contains("://") || trimmed.starts_with("about:") || trimmed.starts_with("data:") {
        return trimmed.to_string();
    }

    let path = Path::new(trimmed);
    if path.exists() {
        if let Ok(absolute) = std::fs::canonicalize(path) {
            if let Ok(file_url) = url::Url::from_file_path(absolute) {
                return file_url.to_string();
            }
        }
    }

    format!("http://{trimmed}")
}

pub fn get_chrome_args() -> Vec<String> {
    vec![
        "--headless".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--hide-scrollbars".to_string(),
        "--ignore-certificate-errors".to_string(),
    ]
}

pub fn create_browser_config(config: &Config) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder().no_sandbox().args(get_chrome_args());

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(BatchError::Configuration)
}

/// Headless Chrome renderer
///
/// One browser is shared by all captures; every capture opens its own page,
/// so captures run concurrently.
///
/// ```rust,no_run
/// use screenshot_batch::{CaptureService, ChromeCaptureService, Config, Options};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = ChromeCaptureService::launch(&Config::default()).await?;
///     let _stream = service
///         .capture("https://example.com", "1024x768", &Options::default())
///         .await?;
///     service.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ChromeCaptureService {
    browser: Arc<Mutex<Browser>>,
    handler: tokio::task::JoinHandle<()>,
    default_timeout: Duration,
}

impl ChromeCaptureService {
    pub async fn launch(config: &Config) -> Result<Self> {
        let browser_config = create_browser_config(config)?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BatchError::Browser(format!("launch failed: {e}")))?;

        // The handler must be polled for the browser connection to make progress
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("Browser handler error: {}", e);
                    break;
                }
            }
            debug!("Browser handler stream ended");
        });

        info!("Headless browser launched");
        Ok(Self {
            browser: Arc::new(Mutex::new(browser)),
            handler,
            default_timeout: config.capture_timeout,
        })
    }

    pub async fn shutdown(&self) {
        info!("Shutting down headless browser...");
        let _ = self.browser.lock().await.close().await;
        self.handler.abort();
    }
}

#[async_trait]
impl CaptureService for ChromeCaptureService {
    async fn capture(&self, url: &str, size: &str, options: &Options) -> Result<CaptureStream> {
        let (width, height) =
            dimensions(size).ok_or_else(|| BatchError::capture(url, size, "not a literal size"))?;

        let (tx, rx) = mpsc::unbounded();
        let browser = self.browser.clone();
        let limit = options.timeout().unwrap_or(self.default_timeout);
        let url = url.to_string();
        let size = size.to_string();
        let options = options.clone();

        tokio::spawn(async move {
            let warn = |message: String| {
                let _ = tx.unbounded_send(Ok(CaptureEvent::Warning(message)));
            };

            let rendered = timeout(
                limit,
                render(&browser, &url, width, height, &options, &warn),
            )
            .await;

            let event = match rendered {
                Ok(Ok(bytes)) => Ok(CaptureEvent::Data(bytes)),
                Ok(Err(e)) => Err(BatchError::capture(&url, &size, e)),
                Err(_) => Err(BatchError::capture(&url, &size, BatchError::Timeout(limit))),
            };
            let _ = tx.unbounded_send(event);
        });

        Ok(rx.boxed())
    }
}

async fn render(
    browser: &Mutex<Browser>,
    url: &str,
    width: u32,
    height: u32,
    options: &Options,
    warn: &(dyn Fn(String) + Send + Sync),
) -> Result<Vec<u8>> {
    let page = browser.lock().await.new_page("about:blank").await?;

    let result = render_page(&page, url, width, height, options, warn).await;

    let _ = page.close().await;
    result
}

async fn render_page(
    page: &Page,
    url: &str,
    width: u32,
    height: u32,
    options: &Options,
    warn: &(dyn Fn(String) + Send + Sync),
) -> Result<Vec<u8>> {
    let metrics = SetDeviceMetricsOverrideParams::builder()
        .width(width)
        .height(height)
        .device_scale_factor(options.scale.unwrap_or(1.0))
        .mobile(false)
        .build()
        .map_err(BatchError::Browser)?;
    page.execute(metrics).await?;

    if let Some(user_agent) = &options.user_agent {
        page.execute(SetUserAgentOverrideParams::new(user_agent.clone()))
            .await?;
    }

    let headers = request_headers(options);
    if !headers.is_empty() {
        let headers = Headers::new(serde_json::to_value(&headers)?);
        page.execute(SetExtraHttpHeadersParams::new(headers)).await?;
    }

    if let Some(cookies) = &options.cookies {
        let mut params = Vec::new();
        for raw in cookies {
            match parse_cookie(raw, url) {
                Some(cookie) => params.push(cookie),
                None => warn(format!("Ignoring malformed cookie '{raw}'")),
            }
        }
        if !params.is_empty() {
            page.set_cookies(params).await?;
        }
    }

    debug!("Navigating to {} at {}x{}", url, width, height);
    page.goto(url).await?;
    page.wait_for_navigation().await?;

    if let Some(delay) = options.delay() {
        sleep(delay).await;
    }

    if let Some(stylesheet) = injected_stylesheet(options) {
        let script = format!(
            "(() => {{ const style = document.createElement('style'); \
             style.textContent = {}; document.head.appendChild(style); }})()",
            serde_json::to_string(&stylesheet)?
        );
        if let Err(e) = page.evaluate(script).await {
            warn(format!("Could not inject CSS: {e}"));
        }
    }

    let png_data = if let Some(selector) = &options.selector {
        page.find_element(selector.as_str())
            .await
            .map_err(|e| BatchError::Browser(format!("selector '{selector}' not found: {e}")))?
            .screenshot(CaptureScreenshotFormat::Png)
            .await?
    } else {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(!options.is_cropped())
            .build();
        page.screenshot(params).await?
    };

    convert_image_format(png_data, options.output_format())
}

/// Extra headers plus basic auth when credentials are set.
fn request_headers(options: &Options) -> BTreeMap<String, String> {
    let mut headers = options.headers.clone();
    if let Some(username) = &options.username {
        let password = options.password.as_deref().unwrap_or("");
        let token = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
        headers.insert("Authorization".to_string(), format!("Basic {token}"));
    }
    headers
}

fn parse_cookie(raw: &str, url: &str) -> Option<CookieParam> {
    let pair = raw.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    CookieParam::builder()
        .name(name)
        .value(value.trim())
        .url(url)
        .build()
        .ok()
}

fn injected_stylesheet(options: &Options) -> Option<String> {
    let mut stylesheet = options.css.clone().unwrap_or_default();

    if let Some(hidden) = &options.hide {
        for selector in hidden {
            stylesheet.push_str(&format!("\n{selector} {{ visibility: hidden !important; }}"));
        }
    }

    if stylesheet.trim().is_empty() {
        None
    } else {
        Some(stylesheet)
    }
}

fn convert_image_format(png_data: Vec<u8>, format: OutputFormat) -> Result<Vec<u8>> {
    let target = match format {
        OutputFormat::Png => return Ok(png_data),
        OutputFormat::Jpeg => image::ImageFormat::Jpeg,
        OutputFormat::Webp => image::ImageFormat::WebP,
    };

    let img = image::load_from_memory(&png_data)
        .map_err(|e| BatchError::Browser(format!("could not decode screenshot: {e}")))?;
    // JPEG has no alpha channel
    let img = image::DynamicImage::ImageRgb8(img.to_rgb8());

    let mut encoded = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut encoded), target)
        .map_err(|e| BatchError::Browser(format!("could not encode {format:?}: {e}")))?;

    Ok(encoded)
}
