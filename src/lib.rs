//! # Screenshot Batch
//!
//! Batch website screenshots across many URLs and many viewport sizes, saved
//! under deterministic filenames.
//!
//! Each source is a URL plus a list of size specifiers. A specifier is either
//! a literal `WIDTHxHEIGHT` or a keyword:
//!
//! - `w3counter` on its own expands to the ten most popular screen
//!   resolutions, scraped once per process from w3counter.com
//! - any other keyword (`iphone`, `ipad pro`, ...) is looked up in a device
//!   table and merged with the literal sizes of the same source
//!
//! Every resulting job is captured concurrently. With a destination set the
//! images are written atomically: each one lands in a hidden temp file that
//! is renamed into place when complete, and every unfinished temp file is
//! removed when a capture fails or the process is interrupted.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use screenshot_batch::{ChromeCaptureService, Config, Options, ScreenshotBatch};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let service = Arc::new(ChromeCaptureService::launch(&config).await?);
//!
//!     let mut batch = ScreenshotBatch::from_config(&config, service.clone())?;
//!     batch
//!         .add_source("https://example.com", ["1280x800", "iphone"], Options::default())
//!         .add_source("https://rust-lang.org", ["w3counter"], Options {
//!             crop: Some(true),
//!             ..Default::default()
//!         })
//!         .set_destination("screenshots");
//!
//!     batch.run().await?;
//!     if let Some(stats) = batch.stats() {
//!         println!("{}", stats.summary());
//!     }
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ### Single URL
//! ```bash
//! screenshot-batch capture https://example.com 1024x768 iphone --dest screenshots/
//! ```
//!
//! ### Batch Processing
//! ```bash
//! screenshot-batch batch --input sources.json --dest screenshots/
//! ```
//!
//! `sources.json` holds an array of `{"url": ..., "sizes": [...], "options": {...}}`.
//!
//! ### Configuration
//! ```bash
//! screenshot-batch --config config.json validate
//! ```

/// Configuration and capture options
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Literal size vs keyword classification
pub mod size_spec;

/// Popular resolution and device viewport lookups
pub mod lookup;

/// Process-scoped caches, temp file registry and interrupt handling
pub mod state;

/// Expansion of sources into capture jobs
pub mod planner;

/// Capture service abstraction and the headless Chrome implementation
pub mod capture;

/// Filename templating and sanitization
pub mod filename;

/// Atomic writes of capture streams
pub mod persist;

/// Batch orchestration and run statistics
pub mod batch;

/// Command-line interface implementation
pub mod cli;

#[cfg(test)]
mod tests;

pub use batch::*;
pub use capture::*;
pub use cli::*;
pub use config::*;
pub use error::{BatchError, Result};
pub use filename::*;
pub use lookup::*;
pub use persist::*;
pub use planner::*;
pub use size_spec::*;
pub use state::*;
