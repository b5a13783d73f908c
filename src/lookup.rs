//! Reference data lookups used to expand size keywords

use crate::error::{BatchError, Result};
use crate::size_spec::union_sizes;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::debug;

/// How many popular resolutions the keyword expands to.
pub const TOP_RESOLUTION_COUNT: usize = 10;

static RESOLUTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{2,4})\s*[x×]\s*(\d{2,4})\b").expect("resolution regex is hardcoded and valid")
});

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResolutionLookup: Send + Sync {
    /// Most common screen resolutions, most popular first.
    async fn top_resolutions(&self) -> Result<Vec<String>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ViewportLookup: Send + Sync {
    /// Literal sizes for the named devices. Unknown names contribute nothing.
    async fn viewport_sizes(&self, keywords: &[String]) -> Result<Vec<String>>;
}

/// Scrapes the global statistics page of w3counter.com
pub struct W3CounterLookup {
    client: reqwest::Client,
    url: String,
}

impl W3CounterLookup {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ResolutionLookup for W3CounterLookup {
    async fn top_resolutions(&self) -> Result<Vec<String>> {
        debug!("Fetching popular resolutions from {}", self.url);
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let sizes = parse_top_resolutions(&body);
        if sizes.is_empty() {
            return Err(BatchError::LookupFailed(format!(
                "no screen resolutions found at {}",
                self.url
            )));
        }
        Ok(sizes)
    }
}

/// Pulls the first ten distinct resolutions after the "Screen Resolutions"
/// heading, or from the whole page when there is no such heading.
pub fn parse_top_resolutions(html: &str) -> Vec<String> {
    let section = html
        .find("Screen Resolutions")
        .map(|start| &html[start..])
        .unwrap_or(html);

    let mut sizes = Vec::new();
    for caps in RESOLUTION.captures_iter(section) {
        union_sizes(&mut sizes, [format!("{}x{}", &caps[1], &caps[2])]);
        if sizes.len() == TOP_RESOLUTION_COUNT {
            break;
        }
    }
    sizes
}

struct Device {
    name: &'static str,
    family: &'static str,
    size: &'static str,
}

const fn device(name: &'static str, family: &'static str, size: &'static str) -> Device {
    Device { name, family, size }
}

static DEVICES: &[Device] = &[
    device("iphone 4", "iphone", "320x480"),
    device("iphone 4s", "iphone", "320x480"),
    device("iphone 5", "iphone", "320x568"),
    device("iphone 5s", "iphone", "320x568"),
    device("iphone se", "iphone", "320x568"),
    device("iphone 6", "iphone", "375x667"),
    device("iphone 6s", "iphone", "375x667"),
    device("iphone 7", "iphone", "375x667"),
    device("iphone 8", "iphone", "375x667"),
    device("iphone 6 plus", "iphone", "414x736"),
    device("iphone 7 plus", "iphone", "414x736"),
    device("iphone 8 plus", "iphone", "414x736"),
    device("iphone x", "iphone", "375x812"),
    device("iphone xs", "iphone", "375x812"),
    device("iphone xr", "iphone", "414x896"),
    device("iphone 11", "iphone", "414x896"),
    device("iphone 12", "iphone", "390x844"),
    device("iphone 13", "iphone", "390x844"),
    device("iphone 14", "iphone", "390x844"),
    device("iphone 14 pro max", "iphone", "430x932"),
    device("iphone 15", "iphone", "393x852"),
    device("ipad", "ipad", "768x1024"),
    device("ipad mini", "ipad", "768x1024"),
    device("ipad air", "ipad", "820x1180"),
    device("ipad pro", "ipad", "1024x1366"),
    device("galaxy s5", "galaxy", "360x640"),
    device("galaxy s8", "galaxy", "360x740"),
    device("galaxy s20", "galaxy", "360x800"),
    device("galaxy tab s7", "galaxy", "800x1280"),
    device("nexus 4", "nexus", "384x640"),
    device("nexus 5", "nexus", "360x640"),
    device("nexus 7", "nexus", "600x960"),
    device("nexus 10", "nexus", "800x1280"),
    device("pixel 2", "pixel", "411x731"),
    device("pixel 5", "pixel", "393x851"),
    device("pixel 7", "pixel", "412x915"),
    device("macbook air", "macbook", "1440x900"),
    device("macbook pro", "macbook", "1512x982"),
];

/// Viewport sizes from a table of common devices.
///
/// A keyword matches a device name (`"iphone 5s"`) or a whole family
/// (`"iphone"`), case-insensitively.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinViewports;

impl BuiltinViewports {
    pub fn sizes_for(keyword: &str) -> Vec<String> {
        let keyword = keyword.trim().to_lowercase();
        let mut sizes = Vec::new();
        let matching = DEVICES
            .iter()
            .filter(|device| device.name == keyword || device.family == keyword)
            .map(|device| device.size.to_string());
        union_sizes(&mut sizes, matching);
        sizes
    }
}

#[async_trait]
impl ViewportLookup for BuiltinViewports {
    async fn viewport_sizes(&self, keywords: &[String]) -> Result<Vec<String>> {
        let mut sizes = Vec::new();
        for keyword in keywords {
            let found = Self::sizes_for(keyword);
            if found.is_empty() {
                debug!("No viewport known for '{}'", keyword);
            }
            union_sizes(&mut sizes, found);
        }
        Ok(sizes)
    }
}
