//! Expansion of sources into concrete capture jobs

use crate::config::Options;
use crate::error::{BatchError, Result};
use crate::lookup::{ResolutionLookup, ViewportLookup};
use crate::size_spec::{classify, union_sizes};
use crate::state::ProcessState;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One URL with its size specifiers and option overrides
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Source {
    pub url: String,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub options: Options,
}

/// A single screenshot to take
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub url: String,
    /// Literal `WIDTHxHEIGHT`
    pub size: String,
    /// Run defaults merged with the source's options
    pub options: Options,
}

pub struct JobPlanner {
    resolutions: Arc<dyn ResolutionLookup>,
    viewports: Arc<dyn ViewportLookup>,
    state: Arc<ProcessState>,
}

impl JobPlanner {
    pub fn new(
        resolutions: Arc<dyn ResolutionLookup>,
        viewports: Arc<dyn ViewportLookup>,
        state: Arc<ProcessState>,
    ) -> Self {
        Self {
            resolutions,
            viewports,
            state,
        }
    }

    /// Plans every source concurrently. The first failing source fails the
    /// whole plan.
    pub async fn plan(&self, sources: &[Source], defaults: &Options) -> Result<Vec<Job>> {
        let planned = try_join_all(sources.iter().map(|source| self.plan_source(source, defaults))).await?;
        Ok(planned.into_iter().flatten().collect())
    }

    pub async fn plan_source(&self, source: &Source, defaults: &Options) -> Result<Vec<Job>> {
        if source.url.trim().is_empty() {
            return Err(BatchError::InvalidSource("URL required".to_string()));
        }

        let options = defaults.merged_with(&source.options);
        let classified = classify(&source.sizes);

        if classified.wants_popular_resolutions() {
            return self.expand_resolutions(&source.url, &options).await;
        }

        if !classified.keywords.is_empty() {
            return self
                .expand_viewports(&source.url, classified.literal_sizes, &classified.keywords, &options)
                .await;
        }

        Ok(jobs_for(&source.url, classified.literal_sizes, &options))
    }

    /// One job per popular resolution.
    pub async fn expand_resolutions(&self, url: &str, options: &Options) -> Result<Vec<Job>> {
        let lookup = Arc::clone(&self.resolutions);
        let fetched = self
            .state
            .resolutions
            .get_or_fetch((), || async move { lookup.top_resolutions().await })
            .await?;

        let mut sizes = Vec::new();
        union_sizes(&mut sizes, fetched);
        debug!("Expanded popular resolutions for {} into {} sizes", url, sizes.len());
        Ok(jobs_for(url, sizes, options))
    }

    /// One job per distinct size among `literal_sizes` and the sizes the
    /// keywords resolve to.
    pub async fn expand_viewports(
        &self,
        url: &str,
        literal_sizes: Vec<String>,
        keywords: &[String],
        options: &Options,
    ) -> Result<Vec<Job>> {
        let lookup = Arc::clone(&self.viewports);
        let key = keywords.to_vec();
        let fetched = self
            .state
            .viewports
            .get_or_fetch(key.clone(), || async move { lookup.viewport_sizes(&key).await })
            .await?;

        let mut sizes = literal_sizes;
        union_sizes(&mut sizes, fetched);
        debug!("Expanded {:?} for {} into {} sizes", keywords, url, sizes.len());
        Ok(jobs_for(url, sizes, options))
    }
}

fn jobs_for(url: &str, sizes: Vec<String>, options: &Options) -> Vec<Job> {
    sizes
        .into_iter()
        .map(|size| Job {
            url: url.to_string(),
            size,
            options: options.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{BuiltinViewports, MockResolutionLookup, MockViewportLookup};

    fn source(url: &str, sizes: &[&str]) -> Source {
        Source {
            url: url.to_string(),
            sizes: sizes.iter().map(|s| s.to_string()).collect(),
            options: Options::default(),
        }
    }

    fn sizes_of(jobs: &[Job]) -> Vec<&str> {
        jobs.iter().map(|job| job.size.as_str()).collect()
    }

    fn unused_resolutions() -> Arc<dyn ResolutionLookup> {
        let mut mock = MockResolutionLookup::new();
        mock.expect_top_resolutions().never();
        Arc::new(mock)
    }

    fn planner(
        resolutions: Arc<dyn ResolutionLookup>,
        viewports: Arc<dyn ViewportLookup>,
    ) -> JobPlanner {
        JobPlanner::new(resolutions, viewports, Arc::new(ProcessState::new()))
    }

    #[tokio::test]
    async fn test_literal_sizes_only() {
        let planner = planner(unused_resolutions(), Arc::new(BuiltinViewports));
        let jobs = planner
            .plan_source(&source("example.com", &["1024x768", "800x600", "1024x768"]), &Options::default())
            .await
            .unwrap();
        assert_eq!(sizes_of(&jobs), vec!["1024x768", "800x600"]);
    }

    #[tokio::test]
    async fn test_empty_url_is_invalid() {
        let planner = planner(unused_resolutions(), Arc::new(BuiltinViewports));
        let err = planner
            .plan_source(&source("  ", &["1024x768"]), &Options::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidSource(_)));
    }

    #[tokio::test]
    async fn test_literals_merge_with_viewport_sizes() {
        let mut viewports = MockViewportLookup::new();
        viewports
            .expect_viewport_sizes()
            .withf(|keywords: &[String]| keywords == ["w3counter".to_string()])
            .times(1)
            .returning(|_| Ok(vec!["1024x768".to_string(), "375x667".to_string()]));
        let planner = planner(unused_resolutions(), Arc::new(viewports));

        let jobs = planner
            .plan_source(
                &source("example.com", &["1024x768", "1024x768", "w3counter"]),
                &Options::default(),
            )
            .await
            .unwrap();
        assert_eq!(sizes_of(&jobs), vec!["1024x768", "375x667"]);
    }

    #[tokio::test]
    async fn test_popular_keyword_alone_uses_resolutions() {
        let mut resolutions = MockResolutionLookup::new();
        resolutions
            .expect_top_resolutions()
            .times(1)
            .returning(|| Ok(vec!["1920x1080".to_string(), "1366x768".to_string()]));
        let mut viewports = MockViewportLookup::new();
        viewports.expect_viewport_sizes().never();
        let planner = planner(Arc::new(resolutions), Arc::new(viewports));

        let jobs = planner
            .plan_source(&source("example.com", &["w3counter"]), &Options::default())
            .await
            .unwrap();
        assert_eq!(sizes_of(&jobs), vec!["1920x1080", "1366x768"]);
    }

    #[tokio::test]
    async fn test_resolutions_fetched_once_per_process_state() {
        let mut resolutions = MockResolutionLookup::new();
        resolutions
            .expect_top_resolutions()
            .times(1)
            .returning(|| Ok(vec!["1920x1080".to_string()]));
        let planner = planner(Arc::new(resolutions), Arc::new(BuiltinViewports));

        let first = planner.expand_resolutions("a.com", &Options::default()).await.unwrap();
        let second = planner.expand_resolutions("b.com", &Options::default()).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second[0].url, "b.com");
    }

    #[tokio::test]
    async fn test_lookup_failure_fails_plan() {
        let mut resolutions = MockResolutionLookup::new();
        resolutions
            .expect_top_resolutions()
            .returning(|| Err(BatchError::LookupFailed("offline".to_string())));
        let planner = planner(Arc::new(resolutions), Arc::new(BuiltinViewports));

        let err = planner
            .plan(
                &[source("a.com", &["1024x768"]), source("b.com", &["w3counter"])],
                &Options::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::LookupFailed(_)));
    }

    #[tokio::test]
    async fn test_source_options_override_defaults() {
        let planner = planner(unused_resolutions(), Arc::new(BuiltinViewports));
        let defaults = Options {
            delay: Some(3),
            crop: Some(false),
            ..Default::default()
        };
        let mut src = source("example.com", &["1024x768"]);
        src.options.crop = Some(true);

        let jobs = planner.plan(&[src], &defaults).await.unwrap();
        assert_eq!(jobs[0].options.delay, Some(3));
        assert_eq!(jobs[0].options.crop, Some(true));
    }

    #[tokio::test]
    async fn test_empty_specifiers_yield_no_jobs() {
        let planner = planner(unused_resolutions(), Arc::new(BuiltinViewports));
        let jobs = planner
            .plan_source(&source("example.com", &[]), &Options::default())
            .await
            .unwrap();
        assert!(jobs.is_empty());
    }
}
