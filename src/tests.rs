#[cfg(test)]
mod integration_tests {
    use crate::lookup::{MockResolutionLookup, MockViewportLookup};
    use crate::{
        BatchError, BuiltinViewports, CaptureEvent, CaptureOutput, CaptureService, CaptureStream,
        Options, ProcessState, ResolutionLookup, ScreenshotBatch, ViewportLookup,
    };
    use async_trait::async_trait;
    use futures::{stream, StreamExt};
    use std::sync::{Arc, Mutex};

    /// Capture service that returns `url@size` as the image
    #[derive(Default)]
    struct FakeCapture {
        calls: Mutex<Vec<(String, String)>>,
        fail_size: Option<String>,
        warning: Option<String>,
    }

    impl FakeCapture {
        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CaptureService for FakeCapture {
        async fn capture(&self, url: &str, size: &str, _options: &Options) -> crate::Result<CaptureStream> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), size.to_string()));

            let mut events = Vec::new();
            if let Some(warning) = &self.warning {
                events.push(Ok(CaptureEvent::Warning(warning.clone())));
            }
            if self.fail_size.as_deref() == Some(size) {
                events.push(Ok(CaptureEvent::Data(b"half".to_vec())));
                events.push(Err(BatchError::capture(url, size, "renderer crashed")));
            } else {
                events.push(Ok(CaptureEvent::Data(format!("{url}@{size}").into_bytes())));
            }
            Ok(stream::iter(events).boxed())
        }
    }

    fn no_resolutions() -> Arc<dyn ResolutionLookup> {
        let mut mock = MockResolutionLookup::new();
        mock.expect_top_resolutions().never();
        Arc::new(mock)
    }

    fn batch_with(capture: Arc<FakeCapture>) -> ScreenshotBatch {
        ScreenshotBatch::new(
            Options::default(),
            capture,
            no_resolutions(),
            Arc::new(BuiltinViewports),
            Arc::new(ProcessState::new()),
        )
    }

    fn none() -> Vec<String> {
        Vec::new()
    }

    #[test]
    fn test_add_source_round_trip() {
        let mut batch = batch_with(Arc::new(FakeCapture::default()));
        assert!(batch.sources().is_empty());
        assert!(batch.destination().is_none());

        batch
            .add_source("a.com", ["1024x768"], Options::default())
            .add_source("b.com", ["iphone", "800x600"], Options::default())
            .add_source("a.com", none(), Options::default())
            .set_destination("out");

        let urls: Vec<&str> = batch.sources().iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["a.com", "b.com", "a.com"]);
        assert_eq!(batch.sources()[1].sizes, vec!["iphone".to_string(), "800x600".to_string()]);
        assert_eq!(batch.destination(), Some(std::path::Path::new("out")));
    }

    #[test]
    fn test_literal_only_run_in_memory() {
        let capture = Arc::new(FakeCapture::default());
        let mut batch = batch_with(capture.clone());
        batch
            .add_source("a.com", ["1024x768", "800x600", "1024x768"], Options::default())
            .add_source("b.com", ["1024x768"], Options::default())
            .add_source("a.com", ["1024x768"], Options::default());

        let results = tokio_test::block_on(batch.run()).unwrap();

        // 2 + 1 + 1 distinct literal sizes
        assert_eq!(results.len(), 4);
        assert_eq!(capture.calls().len(), 4);
        assert!(results.iter().all(|r| matches!(r.output, CaptureOutput::Stream(_))));

        let stats = batch.stats().unwrap();
        assert_eq!(stats.urls, 2);
        assert_eq!(stats.sizes, 2);
        assert_eq!(stats.screenshots, 4);
    }

    #[tokio::test]
    async fn test_results_carry_filename_and_bytes() {
        let capture = Arc::new(FakeCapture::default());
        let mut batch = batch_with(capture.clone());
        batch.add_source(
            "example.com",
            ["1280x720"],
            Options {
                crop: Some(true),
                ..Default::default()
            },
        );

        let mut results = batch.run().await.unwrap();
        let result = results.remove(0);
        assert_eq!(result.filename, "example.com-1280x720-cropped.png");
        assert_eq!(capture.calls(), vec![("http://example.com".to_string(), "1280x720".to_string())]);
        assert_eq!(result.into_bytes().await.unwrap(), b"http://example.com@1280x720");
    }

    #[tokio::test]
    async fn test_invalid_source_fails_before_any_capture() {
        let capture = Arc::new(FakeCapture::default());
        let mut batch = batch_with(capture.clone());
        batch
            .add_source("a.com", ["1024x768"], Options::default())
            .add_source("", ["1024x768"], Options::default());

        let err = batch.run().await.unwrap_err();
        assert!(matches!(err, BatchError::InvalidSource(_)));
        assert!(capture.calls().is_empty());
        assert!(batch.stats().is_none());
    }

    #[tokio::test]
    async fn test_mixed_literals_and_keyword_dedup() {
        let mut viewports = MockViewportLookup::new();
        viewports
            .expect_viewport_sizes()
            .times(1)
            .returning(|_| Ok(vec!["1024x768".to_string(), "1440x900".to_string()]));
        let capture = Arc::new(FakeCapture::default());
        let mut batch = ScreenshotBatch::new(
            Options::default(),
            capture.clone(),
            no_resolutions(),
            Arc::new(viewports),
            Arc::new(ProcessState::new()),
        );
        batch.add_source("a.com", ["1024x768", "1024x768", "w3counter"], Options::default());

        let results = batch.run().await.unwrap();
        let mut sizes: Vec<String> = results.iter().map(|r| r.size.clone()).collect();
        sizes.sort();
        assert_eq!(sizes, vec!["1024x768".to_string(), "1440x900".to_string()]);
    }

    #[tokio::test]
    async fn test_popular_resolutions_fetched_once_across_batches() {
        let mut resolutions = MockResolutionLookup::new();
        resolutions
            .expect_top_resolutions()
            .times(1)
            .returning(|| Ok(vec!["1920x1080".to_string(), "1366x768".to_string()]));
        let mut viewports = MockViewportLookup::new();
        viewports.expect_viewport_sizes().never();

        let resolutions: Arc<dyn ResolutionLookup> = Arc::new(resolutions);
        let viewports: Arc<dyn ViewportLookup> = Arc::new(viewports);
        let state = Arc::new(ProcessState::new());
        let capture = Arc::new(FakeCapture::default());

        for url in ["a.com", "b.com"] {
            let mut batch = ScreenshotBatch::new(
                Options::default(),
                capture.clone(),
                resolutions.clone(),
                viewports.clone(),
                state.clone(),
            );
            batch
                .add_source(url, ["w3counter"], Options::default())
                .add_source(url, ["w3counter"], Options::default());
            let results = batch.run().await.unwrap();
            assert_eq!(results.len(), 4);
            assert_eq!(batch.stats().unwrap().urls, 1);
        }

        assert_eq!(capture.calls().len(), 8);
        assert_eq!(state.resolutions.cached_len(), 1);
    }

    #[tokio::test]
    async fn test_run_saves_to_destination() {
        let dir = tempfile::tempdir().unwrap();
        let capture = Arc::new(FakeCapture {
            warning: Some("font failed to load".to_string()),
            ..Default::default()
        });
        let state = Arc::new(ProcessState::new());
        let mut batch = ScreenshotBatch::new(
            Options::default(),
            capture,
            no_resolutions(),
            Arc::new(BuiltinViewports),
            state.clone(),
        );
        batch
            .add_source("example.com", ["1024x768", "iphone 5s"], Options::default())
            .set_destination(dir.path());
        let mut warnings = batch.subscribe_warnings();

        let results = batch.run().await.unwrap();

        let first = dir.path().join("example.com-1024x768.png");
        let second = dir.path().join("example.com-320x568.png");
        assert_eq!(std::fs::read(&first).unwrap(), b"http://example.com@1024x768");
        assert!(second.exists());
        assert!(results.iter().all(|r| r.saved_path().is_some()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);

        assert_eq!(warnings.recv().await.unwrap(), "font failed to load");
        assert_eq!(warnings.recv().await.unwrap(), "font failed to load");
        assert!(state.temp_files.is_empty());
        assert!(state.interrupt_handler_installed());
    }

    #[tokio::test]
    async fn test_capture_failure_leaves_no_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let capture = Arc::new(FakeCapture {
            fail_size: Some("800x600".to_string()),
            ..Default::default()
        });
        let state = Arc::new(ProcessState::new());
        let mut batch = ScreenshotBatch::new(
            Options::default(),
            capture,
            no_resolutions(),
            Arc::new(BuiltinViewports),
            state.clone(),
        );
        batch
            .add_source("example.com", ["800x600", "1024x768"], Options::default())
            .set_destination(dir.path());

        let err = batch.run().await.unwrap_err();
        assert!(matches!(err, BatchError::CaptureFailed { .. }));
        assert!(batch.stats().is_none());
        assert!(state.temp_files.is_empty());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }

    #[tokio::test]
    async fn test_failed_run_clears_previous_stats() {
        let capture = Arc::new(FakeCapture {
            fail_size: Some("800x600".to_string()),
            ..Default::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let mut batch = batch_with(capture);
        batch.add_source("example.com", ["1024x768"], Options::default());

        batch.run().await.unwrap();
        assert_eq!(batch.stats().map(|s| s.screenshots), Some(1));

        batch
            .add_source("example.com", ["800x600"], Options::default())
            .set_destination(dir.path());
        assert!(batch.run().await.is_err());
        assert!(batch.stats().is_none());
    }
}
