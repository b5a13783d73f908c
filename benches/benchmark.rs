use async_trait::async_trait;
use chrono::Local;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use screenshot_batch::{
    classify, parse_top_resolutions, render_filename, sanitize_filename, BuiltinViewports,
    JobPlanner, Options, ProcessState, ResolutionLookup, Source,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

struct StaticResolutions;

#[async_trait]
impl ResolutionLookup for StaticResolutions {
    async fn top_resolutions(&self) -> screenshot_batch::Result<Vec<String>> {
        Ok(vec!["1920x1080".to_string(), "1366x768".to_string()])
    }
}

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

fn benchmark_options_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("options");
    configure_fast_group(&mut group);

    let mut defaults = Options {
        delay: Some(2),
        crop: Some(false),
        ..Default::default()
    };
    defaults.headers.insert("x-a".to_string(), "1".to_string());
    let mut overrides = Options {
        crop: Some(true),
        ..Default::default()
    };
    overrides.headers.insert("x-b".to_string(), "2".to_string());

    group.bench_function("merge", |b| {
        b.iter(|| black_box(defaults.merged_with(&overrides)));
    });

    group.finish();
}

fn benchmark_size_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("size_spec");
    configure_fast_group(&mut group);

    let specs: Vec<String> = ["1024x768", "800x600", "1024x768", "iphone", "ipad pro", "w3counter"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    group.bench_function("classify", |b| {
        b.iter(|| black_box(classify(&specs)));
    });

    group.finish();
}

fn benchmark_filenames(c: &mut Criterion) {
    let mut group = c.benchmark_group("filename");
    configure_fast_group(&mut group);

    let now = Local::now();
    let options = Options {
        filename: Some("{date} {time} {url}-{width}x{height}{crop}".to_string()),
        crop: Some(true),
        ..Default::default()
    };

    group.bench_function("render", |b| {
        b.iter(|| {
            black_box(render_filename(
                "https://example.com/some/path?q=1",
                "1280x720",
                &options,
                now,
            ))
        });
    });

    group.bench_function("sanitize", |b| {
        b.iter(|| black_box(sanitize_filename("file:with<invalid>chars?.png")));
    });

    group.finish();
}

fn benchmark_resolution_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    configure_fast_group(&mut group);

    let html: String = std::iter::once("<h2>Screen Resolutions</h2>".to_string())
        .chain((0..50).map(|i| format!("<div class=\"bar\">{}x{}</div><span>{}%</span>", 1000 + i, 700, i)))
        .collect();

    group.bench_function("parse_top_resolutions", |b| {
        b.iter(|| black_box(parse_top_resolutions(&html)));
    });

    group.finish();
}

fn benchmark_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planner");
    configure_fast_group(&mut group);

    let rt = Runtime::new().expect("failed to build tokio runtime");
    let planner = JobPlanner::new(
        Arc::new(StaticResolutions),
        Arc::new(BuiltinViewports),
        Arc::new(ProcessState::new()),
    );
    let sources: Vec<Source> = (0..20)
        .map(|i| Source {
            url: format!("https://site{i}.example.com"),
            sizes: vec![
                "1024x768".to_string(),
                "iphone".to_string(),
                if i % 2 == 0 { "w3counter" } else { "ipad" }.to_string(),
            ],
            options: Options::default(),
        })
        .collect();

    group.bench_function("plan_20_sources", |b| {
        b.iter(|| {
            let jobs = rt.block_on(planner.plan(&sources, &Options::default()));
            black_box(jobs)
        });
    });

    group.finish();
}

criterion_group!(
    unit_benches,
    benchmark_options_merge,
    benchmark_size_classification,
    benchmark_filenames,
    benchmark_resolution_parsing,
    benchmark_planning
);

criterion_main!(unit_benches);
