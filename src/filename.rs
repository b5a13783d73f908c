use crate::config::Options;
use crate::size_spec::dimensions;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

static TEMPLATE_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\s*(\w+)\s*\}").expect("template regex is hardcoded and valid"));

static URL_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.\-]*://").expect("scheme regex is hardcoded and valid"));

/// Replaces characters that are unsafe in filenames with `!`.
///
/// Runs of replaced characters collapse into one and surrounding whitespace
/// and dots are trimmed.
pub fn sanitize_filename(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        let c = match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '!',
            c if c.is_control() => '!',
            c => c,
        };
        if c == '!' && out.ends_with('!') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches(|c: char| c.is_whitespace() || c == '.').to_string()
}

/// Filesystem-safe name for a URL.
///
/// Absolute paths keep only their basename; URLs lose their scheme and
/// trailing slash.
pub fn url_to_filename(url: &str) -> String {
    let path = Path::new(url);
    let url = if path.is_absolute() {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| url.to_string())
    } else {
        url.to_string()
    };

    let without_scheme = URL_SCHEME.replace(&url, "");
    sanitize_filename(without_scheme.trim_end_matches('/'))
}

/// Substitutes `{name}` variables. Unknown names are left as written.
pub fn render_template(template: &str, vars: &HashMap<&str, String>) -> String {
    TEMPLATE_VAR
        .replace_all(template, |caps: &regex::Captures| {
            vars.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Target filename of one capture, extension included.
pub fn render_filename(url: &str, size: &str, options: &Options, captured_at: DateTime<Local>) -> String {
    let (width, height) = dimensions(size)
        .map(|(w, h)| (w.to_string(), h.to_string()))
        .unwrap_or_default();

    let vars = HashMap::from([
        ("url", url_to_filename(url)),
        ("size", size.to_string()),
        ("width", width),
        ("height", height),
        ("crop", if options.is_cropped() { "-cropped" } else { "" }.to_string()),
        ("date", captured_at.format("%Y-%m-%d").to_string()),
        ("time", captured_at.format("%H-%M-%S").to_string()),
    ]);

    let stem = render_template(options.filename_template(), &vars);
    sanitize_filename(&format!("{}.{}", stem, options.output_format().extension()))
}
