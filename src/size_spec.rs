//! Size specifier classification
//!
//! A size specifier is either a literal `WIDTHxHEIGHT` string or a keyword
//! that has to be expanded through a lookup.

use once_cell::sync::Lazy;
use regex::Regex;

/// Keyword that expands to the ten most popular screen resolutions.
pub const POPULAR_RESOLUTIONS_KEYWORD: &str = "w3counter";

static LITERAL_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\d{2,4}x\d{2,4}$").expect("size regex is hardcoded and valid"));

/// Specifiers of one source split into literal sizes and keywords
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedSizes {
    /// Distinct literal sizes, first-seen order
    pub literal_sizes: Vec<String>,
    /// Distinct non-literal specifiers, first-seen order
    pub keywords: Vec<String>,
}

impl ClassifiedSizes {
    /// True when the only keyword is the popular-resolutions marker and no
    /// literal size was given.
    pub fn wants_popular_resolutions(&self) -> bool {
        self.literal_sizes.is_empty()
            && self.keywords.len() == 1
            && self.keywords[0] == POPULAR_RESOLUTIONS_KEYWORD
    }
}

pub fn is_literal_size(spec: &str) -> bool {
    LITERAL_SIZE.is_match(spec)
}

pub fn classify(specs: &[String]) -> ClassifiedSizes {
    let mut classified = ClassifiedSizes::default();

    for spec in specs {
        let bucket = if is_literal_size(spec) {
            &mut classified.literal_sizes
        } else {
            &mut classified.keywords
        };
        if !bucket.contains(spec) {
            bucket.push(spec.clone());
        }
    }

    classified
}

/// Splits a literal size into width and height.
///
/// Returns `None` for anything that is not a literal size.
pub fn dimensions(size: &str) -> Option<(u32, u32)> {
    if !is_literal_size(size) {
        return None;
    }
    let (width, height) = size.split_once(['x', 'X'])?;
    Some((width.parse().ok()?, height.parse().ok()?))
}

/// Appends `sizes` to `into`, skipping any already present.
pub fn union_sizes(into: &mut Vec<String>, sizes: impl IntoIterator<Item = String>) {
    for size in sizes {
        if !into.contains(&size) {
            into.push(size);
        }
    }
}
