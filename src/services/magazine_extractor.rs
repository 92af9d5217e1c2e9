//! Serialization magazine extraction from work descriptions.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]
#![allow(clippy::unused_self)]

use regex::Regex;
use std::sync::LazyLock;

/// Marker introducing the first-publication note in a description.
pub const FIRST_PUBLICATION_MARKER: &str = "初出：";

/// A magazine name quoted in corner brackets.
static QUOTED_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"「([^」]+)」").expect("static regex: quoted name pattern"));

/// Extracts serialization magazine names from free-text descriptions.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagazineExtractor;

impl MagazineExtractor {
    /// Creates a new extractor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns the magazine names quoted after the first `初出：` marker.
    ///
    /// Names are trimmed and kept only if longer than one character. Order
    /// and duplicates are preserved. A description without the marker
    /// yields nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use manga_graph::MagazineExtractor;
    ///
    /// let names = MagazineExtractor::new().extract_magazines("初出：「小学五年生」「小学六年生」");
    /// assert_eq!(names, vec!["小学五年生", "小学六年生"]);
    /// ```
    #[must_use]
    pub fn extract_magazines(&self, description: &str) -> Vec<String> {
        let Some((_, after)) = description.split_once(FIRST_PUBLICATION_MARKER) else {
            return Vec::new();
        };

        QUOTED_NAME_REGEX
            .captures_iter(after)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .filter(|name| name.chars().count() > 1)
            .map(str::to_string)
            .collect()
    }
}
