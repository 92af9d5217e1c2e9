//! Name normalization settings.

/// Tokens that mark a creator field as a single organization.
///
/// A comma-bearing creator field containing any of these is never split.
/// The list is editorial; extend it through the config file rather than here.
pub const DEFAULT_ORGANIZATION_TOKENS: &[&str] = &[
    "編集部",
    "出版",
    "プロダクション",
    "スタジオ",
    "委員会",
    "製作所",
    "株式会社",
    "有限会社",
    "Production",
    "Studio",
    "Inc.",
    "Ltd.",
];

/// Longest part, in characters, the middle-dot split accepts.
pub const DEFAULT_MIDDLE_DOT_MAX_PART_CHARS: usize = 8;

/// Name normalization configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationConfig {
    /// Organization markers that block splitting.
    pub organization_tokens: Vec<String>,
    /// Whether `・` separates creators.
    ///
    /// Off by default: katakana renderings of foreign names use the same dot.
    pub split_on_middle_dot: bool,
    /// Longest part accepted by the middle-dot split.
    pub middle_dot_max_part_chars: usize,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            organization_tokens: DEFAULT_ORGANIZATION_TOKENS
                .iter()
                .map(ToString::to_string)
                .collect(),
            split_on_middle_dot: false,
            middle_dot_max_part_chars: DEFAULT_MIDDLE_DOT_MAX_PART_CHARS,
        }
    }
}

impl NormalizationConfig {
    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = super::parse_bool_env("MANGA_GRAPH_SPLIT_MIDDLE_DOT") {
            self.split_on_middle_dot = v;
        }
        if let Ok(v) = std::env::var("MANGA_GRAPH_ORGANIZATION_TOKENS") {
            let tokens: Vec<String> = v
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(ToString::to_string)
                .collect();
            if !tokens.is_empty() {
                self.organization_tokens = tokens;
            }
        }
        self
    }

    /// Sets the organization tokens.
    #[must_use]
    pub fn with_organization_tokens(
        mut self,
        tokens: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.organization_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables the middle-dot split.
    #[must_use]
    pub const fn with_middle_dot_split(mut self, enabled: bool) -> Self {
        self.split_on_middle_dot = enabled;
        self
    }

    /// Returns true if `part` contains an organization token.
    #[must_use]
    pub fn is_organization(&self, part: &str) -> bool {
        self.organization_tokens
            .iter()
            .any(|token| part.contains(token.as_str()))
    }
}
