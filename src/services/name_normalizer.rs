//! Creator and publisher name normalization.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]
// Methods take &self so callers hold one configured normalizer.
#![allow(clippy::unused_self)]
//!
//! Turns the many textual spellings of one real-world author or publisher
//! into a single canonical identity:
//!
//! | Raw | Normalized |
//! |-----|------------|
//! | `[著]尾田栄一郎` | `尾田栄一郎` |
//! | `[[著]]尾田栄一郎` | `尾田栄一郎` |
//! | `岸本斉史, 江坂純` | `岸本斉史`, `江坂純` |
//! | `集英社　∥　シュウエイシャ` | `集英社` |
//!
//! Every rule is a named regex so it can be tested on its own.

use crate::config::NormalizationConfig;
use crate::models::{EntityId, EntityType};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

/// Number of SHA-256 bytes kept in an entity id.
const ID_HASH_BYTES: usize = 16;

/// Role-prefix groups such as `[著]`, `[[原作]]` or `[原作][作画]` at the
/// start of a whitespace-delimited token.
static ROLE_PREFIX_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|\s)(?:\[{1,2}[^\[\]]*\]{1,2})+").expect("static regex: role prefix pattern")
});

/// Top-level comma separators (ASCII, full-width, ideographic).
static CREATOR_SEPARATOR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,，、]").expect("static regex: creator separator pattern"));

/// Publisher reading annotation: `∥` and everything after it.
static READING_ANNOTATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\s\u{3000}]*∥.*$").expect("static regex: reading annotation pattern")
});

/// Trailing catalog role annotation, e.g. `(Story & Art)`.
static CATALOG_ROLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*\([A-Za-z][A-Za-z ,&/]*\)\s*$").expect("static regex: catalog role pattern")
});

/// Volume and edition suffixes stripped from a title to find its series,
/// applied in order. The bare trailing number goes last so `Vol. 4` is
/// removed whole.
static SERIES_SUFFIX_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\s*第\d+巻?$",
        r"\s*\(\d+\)$",
        r"(?i)\s*vol\.\s*\d+$",
        r"(?i)\s*volume\s*\d+$",
        r"\s*巻\d+$",
        r"\s*その\d+$",
        r"\s*メガ盛り.*$",
        r"\s*完全版.*$",
        r"\s*新装版.*$",
        r"\s*愛蔵版.*$",
        r"\s*文庫版.*$",
        r"\s*\d+$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static regex: series suffix pattern"))
    .collect()
});

/// Normalizes creator and publisher names and derives entity identity.
///
/// All operations are pure; the only state is the configured
/// organizational-token table and the middle-dot switch.
#[derive(Debug, Clone, Default)]
pub struct NameNormalizer {
    config: NormalizationConfig,
}

impl NameNormalizer {
    /// Creates a normalizer with default rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a normalizer with the given configuration.
    #[must_use]
    pub const fn with_config(config: NormalizationConfig) -> Self {
        Self { config }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &NormalizationConfig {
        &self.config
    }

    /// Splits a raw creator field into normalized individual names.
    ///
    /// Role prefixes are removed, then the field is split on `,` `，` `、`
    /// unless any part carries an organizational token. Parts are trimmed,
    /// empty parts dropped, order and duplicates kept.
    ///
    /// # Examples
    ///
    /// ```
    /// use manga_graph::NameNormalizer;
    ///
    /// let normalizer = NameNormalizer::new();
    /// assert_eq!(
    ///     normalizer.normalize_creator_field("[著]岸本斉史, 江坂純"),
    ///     vec!["岸本斉史".to_string(), "江坂純".to_string()],
    /// );
    /// ```
    #[must_use]
    pub fn normalize_creator_field(&self, raw: &str) -> Vec<String> {
        let stripped = strip_role_prefixes(raw);
        let stripped = stripped.trim();
        if stripped.is_empty() {
            return Vec::new();
        }

        let parts: Vec<&str> = CREATOR_SEPARATOR_REGEX.split(stripped).collect();
        let parts = if parts.len() > 1 && !parts.iter().any(|p| self.config.is_organization(p)) {
            parts
        } else {
            vec![stripped]
        };

        parts
            .into_iter()
            .flat_map(|part| self.split_middle_dot(part))
            .map(|part| self.normalize_creator_name(&part))
            .filter(|part| !part.is_empty())
            .collect()
    }

    /// Normalizes a single creator name: role prefixes removed, trimmed.
    ///
    /// Idempotent.
    #[must_use]
    pub fn normalize_creator_name(&self, raw: &str) -> String {
        strip_role_prefixes(raw).trim().to_string()
    }

    /// Normalizes a publisher name by dropping its reading annotation.
    ///
    /// Idempotent.
    #[must_use]
    pub fn normalize_publisher_name(&self, raw: &str) -> String {
        READING_ANNOTATION_REGEX.replace(raw, "").trim().to_string()
    }

    /// Normalizes a catalog author entry.
    ///
    /// Catalog author lists are already split per person, and entries are
    /// written `"Family, Given (Role)"`, so only the trailing role
    /// annotation is removed. Commas are kept.
    #[must_use]
    pub fn normalize_catalog_author(&self, raw: &str) -> String {
        let without_role = CATALOG_ROLE_REGEX.replace(raw.trim(), "");
        self.normalize_creator_name(&without_role)
    }

    /// Computes the identity key for a name.
    ///
    /// Full-width ASCII is folded to half-width, katakana to hiragana, the
    /// result lower-cased and internal whitespace collapsed. Returns `None`
    /// when nothing is left.
    #[must_use]
    pub fn canonical_key(&self, name: &str) -> Option<String> {
        canonical_key(name)
    }

    /// Computes the deterministic id for a name of the given type.
    ///
    /// Returns `None` for degenerate names (see [`Self::canonical_key`]).
    #[must_use]
    pub fn canonical_id(&self, name: &str, entity_type: EntityType) -> Option<EntityId> {
        canonical_id(name, entity_type)
    }

    fn split_middle_dot(&self, part: &str) -> Vec<String> {
        let config = &self.config;
        if !config.split_on_middle_dot || !part.contains('・') {
            return vec![part.to_string()];
        }

        let pieces: Vec<&str> = part
            .split('・')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        let all_short_people = pieces.iter().all(|p| {
            p.chars().count() <= config.middle_dot_max_part_chars && !config.is_organization(p)
        });

        if pieces.len() > 1 && all_short_people {
            pieces.into_iter().map(str::to_string).collect()
        } else {
            vec![part.to_string()]
        }
    }
}

/// Removes role-prefix bracket groups from every token that starts with `[`.
#[must_use]
pub fn strip_role_prefixes(raw: &str) -> String {
    ROLE_PREFIX_REGEX.replace_all(raw, "$1").into_owned()
}

/// Folds full-width ASCII and the ideographic space to half-width.
fn fold_width(c: char) -> char {
    match c {
        '\u{3000}' => ' ',
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(u32::from(c) - 0xFEE0).unwrap_or(c),
        _ => c,
    }
}

/// Folds katakana to the matching hiragana.
fn fold_kana(c: char) -> char {
    match c {
        '\u{30A1}'..='\u{30F6}' => char::from_u32(u32::from(c) - 0x60).unwrap_or(c),
        _ => c,
    }
}

/// See [`NameNormalizer::canonical_key`].
#[must_use]
pub fn canonical_key(name: &str) -> Option<String> {
    let folded: String = name
        .chars()
        .map(|c| fold_kana(fold_width(c)))
        .collect::<String>()
        .to_lowercase();
    let key = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    (!key.is_empty()).then_some(key)
}

/// See [`NameNormalizer::canonical_id`].
#[must_use]
pub fn canonical_id(name: &str, entity_type: EntityType) -> Option<EntityId> {
    let key = canonical_key(name)?;
    let type_tag = entity_type.as_str();

    let mut hasher = Sha256::new();
    hasher.update(type_tag.as_bytes());
    hasher.update([0_u8]);
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();

    Some(EntityId::new(format!(
        "{type_tag}_{}",
        hex::encode(&digest[..ID_HASH_BYTES])
    )))
}

/// Loose title key used to find spelling variants of one work title.
///
/// Whitespace is removed, full-width folded and the result case-folded, so
/// `ONE PIECE`, `One Piece` and `ＯＮＥ　ＰＩＥＣＥ` share a key.
#[must_use]
pub fn fuzzy_title_key(title: &str) -> String {
    title
        .chars()
        .map(fold_width)
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Series title of a volume: the title without volume numbers and edition
/// suffixes.
///
/// `NARUTO 3`, `NARUTO 第3巻` and `NARUTO 完全版 1` all yield `NARUTO`. A
/// title that would strip to nothing is returned trimmed instead.
#[must_use]
pub fn series_base_title(title: &str) -> String {
    let mut base = title.trim().to_string();
    for regex in SERIES_SUFFIX_REGEXES.iter() {
        base = regex.replace(&base, "").into_owned();
    }
    let base = base.trim();
    if base.is_empty() {
        title.trim().to_string()
    } else {
        base.to_string()
    }
}
