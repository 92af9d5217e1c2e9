//! Source records as they arrive from the two upstream datasets.
//!
//! Media-arts records are JSON-LD `@graph` items whose fields may be plain
//! strings, `{"@value": ..}` objects, or lists of either. All field access
//! goes through [`jsonld_text`] so the tagged-union handling lives in one place.

use serde_json::Value;

/// `@type` of a single manga volume.
pub const TYPE_MANGA_BOOK: &str = "class:MangaBook";
/// `@type` of a manga book series.
pub const TYPE_MANGA_BOOK_SERIES: &str = "class:MangaBookSeries";
/// Genre of a single manga volume.
pub const GENRE_MANGA_BOOK: &str = "マンガ単行本";
/// Genre of a manga book series.
pub const GENRE_MANGA_BOOK_SERIES: &str = "マンガ単行本シリーズ";
/// Genres that mark a magazine record.
pub const MAGAZINE_GENRES: &[&str] = &["マンガ雑誌", "雑誌", "雑誌全号まとめ"];

/// How a record participates in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// A single book; becomes a Work.
    Work,
    /// A book series; becomes a Work tagged as a series.
    Series,
    /// A magazine or magazine run; becomes a Magazine.
    Magazine,
}

impl RecordKind {
    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Series => "series",
            Self::Magazine => "magazine",
        }
    }
}

/// Extracts text from a JSON-LD field value.
///
/// - string: returned as-is
/// - object: its `@value` member
/// - list: the first element that yields text
///
/// Blank text counts as absent.
#[must_use]
pub fn jsonld_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        },
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("@value").and_then(jsonld_text),
        Value::Array(items) => items.iter().find_map(jsonld_text),
        Value::Null | Value::Bool(_) => None,
    }
}

/// Extracts every text value of a field.
///
/// Used for `@type` and `schema:creator`, which are often lists.
#[must_use]
pub fn jsonld_texts(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(jsonld_text).collect(),
        other => jsonld_text(other).into_iter().collect(),
    }
}

/// One item from a media-arts JSON-LD `@graph`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaArtsRecord {
    /// `@id` of the item.
    pub source_id: Option<String>,
    /// `@type` values.
    pub types: Vec<String>,
    /// `schema:genre`.
    pub genre: Option<String>,
    /// `schema:name`.
    pub title: Option<String>,
    /// `schema:creator`, one raw compound creator field per list element.
    pub creators: Vec<String>,
    /// `schema:publisher`, raw publisher field.
    pub publisher: Option<String>,
    /// `schema:datePublished`.
    pub date_published: Option<String>,
    /// `schema:isbn`.
    pub isbn: Option<String>,
    /// `schema:description`, may carry the `初出：` serialization note.
    pub description: Option<String>,
    /// `schema:volumeNumber`.
    pub volume: Option<String>,
}

impl MediaArtsRecord {
    /// Reads the fields this crate uses from a JSON-LD object.
    ///
    /// Returns `None` if `item` is not an object.
    #[must_use]
    pub fn from_json(item: &Value) -> Option<Self> {
        let map = item.as_object()?;
        let field = |key: &str| map.get(key).and_then(jsonld_text);
        Some(Self {
            source_id: field("@id"),
            types: map.get("@type").map(jsonld_texts).unwrap_or_default(),
            genre: field("schema:genre"),
            title: field("schema:name"),
            creators: map.get("schema:creator").map(jsonld_texts).unwrap_or_default(),
            publisher: field("schema:publisher"),
            date_published: field("schema:datePublished"),
            isbn: field("schema:isbn"),
            description: field("schema:description"),
            volume: field("schema:volumeNumber"),
        })
    }

    /// Classifies the record by declared type and genre.
    ///
    /// Returns `None` for records the graph does not model.
    #[must_use]
    pub fn classify(&self) -> Option<RecordKind> {
        let genre = self.genre.as_deref();
        let has_type = |t: &str| self.types.iter().any(|declared| declared == t);

        if has_type(TYPE_MANGA_BOOK_SERIES) || genre == Some(GENRE_MANGA_BOOK_SERIES) {
            Some(RecordKind::Series)
        } else if has_type(TYPE_MANGA_BOOK) || genre == Some(GENRE_MANGA_BOOK) {
            Some(RecordKind::Work)
        } else if genre.is_some_and(|g| MAGAZINE_GENRES.contains(&g))
            || self.types.iter().any(|t| t.contains("Magazine"))
        {
            Some(RecordKind::Magazine)
        } else {
            None
        }
    }
}

/// One row of the third-party catalog export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRecord {
    /// Catalog id of the title.
    pub source_id: Option<String>,
    /// Primary title.
    pub title: Option<String>,
    /// English title, if any.
    pub english_title: Option<String>,
    /// Author entries, one person each (`"Oda, Eiichiro (Story & Art)"`).
    pub authors: Vec<String>,
    /// Serialization magazine names.
    pub serialization: Vec<String>,
}

/// A record from either upstream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRecord {
    /// Media-arts JSON-LD item.
    MediaArts(MediaArtsRecord),
    /// Catalog CSV row.
    Catalog(CatalogRecord),
}

impl SourceRecord {
    /// Returns the record's source id, used in logs.
    #[must_use]
    pub fn source_id(&self) -> Option<&str> {
        match self {
            Self::MediaArts(r) => r.source_id.as_deref(),
            Self::Catalog(r) => r.source_id.as_deref(),
        }
    }

    /// Returns the source tag stored on ingested works.
    #[must_use]
    pub const fn source_tag(&self) -> &'static str {
        match self {
            Self::MediaArts(_) => "media_arts",
            Self::Catalog(_) => "catalog",
        }
    }
}

impl From<MediaArtsRecord> for SourceRecord {
    fn from(record: MediaArtsRecord) -> Self {
        Self::MediaArts(record)
    }
}

impl From<CatalogRecord> for SourceRecord {
    fn from(record: CatalogRecord) -> Self {
        Self::Catalog(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_jsonld_text_variants() {
        assert_eq!(jsonld_text(&json!("NARUTO")), Some("NARUTO".to_string()));
        assert_eq!(
            jsonld_text(&json!({"@value": "ナルト", "@language": "ja-hrkt"})),
            Some("ナルト".to_string())
        );
        assert_eq!(
            jsonld_text(&json!([{"@value": "NARUTO"}, {"@value": "ナルト"}])),
            Some("NARUTO".to_string())
        );
        assert_eq!(jsonld_text(&json!(["", "  ", "second"])), Some("second".to_string()));
        assert_eq!(jsonld_text(&json!(null)), None);
        assert_eq!(jsonld_text(&json!({"@id": "x"})), None);
    }

    #[test]
    fn test_from_json_reads_fields() {
        let item = json!({
            "@id": "https://mediaarts-db.bunka.go.jp/id/M1",
            "@type": "class:MangaBook",
            "schema:name": [{"@value": "NARUTO 1"}],
            "schema:creator": "[著]岸本斉史",
            "schema:publisher": {"@value": "集英社　∥シュウエイシャ"},
            "schema:genre": "マンガ単行本",
            "schema:description": "初出：「週刊少年ジャンプ」1999年43号"
        });
        let record = MediaArtsRecord::from_json(&item).unwrap();
        assert_eq!(record.title.as_deref(), Some("NARUTO 1"));
        assert_eq!(record.creators, vec!["[著]岸本斉史"]);
        assert_eq!(record.publisher.as_deref(), Some("集英社　∥シュウエイシャ"));
        assert_eq!(record.classify(), Some(RecordKind::Work));
    }

    #[test]
    fn test_from_json_keeps_every_creator_credit() {
        let item = json!({
            "@type": "class:MangaBook",
            "schema:name": "NARUTO ナルト 外伝",
            "schema:creator": ["[原作]岸本斉史", {"@value": "[著]江坂純"}, ""]
        });
        let record = MediaArtsRecord::from_json(&item).unwrap();
        assert_eq!(record.creators, vec!["[原作]岸本斉史", "[著]江坂純"]);
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(MediaArtsRecord::from_json(&json!("oops")).is_none());
    }

    #[test]
    fn test_classify() {
        let series = MediaArtsRecord {
            types: vec![TYPE_MANGA_BOOK_SERIES.to_string()],
            ..Default::default()
        };
        assert_eq!(series.classify(), Some(RecordKind::Series));

        let magazine = MediaArtsRecord {
            genre: Some("マンガ雑誌".to_string()),
            ..Default::default()
        };
        assert_eq!(magazine.classify(), Some(RecordKind::Magazine));

        let magazine_type = MediaArtsRecord {
            types: vec!["class:MangaMagazine".to_string()],
            ..Default::default()
        };
        assert_eq!(magazine_type.classify(), Some(RecordKind::Magazine));

        let animation = MediaArtsRecord {
            types: vec!["class:AnimationTVProgram".to_string()],
            genre: Some("テレビアニメ".to_string()),
            ..Default::default()
        };
        assert_eq!(animation.classify(), None);
    }
}
