//! Catalog CSV loader.
//!
//! The export has one row per title. List columns (`authors`,
//! `serialization`) hold a JSON array or a single-quoted list literal:
//!
//! ```text
//! id,title_name,english_name,authors,serialization
//! 13,One Piece,One Piece,"['Oda, Eiichiro (Story & Art)']","['Shounen Jump (Weekly)']"
//! ```
//!
//! Missing-value tokens are dropped and entries are deduplicated in order.

use super::LoadedRecords;
use crate::models::{CatalogRecord, SourceRecord};
use crate::{Error, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::instrument;

/// Cell values that mean "no value" (compared case-insensitively).
pub const MISSING_VALUE_TOKENS: &[&str] = &["", "none", "null", "n/a", "na", "unknown"];

/// Maps CSV column indices to record fields.
#[derive(Debug, Default)]
struct ColumnMap {
    id: Option<usize>,
    title: Option<usize>,
    english_title: Option<usize>,
    authors: Option<usize>,
    serialization: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let mut map = Self::default();

        for (i, header) in headers.iter().enumerate() {
            match header.to_lowercase().as_str() {
                "id" | "manga_id" => map.id = Some(i),
                "title_name" | "title" => map.title = Some(i),
                "english_name" | "title_english" => map.english_title = Some(i),
                "authors" => map.authors = Some(i),
                "serialization" | "serializations" => map.serialization = Some(i),
                _ => {},
            }
        }

        if map.id.is_none() {
            return Err(Error::InvalidInput(
                "catalog CSV must have an 'id' column".to_string(),
            ));
        }

        Ok(map)
    }

    fn parse_record(&self, record: &csv::StringRecord) -> Option<CatalogRecord> {
        let get_field = |idx: Option<usize>| -> Option<String> {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        let source_id = get_field(self.id)?;
        let english_title = get_field(self.english_title);
        let title = get_field(self.title).or_else(|| english_title.clone());

        Some(CatalogRecord {
            source_id: Some(source_id),
            title,
            english_title,
            authors: parse_list_field(get_field(self.authors).as_deref()),
            serialization: parse_list_field(get_field(self.serialization).as_deref()),
        })
    }
}

/// Reads a catalog CSV from a file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or its header is unusable.
#[instrument(fields(path = %path.display()))]
pub fn read_catalog_file(path: &Path) -> Result<LoadedRecords> {
    let file = File::open(path).map_err(|e| Error::OperationFailed {
        operation: "open_catalog".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;
    read_catalog(BufReader::new(file))
}

/// Reads a catalog CSV from any reader.
///
/// Rows without an id are dropped and counted.
///
/// # Errors
///
/// Returns an error if the header lacks an `id` column or a row cannot be read.
pub fn read_catalog<R: Read>(reader: R) -> Result<LoadedRecords> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| Error::OperationFailed {
            operation: "read_csv_headers".to_string(),
            cause: e.to_string(),
        })?
        .clone();
    let columns = ColumnMap::from_headers(&headers)?;

    let mut loaded = LoadedRecords::default();
    let mut record = csv::StringRecord::new();
    while csv_reader
        .read_record(&mut record)
        .map_err(|e| Error::OperationFailed {
            operation: "read_csv".to_string(),
            cause: e.to_string(),
        })?
    {
        match columns.parse_record(&record) {
            Some(row) => loaded.records.push(SourceRecord::Catalog(row)),
            None => loaded.dropped += 1,
        }
    }

    tracing::debug!(
        records = loaded.records.len(),
        dropped = loaded.dropped,
        "Read catalog rows"
    );
    Ok(loaded)
}

/// Parses a list cell into cleaned, distinct entries.
///
/// Only cells that look like a list or map literal are parsed; anything else
/// yields no entries.
///
/// # Example
///
/// ```rust
/// use manga_graph::io::parse_list_field;
///
/// assert_eq!(
///     parse_list_field(Some("['Oda, Eiichiro (Story & Art)', 'None']")),
///     vec!["Oda, Eiichiro (Story & Art)".to_string()]
/// );
/// assert!(parse_list_field(Some("plain text")).is_empty());
/// ```
#[must_use]
pub fn parse_list_field(value: Option<&str>) -> Vec<String> {
    value
        .map(str::trim)
        .and_then(parse_collection)
        .map(|parsed| sanitize_entries(&parsed))
        .unwrap_or_default()
}

fn parse_collection(text: &str) -> Option<Value> {
    if !text.starts_with(['[', '{']) {
        return None;
    }
    let normalized = text.replace("\"\"", "\"");
    serde_json::from_str(&normalized)
        .ok()
        .or_else(|| serde_json::from_str(&list_literal_to_json(&normalized)).ok())
}

fn sanitize_entries(parsed: &Value) -> Vec<String> {
    let entries: Vec<&str> = match parsed {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => return Vec::new(),
    };

    let mut seen = HashSet::new();
    entries
        .into_iter()
        .map(|entry| entry.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|cleaned| !is_missing(cleaned))
        .filter(|cleaned| seen.insert(cleaned.clone()))
        .collect()
}

fn is_missing(value: &str) -> bool {
    let lowered = value.to_lowercase();
    MISSING_VALUE_TOKENS.contains(&lowered.as_str())
}

/// Rewrites a single-quoted list literal as JSON.
///
/// Single-quoted strings become double-quoted, and the bare words `None`,
/// `True` and `False` become their JSON counterparts.
fn list_literal_to_json(text: &str) -> String {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum State {
        Outside,
        Single,
        Double,
    }

    let mut out = String::with_capacity(text.len() + 8);
    let mut state = State::Outside;
    let mut chars = text.chars().peekable();
    let mut word = String::new();

    let flush_word = |word: &mut String, out: &mut String| {
        match word.as_str() {
            "" => {},
            "None" => out.push_str("null"),
            "True" => out.push_str("true"),
            "False" => out.push_str("false"),
            other => out.push_str(other),
        }
        word.clear();
    };

    while let Some(c) = chars.next() {
        match state {
            State::Outside => {
                if c.is_alphanumeric() || c == '_' {
                    word.push(c);
                    continue;
                }
                flush_word(&mut word, &mut out);
                match c {
                    '\'' => {
                        state = State::Single;
                        out.push('"');
                    },
                    '"' => {
                        state = State::Double;
                        out.push('"');
                    },
                    _ => out.push(c),
                }
            },
            State::Single => match c {
                '\\' => match chars.next() {
                    Some('\'') => out.push('\''),
                    Some(next) => {
                        out.push('\\');
                        out.push(next);
                    },
                    None => out.push('\\'),
                },
                '"' => out.push_str("\\\""),
                '\'' => {
                    state = State::Outside;
                    out.push('"');
                },
                _ => out.push(c),
            },
            State::Double => {
                out.push(c);
                match c {
                    '\\' => {
                        if let Some(next) = chars.next() {
                            out.push(next);
                        }
                    },
                    '"' => state = State::Outside,
                    _ => {},
                }
            },
        }
    }
    flush_word(&mut word, &mut out);
    out
}
