//! Media-arts JSON-LD loader.
//!
//! A dump is one JSON document whose `@graph` member lists the items. A bare
//! top-level array of items is accepted as well.

use super::LoadedRecords;
use crate::models::{MediaArtsRecord, SourceRecord};
use crate::{Error, Result};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::instrument;

/// Reads a JSON-LD dump from a file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or does not parse.
#[instrument(fields(path = %path.display()))]
pub fn read_jsonld_file(path: &Path) -> Result<LoadedRecords> {
    let file = File::open(path).map_err(|e| Error::OperationFailed {
        operation: "open_jsonld".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;
    read_jsonld(BufReader::new(file))
}

/// Reads a JSON-LD dump from any reader.
///
/// Items that are not objects are dropped and counted.
///
/// # Errors
///
/// Returns an error if the input is not JSON or has no `@graph` list.
pub fn read_jsonld<R: Read>(reader: R) -> Result<LoadedRecords> {
    let document: Value = serde_json::from_reader(reader)
        .map_err(|e| Error::InvalidInput(format!("failed to parse JSON-LD: {e}")))?;

    let items = match document {
        Value::Object(mut map) => match map.remove("@graph") {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(Error::InvalidInput("@graph is not a list".to_string()));
            },
            None => {
                return Err(Error::InvalidInput("document has no @graph".to_string()));
            },
        },
        Value::Array(items) => items,
        _ => {
            return Err(Error::InvalidInput(
                "JSON-LD document must be an object or a list".to_string(),
            ));
        },
    };

    let mut loaded = LoadedRecords::default();
    for item in &items {
        match MediaArtsRecord::from_json(item) {
            Some(record) => loaded.records.push(SourceRecord::MediaArts(record)),
            None => loaded.dropped += 1,
        }
    }

    tracing::debug!(
        records = loaded.records.len(),
        dropped = loaded.dropped,
        "Read JSON-LD items"
    );
    Ok(loaded)
}
