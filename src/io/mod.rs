//! Input loaders for the two upstream datasets.
//!
//! Each loader turns a file (or any reader) into [`SourceRecord`]s for
//! [`GraphIngestor`](crate::services::GraphIngestor):
//!
//! | Format | Source | Notes |
//! |--------|--------|-------|
//! | JSON-LD | Media-arts database dump | Items under `@graph` |
//! | CSV | Catalog export | `authors` / `serialization` are list literals |
//!
//! # Example
//!
//! ```rust,ignore
//! use manga_graph::io::{InputFormat, load_records};
//!
//! let loaded = load_records(InputFormat::JsonLd, "metadata101.json".as_ref())?;
//! ingestor.ingest(&loaded.records)?;
//! ```

pub mod catalog;
pub mod jsonld;

pub use catalog::{parse_list_field, read_catalog, read_catalog_file};
pub use jsonld::{read_jsonld, read_jsonld_file};

use crate::models::SourceRecord;
use crate::{Error, Result};
use std::path::Path;
use std::str::FromStr;

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputFormat {
    /// Media-arts JSON-LD export.
    JsonLd,
    /// Catalog CSV export.
    Catalog,
}

impl InputFormat {
    /// Returns the format name as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::JsonLd => "jsonld",
            Self::Catalog => "catalog",
        }
    }

    /// Detects the format from a file extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is not recognized.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| {
                Error::InvalidInput(format!("cannot detect format of {}", path.display()))
            })?;

        match ext.as_str() {
            "json" | "jsonld" => Ok(Self::JsonLd),
            "csv" => Ok(Self::Catalog),
            other => Err(Error::InvalidInput(format!(
                "unsupported file extension '.{other}'"
            ))),
        }
    }
}

impl FromStr for InputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "jsonld" | "json-ld" | "json" | "media-arts" => Ok(Self::JsonLd),
            "catalog" | "csv" | "mal" => Ok(Self::Catalog),
            other => Err(Error::InvalidInput(format!("unknown input format: {other}"))),
        }
    }
}

impl std::fmt::Display for InputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records read from one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedRecords {
    /// Records ready for ingestion.
    pub records: Vec<SourceRecord>,
    /// Items dropped before ingestion (not an object, missing id).
    pub dropped: usize,
}

/// Loads every record of `path` in the given format.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid for the format.
pub fn load_records(format: InputFormat, path: &Path) -> Result<LoadedRecords> {
    match format {
        InputFormat::JsonLd => read_jsonld_file(path),
        InputFormat::Catalog => read_catalog_file(path),
    }
}
