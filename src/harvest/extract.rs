//! Document metadata extraction.
//!
//! Connectors harvesting binary documents can hand the raw bytes to a
//! [`MetadataExtractor`] and fold the returned properties into the record.

use crate::model::DataReference;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Well-known property: document title.
pub const PROP_TITLE: &str = "title";
/// Well-known property: document subject / abstract.
pub const PROP_DESCRIPTION: &str = "description";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Unreadable document: {0}")]
    Unreadable(String),
    #[error("Encrypted document")]
    Encrypted,
}

/// Black-box `raw bytes -> properties` function.
pub trait MetadataExtractor: Send + Sync {
    /// Returns `Ok(None)` when the document carries no metadata.
    fn extract(&self, raw: &[u8]) -> Result<Option<BTreeMap<String, String>>, ExtractError>;
}

impl<F> MetadataExtractor for F
where
    F: Fn(&[u8]) -> Result<Option<BTreeMap<String, String>>, ExtractError> + Send + Sync,
{
    fn extract(&self, raw: &[u8]) -> Result<Option<BTreeMap<String, String>>, ExtractError> {
        self(raw)
    }
}

/// Adds extracted properties to `reference`.
///
/// No metadata and extraction failure are handled the same way: the record is
/// returned unchanged.
pub fn enrich(reference: DataReference, extractor: &dyn MetadataExtractor) -> DataReference {
    match extractor.extract(reference.content()) {
        Ok(Some(properties)) if !properties.is_empty() => {
            debug!(record = %reference, count = properties.len(), "Enriched record");
            reference.with_attributes(properties)
        }
        Ok(_) => reference,
        Err(error) => {
            warn!(record = %reference, error = %error, "Metadata extraction failed");
            reference
        }
    }
}
