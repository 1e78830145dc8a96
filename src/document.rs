//! The remote Document and its Records.
//!
//! The Document is a single JSON object whose keys are collection names and
//! whose values are arrays of records. It is the only persisted artifact:
//! every collection the dashboard uses is one key inside it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::SyncError;

/// The arbitrary caller-defined fields of a record.
pub type Fields = Map<String, Value>;

/// Generates a fresh collision-resistant record id.
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// One entry of a collection: a flat object with a unique `id` plus
/// arbitrary fields. Uniqueness of `id` is per collection, not global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    /// Creates a record with a freshly generated id.
    ///
    /// Any `id` entry in `fields` is discarded; the generated id wins.
    pub fn new(mut fields: Fields) -> Self {
        fields.remove("id");
        Self {
            id: new_record_id(),
            fields,
        }
    }

    /// Creates a record with an explicit id.
    pub fn with_id(id: impl Into<String>, mut fields: Fields) -> Self {
        fields.remove("id");
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Shallow-merges a partial patch into this record's fields.
    ///
    /// The `id` key is never overwritten by a patch.
    pub fn merge(&mut self, patch: &Fields) {
        for (key, value) in patch {
            if key == "id" {
                continue;
            }
            self.fields.insert(key.clone(), value.clone());
        }
    }
}

/// The whole remote document: collection name → array of records.
///
/// Collections other than the one being read or written are carried as raw
/// JSON values, so persisting one collection can never alter a sibling key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    collections: BTreeMap<String, Vec<Value>>,
}

impl Document {
    /// Parses remote file content.
    ///
    /// Empty or whitespace-only content is treated as the empty document
    /// (freshly seeded files). Anything that is not a JSON object mapping
    /// names to arrays is [`SyncError::CorruptStore`].
    pub fn parse(bytes: &[u8]) -> Result<Self, SyncError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| SyncError::CorruptStore(format!("not valid UTF-8: {}", e)))?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(text).map_err(|e| SyncError::CorruptStore(e.to_string()))
    }

    /// Serializes the document for a whole-file write.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        serde_json::to_vec(self).map_err(|e| SyncError::SyncFailed(e.to_string()))
    }

    /// Whether the document has an entry for this collection.
    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Returns the records of one collection. A missing key is an empty
    /// array; a record without a string `id` is [`SyncError::CorruptStore`].
    pub fn records(&self, name: &str) -> Result<Vec<Record>, SyncError> {
        let Some(values) = self.collections.get(name) else {
            return Ok(Vec::new());
        };
        values
            .iter()
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| {
                    SyncError::CorruptStore(format!("collection {}: {}", name, e))
                })
            })
            .collect()
    }

    /// Replaces one collection's array, leaving every other key untouched.
    pub fn set_records(&mut self, name: &str, records: &[Record]) -> Result<(), SyncError> {
        let values = records
            .iter()
            .map(|record| {
                serde_json::to_value(record).map_err(|e| SyncError::SyncFailed(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.collections.insert(name.to_string(), values);
        Ok(())
    }

    /// Collection names present in the document.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }
}
