//! Seam implemented by every collection behind the bridge.
//!
//! Only [`ContentSource`] is re-exported from the parent module.

use cbridge_core::prelude::*;

use super::{FieldType, MatchFilter, Record};

/// One collection behind the bridge.
#[trait_variant::make(ContentSource: Send)]
pub trait LocalContentSource {
    /// Field names and types of this source's records.
    fn fields(&self) -> &'static [(&'static str, FieldType)];

    /// Records matching every filter; no filters means all records.
    async fn query(&self, filters: &[MatchFilter]) -> Result<Vec<Record>>;

    /// Create `record`, or replace the record the filters address.
    async fn insert_or_replace(&self, record: Record, filters: &[MatchFilter]) -> Result<()>;

    /// Remove the addressed record. Returns whether one was removed.
    async fn delete(&self, filters: &[MatchFilter]) -> Result<bool>;
}
