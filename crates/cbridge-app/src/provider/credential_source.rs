use std::path::PathBuf;

use serde_json::Value;

use cbridge_core::prelude::*;

use super::{matches_all, ContentSource, FieldType, MatchFilter, Record, SyncPath};

pub const CLIENT_CRT: &str = "client_crt";
pub const CLIENT_KEY: &str = "client_key";

const FIELD_NAME: &str = "name";
const FIELD_VALUE: &str = "value";

const FIELDS: &[(&str, FieldType)] = &[
    (FIELD_NAME, FieldType::String),
    (FIELD_VALUE, FieldType::String),
];

/// Client certificate and private key, exported hex encoded. Read-only.
#[derive(Debug, Clone, Default)]
pub struct CredentialSource {
    certificate_path: Option<PathBuf>,
    private_key_path: Option<PathBuf>,
}

impl CredentialSource {
    pub fn new(certificate_path: Option<PathBuf>, private_key_path: Option<PathBuf>) -> Self {
        Self {
            certificate_path,
            private_key_path,
        }
    }

    /// Hex of the file at `path`; `None` when no path is configured.
    async fn read_hex(name: &str, path: Option<&PathBuf>) -> Result<Option<String>> {
        let Some(path) = path else {
            debug!("No {} configured", name);
            return Ok(None);
        };
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::storage(format!("Failed to read {} {:?}: {}", name, path, e)))?;
        Ok(Some(hex::encode(bytes)))
    }
}

impl ContentSource for CredentialSource {
    fn fields(&self) -> &'static [(&'static str, FieldType)] {
        FIELDS
    }

    async fn query(&self, filters: &[MatchFilter]) -> Result<Vec<Record>> {
        let candidates = [
            (CLIENT_CRT, self.certificate_path.as_ref()),
            (CLIENT_KEY, self.private_key_path.as_ref()),
        ];

        let mut records = Vec::new();
        for (name, path) in candidates {
            let wanted = filters
                .iter()
                .filter(|f| f.field == FIELD_NAME)
                .all(|f| f.value.as_str() == Some(name));
            if !wanted {
                continue;
            }

            if let Some(value) = Self::read_hex(name, path).await? {
                let mut record = Record::new();
                record.insert(FIELD_NAME.into(), Value::String(name.to_string()));
                record.insert(FIELD_VALUE.into(), Value::String(value));
                if matches_all(&record, filters) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    async fn insert_or_replace(&self, _record: Record, _filters: &[MatchFilter]) -> Result<()> {
        Err(Error::unsupported("insert", SyncPath::Credentials.as_str()))
    }

    async fn delete(&self, _filters: &[MatchFilter]) -> Result<bool> {
        Err(Error::unsupported("delete", SyncPath::Credentials.as_str()))
    }
}
