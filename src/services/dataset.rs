use crate::api::error::AppError;
use crate::services::file_registry::FileRegistry;
use crate::services::object_store::ObjectStore;
use crate::tabular::{ParsedTable, parser};
use std::sync::Arc;

/// Loads a caller's stored file and re-parses it from the raw bytes. The
/// statistics endpoints always come through here instead of trusting the
/// asynchronously stored schema, so a slow or failed extraction never
/// affects reads. The same parse over the same bytes yields the same
/// table either way.
pub struct DatasetService {
    store: Arc<dyn ObjectStore>,
    registry: Arc<dyn FileRegistry>,
}

impl DatasetService {
    pub fn new(store: Arc<dyn ObjectStore>, registry: Arc<dyn FileRegistry>) -> Self {
        Self { store, registry }
    }

    pub async fn load_table(&self, user: &str, file_id: &str) -> Result<ParsedTable, AppError> {
        let record = self
            .registry
            .get(user, file_id)
            .await
            .map_err(|e| AppError::Storage(format!("error reading file metadata: {e:#}")))?
            .ok_or_else(|| AppError::NotFound("File metadata not found".to_string()))?;

        let bytes = self
            .store
            .get_object(&record.s3_object_key)
            .await
            .map_err(|e| AppError::Storage(format!("error reading file content: {e:#}")))?;

        let table = parser::parse(&bytes, Some(&record.file_type), &record.original_filename)?;
        Ok(table)
    }
}
