use crate::models::{ObjectCreatedEvent, ProcessingStatus};
use crate::services::file_registry::{ExtractionResult, FileRegistry};
use crate::services::object_store::ObjectStore;
use crate::tabular::{TabularError, parser, schema};
use chrono::Utc;
use percent_encoding::percent_decode_str;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Pieces of an object key in the `user_uploads/{user}/{file_id}/{filename}`
/// layout.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadKey {
    pub user: String,
    pub file_id: String,
    pub filename: String,
}

/// Decode an object key the way S3 event notifications encode it: '+' is a
/// space, then percent-escapes are resolved.
pub fn decode_event_key(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

pub fn parse_upload_key(key: &str) -> Option<UploadKey> {
    let mut parts = key.splitn(4, '/');
    let prefix = parts.next()?;
    let user = parts.next()?;
    let file_id = parts.next()?;
    let filename = parts.next()?;
    if prefix != "user_uploads" || user.is_empty() || file_id.is_empty() || filename.is_empty() {
        return None;
    }
    Some(UploadKey {
        user: user.to_string(),
        file_id: file_id.to_string(),
        filename: filename.to_string(),
    })
}

/// Asynchronous ingestion entry point. Each object-created event ends in
/// exactly one terminal processing status on the file record; no failure
/// ever propagates back to the event source.
pub struct MetadataExtractor {
    store: Arc<dyn ObjectStore>,
    registry: Arc<dyn FileRegistry>,
}

impl MetadataExtractor {
    pub fn new(store: Arc<dyn ObjectStore>, registry: Arc<dyn FileRegistry>) -> Self {
        Self { store, registry }
    }

    /// Process a batch of independent events. One item's failure is
    /// isolated to its own outcome slot and never stops the rest.
    pub async fn process_batch(
        &self,
        events: &[ObjectCreatedEvent],
    ) -> Vec<Option<ExtractionResult>> {
        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            outcomes.push(self.process_event(event).await);
        }
        outcomes
    }

    /// Handle one event. Returns `None` when the key is outside the upload
    /// layout (nothing to record); otherwise the terminal outcome that was
    /// written to the registry.
    pub async fn process_event(&self, event: &ObjectCreatedEvent) -> Option<ExtractionResult> {
        let key = decode_event_key(&event.key);
        let Some(upload) = parse_upload_key(&key) else {
            warn!(
                "Skipping object '{}': key does not match 'user_uploads/user/file_id/filename'",
                key
            );
            return None;
        };
        info!(
            "Processing s3://{}/{} (user '{}', file '{}')",
            event.bucket, key, upload.user, upload.file_id
        );

        // Prefer the stored record's hints so this parse and the on-demand
        // statistics parse see identical inputs. The generated object name
        // keeps the original suffix, so the key is a workable fallback when
        // the upload confirmation has not landed yet.
        let (declared_type, filename) = match self.registry.get(&upload.user, &upload.file_id).await
        {
            Ok(Some(record)) => (Some(record.file_type), record.original_filename),
            Ok(None) => (None, upload.filename.clone()),
            Err(e) => {
                warn!("Could not read record for hint lookup: {e:#}");
                (None, upload.filename.clone())
            }
        };

        let result = match self.store.get_object(&key).await {
            Ok(bytes) => extract_schema(&bytes, declared_type.as_deref(), &filename),
            Err(e) => {
                error!("Failed to read object '{}': {e:#}", key);
                ExtractionResult {
                    status: ProcessingStatus::ErrorS3Read,
                    schema: None,
                    processed_at: Utc::now(),
                }
            }
        };

        if let Err(e) = self
            .registry
            .record_extraction(&upload.user, &upload.file_id, &result)
            .await
        {
            error!(
                "Failed to record extraction outcome for '{}/{}': {e:#}",
                upload.user, upload.file_id
            );
        } else {
            info!(
                "Recorded extraction outcome '{}' for '{}/{}'",
                result.status, upload.user, upload.file_id
            );
        }
        Some(result)
    }
}

/// Parse the bytes and fold any failure into a terminal status value.
fn extract_schema(
    bytes: &[u8],
    declared_type: Option<&str>,
    filename: &str,
) -> ExtractionResult {
    let processed_at = Utc::now();
    match parser::parse(bytes, declared_type, filename) {
        Ok(table) => {
            let schema = schema::extract(&table);
            info!(
                "Extracted schema: {} rows, {} columns",
                schema.row_count, schema.column_count
            );
            ExtractionResult {
                status: ProcessingStatus::ProcessedWithMetadata,
                schema: Some(schema),
                processed_at,
            }
        }
        Err(err) => {
            let status = match err {
                TabularError::UnsupportedFormat(_) => ProcessingStatus::UnsupportedFileType,
                TabularError::MissingDependency(_) => ProcessingStatus::ErrorMissingDependency,
                _ => ProcessingStatus::ErrorParsingFile,
            };
            warn!("Extraction failed for '{}': {}", filename, err);
            ExtractionResult {
                status,
                schema: None,
                processed_at,
            }
        }
    }
}
