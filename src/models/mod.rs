use crate::tabular::schema::TableSchema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Processing states for the asynchronous extraction path. A record leaves
/// `Pending` exactly once; every other state is terminal and the record is
/// never re-processed (a retried upload gets a fresh file identity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    ProcessedWithMetadata,
    UnsupportedFileType,
    ErrorParsingFile,
    ErrorMissingDependency,
    #[serde(rename = "error_s3_read")]
    ErrorS3Read,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::ProcessedWithMetadata => "processed_with_metadata",
            ProcessingStatus::UnsupportedFileType => "unsupported_file_type",
            ProcessingStatus::ErrorParsingFile => "error_parsing_file",
            ProcessingStatus::ErrorMissingDependency => "error_missing_dependency",
            ProcessingStatus::ErrorS3Read => "error_s3_read",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ProcessingStatus::Pending),
            "processed_with_metadata" => Some(ProcessingStatus::ProcessedWithMetadata),
            "unsupported_file_type" => Some(ProcessingStatus::UnsupportedFileType),
            "error_parsing_file" => Some(ProcessingStatus::ErrorParsingFile),
            "error_missing_dependency" => Some(ProcessingStatus::ErrorMissingDependency),
            "error_s3_read" => Some(ProcessingStatus::ErrorS3Read),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProcessingStatus::Pending)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored file, keyed by (user, file_id) in the metadata store. The
/// schema fields are written once by the extraction worker and read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub user: String,
    pub file_id: String,
    pub original_filename: String,
    pub s3_object_key: String,
    pub file_type: String,
    pub upload_timestamp: DateTime<Utc>,
    pub file_size: Option<i64>,
    pub status: String,
    pub processing_status: ProcessingStatus,
    pub schema: Option<TableSchema>,
    pub processed_timestamp: Option<DateTime<Utc>>,
}

/// One object-creation notification, as delivered by the storage layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectCreatedEvent {
    pub bucket: String,
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::ProcessedWithMetadata,
            ProcessingStatus::UnsupportedFileType,
            ProcessingStatus::ErrorParsingFile,
            ProcessingStatus::ErrorMissingDependency,
            ProcessingStatus::ErrorS3Read,
        ] {
            assert_eq!(ProcessingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ProcessingStatus::parse("something_else"), None);
    }

    #[test]
    fn serde_matches_stored_strings() {
        let json = serde_json::to_string(&ProcessingStatus::ErrorS3Read).unwrap();
        assert_eq!(json, "\"error_s3_read\"");
        let json = serde_json::to_string(&ProcessingStatus::ProcessedWithMetadata).unwrap();
        assert_eq!(json, "\"processed_with_metadata\"");
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!ProcessingStatus::Pending.is_terminal());
        assert!(ProcessingStatus::ErrorParsingFile.is_terminal());
    }
}
