use crate::AppState;
use crate::api::error::AppError;
use crate::api::middleware::auth::Identity;
use crate::models::{FileRecord, ProcessingStatus};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Deserialize, ToSchema, Validate)]
pub struct InitiateUploadRequest {
    #[validate(length(min = 1, message = "filename must not be empty"))]
    pub filename: String,
    #[validate(length(min = 1, message = "filetype must not be empty"))]
    pub filetype: String,
}

#[derive(Serialize, ToSchema)]
pub struct InitiateUploadResponse {
    pub upload_url: String,
    pub s3_object_key: String,
    pub file_id: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ConfirmUploadRequest {
    pub file_id: String,
    pub s3_object_key: String,
    pub original_filename: String,
    pub file_type: String,
    pub file_size: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct FileMetadataResponse {
    pub user: String,
    pub file_id: String,
    pub original_filename: String,
    pub s3_object_key: String,
    pub file_type: String,
    pub upload_timestamp: DateTime<Utc>,
    pub file_size: Option<i64>,
    pub status: String,
    #[serde(rename = "processingStatus")]
    pub processing_status: ProcessingStatus,
    #[serde(rename = "columnHeaders")]
    pub column_headers: Option<Vec<String>>,
    #[serde(rename = "rowCount")]
    pub row_count: Option<usize>,
    #[serde(rename = "columnCount")]
    pub column_count: Option<usize>,
    #[serde(rename = "processedTimestamp")]
    pub processed_timestamp: Option<DateTime<Utc>>,
}

impl From<FileRecord> for FileMetadataResponse {
    fn from(record: FileRecord) -> Self {
        let (column_headers, row_count, column_count) = match record.schema {
            Some(schema) => (
                Some(schema.headers),
                Some(schema.row_count),
                Some(schema.column_count),
            ),
            None => (None, None, None),
        };
        Self {
            user: record.user,
            file_id: record.file_id,
            original_filename: record.original_filename,
            s3_object_key: record.s3_object_key,
            file_type: record.file_type,
            upload_timestamp: record.upload_timestamp,
            file_size: record.file_size,
            status: record.status,
            processing_status: record.processing_status,
            column_headers,
            row_count,
            column_count,
            processed_timestamp: record.processed_timestamp,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DownloadUrlResponse {
    pub download_url: String,
    pub s3_object_key: String,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteFileResponse {
    pub message: String,
    pub deleted_file: FileMetadataResponse,
}

#[utoipa::path(
    post,
    path = "/files/initiate-upload",
    request_body = InitiateUploadRequest,
    responses(
        (status = 200, description = "Presigned upload URL issued", body = InitiateUploadResponse),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "files"
)]
pub async fn initiate_upload(
    State(state): State<AppState>,
    Extension(Identity(user)): Extension<Identity>,
    Json(payload): Json<InitiateUploadRequest>,
) -> Result<Json<InitiateUploadResponse>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    if state.config.bucket.is_empty() {
        return Err(AppError::Internal("S3 bucket not configured".to_string()));
    }

    let file_id = Uuid::new_v4().to_string();
    // Keep the original suffix on the generated object name; the extraction
    // worker falls back to it as a format hint.
    let suffix = std::path::Path::new(&payload.filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let s3_object_key = format!(
        "user_uploads/{}/{}/{}{}",
        user,
        file_id,
        Uuid::new_v4(),
        suffix
    );

    let upload_url = state
        .store
        .presign_upload(
            &s3_object_key,
            &payload.filetype,
            Duration::from_secs(state.config.presign_ttl_secs),
        )
        .await
        .map_err(|e| AppError::Storage(format!("could not generate upload URL: {e:#}")))?;

    tracing::info!(
        "Initiated upload for user {}, file_id {}, key {}",
        user,
        file_id,
        s3_object_key
    );
    Ok(Json(InitiateUploadResponse {
        upload_url,
        s3_object_key,
        file_id,
    }))
}

#[utoipa::path(
    post,
    path = "/files/confirm-upload",
    request_body = ConfirmUploadRequest,
    responses(
        (status = 201, description = "Upload confirmed and recorded", body = FileMetadataResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Uploaded object not found in storage")
    ),
    tag = "files"
)]
pub async fn confirm_upload(
    State(state): State<AppState>,
    Extension(Identity(user)): Extension<Identity>,
    Json(payload): Json<ConfirmUploadRequest>,
) -> Result<(StatusCode, Json<FileMetadataResponse>), AppError> {
    let exists = state
        .store
        .object_exists(&payload.s3_object_key)
        .await
        .map_err(|e| AppError::Storage(format!("error verifying uploaded object: {e:#}")))?;
    if !exists {
        return Err(AppError::NotFound(
            "Uploaded file not found in storage".to_string(),
        ));
    }

    let record = FileRecord {
        user,
        file_id: payload.file_id,
        original_filename: payload.original_filename,
        s3_object_key: payload.s3_object_key,
        file_type: payload.file_type,
        upload_timestamp: Utc::now(),
        file_size: payload.file_size,
        status: "uploaded".to_string(),
        processing_status: ProcessingStatus::Pending,
        schema: None,
        processed_timestamp: None,
    };
    state
        .registry
        .put(&record)
        .await
        .map_err(|e| AppError::Storage(format!("failed to record file metadata: {e:#}")))?;

    tracing::info!(
        "Confirmed upload for user {}, file_id {}",
        record.user,
        record.file_id
    );
    Ok((StatusCode::CREATED, Json(record.into())))
}

#[utoipa::path(
    get,
    path = "/files",
    responses(
        (status = 200, description = "The caller's files, newest first", body = Vec<FileMetadataResponse>),
        (status = 401, description = "Unauthorized")
    ),
    tag = "files"
)]
pub async fn list_files(
    State(state): State<AppState>,
    Extension(Identity(user)): Extension<Identity>,
) -> Result<Json<Vec<FileMetadataResponse>>, AppError> {
    let mut records = state
        .registry
        .list(&user)
        .await
        .map_err(|e| AppError::Storage(format!("error listing files: {e:#}")))?;
    records.sort_by(|a, b| b.upload_timestamp.cmp(&a.upload_timestamp));
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/files/{file_id}/download-url",
    params(("file_id" = String, Path, description = "File ID")),
    responses(
        (status = 200, description = "Presigned download URL", body = DownloadUrlResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "File not found")
    ),
    tag = "files"
)]
pub async fn get_download_url(
    State(state): State<AppState>,
    Extension(Identity(user)): Extension<Identity>,
    Path(file_id): Path<String>,
) -> Result<Json<DownloadUrlResponse>, AppError> {
    let record = state
        .registry
        .get(&user, &file_id)
        .await
        .map_err(|e| AppError::Storage(format!("error reading file metadata: {e:#}")))?
        .ok_or_else(|| AppError::NotFound("File not found for this user".to_string()))?;

    let download_url = state
        .store
        .presign_download(
            &record.s3_object_key,
            Duration::from_secs(state.config.presign_ttl_secs),
        )
        .await
        .map_err(|e| AppError::Storage(format!("could not generate download URL: {e:#}")))?;

    Ok(Json(DownloadUrlResponse {
        download_url,
        s3_object_key: record.s3_object_key,
    }))
}

#[utoipa::path(
    delete,
    path = "/files/{file_id}",
    params(("file_id" = String, Path, description = "File ID")),
    responses(
        (status = 200, description = "File deleted", body = DeleteFileResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "File not found")
    ),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(Identity(user)): Extension<Identity>,
    Path(file_id): Path<String>,
) -> Result<Json<DeleteFileResponse>, AppError> {
    let record = state
        .registry
        .get(&user, &file_id)
        .await
        .map_err(|e| AppError::Storage(format!("error reading file metadata: {e:#}")))?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    // Best effort: a storage hiccup must not strand the metadata record.
    if let Err(e) = state.store.delete_object(&record.s3_object_key).await {
        tracing::error!("S3 error deleting {}: {e:#}", record.s3_object_key);
    }

    let deleted = state
        .registry
        .delete(&user, &file_id)
        .await
        .map_err(|e| AppError::Storage(format!("error deleting file metadata: {e:#}")))?
        .ok_or_else(|| {
            AppError::NotFound("File was already deleted or not found during final delete".to_string())
        })?;

    Ok(Json(DeleteFileResponse {
        message: "File deleted successfully".to_string(),
        deleted_file: deleted.into(),
    }))
}
