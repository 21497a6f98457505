use crate::AppState;
use crate::api::error::AppError;
use crate::models::ObjectCreatedEvent;
use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// S3-compatible event notification document. Only the bucket name and
/// object key are read; everything else the notifier includes is ignored.
#[derive(Deserialize, ToSchema)]
pub struct NotificationDocument {
    #[serde(rename = "Records", default)]
    pub records: Vec<NotificationRecord>,
}

#[derive(Deserialize, ToSchema)]
pub struct NotificationRecord {
    pub s3: Option<S3Entity>,
}

#[derive(Deserialize, ToSchema)]
pub struct S3Entity {
    pub bucket: Option<BucketEntity>,
    pub object: Option<ObjectEntity>,
}

#[derive(Deserialize, ToSchema)]
pub struct BucketEntity {
    pub name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ObjectEntity {
    pub key: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct NotificationAck {
    pub accepted: usize,
    pub skipped: usize,
}

#[utoipa::path(
    post,
    path = "/events/object-created",
    request_body = NotificationDocument,
    responses(
        (status = 202, description = "Events queued for extraction", body = NotificationAck)
    ),
    tag = "system"
)]
pub async fn object_created(
    State(state): State<AppState>,
    Json(document): Json<NotificationDocument>,
) -> Result<(StatusCode, Json<NotificationAck>), AppError> {
    let mut accepted = 0;
    let mut skipped = 0;

    for record in document.records {
        let bucket = record
            .s3
            .as_ref()
            .and_then(|s| s.bucket.as_ref())
            .and_then(|b| b.name.clone());
        let key = record
            .s3
            .as_ref()
            .and_then(|s| s.object.as_ref())
            .and_then(|o| o.key.clone());

        match (bucket, key) {
            (Some(bucket), Some(key)) => {
                if state
                    .events
                    .send(ObjectCreatedEvent { bucket, key })
                    .await
                    .is_err()
                {
                    return Err(AppError::Internal(
                        "extraction worker is not running".to_string(),
                    ));
                }
                accepted += 1;
            }
            _ => {
                tracing::warn!("Skipping notification record with missing bucket name or object key");
                skipped += 1;
            }
        }
    }

    Ok((StatusCode::ACCEPTED, Json(NotificationAck { accepted, skipped })))
}
