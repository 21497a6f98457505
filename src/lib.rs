pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod tabular;

use crate::config::AppConfig;
use crate::models::ObjectCreatedEvent;
use crate::services::dataset::DatasetService;
use crate::services::file_registry::FileRegistry;
use crate::services::object_store::ObjectStore;
use axum::{
    Router,
    middleware::from_fn,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::files::initiate_upload,
        api::handlers::files::confirm_upload,
        api::handlers::files::list_files,
        api::handlers::files::get_download_url,
        api::handlers::files::delete_file,
        api::handlers::statistics::get_statistics,
        api::handlers::statistics::get_boxplot,
        api::handlers::events::object_created,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::files::InitiateUploadRequest,
            api::handlers::files::InitiateUploadResponse,
            api::handlers::files::ConfirmUploadRequest,
            api::handlers::files::FileMetadataResponse,
            api::handlers::files::DownloadUrlResponse,
            api::handlers::files::DeleteFileResponse,
            api::handlers::statistics::DescriptiveStatsResponse,
            api::handlers::statistics::FrequencyEntry,
            api::handlers::statistics::BoxplotDataResponse,
            api::handlers::events::NotificationDocument,
            api::handlers::events::NotificationRecord,
            api::handlers::events::S3Entity,
            api::handlers::events::BucketEntity,
            api::handlers::events::ObjectEntity,
            api::handlers::events::NotificationAck,
            models::ProcessingStatus,
        )
    ),
    tags(
        (name = "files", description = "Upload lifecycle endpoints"),
        (name = "statistics", description = "On-demand descriptive statistics"),
        (name = "system", description = "Health and storage notifications")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub registry: Arc<dyn FileRegistry>,
    pub dataset: Arc<DatasetService>,
    pub events: mpsc::Sender<ObjectCreatedEvent>,
    pub config: AppConfig,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/events/object-created",
            post(api::handlers::events::object_created),
        )
        .route(
            "/files/initiate-upload",
            post(api::handlers::files::initiate_upload)
                .layer(from_fn(api::middleware::auth::identity_middleware)),
        )
        .route(
            "/files/confirm-upload",
            post(api::handlers::files::confirm_upload)
                .layer(from_fn(api::middleware::auth::identity_middleware)),
        )
        .route(
            "/files",
            get(api::handlers::files::list_files)
                .layer(from_fn(api::middleware::auth::identity_middleware)),
        )
        .route(
            "/files/:file_id/download-url",
            get(api::handlers::files::get_download_url)
                .layer(from_fn(api::middleware::auth::identity_middleware)),
        )
        .route(
            "/files/:file_id",
            delete(api::handlers::files::delete_file)
                .layer(from_fn(api::middleware::auth::identity_middleware)),
        )
        .route(
            "/files/:file_id/statistics/:variable_name",
            get(api::handlers::statistics::get_statistics)
                .layer(from_fn(api::middleware::auth::identity_middleware)),
        )
        .route(
            "/files/:file_id/graph-data/boxplot/:variable_name",
            get(api::handlers::statistics::get_boxplot)
                .layer(from_fn(api::middleware::auth::identity_middleware)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
