use crate::config::AppConfig;
use crate::services::object_store::S3ObjectStore;
use aws_sdk_s3::config::Region;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &AppConfig) -> Arc<S3ObjectStore> {
    let mut loader = aws_config::from_env().region(Region::new(config.aws_region.clone()));
    if let Some(endpoint) = &config.s3_endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    let aws_config = loader.load().await;

    let mut builder = aws_sdk_s3::config::Builder::from(&aws_config);
    if config.s3_endpoint.is_some() {
        // MinIO-style endpoints do not resolve virtual-hosted buckets.
        builder = builder.force_path_style(true);
    }
    let client = aws_sdk_s3::Client::from_conf(builder.build());

    info!("☁️  S3 storage ready (bucket: {})", config.bucket);
    Arc::new(S3ObjectStore::new(client, config.bucket.clone()))
}
