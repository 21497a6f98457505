use crate::config::AppConfig;
use crate::services::file_registry::DynamoFileRegistry;
use aws_sdk_dynamodb::config::Region;
use std::sync::Arc;
use tracing::info;

pub async fn setup_registry(config: &AppConfig) -> Arc<DynamoFileRegistry> {
    let mut loader = aws_config::from_env().region(Region::new(config.aws_region.clone()));
    if let Some(endpoint) = &config.dynamo_endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    let aws_config = loader.load().await;
    let client = aws_sdk_dynamodb::Client::new(&aws_config);

    info!("🗄️  File registry ready (table: {})", config.files_table);
    Arc::new(DynamoFileRegistry::new(client, config.files_table.clone()))
}
