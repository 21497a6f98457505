use std::env;

/// Runtime configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// AWS region for both clients (default: us-east-1)
    pub aws_region: String,

    /// Bucket holding uploaded files (required at runtime)
    pub bucket: String,

    /// DynamoDB table for file records (default: "MyFilesTable")
    pub files_table: String,

    /// Optional S3 endpoint override (MinIO / localstack style)
    pub s3_endpoint: Option<String>,

    /// Optional DynamoDB endpoint override (dynamodb-local style)
    pub dynamo_endpoint: Option<String>,

    /// Presigned URL lifetime in seconds (default: 3600)
    pub presign_ttl_secs: u64,

    /// Maximum accepted request body in bytes (default: 256 MB)
    pub max_file_size: usize,

    /// Address the HTTP listener binds to
    pub bind_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            aws_region: "us-east-1".to_string(),
            bucket: String::new(),
            files_table: "MyFilesTable".to_string(),
            s3_endpoint: None,
            dynamo_endpoint: None,
            presign_ttl_secs: 3600,
            max_file_size: 256 * 1024 * 1024,
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            aws_region: env::var("AWS_REGION").unwrap_or(default.aws_region),

            bucket: env::var("BUCKET").unwrap_or(default.bucket),

            files_table: env::var("DYNAMO_TABLE").unwrap_or(default.files_table),

            s3_endpoint: env::var("S3_ENDPOINT").ok(),

            dynamo_endpoint: env::var("DYNAMO_ENDPOINT").ok(),

            presign_ttl_secs: env::var("PRESIGN_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.presign_ttl_secs),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            bind_addr: env::var("BIND_ADDR").unwrap_or(default.bind_addr),
        }
    }
}
