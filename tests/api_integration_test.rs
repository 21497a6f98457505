use anyhow::anyhow;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tabledrop::config::AppConfig;
use tabledrop::models::{FileRecord, ObjectCreatedEvent, ProcessingStatus};
use tabledrop::services::dataset::DatasetService;
use tabledrop::services::extraction::MetadataExtractor;
use tabledrop::services::file_registry::{ExtractionResult, FileRegistry};
use tabledrop::services::object_store::ObjectStore;
use tabledrop::services::worker::ExtractionWorker;
use tabledrop::tabular::{parser, schema};
use tabledrop::{AppState, create_app};
use tokio::sync::{mpsc, watch};
use tower::ServiceExt;

struct MockObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockObjectStore {
    fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
        }
    }

    fn insert(&self, key: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn put_object(&self, key: &str, data: Vec<u8>, _content_type: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("no such object: {}", key))
    }

    async fn object_exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn presign_upload(
        &self,
        key: &str,
        _content_type: &str,
        _ttl: Duration,
    ) -> anyhow::Result<String> {
        Ok(format!("https://storage.test/{}?method=put", key))
    }

    async fn presign_download(&self, key: &str, _ttl: Duration) -> anyhow::Result<String> {
        Ok(format!("https://storage.test/{}?method=get", key))
    }
}

struct MockFileRegistry {
    records: Mutex<HashMap<(String, String), FileRecord>>,
}

impl MockFileRegistry {
    fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl FileRegistry for MockFileRegistry {
    async fn get(&self, user: &str, file_id: &str) -> anyhow::Result<Option<FileRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(user.to_string(), file_id.to_string()))
            .cloned())
    }

    async fn put(&self, record: &FileRecord) -> anyhow::Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert((record.user.clone(), record.file_id.clone()), record.clone());
        Ok(())
    }

    async fn list(&self, user: &str) -> anyhow::Result<Vec<FileRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.user == user)
            .cloned()
            .collect())
    }

    async fn delete(&self, user: &str, file_id: &str) -> anyhow::Result<Option<FileRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .remove(&(user.to_string(), file_id.to_string())))
    }

    async fn record_extraction(
        &self,
        user: &str,
        file_id: &str,
        result: &ExtractionResult,
    ) -> anyhow::Result<()> {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(&(user.to_string(), file_id.to_string())) {
            record.processing_status = result.status;
            record.schema = result.schema.clone();
            if result.schema.is_some() {
                record.processed_timestamp = Some(result.processed_at);
            }
        }
        Ok(())
    }
}

struct TestHarness {
    state: AppState,
    store: Arc<MockObjectStore>,
    registry: Arc<MockFileRegistry>,
    event_rx: mpsc::Receiver<ObjectCreatedEvent>,
}

fn setup() -> TestHarness {
    let store = Arc::new(MockObjectStore::new());
    let registry = Arc::new(MockFileRegistry::new());
    let (event_tx, event_rx) = mpsc::channel(16);

    let store_dyn: Arc<dyn ObjectStore> = store.clone();
    let registry_dyn: Arc<dyn FileRegistry> = registry.clone();
    let dataset = Arc::new(DatasetService::new(store_dyn.clone(), registry_dyn.clone()));

    let mut config = AppConfig::default();
    config.bucket = "test-bucket".to_string();

    let state = AppState {
        store: store_dyn,
        registry: registry_dyn,
        dataset,
        events: event_tx,
        config,
    };

    TestHarness {
        state,
        store,
        registry,
        event_rx,
    }
}

async fn seed_csv(harness: &TestHarness, user: &str, file_id: &str, content: &str) -> String {
    let key = format!("user_uploads/{}/{}/{}.csv", user, file_id, file_id);
    harness.store.insert(&key, content.as_bytes());
    harness
        .registry
        .put(&FileRecord {
            user: user.to_string(),
            file_id: file_id.to_string(),
            original_filename: "data.csv".to_string(),
            s3_object_key: key.clone(),
            file_type: "text/csv".to_string(),
            upload_timestamp: Utc::now(),
            file_size: Some(content.len() as i64),
            status: "uploaded".to_string(),
            processing_status: ProcessingStatus::Pending,
            schema: None,
            processed_timestamp: None,
        })
        .await
        .unwrap();
    key
}

async fn get_json(harness: &TestHarness, uri: &str, user: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().uri(uri).method("GET");
    if let Some(user) = user {
        request = request.header("Authorization", user);
    }
    let response = create_app(harness.state.clone())
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn post_json(
    harness: &TestHarness,
    uri: &str,
    user: Option<&str>,
    body: &Value,
) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .uri(uri)
        .method("POST")
        .header("content-type", "application/json");
    if let Some(user) = user {
        request = request.header("Authorization", user);
    }
    let response = create_app(harness.state.clone())
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn statistics_for_semicolon_csv() {
    let harness = setup();
    seed_csv(&harness, "alice", "f-1", "name;age\nAda;30\nBob;25").await;

    let (status, body) = get_json(&harness, "/files/f-1/statistics/age", Some("alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["variable_name"], "age");
    assert_eq!(body["data_type_detected"], "numeric");
    assert_eq!(body["count"], 2);
    assert_eq!(body["missing_values"], 0);
    assert_eq!(body["mean"], 27.5);
    assert_eq!(body["min_val"], 25.0);
    assert_eq!(body["max_val"], 30.0);
    assert!(body["q1"].is_null());
    assert!(body["q3"].is_null());
}

#[tokio::test]
async fn statistics_for_categorical_column() {
    let harness = setup();
    seed_csv(
        &harness,
        "alice",
        "f-1",
        "name;city\nAda;London\nBob;Paris\nCid;London",
    )
    .await;

    let (status, body) = get_json(&harness, "/files/f-1/statistics/city", Some("alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data_type_detected"], "categorical");
    assert_eq!(body["unique_values_count"], 2);
    assert_eq!(body["top_frequencies"][0]["value"], "London");
    assert_eq!(body["top_frequencies"][0]["count"], 2);
}

#[tokio::test]
async fn statistics_unknown_column_is_404() {
    let harness = setup();
    seed_csv(&harness, "alice", "f-1", "name;age\nAda;30").await;

    let (status, body) =
        get_json(&harness, "/files/f-1/statistics/nonexistent", Some("alice")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nonexistent"));
}

#[tokio::test]
async fn statistics_unknown_file_is_404() {
    let harness = setup();
    let (status, _) = get_json(&harness, "/files/missing/statistics/age", Some("alice")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn statistics_requires_identity() {
    let harness = setup();
    seed_csv(&harness, "alice", "f-1", "name;age\nAda;30").await;

    let (status, _) = get_json(&harness, "/files/f-1/statistics/age", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn boxplot_reports_outliers() {
    let harness = setup();
    seed_csv(&harness, "alice", "f-1", "v\n1\n2\n3\n4\n10").await;

    let (status, body) = get_json(
        &harness,
        "/files/f-1/graph-data/boxplot/v",
        Some("alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["q1"], 2.0);
    assert_eq!(body["median"], 3.0);
    assert_eq!(body["q3"], 4.0);
    assert_eq!(body["min_val"], 1.0);
    assert_eq!(body["max_val"], 10.0);
    assert_eq!(body["outliers"], json!([10.0]));
}

#[tokio::test]
async fn boxplot_rejects_text_column() {
    let harness = setup();
    seed_csv(&harness, "alice", "f-1", "name;age\nAda;30").await;

    let (status, _) = get_json(
        &harness,
        "/files/f-1/graph-data/boxplot/name",
        Some("alice"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_lifecycle_round_trip() {
    let harness = setup();

    let (status, body) = post_json(
        &harness,
        "/files/initiate-upload",
        Some("alice"),
        &json!({"filename": "people.csv", "filetype": "text/csv"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let key = body["s3_object_key"].as_str().unwrap().to_string();
    let file_id = body["file_id"].as_str().unwrap().to_string();
    assert!(key.starts_with("user_uploads/alice/"));
    assert!(key.ends_with(".csv"));
    assert!(body["upload_url"].as_str().unwrap().contains(&key));

    // Simulate the client PUT against the presigned URL.
    harness.store.insert(&key, b"name,age\nAda,30");

    let (status, body) = post_json(
        &harness,
        "/files/confirm-upload",
        Some("alice"),
        &json!({
            "file_id": file_id,
            "s3_object_key": key,
            "original_filename": "people.csv",
            "file_type": "text/csv",
            "file_size": 15
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "uploaded");
    assert_eq!(body["processingStatus"], "pending");

    let (status, body) = get_json(&harness, "/files", Some("alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["file_id"], file_id.as_str());

    let (status, body) = get_json(
        &harness,
        &format!("/files/{}/download-url", file_id),
        Some("alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["download_url"].as_str().unwrap().contains(&key));

    let request = Request::builder()
        .uri(format!("/files/{}", file_id))
        .method("DELETE")
        .header("Authorization", "alice")
        .body(Body::empty())
        .unwrap();
    let response = create_app(harness.state.clone())
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (_, body) = get_json(&harness, "/files", Some("alice")).await;
    assert_eq!(body.as_array().unwrap().len(), 0);
    assert!(!harness.store.object_exists(&key).await.unwrap());
}

#[tokio::test]
async fn confirm_upload_requires_object_in_storage() {
    let harness = setup();

    let (status, _) = post_json(
        &harness,
        "/files/confirm-upload",
        Some("alice"),
        &json!({
            "file_id": "f-1",
            "s3_object_key": "user_uploads/alice/f-1/missing.csv",
            "original_filename": "missing.csv",
            "file_type": "text/csv"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn events_webhook_queues_extraction_events() {
    let mut harness = setup();

    let (status, body) = post_json(
        &harness,
        "/events/object-created",
        None,
        &json!({
            "Records": [
                {"s3": {"bucket": {"name": "test-bucket"},
                         "object": {"key": "user_uploads/alice/f-1/abc.csv"}}},
                {"s3": {"bucket": {"name": "test-bucket"}}}
            ]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], 1);
    assert_eq!(body["skipped"], 1);

    let event = harness.event_rx.try_recv().unwrap();
    assert_eq!(event.key, "user_uploads/alice/f-1/abc.csv");
}

#[tokio::test]
async fn extraction_schema_matches_on_demand_parse() {
    let harness = setup();
    let key = seed_csv(&harness, "alice", "f-1", "name;age\nAda;30\nBob;25").await;

    let extractor = MetadataExtractor::new(
        harness.state.store.clone(),
        harness.state.registry.clone(),
    );
    let outcomes = extractor
        .process_batch(&[ObjectCreatedEvent {
            bucket: "test-bucket".to_string(),
            key,
        }])
        .await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(
        outcomes[0].as_ref().unwrap().status,
        ProcessingStatus::ProcessedWithMetadata
    );

    let record = harness.registry.get("alice", "f-1").await.unwrap().unwrap();
    assert_eq!(record.processing_status, ProcessingStatus::ProcessedWithMetadata);
    let stored = record.schema.unwrap();

    // The statistics path re-parses from scratch; it must land on the
    // same schema the asynchronous path committed.
    let table = harness
        .state
        .dataset
        .load_table("alice", "f-1")
        .await
        .unwrap();
    assert_eq!(schema::extract(&table), stored);

    let (_, body) = get_json(&harness, "/files", Some("alice")).await;
    assert_eq!(body[0]["columnHeaders"], json!(["name", "age"]));
    assert_eq!(body[0]["rowCount"], 2);
    assert_eq!(body[0]["columnCount"], 2);
}

#[tokio::test]
async fn extraction_isolates_failures_within_a_batch() {
    let harness = setup();

    // First object is declared as an unsupported binary; second is fine.
    let bad_key = "user_uploads/alice/f-bad/blob.bin".to_string();
    harness.store.insert(&bad_key, b"\x00\x01\x02");
    harness
        .registry
        .put(&FileRecord {
            user: "alice".to_string(),
            file_id: "f-bad".to_string(),
            original_filename: "blob.bin".to_string(),
            s3_object_key: bad_key.clone(),
            file_type: "application/octet-stream".to_string(),
            upload_timestamp: Utc::now(),
            file_size: None,
            status: "uploaded".to_string(),
            processing_status: ProcessingStatus::Pending,
            schema: None,
            processed_timestamp: None,
        })
        .await
        .unwrap();
    let good_key = seed_csv(&harness, "alice", "f-good", "a,b\n1,2").await;

    let extractor = MetadataExtractor::new(
        harness.state.store.clone(),
        harness.state.registry.clone(),
    );
    let outcomes = extractor
        .process_batch(&[
            ObjectCreatedEvent {
                bucket: "test-bucket".to_string(),
                key: bad_key,
            },
            ObjectCreatedEvent {
                bucket: "test-bucket".to_string(),
                key: good_key,
            },
        ])
        .await;

    assert_eq!(
        outcomes[0].as_ref().unwrap().status,
        ProcessingStatus::UnsupportedFileType
    );
    assert_eq!(
        outcomes[1].as_ref().unwrap().status,
        ProcessingStatus::ProcessedWithMetadata
    );

    let bad = harness.registry.get("alice", "f-bad").await.unwrap().unwrap();
    assert_eq!(bad.processing_status, ProcessingStatus::UnsupportedFileType);
    assert!(bad.schema.is_none());
}

#[tokio::test]
async fn extraction_records_storage_read_failures() {
    let harness = setup();
    seed_csv(&harness, "alice", "f-1", "a,b\n1,2").await;
    // Object vanished between the event and the read.
    harness
        .store
        .delete_object("user_uploads/alice/f-1/f-1.csv")
        .await
        .unwrap();

    let extractor = MetadataExtractor::new(
        harness.state.store.clone(),
        harness.state.registry.clone(),
    );
    let outcomes = extractor
        .process_batch(&[ObjectCreatedEvent {
            bucket: "test-bucket".to_string(),
            key: "user_uploads/alice/f-1/f-1.csv".to_string(),
        }])
        .await;

    assert_eq!(
        outcomes[0].as_ref().unwrap().status,
        ProcessingStatus::ErrorS3Read
    );
    let record = harness.registry.get("alice", "f-1").await.unwrap().unwrap();
    assert_eq!(record.processing_status, ProcessingStatus::ErrorS3Read);
}

#[tokio::test]
async fn worker_drains_events_until_shutdown() {
    let harness = setup();
    let key = seed_csv(&harness, "alice", "f-1", "name,age\nAda,30").await;

    let extractor = Arc::new(MetadataExtractor::new(
        harness.state.store.clone(),
        harness.state.registry.clone(),
    ));
    let (event_tx, event_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = ExtractionWorker::new(extractor, event_rx, shutdown_rx);
    let handle = tokio::spawn(worker.run());

    event_tx
        .send(ObjectCreatedEvent {
            bucket: "test-bucket".to_string(),
            key,
        })
        .await
        .unwrap();

    // Wait for the worker to pick the event up and record the outcome.
    let mut processed = false;
    for _ in 0..50 {
        let record = harness.registry.get("alice", "f-1").await.unwrap().unwrap();
        if record.processing_status.is_terminal() {
            assert_eq!(
                record.processing_status,
                ProcessingStatus::ProcessedWithMetadata
            );
            processed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(processed, "worker never recorded the extraction outcome");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker did not stop after shutdown signal")
        .unwrap();
}

#[tokio::test]
async fn stats_and_extraction_agree_after_fresh_parse() {
    // Determinism check across the two independent paths over identical
    // bytes: headers derived by the extractor equal the headers the
    // statistics handler resolves columns against.
    let harness = setup();
    let key = seed_csv(&harness, "alice", "f-1", "col a;col b\n1;x\n2;y").await;

    let extractor = MetadataExtractor::new(
        harness.state.store.clone(),
        harness.state.registry.clone(),
    );
    extractor
        .process_batch(&[ObjectCreatedEvent {
            bucket: "test-bucket".to_string(),
            key: key.clone(),
        }])
        .await;

    let record = harness.registry.get("alice", "f-1").await.unwrap().unwrap();
    for header in &record.schema.unwrap().headers {
        let (status, _) = get_json(
            &harness,
            &format!("/files/f-1/statistics/{}", header.replace(' ', "%20")),
            Some("alice"),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "column '{}' not resolvable", header);
    }

    // Byte-identical input yields a byte-identical table.
    let bytes = harness.store.get_object(&key).await.unwrap();
    let first = parser::parse(&bytes, Some("text/csv"), "data.csv").unwrap();
    let second = parser::parse(&bytes, Some("text/csv"), "data.csv").unwrap();
    assert_eq!(first, second);
}
