use crate::models::{FileRecord, ProcessingStatus};
use crate::tabular::schema::TableSchema;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Outcome of one extraction run. Applied to a record exactly once; the
/// schema fields are only present for a successful parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub status: ProcessingStatus,
    pub schema: Option<TableSchema>,
    pub processed_at: DateTime<Utc>,
}

/// Key-value metadata store seam, keyed by (user, file_id).
#[async_trait]
pub trait FileRegistry: Send + Sync {
    async fn get(&self, user: &str, file_id: &str) -> Result<Option<FileRecord>>;
    async fn put(&self, record: &FileRecord) -> Result<()>;
    async fn list(&self, user: &str) -> Result<Vec<FileRecord>>;
    async fn delete(&self, user: &str, file_id: &str) -> Result<Option<FileRecord>>;
    /// Single terminal write of the asynchronous path (`pending` leaves
    /// exactly once). Uses a conditional attribute set, not a full replace,
    /// so the upload-time fields are never touched.
    async fn record_extraction(
        &self,
        user: &str,
        file_id: &str,
        result: &ExtractionResult,
    ) -> Result<()>;
}

pub struct DynamoFileRegistry {
    client: Client,
    table: String,
}

impl DynamoFileRegistry {
    pub fn new(client: Client, table: String) -> Self {
        Self { client, table }
    }
}

#[async_trait]
impl FileRegistry for DynamoFileRegistry {
    async fn get(&self, user: &str, file_id: &str) -> Result<Option<FileRecord>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("user", AttributeValue::S(user.to_string()))
            .key("file_id", AttributeValue::S(file_id.to_string()))
            .send()
            .await
            .context("dynamodb get_item failed")?;

        output.item().map(record_from_item).transpose()
    }

    async fn put(&self, record: &FileRecord) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(record_to_item(record)))
            .send()
            .await
            .context("dynamodb put_item failed")?;
        Ok(())
    }

    async fn list(&self, user: &str) -> Result<Vec<FileRecord>> {
        // "user" is a DynamoDB reserved word, so the key condition needs an
        // attribute-name alias.
        let output = self
            .client
            .query()
            .table_name(&self.table)
            .key_condition_expression("#u = :u")
            .expression_attribute_names("#u", "user")
            .expression_attribute_values(":u", AttributeValue::S(user.to_string()))
            .send()
            .await
            .context("dynamodb query failed")?;

        // Items another writer left half-populated are skipped, not fatal.
        Ok(output
            .items()
            .iter()
            .filter_map(|item| match record_from_item(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping malformed registry item: {e:#}");
                    None
                }
            })
            .collect())
    }

    async fn delete(&self, user: &str, file_id: &str) -> Result<Option<FileRecord>> {
        let output = self
            .client
            .delete_item()
            .table_name(&self.table)
            .key("user", AttributeValue::S(user.to_string()))
            .key("file_id", AttributeValue::S(file_id.to_string()))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .context("dynamodb delete_item failed")?;

        output.attributes().map(record_from_item).transpose()
    }

    async fn record_extraction(
        &self,
        user: &str,
        file_id: &str,
        result: &ExtractionResult,
    ) -> Result<()> {
        let mut expression_parts = vec!["processingStatus = :ps"];
        let mut values = HashMap::from([(
            ":ps".to_string(),
            AttributeValue::S(result.status.as_str().to_string()),
        )]);

        if let Some(schema) = &result.schema {
            expression_parts.push("columnHeaders = :ch");
            values.insert(
                ":ch".to_string(),
                AttributeValue::L(
                    schema
                        .headers
                        .iter()
                        .map(|h| AttributeValue::S(h.clone()))
                        .collect(),
                ),
            );
            expression_parts.push("rowCount = :rc");
            values.insert(
                ":rc".to_string(),
                AttributeValue::N(schema.row_count.to_string()),
            );
            expression_parts.push("columnCount = :cc");
            values.insert(
                ":cc".to_string(),
                AttributeValue::N(schema.column_count.to_string()),
            );
            expression_parts.push("processedTimestamp = :pt");
            values.insert(
                ":pt".to_string(),
                AttributeValue::S(result.processed_at.to_rfc3339()),
            );
        }

        self.client
            .update_item()
            .table_name(&self.table)
            .key("user", AttributeValue::S(user.to_string()))
            .key("file_id", AttributeValue::S(file_id.to_string()))
            .update_expression(format!("SET {}", expression_parts.join(", ")))
            .set_expression_attribute_values(Some(values))
            .send()
            .await
            .context("dynamodb update_item failed")?;
        Ok(())
    }
}

fn record_to_item(record: &FileRecord) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::from([
        (
            "user".to_string(),
            AttributeValue::S(record.user.clone()),
        ),
        (
            "file_id".to_string(),
            AttributeValue::S(record.file_id.clone()),
        ),
        (
            "original_filename".to_string(),
            AttributeValue::S(record.original_filename.clone()),
        ),
        (
            "s3_object_key".to_string(),
            AttributeValue::S(record.s3_object_key.clone()),
        ),
        (
            "file_type".to_string(),
            AttributeValue::S(record.file_type.clone()),
        ),
        (
            "upload_timestamp".to_string(),
            AttributeValue::S(record.upload_timestamp.to_rfc3339()),
        ),
        (
            "status".to_string(),
            AttributeValue::S(record.status.clone()),
        ),
        (
            "processingStatus".to_string(),
            AttributeValue::S(record.processing_status.as_str().to_string()),
        ),
    ]);

    if let Some(size) = record.file_size {
        item.insert("file_size".to_string(), AttributeValue::N(size.to_string()));
    }
    if let Some(schema) = &record.schema {
        item.insert(
            "columnHeaders".to_string(),
            AttributeValue::L(
                schema
                    .headers
                    .iter()
                    .map(|h| AttributeValue::S(h.clone()))
                    .collect(),
            ),
        );
        item.insert(
            "rowCount".to_string(),
            AttributeValue::N(schema.row_count.to_string()),
        );
        item.insert(
            "columnCount".to_string(),
            AttributeValue::N(schema.column_count.to_string()),
        );
    }
    if let Some(processed) = record.processed_timestamp {
        item.insert(
            "processedTimestamp".to_string(),
            AttributeValue::S(processed.to_rfc3339()),
        );
    }

    item
}

fn record_from_item(item: &HashMap<String, AttributeValue>) -> Result<FileRecord> {
    let schema = match (
        string_list_attr(item, "columnHeaders"),
        number_attr(item, "rowCount"),
        number_attr(item, "columnCount"),
    ) {
        (Some(headers), Some(row_count), Some(column_count)) => Some(TableSchema {
            headers,
            row_count: row_count as usize,
            column_count: column_count as usize,
        }),
        _ => None,
    };

    Ok(FileRecord {
        user: string_attr(item, "user").ok_or_else(|| anyhow!("item missing 'user'"))?,
        file_id: string_attr(item, "file_id").ok_or_else(|| anyhow!("item missing 'file_id'"))?,
        original_filename: string_attr(item, "original_filename").unwrap_or_default(),
        s3_object_key: string_attr(item, "s3_object_key")
            .ok_or_else(|| anyhow!("item missing 's3_object_key'"))?,
        file_type: string_attr(item, "file_type").unwrap_or_default(),
        upload_timestamp: timestamp_attr(item, "upload_timestamp")
            .ok_or_else(|| anyhow!("item missing 'upload_timestamp'"))?,
        file_size: number_attr(item, "file_size"),
        status: string_attr(item, "status").unwrap_or_else(|| "uploaded".to_string()),
        processing_status: string_attr(item, "processingStatus")
            .and_then(|s| ProcessingStatus::parse(&s))
            .unwrap_or(ProcessingStatus::Pending),
        schema,
        processed_timestamp: timestamp_attr(item, "processedTimestamp"),
    })
}

fn string_attr(item: &HashMap<String, AttributeValue>, name: &str) -> Option<String> {
    item.get(name).and_then(|v| v.as_s().ok()).cloned()
}

fn number_attr(item: &HashMap<String, AttributeValue>, name: &str) -> Option<i64> {
    item.get(name)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
}

fn string_list_attr(item: &HashMap<String, AttributeValue>, name: &str) -> Option<Vec<String>> {
    item.get(name).and_then(|v| v.as_l().ok()).map(|list| {
        list.iter()
            .filter_map(|v| v.as_s().ok().cloned())
            .collect()
    })
}

fn timestamp_attr(item: &HashMap<String, AttributeValue>, name: &str) -> Option<DateTime<Utc>> {
    string_attr(item, name)
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
