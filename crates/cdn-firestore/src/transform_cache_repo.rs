//! Rendition metadata repository (`transform_cache/{file_id}_{cache_key}`).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use cdn_models::{cache_document_id, TransformCacheRecord};

use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::store::TransformCacheStore;
use crate::types::{Document, ToFirestoreValue, Value, Write};

pub const TRANSFORM_CACHE_COLLECTION: &str = "transform_cache";

#[derive(Clone)]
pub struct TransformCacheRepository {
    client: FirestoreClient,
}

impl TransformCacheRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TransformCacheStore for TransformCacheRepository {
    async fn get_cached(
        &self,
        file_id: &str,
        cache_key: &str,
    ) -> FirestoreResult<Option<TransformCacheRecord>> {
        let doc_id = cache_document_id(file_id, cache_key);
        match self
            .client
            .get_document(TRANSFORM_CACHE_COLLECTION, &doc_id)
            .await?
        {
            Some(doc) => Ok(Some(document_to_record(&doc)?)),
            None => Ok(None),
        }
    }

    async fn put_cached(&self, record: &TransformCacheRecord) -> FirestoreResult<()> {
        self.client
            .create_document(
                TRANSFORM_CACHE_COLLECTION,
                &record.document_id(),
                record_to_fields(record),
            )
            .await?;
        info!(
            file_id = %record.file_id,
            cache_key = %record.cache_key,
            size_bytes = record.size_bytes,
            "Stored transform cache record"
        );
        Ok(())
    }

    async fn record_hit(&self, file_id: &str, cache_key: &str) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("last_accessed_at".to_string(), Utc::now().to_firestore_value());

        let write = Write::increment(
            self.client
                .full_document_name(TRANSFORM_CACHE_COLLECTION, &cache_document_id(file_id, cache_key)),
            fields,
            &["request_count"],
            1,
            true,
        );
        self.client.batch_write(vec![write]).await?;
        Ok(())
    }
}

fn record_to_fields(record: &TransformCacheRecord) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("file_id".to_string(), record.file_id.to_firestore_value());
    fields.insert("cache_key".to_string(), record.cache_key.to_firestore_value());
    fields.insert("descriptor".to_string(), record.descriptor.to_firestore_value());
    fields.insert("storage_key".to_string(), record.storage_key.to_firestore_value());
    fields.insert("content_type".to_string(), record.content_type.to_firestore_value());
    fields.insert("size_bytes".to_string(), record.size_bytes.to_firestore_value());
    fields.insert("request_count".to_string(), record.request_count.to_firestore_value());
    fields.insert("created_at".to_string(), record.created_at.to_firestore_value());
    fields.insert(
        "last_accessed_at".to_string(),
        record.last_accessed_at.to_firestore_value(),
    );

    if let Some(width) = record.width {
        fields.insert("width".to_string(), width.to_firestore_value());
    }
    if let Some(height) = record.height {
        fields.insert("height".to_string(), height.to_firestore_value());
    }

    fields
}

fn document_to_record(doc: &Document) -> FirestoreResult<TransformCacheRecord> {
    let fields = doc.reader()?;
    let created_at = fields.get("created_at").unwrap_or_else(Utc::now);

    Ok(TransformCacheRecord {
        file_id: fields.require("file_id")?,
        cache_key: fields.require("cache_key")?,
        descriptor: fields.string("descriptor"),
        storage_key: fields.require("storage_key")?,
        content_type: fields.require("content_type")?,
        size_bytes: fields.u64("size_bytes"),
        width: fields.get("width"),
        height: fields.get("height"),
        request_count: fields.u64("request_count"),
        created_at,
        last_accessed_at: fields.get("last_accessed_at").unwrap_or(created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FirestoreConfig;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo(server: &MockServer) -> TransformCacheRepository {
        let config = FirestoreConfig::emulator("test-project", server.address().to_string());
        TransformCacheRepository::new(FirestoreClient::new(config).unwrap())
    }

    fn sample() -> TransformCacheRecord {
        TransformCacheRecord::new(
            "file-1",
            "0123456789abcdef",
            "transforms/file-1/0123456789abcdef",
            "image/webp",
            512,
        )
        .with_descriptor("w_800,f_webp")
        .with_dimensions(Some(800), None)
    }

    #[test]
    fn test_record_field_roundtrip() {
        let record = sample();
        let parsed = document_to_record(&Document::new(record_to_fields(&record))).unwrap();
        assert_eq!(parsed.document_id(), record.document_id());
        assert_eq!(parsed.descriptor, "w_800,f_webp");
        assert_eq!(parsed.width, Some(800));
        assert_eq!(parsed.height, None);
        assert_eq!(parsed.created_at.timestamp(), record.created_at.timestamp());
    }

    #[tokio::test]
    async fn test_put_cached_is_create_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/documents/transform_cache$"))
            .and(query_param("documentId", "file-1_0123456789abcdef"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"fields": {}})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"/documents/transform_cache$"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let repo = repo(&server);
        repo.put_cached(&sample()).await.unwrap();
        let err = repo.put_cached(&sample()).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_record_hit_requires_existing_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":batchWrite$"))
            .and(body_partial_json(json!({
                "writes": [{
                    "updateMask": {"fieldPaths": ["last_accessed_at"]},
                    "updateTransforms": [{"fieldPath": "request_count"}],
                    "currentDocument": {"exists": true}
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "writeResults": [{}],
                "status": [{}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        repo(&server).record_hit("file-1", "0123456789abcdef").await.unwrap();
    }
}
