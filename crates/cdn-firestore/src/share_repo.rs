//! Share repository.
//!
//! Shares live at `shares/{token}` so public lookups are a single document GET.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use cdn_models::Share;

use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::store::ShareStore;
use crate::types::{Document, Write};

pub const SHARES_COLLECTION: &str = "shares";

/// Repository for share documents.
#[derive(Clone)]
pub struct ShareRepository {
    client: FirestoreClient,
}

impl ShareRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    async fn increment(&self, token: &str, counter: &str) -> FirestoreResult<()> {
        let write = Write::increment(
            self.client.full_document_name(SHARES_COLLECTION, token),
            HashMap::new(),
            &[counter],
            1,
            true,
        );
        self.client.batch_write(vec![write]).await?;
        debug!(counter = %counter, "Incremented share counter");
        Ok(())
    }
}

#[async_trait]
impl ShareStore for ShareRepository {
    async fn get_share_by_token(&self, token: &str) -> FirestoreResult<Option<Share>> {
        match self.client.get_document(SHARES_COLLECTION, token).await? {
            Some(doc) => Ok(Some(document_to_share(token, &doc)?)),
            None => Ok(None),
        }
    }

    async fn increment_access_count(&self, token: &str) -> FirestoreResult<()> {
        self.increment(token, "access_count").await
    }

    async fn increment_download_count(&self, token: &str) -> FirestoreResult<()> {
        self.increment(token, "download_count").await
    }

    /// A GET of a document that never exists still proves auth and reachability.
    async fn check_connectivity(&self) -> FirestoreResult<()> {
        self.client
            .get_document(SHARES_COLLECTION, "__readiness_probe__")
            .await
            .map(|_| ())
    }
}

// ============================================================================
// Field Conversion Helpers
// ============================================================================

fn document_to_share(token: &str, doc: &Document) -> FirestoreResult<Share> {
    let fields = doc.reader()?;

    Ok(Share {
        id: fields.string("id"),
        token: fields.get("token").unwrap_or_else(|| token.to_string()),
        file_id: fields.require("file_id")?,
        expires_at: fields.get::<Option<DateTime<Utc>>>("expires_at").flatten(),
        password_hash: fields
            .get::<Option<String>>("password_hash")
            .flatten()
            .filter(|h| !h.is_empty()),
        max_downloads: fields.get::<Option<u64>>("max_downloads").flatten(),
        access_count: fields.u64("access_count"),
        download_count: fields.u64("download_count"),
        allowed_transforms: fields.get("allowed_transforms").unwrap_or_default(),
        created_at: fields.get("created_at").unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FirestoreConfig;
    use crate::types::{ToFirestoreValue, Value};
    use chrono::Duration;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Document fields as the share owner's service writes them.
    fn share_to_fields(share: &Share) -> HashMap<String, Value> {
        let mut fields = HashMap::new();
        fields.insert("id".to_string(), share.id.to_firestore_value());
        fields.insert("token".to_string(), share.token.to_firestore_value());
        fields.insert("file_id".to_string(), share.file_id.to_firestore_value());
        fields.insert("access_count".to_string(), share.access_count.to_firestore_value());
        fields.insert("download_count".to_string(), share.download_count.to_firestore_value());
        fields.insert(
            "allowed_transforms".to_string(),
            share.allowed_transforms.to_firestore_value(),
        );
        fields.insert("created_at".to_string(), share.created_at.to_firestore_value());

        if let Some(expires) = share.expires_at {
            fields.insert("expires_at".to_string(), expires.to_firestore_value());
        }
        if let Some(hash) = &share.password_hash {
            fields.insert("password_hash".to_string(), hash.to_firestore_value());
        }
        if let Some(max) = share.max_downloads {
            fields.insert("max_downloads".to_string(), max.to_firestore_value());
        }

        fields
    }

    fn repo(server: &MockServer) -> ShareRepository {
        let config = FirestoreConfig::emulator("test-project", server.address().to_string());
        ShareRepository::new(FirestoreClient::new(config).unwrap())
    }

    #[test]
    fn test_share_field_roundtrip() {
        let mut share = Share::new("file-1")
            .with_expiry(Utc::now() + Duration::days(1))
            .with_password_hash("$2b$04$hash")
            .with_max_downloads(5)
            .with_allowed_transforms(["w_800", "*"]);
        share.download_count = 2;

        let doc = Document::new(share_to_fields(&share));
        let parsed = document_to_share(&share.token, &doc).unwrap();

        assert_eq!(parsed.id, share.id);
        assert_eq!(parsed.file_id, "file-1");
        assert_eq!(parsed.password_hash.as_deref(), Some("$2b$04$hash"));
        assert_eq!(parsed.max_downloads, Some(5));
        assert_eq!(parsed.download_count, 2);
        assert_eq!(parsed.allowed_transforms, vec!["w_800", "*"]);
        assert_eq!(
            parsed.expires_at.map(|t| t.timestamp()),
            share.expires_at.map(|t| t.timestamp())
        );
    }

    #[test]
    fn test_document_without_file_id_is_invalid() {
        let mut fields = HashMap::new();
        fields.insert("id".to_string(), "s".to_firestore_value());
        assert!(document_to_share("tok", &Document::new(fields)).is_err());
    }

    #[test]
    fn test_null_optionals_read_as_absent() {
        let mut fields = HashMap::new();
        fields.insert("file_id".to_string(), "f".to_firestore_value());
        fields.insert("max_downloads".to_string(), Value::NullValue(()));
        fields.insert("expires_at".to_string(), Value::NullValue(()));
        let share = document_to_share("tok", &Document::new(fields)).unwrap();
        assert_eq!(share.token, "tok");
        assert!(share.max_downloads.is_none());
        assert!(share.expires_at.is_none());
        assert!(share.allowed_transforms.is_empty());
    }

    #[tokio::test]
    async fn test_get_share_by_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"/documents/shares/abcd1234$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "fields": {
                    "id": {"stringValue": "share-1"},
                    "file_id": {"stringValue": "file-1"},
                    "download_count": {"integerValue": "4"},
                    "max_downloads": {"integerValue": "4"}
                }
            })))
            .mount(&server)
            .await;

        let share = repo(&server)
            .get_share_by_token("abcd1234")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(share.id, "share-1");
        assert!(share.download_limit_reached());
    }

    #[tokio::test]
    async fn test_increment_download_count_sends_transform() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":batchWrite$"))
            .and(body_partial_json(json!({
                "writes": [{
                    "updateTransforms": [{
                        "fieldPath": "download_count",
                        "increment": {"integerValue": "1"}
                    }],
                    "currentDocument": {"exists": true}
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "writeResults": [{"updateTime": "2024-01-01T00:00:00Z"}],
                "status": [{}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        repo(&server).increment_download_count("abcd1234").await.unwrap();
    }
}
