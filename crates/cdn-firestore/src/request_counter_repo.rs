//! Request-frequency counters (`transform_requests/{file_id}_{cache_key}`).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;

use cdn_models::cache_document_id;

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::store::RequestCounterStore;
use crate::types::{FromFirestoreValue, ToFirestoreValue, Write};

pub const REQUEST_COUNTERS_COLLECTION: &str = "transform_requests";

#[derive(Clone)]
pub struct RequestCounterRepository {
    client: FirestoreClient,
}

impl RequestCounterRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RequestCounterStore for RequestCounterRepository {
    /// Upserting increment; the server returns the new value as a transform result.
    async fn increment_request_count(
        &self,
        file_id: &str,
        cache_key: &str,
    ) -> FirestoreResult<u64> {
        let mut fields = HashMap::new();
        fields.insert("file_id".to_string(), file_id.to_firestore_value());
        fields.insert("cache_key".to_string(), cache_key.to_firestore_value());
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

        let write = Write::increment(
            self.client
                .full_document_name(REQUEST_COUNTERS_COLLECTION, &cache_document_id(file_id, cache_key)),
            fields,
            &["count"],
            1,
            false,
        );

        let response = self.client.batch_write(vec![write]).await?;
        response
            .transform_result(0, 0)
            .and_then(u64::from_firestore_value)
            .ok_or_else(|| FirestoreError::invalid_response("increment returned no transform result"))
    }
}
