//! File metadata repository (`files/{file_id}`).

use async_trait::async_trait;
use chrono::Utc;

use cdn_models::FileRecord;

use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::store::FileStore;
use crate::types::Document;

pub const FILES_COLLECTION: &str = "files";

#[derive(Clone)]
pub struct FileRepository {
    client: FirestoreClient,
}

impl FileRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FileStore for FileRepository {
    async fn get_file(&self, file_id: &str) -> FirestoreResult<Option<FileRecord>> {
        match self.client.get_document(FILES_COLLECTION, file_id).await? {
            Some(doc) => Ok(Some(document_to_file(file_id, &doc)?)),
            None => Ok(None),
        }
    }
}

fn document_to_file(file_id: &str, doc: &Document) -> FirestoreResult<FileRecord> {
    let fields = doc.reader()?;

    Ok(FileRecord {
        id: file_id.to_string(),
        storage_key: fields.require("storage_key")?,
        content_type: fields
            .get("content_type")
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        size_bytes: fields.u64("size_bytes"),
        name: fields.string("name"),
        updated_at: fields
            .get("updated_at")
            .or_else(|| fields.get("created_at"))
            .unwrap_or_else(Utc::now),
    })
}
