//! Firestore REST API types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{FirestoreError, FirestoreResult};

/// Firestore document value types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(String), // Firestore sends integers as strings
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(serde_json::Value),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    pub fields: Option<HashMap<String, Value>>,
}

/// Firestore document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Document fields
    pub fields: Option<HashMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl Document {
    /// Create a new document with the given fields.
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self {
            fields: Some(fields),
            ..Default::default()
        }
    }

    /// Named document, as batch writes require.
    pub fn named(name: impl Into<String>, fields: HashMap<String, Value>) -> Self {
        Self {
            name: Some(name.into()),
            fields: Some(fields),
            ..Default::default()
        }
    }

    /// Typed view over the fields; errors on a field-less document.
    pub fn reader(&self) -> FirestoreResult<FieldReader<'_>> {
        self.fields
            .as_ref()
            .map(FieldReader)
            .ok_or_else(|| FirestoreError::invalid_response("Document has no fields"))
    }
}

/// Typed getters over a document's fields. Missing or mistyped fields read as `None`.
pub struct FieldReader<'a>(&'a HashMap<String, Value>);

impl<'a> FieldReader<'a> {
    pub fn get<T: FromFirestoreValue>(&self, key: &str) -> Option<T> {
        self.0.get(key).and_then(T::from_firestore_value)
    }

    pub fn string(&self, key: &str) -> String {
        self.get(key).unwrap_or_default()
    }

    pub fn u64(&self, key: &str) -> u64 {
        self.get::<u64>(key).unwrap_or(0)
    }

    /// Required field; a missing value is an invalid document.
    pub fn require<T: FromFirestoreValue>(&self, key: &str) -> FirestoreResult<T> {
        self.get(key)
            .ok_or_else(|| FirestoreError::invalid_response(format!("missing field '{}'", key)))
    }
}

// ============================================================================
// Batch Write Types
// ============================================================================

/// A single write operation in a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Write {
    /// Update or insert a document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Document>,

    /// Delete a document by name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<String>,

    /// Field mask for partial updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_mask: Option<DocumentMask>,

    /// Server-side transforms applied after the update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_transforms: Option<Vec<FieldTransform>>,

    /// Precondition for the write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_document: Option<Precondition>,
}

impl Write {
    /// Merge `fields` into `name` and atomically add `by` to each of `counters`.
    ///
    /// With `must_exist` the write fails instead of creating the document.
    pub fn increment(
        name: impl Into<String>,
        fields: HashMap<String, Value>,
        counters: &[&str],
        by: i64,
        must_exist: bool,
    ) -> Self {
        let mask: Vec<String> = fields.keys().cloned().collect();
        Self {
            update: Some(Document::named(name, fields)),
            update_mask: Some(DocumentMask { field_paths: mask }),
            update_transforms: Some(
                counters
                    .iter()
                    .map(|field| FieldTransform::increment(*field, by))
                    .collect(),
            ),
            current_document: must_exist.then(|| Precondition {
                exists: Some(true),
                update_time: None,
            }),
            ..Default::default()
        }
    }
}

/// Document field mask for partial updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMask {
    pub field_paths: Vec<String>,
}

/// Precondition for a write operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Precondition {
    /// Document must (or must not) exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,

    /// Document must have this update time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

/// A server-side field transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTransform {
    pub field_path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub increment: Option<Value>,

    /// Only `REQUEST_TIME` is defined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_to_server_value: Option<String>,
}

impl FieldTransform {
    pub fn increment(field_path: impl Into<String>, by: i64) -> Self {
        Self {
            field_path: field_path.into(),
            increment: Some(by.to_firestore_value()),
            set_to_server_value: None,
        }
    }
}

/// Batch write request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWriteRequest {
    pub writes: Vec<Write>,
}

/// Result of a single write in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    /// Update time of the written document.
    pub update_time: Option<String>,

    /// Post-transform values, in `update_transforms` order.
    #[serde(default)]
    pub transform_results: Option<Vec<Value>>,
}

/// Status of a single write in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// gRPC status code (0 = OK).
    pub code: Option<i32>,
    /// Error message if failed.
    pub message: Option<String>,
}

/// Batch write response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWriteResponse {
    /// Results for each write, in order.
    pub write_results: Option<Vec<WriteResult>>,
    /// Status for each write, in order.
    pub status: Option<Vec<Status>>,
}

impl BatchWriteResponse {
    /// Create an empty response for empty batch writes.
    pub fn empty() -> Self {
        Self {
            write_results: Some(vec![]),
            status: Some(vec![]),
        }
    }

    /// Fail on the first non-OK write status.
    pub fn check_for_errors(&self) -> FirestoreResult<()> {
        let Some(statuses) = &self.status else {
            return Ok(());
        };
        for (i, status) in statuses.iter().enumerate() {
            if let Some(code) = status.code.filter(|c| *c != 0) {
                let msg = status.message.as_deref().unwrap_or("Unknown error");
                return Err(FirestoreError::from_grpc_code(
                    code,
                    format!("Batch write failed at index {}: {} (code {})", i, msg, code),
                ));
            }
        }
        Ok(())
    }

    /// Transform result `transform` of write `write`.
    pub fn transform_result(&self, write: usize, transform: usize) -> Option<&Value> {
        self.write_results
            .as_ref()?
            .get(write)?
            .transform_results
            .as_ref()?
            .get(transform)
    }
}

// ============================================================================
// Value Conversion
// ============================================================================

/// Convert a Rust value to Firestore Value.
pub trait ToFirestoreValue {
    fn to_firestore_value(&self) -> Value;
}

impl ToFirestoreValue for String {
    fn to_firestore_value(&self) -> Value {
        Value::StringValue(self.clone())
    }
}

impl ToFirestoreValue for &str {
    fn to_firestore_value(&self) -> Value {
        Value::StringValue(self.to_string())
    }
}

impl ToFirestoreValue for i64 {
    fn to_firestore_value(&self) -> Value {
        Value::IntegerValue(self.to_string())
    }
}

impl ToFirestoreValue for u32 {
    fn to_firestore_value(&self) -> Value {
        Value::IntegerValue(self.to_string())
    }
}

impl ToFirestoreValue for u64 {
    fn to_firestore_value(&self) -> Value {
        Value::IntegerValue(self.to_string())
    }
}

impl ToFirestoreValue for bool {
    fn to_firestore_value(&self) -> Value {
        Value::BooleanValue(*self)
    }
}

impl ToFirestoreValue for DateTime<Utc> {
    fn to_firestore_value(&self) -> Value {
        Value::TimestampValue(self.to_rfc3339())
    }
}

impl<T: ToFirestoreValue> ToFirestoreValue for Option<T> {
    fn to_firestore_value(&self) -> Value {
        match self {
            Some(v) => v.to_firestore_value(),
            None => Value::NullValue(()),
        }
    }
}

impl<T: ToFirestoreValue> ToFirestoreValue for Vec<T> {
    fn to_firestore_value(&self) -> Value {
        Value::ArrayValue(ArrayValue {
            values: Some(self.iter().map(|v| v.to_firestore_value()).collect()),
        })
    }
}

/// Convert Firestore Value to Rust type.
pub trait FromFirestoreValue: Sized {
    fn from_firestore_value(value: &Value) -> Option<Self>;
}

impl FromFirestoreValue for String {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::StringValue(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromFirestoreValue for u32 {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::IntegerValue(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromFirestoreValue for u64 {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::IntegerValue(s) => s.parse().ok(),
            Value::DoubleValue(f) if *f >= 0.0 => Some(*f as u64),
            _ => None,
        }
    }
}

impl FromFirestoreValue for bool {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::BooleanValue(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromFirestoreValue for DateTime<Utc> {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::TimestampValue(s) => DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.into()),
            _ => None,
        }
    }
}

impl<T: FromFirestoreValue> FromFirestoreValue for Vec<T> {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::ArrayValue(array) => Some(
                array
                    .values
                    .iter()
                    .flatten()
                    .filter_map(T::from_firestore_value)
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// `Option` fields stored as explicit nulls read back as present-but-empty.
impl<T: FromFirestoreValue> FromFirestoreValue for Option<T> {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::NullValue(()) => Some(None),
            other => T::from_firestore_value(other).map(Some),
        }
    }
}
