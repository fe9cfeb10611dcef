//! Document shape and the field names docvault stamps onto derived copies.

use serde_json::{Map, Value};

/// An opaque JSON document as stored in a container.
pub type Document = Map<String, Value>;

/// Identifier field every stored document carries.
pub const ID_FIELD: &str = "id";
/// Source identifier recorded on a backup copy.
pub const ID_ORIGINAL_FIELD: &str = "idOriginal";
/// RFC 3339 UTC timestamp recorded on a backup copy.
pub const BACKUP_DATE_FIELD: &str = "backupDate";
/// Name of the job that produced a backup or cleaned document.
pub const JOB_NAME_FIELD: &str = "jobName";

/// Return the document's `id` when it is a string.
#[must_use]
pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// Return the value stored under the partition-key field, if present and non-null.
#[must_use]
pub fn partition_key_value<'a>(doc: &'a Document, field: &str) -> Option<&'a Value> {
    doc.get(field).filter(|v| !v.is_null())
}
