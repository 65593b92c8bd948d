//! The two write helpers: artist upsert and dataset row append.
//!
//! Both check their arguments locally before touching the store, and both
//! turn every store failure into [`WriteError::StoreOperation`] after logging
//! the cause at error level. Nothing is retried.

use log::{debug, error};
use serde_json::Value;

use crate::data_types::{Document, ARTISTS_COLLECTION, DATASETS_COLLECTION, SONG_ID_FIELD};
use crate::database::DocumentStore;
use crate::errors::{StoreError, WriteError, WriteResult};

// --| Artist Upsert ------------------
// --|---------------------------------
/// Merge `payload` into `artists/{style_id}`. Fields already stored but absent
/// from `payload` are kept.
pub async fn upsert_artist<S>(store: &S, style_id: &str, payload: &Value) -> WriteResult<()>
where
  S: DocumentStore + ?Sized,
{
  if style_id.is_empty() {
    error!("style_id is required for upsert_artist");
    return Err(WriteError::InvalidArgument("style_id must not be empty".to_string()));
  }

  let fields = as_document(payload, "payload")?;

  match store.merge_document(ARTISTS_COLLECTION, style_id, fields).await {
    Ok(()) => {
      debug!("Upserted artist {}", style_id);
      Ok(())
    }
    Err(e) => {
      error!("Failed to upsert artist {}: {}", style_id, describe(&e));
      Err(WriteError::StoreOperation(e))
    }
  }
}

// --| Dataset Row Append -------------
// --|---------------------------------
/// Write `row` into `datasets`. A non-empty string `song_id` becomes the
/// document id and fully replaces whatever was there; without one the store
/// picks a fresh id. Returns the id the row was written under.
pub async fn add_dataset_row<S>(store: &S, row: &Value) -> WriteResult<String>
where
  S: DocumentStore + ?Sized,
{
  let fields = as_document(row, "row")?;

  let result = match song_id(fields) {
    Ok(Some(id)) => store
      .set_document(DATASETS_COLLECTION, id, fields)
      .await
      .map(|()| id.to_string()),
    Ok(None) => store.add_document(DATASETS_COLLECTION, fields).await,
    Err(e) => Err(e),
  };

  match result {
    Ok(id) => {
      debug!("Wrote dataset row {}", id);
      Ok(id)
    }
    Err(e) => {
      error!("Failed to add dataset row: {}", describe(&e));
      Err(WriteError::StoreOperation(e))
    }
  }
}

fn as_document<'a>(value: &'a Value, what: &str) -> WriteResult<&'a Document> {
  value.as_object().ok_or_else(|| {
    error!("{} must be a JSON object", what);
    WriteError::InvalidArgument(format!("{} must be a JSON object, got {}", what, kind_of(value)))
  })
}

/// `Ok(None)` means "let the store pick an id". Missing and every empty
/// value (null, `""`, `0`, `false`, `[]`, `{}`) count as absent; any other
/// non-string is a malformed id.
fn song_id(row: &Document) -> Result<Option<&str>, StoreError> {
  match row.get(SONG_ID_FIELD) {
    None => Ok(None),
    Some(Value::String(id)) if !id.is_empty() => Ok(Some(id.as_str())),
    Some(value) if is_empty_value(value) => Ok(None),
    Some(other) => Err(StoreError::InvalidDocumentId(other.to_string())),
  }
}

fn is_empty_value(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::Bool(b) => !b,
    Value::Number(n) => n.as_f64() == Some(0.0),
    Value::String(s) => s.is_empty(),
    Value::Array(items) => items.is_empty(),
    Value::Object(map) => map.is_empty(),
  }
}

fn kind_of(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

/// Flatten an error and its sources into one log line.
fn describe(err: &dyn std::error::Error) -> String {
  let mut message = err.to_string();
  let mut source = err.source();
  while let Some(cause) = source {
    message.push_str(": ");
    message.push_str(&cause.to_string());
    source = cause.source();
  }
  message
}
