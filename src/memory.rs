use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use log::debug;

use crate::data_types::Document;
use crate::database::DocumentStore;
use crate::errors::StoreError;
use crate::values::{deep_merge, encode_fields, validate_document_id};

type Collections = HashMap<String, HashMap<String, Document>>;

/// In-process document store with the same write semantics as Firestore.
/// Backs `--memory` runs and the test suite.
#[derive(Debug, Default)]
pub struct MemoryStore {
  collections: Mutex<Collections>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of documents currently held in `collection`.
  pub fn len(&self, collection: &str) -> usize {
    self.lock()
      .map(|collections| collections.get(collection).map_or(0, HashMap::len))
      .unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.lock().map(|collections| collections.values().all(HashMap::is_empty)).unwrap_or(true)
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Collections>, StoreError> {
    self.collections
      .lock()
      .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
  }
}

fn generate_id() -> String {
  // 32 hex chars, comfortably unique and valid as a Firestore id
  uuid::Uuid::new_v4().simple().to_string()
}

// Values Firestore cannot hold are refused here too
fn check_values(fields: &Document) -> Result<(), StoreError> {
  encode_fields(fields).map(|_| ())
}

#[async_trait]
impl DocumentStore for MemoryStore {
  async fn merge_document(&self, collection: &str, id: &str, fields: &Document) -> Result<(), StoreError> {
    validate_document_id(id)?;
    check_values(fields)?;
    let mut collections = self.lock()?;
    let existing = collections
      .entry(collection.to_string())
      .or_default()
      .entry(id.to_string())
      .or_default();

    deep_merge(existing, fields);
    debug!("merged {}/{}", collection, id);
    Ok(())
  }

  async fn set_document(&self, collection: &str, id: &str, fields: &Document) -> Result<(), StoreError> {
    validate_document_id(id)?;
    check_values(fields)?;
    let mut collections = self.lock()?;
    collections
      .entry(collection.to_string())
      .or_default()
      .insert(id.to_string(), fields.clone());

    debug!("set {}/{}", collection, id);
    Ok(())
  }

  async fn add_document(&self, collection: &str, fields: &Document) -> Result<String, StoreError> {
    check_values(fields)?;
    let id = generate_id();
    let mut collections = self.lock()?;
    collections
      .entry(collection.to_string())
      .or_default()
      .insert(id.clone(), fields.clone());

    debug!("added {}/{}", collection, id);
    Ok(id)
  }

  async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
    let collections = self.lock()?;
    Ok(collections.get(collection).and_then(|docs| docs.get(id)).cloned())
  }
}
