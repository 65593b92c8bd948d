use async_trait::async_trait;

use crate::data_types::Document;
use crate::errors::StoreError;

/// A keyed document store. `FirestoreClient` talks to Cloud Firestore,
/// `MemoryStore` keeps everything in process.
///
/// Every call is a single round trip with no cross-call atomicity, and
/// implementations perform no retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
  /// Write `fields` into `collection/id`, keeping any existing field the
  /// payload does not mention. Nested maps merge recursively.
  async fn merge_document(&self, collection: &str, id: &str, fields: &Document) -> Result<(), StoreError>;

  /// Replace `collection/id` with exactly `fields`.
  async fn set_document(&self, collection: &str, id: &str, fields: &Document) -> Result<(), StoreError>;

  /// Insert `fields` under a fresh store-generated id and return that id.
  async fn add_document(&self, collection: &str, fields: &Document) -> Result<String, StoreError>;

  async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;
}
