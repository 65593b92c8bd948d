//! Upsert artist records and append dataset rows in Cloud Firestore.

pub mod auth;
pub mod cli;
pub mod configuration;
pub mod data_types;
pub mod database;
pub mod errors;
pub mod firestore;
pub mod memory;
pub mod smoke;
pub mod values;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_logger;

pub use database::DocumentStore;
pub use errors::{ConnectionError, StoreError, WriteError, WriteResult};
pub use firestore::{connect, ClientOptions, FirestoreClient};
pub use memory::MemoryStore;
pub use writer::{add_dataset_row, upsert_artist};
