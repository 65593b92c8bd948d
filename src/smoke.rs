use std::fmt;
use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use serde_json::{json, Value};

use crate::database::DocumentStore;
use crate::writer::{add_dataset_row, upsert_artist};

pub const SMOKE_STYLE_ID: &str = "writer_test";
pub const SMOKE_ARTIST_NAME: &str = "Smoke Test Artist";

// --| Sample Records -----------------
// --|---------------------------------
pub fn sample_artist(now: DateTime<Utc>) -> Value {
  json!({
    "style_id": SMOKE_STYLE_ID,
    "name": SMOKE_ARTIST_NAME,
    "updated_at": now.to_rfc3339_opts(SecondsFormat::Micros, true),
  })
}

pub fn sample_dataset_row(now: DateTime<Utc>) -> Value {
  json!({
    "song_id": format!("test_{}", now.timestamp()),
    "artist_placeholder": SMOKE_ARTIST_NAME,
    "title": "Cloud Smoke",
    "themes": r#"["test","firestore"]"#,
    "structure": "Verse-Chorus",
    "notes_annotations": "Inserted by test script",
  })
}

// --| Report -------------------------
// --|---------------------------------
/// What the smoke run prints. Failures only show up here and in the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeReport {
  pub artist_written: bool,
  pub dataset_row_id: Option<String>,
}

impl fmt::Display for SmokeReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Artist write: {}", self.artist_written)?;
    match &self.dataset_row_id {
      Some(id) => write!(f, "Dataset write: {}", id),
      None => write!(f, "Dataset write: None"),
    }
  }
}

/// One artist upsert followed by one dataset append. The two writes are
/// independent: a failed upsert does not stop the append.
pub async fn run<S>(store: &S, now: DateTime<Utc>) -> SmokeReport
where
  S: DocumentStore + ?Sized,
{
  let artist_start = Instant::now();
  let artist = upsert_artist(store, SMOKE_STYLE_ID, &sample_artist(now)).await;
  info!("Artist write took {:?}", artist_start.elapsed());

  let row_start = Instant::now();
  let row = add_dataset_row(store, &sample_dataset_row(now)).await;
  info!("Dataset write took {:?}", row_start.elapsed());

  SmokeReport {
    artist_written: artist.is_ok(),
    dataset_row_id: row.ok(),
  }
}
