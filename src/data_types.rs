use anyhow::Error;
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored document: field name to JSON value.
pub type Document = Map<String, Value>;

pub const ARTISTS_COLLECTION: &str = "artists";
pub const DATASETS_COLLECTION: &str = "datasets";

/// Field of a dataset row that doubles as its document id.
pub const SONG_ID_FIELD: &str = "song_id";

// --| Arguments ----------------------
// --|---------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Arguments {
  pub project: Option<String>,
  pub credentials: Option<String>,
  pub config: Option<String>,
  pub log_level: Option<String>,
  pub memory: bool,
}

impl Arguments {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_matches(matches: &ArgMatches) -> Arguments {
    let mut args = Self::new();
    args.project = matches.get_one::<String>("project").cloned();
    args.credentials = matches.get_one::<String>("credentials").cloned();
    args.config = matches.get_one::<String>("config").cloned();
    args.log_level = matches.get_one::<String>("level").cloned();
    args.memory = matches.get_flag("memory");
    args
  }

  /// Command line values win over the settings file and environment.
  pub fn to_settings(&self, settings: &mut config::Config) -> Result<(), Error> {
    if let Some(value) = &self.project     { settings.set("firestore.project", value.clone())?; }
    if let Some(value) = &self.credentials { settings.set("firestore.credentials", value.clone())?; }
    if let Some(value) = &self.log_level   { settings.set("logging.level", value.clone())?; }
    if self.memory                         { settings.set("firestore.backend", "memory")?; }

    Ok(())
  }
}
