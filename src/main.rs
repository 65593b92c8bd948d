use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use anyhow::{Context, Error, Result};
use chrono::Utc;
use log::{debug, info, warn};
use simplelog::*;

use firestore_writer::cli::cli;
use firestore_writer::configuration::{get_config_path, load_settings, settings_file, Backend, LoadedSettings, APP_NAME};
use firestore_writer::data_types::Arguments;
use firestore_writer::{connect, smoke, MemoryStore};

#[tokio::main]
async fn main() -> Result<(), Error> {
  let initial_perf = Instant::now();

  let matches = cli().get_matches();
  let args = Arguments::from_matches(&matches);

  let config_path = get_config_path(APP_NAME)?;
  let settings_path = settings_file(&config_path, &args)?;
  let LoadedSettings { settings, file_error } = load_settings(&settings_path, &args)?;

  init_logging(&config_path, &settings.logging.level)?;
  if let Some(err) = file_error {
    warn!("settings merge failed, use default settings, err: {}", err);
  }
  debug!("Settings loaded from {:?}: {:?}", settings_path, settings);

  // --| Write failures only show in the report and the log, never in the exit code
  let report = match settings.firestore.backend {
    Backend::Memory => {
      info!("Using in-memory store");
      smoke::run(&MemoryStore::new(), Utc::now()).await
    }
    Backend::Firestore => {
      let options = settings.client_options(|key| env::var(key).ok());
      let client = connect(&options).await.context("failed to connect to Firestore")?;
      smoke::run(&client, Utc::now()).await
    }
  };

  println!("{}", report);
  info!("Smoke test complete: {:?}", initial_perf.elapsed());
  Ok(())
}

// --| Initialize logging -----------------------
// --|-------------------------------------------
pub fn init_logging(config_path: &Path, level: &str) -> Result<PathBuf, Error> {
  // --| If env variable is provided, it will override other log level settings --
  let default_level = match env::var("RUST_LOG") {
    Ok(v) => LevelFilter::from_str(&v).unwrap_or(LevelFilter::Warn),
    Err(_) => LevelFilter::from_str(level).unwrap_or(LevelFilter::Warn),
  };

  let logging_config = ConfigBuilder::new().set_location_level(LevelFilter::Debug).build();
  let log_path = config_path.join(format!("{}.log", APP_NAME));
  let log_file = File::create(&log_path).with_context(|| format!("failed to create {:?}", log_path))?;

  CombinedLogger::init(vec![
    TermLogger::new(default_level, logging_config.clone(), TerminalMode::Stderr, ColorChoice::Auto),
    WriteLogger::new(default_level, logging_config, log_file),
  ])?;

  Ok(log_path)
}
