//! Captures log records so tests can assert on what was logged.

use std::sync::{Mutex, Once};

use log::{Level, LevelFilter, Log, Metadata, Record};

static INIT: Once = Once::new();
static RECORDS: Mutex<Vec<(Level, String)>> = Mutex::new(Vec::new());

struct CaptureLogger;

static LOGGER: CaptureLogger = CaptureLogger;

impl Log for CaptureLogger {
  fn enabled(&self, _metadata: &Metadata) -> bool {
    true
  }

  fn log(&self, record: &Record) {
    if let Ok(mut records) = RECORDS.lock() {
      records.push((record.level(), record.args().to_string()));
    }
  }

  fn flush(&self) {}
}

pub fn init() {
  INIT.call_once(|| {
    log::set_logger(&LOGGER).expect("logger already set");
    log::set_max_level(LevelFilter::Trace);
  });
}

/// Messages logged at exactly `level` that mention `needle`.
pub fn records_matching(level: Level, needle: &str) -> Vec<String> {
  RECORDS
    .lock()
    .map(|records| {
      records
        .iter()
        .filter(|(l, message)| *l == level && message.contains(needle))
        .map(|(_, message)| message.clone())
        .collect()
    })
    .unwrap_or_default()
}
