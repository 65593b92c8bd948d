use std::{path::{PathBuf, Path}, env, io::Write};
use std::fs::{self, File};

use anyhow::{anyhow, Error};
use serde::Deserialize;

use crate::auth::METADATA_HOST;
use crate::data_types::Arguments;
use crate::firestore::{ClientOptions, DEFAULT_DATABASE};

pub const APP_NAME: &str = "firestore-writer";
pub const ENV_PREFIX: &str = "FIRESTORE_WRITER";

// --| Settings -----------------------
// --|---------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Backend {
    Firestore,
    Memory,
}

impl Default for Backend {
    fn default() -> Self { Backend::Firestore }
}

impl TryFrom<String> for Backend {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "firestore" | "" => Ok(Backend::Firestore),
            "memory" => Ok(Backend::Memory),
            other => Err(format!("unknown backend {:?}, expected \"firestore\" or \"memory\"", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "warn".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FirestoreSettings {
    pub backend: Backend,
    pub project: String,
    pub database: String,
    pub credentials: String,
    pub endpoint: String,
    pub emulator_host: String,
    pub metadata: bool,
}

impl Default for FirestoreSettings {
    fn default() -> Self {
        Self {
            backend: Backend::Firestore,
            project: String::new(),
            database: DEFAULT_DATABASE.to_string(),
            credentials: String::new(),
            endpoint: String::new(),
            emulator_host: String::new(),
            metadata: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub firestore: FirestoreSettings,
}

impl Settings {
    /// Turn settings plus the Google environment variables into client
    /// options. `lookup` is the only window onto the environment.
    pub fn client_options<F>(&self, lookup: F) -> ClientOptions
    where
        F: Fn(&str) -> Option<String>,
    {
        let fs = &self.firestore;
        let env_value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        ClientOptions {
            project: non_empty(&fs.project),
            database: non_empty(&fs.database),
            credentials: non_empty(&fs.credentials).map(PathBuf::from),
            ambient_credentials: env_value("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from),
            ambient_project: env_value("GOOGLE_CLOUD_PROJECT").or_else(|| env_value("GCLOUD_PROJECT")),
            well_known_credentials: well_known_credentials(&env_value),
            emulator_host: non_empty(&fs.emulator_host).or_else(|| env_value("FIRESTORE_EMULATOR_HOST")),
            endpoint: non_empty(&fs.endpoint),
            metadata_host: if fs.metadata { Some(METADATA_HOST.to_string()) } else { None },
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

/// Where `gcloud auth application-default login` leaves its credentials.
fn well_known_credentials<F>(env_value: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(home) = env_value("HOME") {
        return Some(Path::new(&home).join(".config/gcloud/application_default_credentials.json"));
    }

    env_value("APPDATA").map(|appdata| Path::new(&appdata).join("gcloud").join("application_default_credentials.json"))
}

// --| Loading ------------------------
// --|---------------------------------
/// Resolved settings, plus the reason the settings file was skipped, if it
/// was. Loading runs before the logger exists, so the caller reports it.
#[derive(Debug)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub file_error: Option<String>,
}

/// Layer the settings file, `FIRESTORE_WRITER_*` variables and the command
/// line, in that order.
pub fn load_settings(settings_path: &Path, args: &Arguments) -> Result<LoadedSettings, Error> {
    let mut settings = config::Config::default();

    let required = args.config.is_some();
    let file = config::File::from(settings_path.to_path_buf())
        .format(config::FileFormat::Toml)
        .required(required);

    let mut file_error = None;
    if let Err(err) = settings.merge(file) {
        if required {
            return Err(anyhow!("failed to read settings file {:?}: {}", settings_path, err));
        }
        file_error = Some(err.to_string());
    }

    settings.merge(config::Environment::with_prefix(ENV_PREFIX).separator("__"))?;
    args.to_settings(&mut settings)?;

    let resolved: Settings = settings.try_into()?;
    Ok(LoadedSettings { settings: resolved, file_error })
}

/// Settings file to read: `--config` if given, else the one in the
/// application config dir (created with defaults on first run).
pub fn settings_file(config_dir: &Path, args: &Arguments) -> Result<PathBuf, Error> {
    if let Some(path) = &args.config {
        return Ok(PathBuf::from(path));
    }

    let settings_path = config_dir.join("settings.toml");
    if !settings_path.exists() {
        default_settings(config_dir)?;
    }
    Ok(settings_path)
}

pub fn get_config_path(name: &str) -> Result<PathBuf, Error> {
    let key = "HOME";
    let home = env::var(key).map_err(|e| anyhow!("couldn't interpret {}: {}", key, e))?;

    let path = Path::new(&home).join(".config").join(name.to_lowercase());
    fs::create_dir_all(&path)?;
    Ok(path)
}

pub fn default_settings(config_dir: &Path) -> Result<PathBuf, Error> {
    let settings_path = config_dir.join("settings.toml");

    let mut settings_file = File::create(&settings_path)?;
    let settings_toml = r##"
[logging]
level         = "warn"        # error, warn, info or debug

[firestore]
backend       = "firestore"   # "firestore" or "memory"
project       = ""            # Project id; falls back to the credentials file, then GOOGLE_CLOUD_PROJECT
database      = "(default)"   # Firestore database id
credentials   = ""            # Service account or authorized user json; falls back to GOOGLE_APPLICATION_CREDENTIALS
endpoint      = ""            # Override the REST endpoint
emulator_host = ""            # host:port of a Firestore emulator; falls back to FIRESTORE_EMULATOR_HOST
metadata      = true          # Ask the GCE metadata server when nothing else is configured
"##;

    settings_file.write_all(settings_toml.as_bytes())?;
    Ok(settings_path)
}
