use std::path::PathBuf;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{metadata_project_id, Credentials, TokenSource};
use crate::data_types::Document;
use crate::database::DocumentStore;
use crate::errors::{ConnectionError, StoreError};
use crate::values::{decode_fields, encode_fields, leaf_field_paths, validate_document_id};

pub const FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com/v1/";
pub const DEFAULT_DATABASE: &str = "(default)";

// --| Client Options -----------------
// --|---------------------------------
/// Everything the client factory needs, resolved up front by the
/// configuration layer. `connect` reads nothing from the process environment.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
  pub project: Option<String>,
  pub database: Option<String>,
  /// Explicit credentials file, highest priority after the emulator.
  pub credentials: Option<PathBuf>,
  /// Value of `GOOGLE_APPLICATION_CREDENTIALS` at startup.
  pub ambient_credentials: Option<PathBuf>,
  /// Value of `GOOGLE_CLOUD_PROJECT` at startup.
  pub ambient_project: Option<String>,
  /// gcloud's application default credentials file; skipped when missing.
  pub well_known_credentials: Option<PathBuf>,
  /// `host:port` of a Firestore emulator.
  pub emulator_host: Option<String>,
  /// Overrides the REST base url.
  pub endpoint: Option<String>,
  /// Metadata server to fall back on; `None` disables the fallback.
  pub metadata_host: Option<String>,
}

impl ClientOptions {
  pub fn with_project(project: &str) -> Self {
    Self { project: Some(project.to_string()), ..Default::default() }
  }
}

// --| Client Factory -----------------
// --|---------------------------------
/// Resolve credentials and project, fetch a first access token and hand back
/// a ready client. Failures are returned as-is, never retried.
pub async fn connect(options: &ClientOptions) -> Result<FirestoreClient, ConnectionError> {
  let http = reqwest::Client::builder()
    .user_agent(concat!("firestore-writer/", env!("CARGO_PKG_VERSION")))
    .build()?;

  let (credentials, probed_project) = resolve_credentials(options, &http).await?;

  let project = options.project.clone()
    .or_else(|| credentials.project_id())
    .or_else(|| options.ambient_project.clone())
    .or(probed_project)
    .ok_or(ConnectionError::NoProject)?;

  let database = options.database.clone().unwrap_or_else(|| DEFAULT_DATABASE.to_string());
  let endpoint = resolve_endpoint(options)?;

  debug!("Firestore endpoint {} (project {}, database {})", endpoint, project, database);

  let tokens = TokenSource::new(credentials, http.clone());
  tokens.token().await?;

  info!("Connected to Firestore project {}", project);
  Ok(FirestoreClient { http, tokens, endpoint, project, database })
}

async fn resolve_credentials(
  options: &ClientOptions,
  http: &reqwest::Client,
) -> Result<(Credentials, Option<String>), ConnectionError> {
  if let Some(host) = &options.emulator_host {
    debug!("Using Firestore emulator at {}", host);
    return Ok((Credentials::Emulator, None));
  }

  if let Some(path) = &options.credentials {
    debug!("Using credentials file {:?}", path);
    return Ok((Credentials::from_file(path)?, None));
  }

  if let Some(path) = &options.ambient_credentials {
    debug!("Using GOOGLE_APPLICATION_CREDENTIALS {:?}", path);
    return Ok((Credentials::from_file(path)?, None));
  }

  if let Some(path) = options.well_known_credentials.as_ref().filter(|p| p.exists()) {
    debug!("Using application default credentials {:?}", path);
    return Ok((Credentials::from_file(path)?, None));
  }

  if let Some(host) = &options.metadata_host {
    if let Some(project) = metadata_project_id(http, host).await {
      debug!("Using metadata server credentials");
      return Ok((Credentials::MetadataServer(host.clone()), Some(project)));
    }
  }

  Err(ConnectionError::NoCredentials)
}

fn resolve_endpoint(options: &ClientOptions) -> Result<Url, ConnectionError> {
  let raw = match (&options.endpoint, &options.emulator_host) {
    (Some(endpoint), _) => endpoint.clone(),
    (None, Some(host)) => format!("http://{}/v1/", host),
    (None, None) => FIRESTORE_ENDPOINT.to_string(),
  };

  let with_slash = if raw.ends_with('/') { raw } else { format!("{}/", raw) };
  Url::parse(&with_slash).map_err(|_| ConnectionError::InvalidEndpoint(with_slash.clone()))
}

// --| Firestore Client ---------------
// --|---------------------------------
/// Handle to one Firestore database over the v1 REST API.
pub struct FirestoreClient {
  http: reqwest::Client,
  tokens: TokenSource,
  endpoint: Url,
  project: String,
  database: String,
}

#[derive(Debug, Deserialize)]
struct RestDocument {
  name: String,
  #[serde(default)]
  fields: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
  error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
  #[serde(default)]
  message: String,
  #[serde(default)]
  status: String,
}

impl FirestoreClient {
  pub fn project(&self) -> &str {
    &self.project
  }

  pub fn database(&self) -> &str {
    &self.database
  }

  fn documents_root(&self) -> String {
    format!("projects/{}/databases/{}/documents", self.project, self.database)
  }

  /// Resource name used inside request bodies.
  fn document_name(&self, collection: &str, id: &str) -> Result<String, StoreError> {
    validate_document_id(collection)?;
    validate_document_id(id)?;
    Ok(format!("{}/{}/{}", self.documents_root(), collection, id))
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.endpoint, path)
  }

  fn document_url(&self, collection: &str, id: &str) -> String {
    self.url(&format!(
      "{}/{}/{}",
      self.documents_root(),
      urlencoding::encode(collection),
      urlencoding::encode(id)
    ))
  }

  async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
    let token = self.tokens.token().await?;
    Ok(request.bearer_auth(token).send().await?)
  }

  async fn commit(&self, write: Value) -> Result<(), StoreError> {
    let url = self.url(&format!("{}:commit", self.documents_root()));
    let response = self.send(self.http.post(url).json(&json!({ "writes": [write] }))).await?;
    check(response).await?;
    Ok(())
  }
}

async fn check(response: Response) -> Result<Response, StoreError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let body = response.text().await.unwrap_or_default();
  Err(api_error(status, &body))
}

fn api_error(status: StatusCode, body: &str) -> StoreError {
  match serde_json::from_str::<ErrorEnvelope>(body) {
    Ok(envelope) => StoreError::Api {
      code: status.as_u16(),
      status: envelope.error.status,
      message: envelope.error.message,
    },
    Err(_) => StoreError::Api {
      code: status.as_u16(),
      status: status.canonical_reason().unwrap_or("UNKNOWN").to_string(),
      message: body.to_string(),
    },
  }
}

fn id_from_name(name: &str) -> Result<String, StoreError> {
  name
    .rsplit('/')
    .next()
    .filter(|id| !id.is_empty())
    .map(str::to_string)
    .ok_or_else(|| StoreError::MalformedResponse(format!("document name {:?} has no id", name)))
}

#[async_trait]
impl DocumentStore for FirestoreClient {
  async fn merge_document(&self, collection: &str, id: &str, fields: &Document) -> Result<(), StoreError> {
    let name = self.document_name(collection, id)?;
    let encoded = encode_fields(fields)?;
    self.commit(json!({
      "update": { "name": name, "fields": encoded },
      "updateMask": { "fieldPaths": leaf_field_paths(fields) },
    })).await
  }

  async fn set_document(&self, collection: &str, id: &str, fields: &Document) -> Result<(), StoreError> {
    let name = self.document_name(collection, id)?;
    let encoded = encode_fields(fields)?;
    self.commit(json!({
      "update": { "name": name, "fields": encoded },
    })).await
  }

  async fn add_document(&self, collection: &str, fields: &Document) -> Result<String, StoreError> {
    validate_document_id(collection)?;
    let url = self.url(&format!("{}/{}", self.documents_root(), urlencoding::encode(collection)));

    let encoded = encode_fields(fields)?;
    let response = self.send(self.http.post(url).json(&json!({ "fields": encoded }))).await?;
    let created: RestDocument = check(response).await?.json().await?;
    id_from_name(&created.name)
  }

  async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
    validate_document_id(collection)?;
    validate_document_id(id)?;

    let response = self.send(self.http.get(self.document_url(collection, id))).await?;
    if response.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }

    let document: RestDocument = check(response).await?.json().await?;
    match document.fields {
      Some(fields) => decode_fields(&fields).map(Some),
      None => Ok(Some(Document::new())),
    }
  }
}
