use std::path::PathBuf;

// --| Store Errors -------------------
// --|---------------------------------
/// Any failure raised while talking to a document store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error(transparent)]
  Http(#[from] reqwest::Error),

  #[error("firestore returned {code} ({status}): {message}")]
  Api { code: u16, status: String, message: String },

  #[error("invalid document id {0:?}")]
  InvalidDocumentId(String),

  #[error("malformed response: {0}")]
  MalformedResponse(String),

  #[error("could not refresh access token")]
  Auth(#[from] AuthError),

  #[error("store unavailable: {0}")]
  Unavailable(String),

  #[error("unsupported value: {0}")]
  UnsupportedValue(String),
}

// --| Auth Errors --------------------
// --|---------------------------------
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
  #[error("failed to read credentials file {path:?}")]
  ReadCredentials { path: PathBuf, source: std::io::Error },

  #[error("failed to parse credentials file {path:?}")]
  ParseCredentials { path: PathBuf, source: serde_json::Error },

  #[error("unsupported credentials type {0:?}")]
  UnsupportedCredentials(String),

  #[error("failed to sign token assertion")]
  Signing(#[from] jsonwebtoken::errors::Error),

  #[error(transparent)]
  Http(#[from] reqwest::Error),

  #[error("token endpoint returned {status}: {body}")]
  TokenEndpoint { status: u16, body: String },

  #[error("token endpoint returned an unusable token: {0}")]
  MalformedToken(String),
}

// --| Connection Errors --------------
// --|---------------------------------
/// Raised by the client factory. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
  #[error("no credentials found (set a credentials path, GOOGLE_APPLICATION_CREDENTIALS, or run on GCP)")]
  NoCredentials,

  #[error("no project id could be determined")]
  NoProject,

  #[error("invalid endpoint {0:?}")]
  InvalidEndpoint(String),

  #[error(transparent)]
  Auth(#[from] AuthError),

  #[error("failed to build http client")]
  Http(#[from] reqwest::Error),
}

// --| Write Errors -------------------
// --|---------------------------------
/// Result of the artist/dataset writers. Callers can tell a rejected argument
/// from a failed remote call without looking at the logs.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  #[error("store operation failed")]
  StoreOperation(#[from] StoreError),
}

impl WriteError {
  pub fn is_invalid_argument(&self) -> bool {
    matches!(self, WriteError::InvalidArgument(_))
  }
}

pub type WriteResult<T> = Result<T, WriteError>;
