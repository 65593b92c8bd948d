use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::errors::AuthError;

pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const METADATA_HOST: &str = "http://metadata.google.internal";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

// Refresh this long before the server-side expiry
const EXPIRY_SLACK_SECS: i64 = 60;

// Longest lifetime accepted from a token endpoint
const MAX_TOKEN_LIFETIME_SECS: i64 = 86_400;

// --| Credential Files ---------------
// --|---------------------------------
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
  pub project_id: Option<String>,
  pub private_key_id: Option<String>,
  pub private_key: String,
  pub client_email: String,
  #[serde(default = "default_token_uri")]
  pub token_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedUser {
  pub client_id: String,
  pub client_secret: String,
  pub refresh_token: String,
  pub quota_project_id: Option<String>,
  #[serde(default = "default_token_uri")]
  pub token_uri: String,
}

fn default_token_uri() -> String {
  GOOGLE_TOKEN_URI.to_string()
}

#[derive(Debug, Clone)]
pub enum Credentials {
  ServiceAccount(ServiceAccountKey),
  AuthorizedUser(AuthorizedUser),
  /// Tokens from the GCE/Cloud Run metadata server at the given base url.
  MetadataServer(String),
  /// The local emulator accepts any bearer token.
  Emulator,
}

impl Credentials {
  /// Load a `service_account` or `authorized_user` json file.
  pub fn from_file(path: &Path) -> Result<Credentials, AuthError> {
    let raw = fs::read_to_string(path).map_err(|source| AuthError::ReadCredentials {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json(&raw, path)
  }

  fn from_json(raw: &str, path: &Path) -> Result<Credentials, AuthError> {
    let parse_err = |source: serde_json::Error| AuthError::ParseCredentials { path: PathBuf::from(path), source };

    #[derive(Deserialize)]
    struct Kind {
      #[serde(rename = "type")]
      kind: Option<String>,
    }

    let kind: Kind = serde_json::from_str(raw).map_err(parse_err)?;
    match kind.kind.as_deref() {
      Some("service_account") => Ok(Credentials::ServiceAccount(serde_json::from_str(raw).map_err(parse_err)?)),
      Some("authorized_user") => Ok(Credentials::AuthorizedUser(serde_json::from_str(raw).map_err(parse_err)?)),
      other => Err(AuthError::UnsupportedCredentials(other.unwrap_or("<missing>").to_string())),
    }
  }

  /// Project id embedded in the credentials, if any.
  pub fn project_id(&self) -> Option<String> {
    match self {
      Credentials::ServiceAccount(key) => key.project_id.clone(),
      Credentials::AuthorizedUser(user) => user.quota_project_id.clone(),
      _ => None,
    }
  }
}

// --| Access Tokens ------------------
// --|---------------------------------
#[derive(Debug, Clone)]
pub struct AccessToken {
  pub token: String,
  pub expires_at: DateTime<Utc>,
}

impl AccessToken {
  fn is_fresh(&self, now: DateTime<Utc>) -> bool {
    now + chrono::Duration::seconds(EXPIRY_SLACK_SECS) < self.expires_at
  }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
  #[serde(default = "default_expires_in")]
  expires_in: i64,
}

fn default_expires_in() -> i64 {
  ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
  iss: &'a str,
  scope: &'a str,
  aud: &'a str,
  iat: i64,
  exp: i64,
}

/// Hands out bearer tokens for one set of credentials, caching the last one
/// until shortly before it expires.
pub struct TokenSource {
  credentials: Credentials,
  http: reqwest::Client,
  cached: Mutex<Option<AccessToken>>,
}

impl TokenSource {
  pub fn new(credentials: Credentials, http: reqwest::Client) -> Self {
    Self { credentials, http, cached: Mutex::new(None) }
  }

  pub async fn token(&self) -> Result<String, AuthError> {
    if let Credentials::Emulator = self.credentials {
      return Ok("owner".to_string());
    }

    let mut cached = self.cached.lock().await;
    let now = Utc::now();

    if let Some(token) = cached.as_ref() {
      if token.is_fresh(now) {
        return Ok(token.token.clone());
      }
    }

    let fresh = self.fetch(now).await?;
    let value = fresh.token.clone();
    *cached = Some(fresh);
    Ok(value)
  }

  async fn fetch(&self, now: DateTime<Utc>) -> Result<AccessToken, AuthError> {
    let request = match &self.credentials {
      Credentials::ServiceAccount(key) => {
        debug!("Requesting access token for {}", key.client_email);
        let assertion = sign_assertion(key, now)?;
        self.http
          .post(&key.token_uri)
          .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
      }
      Credentials::AuthorizedUser(user) => {
        debug!("Refreshing user access token");
        self.http.post(&user.token_uri).form(&[
          ("grant_type", "refresh_token"),
          ("client_id", user.client_id.as_str()),
          ("client_secret", user.client_secret.as_str()),
          ("refresh_token", user.refresh_token.as_str()),
        ])
      }
      Credentials::MetadataServer(host) => {
        debug!("Requesting access token from metadata server");
        self.http
          .get(format!("{}/computeMetadata/v1/instance/service-accounts/default/token", host))
          .header("Metadata-Flavor", "Google")
      }
      Credentials::Emulator => {
        return Ok(AccessToken { token: "owner".to_string(), expires_at: now + chrono::Duration::days(1) });
      }
    };

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(AuthError::TokenEndpoint { status: status.as_u16(), body });
    }

    let parsed: TokenResponse = response.json().await?;
    Ok(AccessToken {
      token: parsed.access_token,
      expires_at: expiry(now, parsed.expires_in)?,
    })
  }
}

/// `now + expires_in`, refusing lifetimes no real token endpoint hands out.
fn expiry(now: DateTime<Utc>, expires_in: i64) -> Result<DateTime<Utc>, AuthError> {
  if !(0..=MAX_TOKEN_LIFETIME_SECS).contains(&expires_in) {
    return Err(AuthError::MalformedToken(format!("expires_in {} is out of range", expires_in)));
  }

  now
    .checked_add_signed(chrono::Duration::seconds(expires_in))
    .ok_or_else(|| AuthError::MalformedToken(format!("expires_in {} overflows the clock", expires_in)))
}

fn sign_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String, AuthError> {
  let iat = now.timestamp();
  let claims = Claims {
    iss: &key.client_email,
    scope: DATASTORE_SCOPE,
    aud: &key.token_uri,
    iat,
    exp: iat + ASSERTION_LIFETIME_SECS,
  };

  let mut header = Header::new(Algorithm::RS256);
  header.kid = key.private_key_id.clone();

  let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
  Ok(jsonwebtoken::encode(&header, &claims, &signing_key)?)
}

// --| Metadata Server ----------------
// --|---------------------------------
/// Project id of the instance we are running on, if we are on GCP at all.
pub async fn metadata_project_id(http: &reqwest::Client, host: &str) -> Option<String> {
  let response = http
    .get(format!("{}/computeMetadata/v1/project/project-id", host))
    .header("Metadata-Flavor", "Google")
    .timeout(Duration::from_secs(2))
    .send()
    .await
    .ok()?;

  if !response.status().is_success() {
    return None;
  }

  response.text().await.ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
