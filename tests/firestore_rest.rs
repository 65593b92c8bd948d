use std::fs;

use firestore_writer::errors::AuthError;
use firestore_writer::{add_dataset_row, connect, upsert_artist};
use firestore_writer::{ClientOptions, ConnectionError, DocumentStore, FirestoreClient, StoreError, WriteError};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROJECT: &str = "writer-test-project";

async fn emulator_client(server: &MockServer) -> FirestoreClient {
  let options = ClientOptions {
    emulator_host: Some(server.address().to_string()),
    ..ClientOptions::with_project(PROJECT)
  };
  connect(&options).await.map_err(|e| e.to_string()).unwrap()
}

async fn mount_commit_ok(server: &MockServer) {
  Mock::given(method("POST"))
    .and(path_regex(r"/documents:commit$"))
    .and(header("authorization", "Bearer owner"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "writeResults": [{ "updateTime": "2024-05-20T12:00:00.000000Z" }],
      "commitTime": "2024-05-20T12:00:00.000000Z"
    })))
    .mount(server)
    .await;
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
  server
    .received_requests()
    .await
    .unwrap_or_default()
    .iter()
    .filter_map(|request| serde_json::from_slice(&request.body).ok())
    .collect()
}

// --| Writes -------------------------
#[tokio::test]
async fn upsert_commits_a_masked_update() {
  let server = MockServer::start().await;
  mount_commit_ok(&server).await;
  let client = emulator_client(&server).await;

  let payload = json!({ "style_id": "writer_test", "name": "Smoke Test Artist", "stats": { "plays": 3 } });
  upsert_artist(&client, "writer_test", &payload).await.unwrap();

  let bodies = request_bodies(&server).await;
  assert_eq!(bodies.len(), 1);

  let write = &bodies[0]["writes"][0];
  assert_eq!(
    write["update"]["name"],
    format!("projects/{}/databases/(default)/documents/artists/writer_test", PROJECT)
  );
  assert_eq!(write["update"]["fields"]["name"], json!({ "stringValue": "Smoke Test Artist" }));

  let mut mask: Vec<String> = serde_json::from_value(write["updateMask"]["fieldPaths"].clone()).unwrap();
  mask.sort();
  assert_eq!(mask, vec!["name", "stats.plays", "style_id"]);
}

#[tokio::test]
async fn dataset_row_with_song_id_is_an_unmasked_update() {
  let server = MockServer::start().await;
  mount_commit_ok(&server).await;
  let client = emulator_client(&server).await;

  let row = json!({ "song_id": "test_123", "title": "Cloud Smoke", "themes": "[\"test\",\"firestore\"]" });
  let id = add_dataset_row(&client, &row).await.unwrap();
  assert_eq!(id, "test_123");

  let bodies = request_bodies(&server).await;
  let write = &bodies[0]["writes"][0];
  assert!(write["update"]["name"].as_str().unwrap().ends_with("/documents/datasets/test_123"));
  assert_eq!(write["update"]["fields"]["title"], json!({ "stringValue": "Cloud Smoke" }));
  assert!(write.get("updateMask").is_none());
}

#[tokio::test]
async fn dataset_row_without_song_id_uses_generated_id() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path_regex(r"/documents/datasets$"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "name": format!("projects/{}/databases/(default)/documents/datasets/aZ09GeneratedId", PROJECT),
      "fields": { "x": { "integerValue": "1" } },
      "createTime": "2024-05-20T12:00:00.000000Z",
      "updateTime": "2024-05-20T12:00:00.000000Z"
    })))
    .expect(1)
    .mount(&server)
    .await;
  let client = emulator_client(&server).await;

  let id = add_dataset_row(&client, &json!({ "x": 1 })).await.unwrap();
  assert_eq!(id, "aZ09GeneratedId");

  let bodies = request_bodies(&server).await;
  assert_eq!(bodies[0], json!({ "fields": { "x": { "integerValue": "1" } } }));
}

#[tokio::test]
async fn permission_denied_becomes_store_operation_error() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path_regex(r"/documents:commit$"))
    .respond_with(ResponseTemplate::new(403).set_body_json(json!({
      "error": { "code": 403, "message": "Missing or insufficient permissions.", "status": "PERMISSION_DENIED" }
    })))
    .mount(&server)
    .await;
  let client = emulator_client(&server).await;

  let err = upsert_artist(&client, "writer_test", &json!({ "name": "x" })).await.unwrap_err();
  match err {
    WriteError::StoreOperation(StoreError::Api { code, status, .. }) => {
      assert_eq!(code, 403);
      assert_eq!(status, "PERMISSION_DENIED");
    }
    other => panic!("unexpected error {:?}", other),
  }
}

#[tokio::test]
async fn slash_in_song_id_is_rejected_before_sending() {
  let server = MockServer::start().await;
  let client = emulator_client(&server).await;

  let err = add_dataset_row(&client, &json!({ "song_id": "a/b" })).await.unwrap_err();
  assert!(matches!(err, WriteError::StoreOperation(StoreError::InvalidDocumentId(_))));
  assert!(request_bodies(&server).await.is_empty());
}

#[tokio::test]
async fn integer_beyond_int64_is_rejected_before_sending() {
  let server = MockServer::start().await;
  let client = emulator_client(&server).await;

  let row = json!({ "song_id": "s1", "plays": u64::MAX });
  let err = add_dataset_row(&client, &row).await.unwrap_err();

  assert!(matches!(err, WriteError::StoreOperation(StoreError::UnsupportedValue(_))));
  assert!(request_bodies(&server).await.is_empty());
}

// --| Reads --------------------------
#[tokio::test]
async fn reads_back_a_stored_document() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path_regex(r"/documents/artists/writer_test$"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "name": format!("projects/{}/databases/(default)/documents/artists/writer_test", PROJECT),
      "fields": {
        "name": { "stringValue": "Smoke Test Artist" },
        "updated_at": { "stringValue": "2024-05-20T12:00:00.000000Z" }
      }
    })))
    .mount(&server)
    .await;
  let client = emulator_client(&server).await;

  let stored = client.get_document("artists", "writer_test").await.unwrap().unwrap();
  assert_eq!(stored["name"], "Smoke Test Artist");
}

#[tokio::test]
async fn missing_document_is_none() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .respond_with(ResponseTemplate::new(404).set_body_json(json!({
      "error": { "code": 404, "message": "Document not found", "status": "NOT_FOUND" }
    })))
    .mount(&server)
    .await;
  let client = emulator_client(&server).await;

  assert!(client.get_document("artists", "nobody").await.unwrap().is_none());
}

// --| Credentials --------------------
fn service_account_file(dir: &tempfile::TempDir, token_uri: &str) -> std::path::PathBuf {
  let raw = fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/service_account.json")).unwrap();
  let mut key: Value = serde_json::from_str(&raw).unwrap();
  key["token_uri"] = json!(token_uri);

  let path = dir.path().join("service-account.json");
  fs::write(&path, serde_json::to_vec(&key).unwrap()).unwrap();
  path
}

#[tokio::test]
async fn service_account_token_is_used_for_writes() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/token"))
    .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "access_token": "ya29.test-token",
      "expires_in": 3599,
      "token_type": "Bearer"
    })))
    .expect(1)
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path_regex(r"/documents:commit$"))
    .and(header("authorization", "Bearer ya29.test-token"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "writeResults": [{}] })))
    .expect(2)
    .mount(&server)
    .await;

  let dir = tempfile::tempdir().unwrap();
  let options = ClientOptions {
    credentials: Some(service_account_file(&dir, &format!("{}/token", server.uri()))),
    endpoint: Some(format!("{}/v1/", server.uri())),
    ..Default::default()
  };

  let client = connect(&options).await.map_err(|e| e.to_string()).unwrap();
  assert_eq!(client.project(), PROJECT);

  // second write reuses the cached token
  upsert_artist(&client, "writer_test", &json!({ "a": 1 })).await.unwrap();
  upsert_artist(&client, "writer_test", &json!({ "b": 2 })).await.unwrap();
}

#[tokio::test]
async fn rejected_credentials_fail_at_connect() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/token"))
    .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"error":"invalid_grant"}"#))
    .mount(&server)
    .await;

  let dir = tempfile::tempdir().unwrap();
  let options = ClientOptions {
    credentials: Some(service_account_file(&dir, &format!("{}/token", server.uri()))),
    endpoint: Some(format!("{}/v1/", server.uri())),
    ..Default::default()
  };

  let err = connect(&options).await.err().unwrap();
  assert!(matches!(err, ConnectionError::Auth(AuthError::TokenEndpoint { status: 401, .. })));
}

#[tokio::test]
async fn absurd_token_lifetime_fails_at_connect() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/token"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "access_token": "t",
      "expires_in": i64::MAX
    })))
    .mount(&server)
    .await;

  let dir = tempfile::tempdir().unwrap();
  let options = ClientOptions {
    credentials: Some(service_account_file(&dir, &format!("{}/token", server.uri()))),
    endpoint: Some(format!("{}/v1/", server.uri())),
    ..Default::default()
  };

  let err = connect(&options).await.err().unwrap();
  assert!(matches!(err, ConnectionError::Auth(AuthError::MalformedToken(_))));
}

#[tokio::test]
async fn authorized_user_refreshes_and_supplies_project() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/token"))
    .and(body_string_contains("grant_type=refresh_token"))
    .and(body_string_contains("refresh_token=1%2F%2Frefresh"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "ya29.user", "expires_in": 3599 })))
    .expect(1)
    .mount(&server)
    .await;

  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("adc.json");
  fs::write(&path, serde_json::to_vec(&json!({
    "type": "authorized_user",
    "client_id": "cid.apps.googleusercontent.com",
    "client_secret": "secret",
    "refresh_token": "1//refresh",
    "quota_project_id": "songs-dev",
    "token_uri": format!("{}/token", server.uri())
  })).unwrap()).unwrap();

  let options = ClientOptions {
    ambient_credentials: Some(path),
    endpoint: Some(format!("{}/v1/", server.uri())),
    ..Default::default()
  };

  let client = connect(&options).await.map_err(|e| e.to_string()).unwrap();
  assert_eq!(client.project(), "songs-dev");
}

#[tokio::test]
async fn explicit_project_wins_over_credentials_file() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/token"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "t", "expires_in": 3599 })))
    .mount(&server)
    .await;

  let dir = tempfile::tempdir().unwrap();
  let options = ClientOptions {
    project: Some("override-project".to_string()),
    credentials: Some(service_account_file(&dir, &format!("{}/token", server.uri()))),
    endpoint: Some(format!("{}/v1/", server.uri())),
    ..Default::default()
  };

  let client = connect(&options).await.map_err(|e| e.to_string()).unwrap();
  assert_eq!(client.project(), "override-project");
}

#[tokio::test]
async fn unreadable_credentials_file_is_a_connection_error() {
  let options = ClientOptions {
    credentials: Some("/nonexistent/sa.json".into()),
    ..ClientOptions::with_project(PROJECT)
  };

  let err = connect(&options).await.err().unwrap();
  assert!(matches!(err, ConnectionError::Auth(AuthError::ReadCredentials { .. })));
}
