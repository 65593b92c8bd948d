//! Translation between plain JSON documents and the Firestore REST value
//! encoding, plus the field-path and document-id rules the REST API enforces.

use serde_json::{json, Map, Number, Value};

use crate::data_types::Document;
use crate::errors::StoreError;

const MAX_DOCUMENT_ID_BYTES: usize = 1500;

// --| Encoding -----------------------
// --|---------------------------------
/// Integers outside int64 have no Firestore form and are refused rather
/// than silently widened to a double.
pub fn encode_value(value: &Value) -> Result<Value, StoreError> {
  let encoded = match value {
    Value::Null => json!({ "nullValue": null }),
    Value::Bool(b) => json!({ "booleanValue": b }),
    Value::Number(n) => {
      if let Some(i) = n.as_i64() {
        // int64 travels as a decimal string
        json!({ "integerValue": i.to_string() })
      } else if n.is_u64() {
        return Err(StoreError::UnsupportedValue(format!("integer {} does not fit in int64", n)));
      } else {
        json!({ "doubleValue": n.as_f64().unwrap_or(f64::NAN) })
      }
    }
    Value::String(s) => json!({ "stringValue": s }),
    Value::Array(items) => {
      if items.is_empty() {
        json!({ "arrayValue": {} })
      } else {
        let values = items.iter().map(encode_value).collect::<Result<Vec<_>, _>>()?;
        json!({ "arrayValue": { "values": values } })
      }
    }
    Value::Object(map) => {
      let fields = encode_fields(map)?;
      json!({ "mapValue": { "fields": fields } })
    }
  };
  Ok(encoded)
}

pub fn encode_fields(document: &Document) -> Result<Value, StoreError> {
  let fields = document
    .iter()
    .map(|(key, value)| encode_value(value).map(|encoded| (key.clone(), encoded)))
    .collect::<Result<Map<String, Value>, _>>()?;
  Ok(Value::Object(fields))
}

// --| Decoding -----------------------
// --|---------------------------------
pub fn decode_value(value: &Value) -> Result<Value, StoreError> {
  let (kind, inner) = value
    .as_object()
    .and_then(|obj| obj.iter().next())
    .ok_or_else(|| malformed(format!("expected a typed value, got {}", value)))?;

  match kind.as_str() {
    "nullValue" => Ok(Value::Null),
    "booleanValue" => inner.as_bool().map(Value::Bool).ok_or_else(|| malformed_kind(kind, inner)),
    "integerValue" => {
      let parsed = match inner {
        Value::String(s) => s.parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
      };
      parsed.map(Value::from).ok_or_else(|| malformed_kind(kind, inner))
    }
    "doubleValue" => match inner {
      Value::Number(n) => Ok(Value::Number(n.clone())),
      // NaN and the infinities arrive as strings and have no JSON form
      Value::String(_) => Ok(Value::Null),
      _ => Err(malformed_kind(kind, inner)),
    },
    "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => {
      inner.as_str().map(|s| Value::String(s.to_string())).ok_or_else(|| malformed_kind(kind, inner))
    }
    "geoPointValue" => {
      let latitude = inner.get("latitude").and_then(Value::as_f64).unwrap_or(0.0);
      let longitude = inner.get("longitude").and_then(Value::as_f64).unwrap_or(0.0);
      Ok(json!({ "latitude": number(latitude), "longitude": number(longitude) }))
    }
    "arrayValue" => {
      let values = match inner.get("values") {
        Some(Value::Array(values)) => values.iter().map(decode_value).collect::<Result<Vec<_>, _>>()?,
        Some(other) => return Err(malformed_kind(kind, other)),
        None => Vec::new(),
      };
      Ok(Value::Array(values))
    }
    "mapValue" => match inner.get("fields") {
      Some(fields) => decode_fields(fields).map(Value::Object),
      None => Ok(Value::Object(Map::new())),
    },
    other => Err(malformed(format!("unknown value type {:?}", other))),
  }
}

pub fn decode_fields(fields: &Value) -> Result<Document, StoreError> {
  let map = fields
    .as_object()
    .ok_or_else(|| malformed(format!("expected a fields map, got {}", fields)))?;

  map
    .iter()
    .map(|(key, value)| decode_value(value).map(|decoded| (key.clone(), decoded)))
    .collect()
}

fn number(value: f64) -> Value {
  Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn malformed(message: String) -> StoreError {
  StoreError::MalformedResponse(message)
}

fn malformed_kind(kind: &str, inner: &Value) -> StoreError {
  malformed(format!("bad {}: {}", kind, inner))
}

// --| Field Paths --------------------
// --|---------------------------------
/// Dotted paths to every leaf of `document`. A nested non-empty map is
/// descended into; anything else, empty maps included, is a leaf.
pub fn leaf_field_paths(document: &Document) -> Vec<String> {
  let mut paths = Vec::new();
  collect_paths(document, &mut Vec::new(), &mut paths);
  paths
}

fn collect_paths(document: &Document, prefix: &mut Vec<String>, paths: &mut Vec<String>) {
  for (key, value) in document {
    prefix.push(quote_segment(key));
    match value {
      Value::Object(inner) if !inner.is_empty() => collect_paths(inner, prefix, paths),
      _ => paths.push(prefix.join(".")),
    }
    prefix.pop();
  }
}

/// Simple identifiers go bare, everything else is wrapped in backticks.
pub fn quote_segment(segment: &str) -> String {
  let mut chars = segment.chars();
  let simple = match chars.next() {
    Some(first) if first.is_ascii_alphabetic() || first == '_' => {
      chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
    _ => false,
  };

  if simple {
    return segment.to_string();
  }

  let escaped = segment.replace('\\', "\\\\").replace('`', "\\`");
  format!("`{}`", escaped)
}

// --| Document Ids -------------------
// --|---------------------------------
pub fn validate_document_id(id: &str) -> Result<(), StoreError> {
  let reserved = id.len() >= 4 && id.starts_with("__") && id.ends_with("__");

  if id.is_empty()
    || id.contains('/')
    || id == "."
    || id == ".."
    || reserved
    || id.len() > MAX_DOCUMENT_ID_BYTES
  {
    return Err(StoreError::InvalidDocumentId(id.to_string()));
  }

  Ok(())
}

// --| Merge --------------------------
// --|---------------------------------
/// Apply `patch` over `target` with the same semantics as a masked update
/// built from [`leaf_field_paths`].
pub fn deep_merge(target: &mut Document, patch: &Document) {
  for (key, value) in patch {
    match (target.get_mut(key), value) {
      (Some(Value::Object(existing)), Value::Object(incoming)) if !incoming.is_empty() => {
        deep_merge(existing, incoming);
      }
      _ => {
        target.insert(key.clone(), value.clone());
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
  }

  #[test]
  fn encodes_sample_dataset_row() {
    let row = doc(json!({
      "song_id": "test_123",
      "plays": 12,
      "rating": 4.5,
      "explicit": false,
      "themes": "[\"test\",\"firestore\"]",
      "tags": ["a"],
      "credits": { "writer": null }
    }));

    let encoded = encode_fields(&row).unwrap();

    assert_eq!(encoded["song_id"], json!({ "stringValue": "test_123" }));
    assert_eq!(encoded["plays"], json!({ "integerValue": "12" }));
    assert_eq!(encoded["rating"], json!({ "doubleValue": 4.5 }));
    assert_eq!(encoded["explicit"], json!({ "booleanValue": false }));
    assert_eq!(encoded["themes"], json!({ "stringValue": "[\"test\",\"firestore\"]" }));
    assert_eq!(encoded["tags"], json!({ "arrayValue": { "values": [{ "stringValue": "a" }] } }));
    assert_eq!(
      encoded["credits"],
      json!({ "mapValue": { "fields": { "writer": { "nullValue": null } } } })
    );
  }

  #[test]
  fn refuses_integers_beyond_int64() {
    let row = doc(json!({ "stats": { "plays": [1, u64::MAX] } }));
    let err = encode_fields(&row).unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedValue(ref msg) if msg.contains("18446744073709551615")));

    // the largest int64 still goes through as an integer
    let encoded = encode_value(&json!(i64::MAX)).unwrap();
    assert_eq!(encoded, json!({ "integerValue": i64::MAX.to_string() }));
  }

  #[test]
  fn decodes_server_only_types() {
    let fields = json!({
      "updated_at": { "timestampValue": "2024-05-01T10:00:00Z" },
      "where": { "geoPointValue": { "latitude": 1.5, "longitude": -2.0 } },
      "empty": { "arrayValue": {} },
      "count": { "integerValue": "-7" }
    });

    let decoded = decode_fields(&fields).unwrap();

    assert_eq!(decoded["updated_at"], json!("2024-05-01T10:00:00Z"));
    assert_eq!(decoded["where"], json!({ "latitude": 1.5, "longitude": -2.0 }));
    assert_eq!(decoded["empty"], json!([]));
    assert_eq!(decoded["count"], json!(-7));
  }

  #[test]
  fn rejects_unknown_value_type() {
    let err = decode_value(&json!({ "vectorValue": {} })).unwrap_err();
    assert!(matches!(err, StoreError::MalformedResponse(_)));
  }

  #[test]
  fn field_paths_descend_into_maps_and_quote_odd_names() {
    let payload = doc(json!({
      "name": "Smoke Test Artist",
      "stats": { "plays": 1, "top-song": "x" },
      "meta": {},
      "9lives": true
    }));

    let mut paths = leaf_field_paths(&payload);
    paths.sort();

    assert_eq!(paths, vec!["`9lives`", "meta", "name", "stats.`top-song`", "stats.plays"]);
  }

  #[test]
  fn quotes_backticks_and_backslashes() {
    assert_eq!(quote_segment("a`b"), "`a\\`b`");
    assert_eq!(quote_segment("a\\b"), "`a\\\\b`");
    assert_eq!(quote_segment("_ok_1"), "_ok_1");
  }

  #[test]
  fn document_id_rules() {
    assert!(validate_document_id("writer_test").is_ok());
    assert!(validate_document_id("test_1716200000").is_ok());

    for bad in ["", "a/b", ".", "..", "__id__"] {
      assert!(validate_document_id(bad).is_err(), "{:?} should be rejected", bad);
    }
    assert!(validate_document_id(&"x".repeat(1501)).is_err());
  }

  #[test]
  fn deep_merge_keeps_untouched_fields() {
    let mut stored = doc(json!({ "a": 1, "nested": { "x": 1, "y": 2 } }));
    deep_merge(&mut stored, &doc(json!({ "b": 2, "nested": { "y": 3 } })));

    assert_eq!(Value::Object(stored), json!({ "a": 1, "b": 2, "nested": { "x": 1, "y": 3 } }));
  }
}
