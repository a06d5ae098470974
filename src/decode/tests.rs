//! Tests for decoder module

use super::*;
use crate::error::Error;
use serde_json::json;

// ============================================================================
// JsonDecoder Tests
// ============================================================================

#[test]
fn test_decode_top_level_array() {
    let decoder = JsonDecoder::new();
    let records = decoder.decode(&json!([{"id": 1}, {"id": 2}])).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["id"], 2);
}

#[test]
fn test_decode_single_object_without_path() {
    let decoder = JsonDecoder::new();
    let records = decoder
        .decode(&json!({"id": 319, "joke": "...", "error": false}))
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], 319);
}

#[test]
fn test_decode_null_body_is_empty() {
    let decoder = JsonDecoder::new();
    assert!(decoder.decode(&json!(null)).unwrap().is_empty());
}

#[test]
fn test_decode_with_path() {
    let decoder = JsonDecoder::with_path("hits");
    let body = json!({"hits": [{"objectID": "1"}, {"objectID": "2"}], "nbHits": 2});
    let records = decoder.decode(&body).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(decoder.record_path(), Some("hits"));
}

#[test]
fn test_decode_missing_path_is_empty() {
    let decoder = JsonDecoder::with_path("data");
    assert!(decoder.decode(&json!({"object": "list"})).unwrap().is_empty());
}

#[test]
fn test_decode_wildcard_pluck() {
    let decoder = JsonDecoder::with_path("results[*].url");
    let body = json!({
        "count": 2,
        "results": [
            {"name": "normal", "url": "https://pokeapi.co/api/v2/type/1/"},
            {"name": "fighting", "url": "https://pokeapi.co/api/v2/type/2/"}
        ]
    });
    let urls = decoder.decode(&body).unwrap();
    assert_eq!(
        urls,
        vec![
            json!("https://pokeapi.co/api/v2/type/1/"),
            json!("https://pokeapi.co/api/v2/type/2/")
        ]
    );
}

#[test]
fn test_decode_wildcard_skips_missing_fields() {
    let decoder = JsonDecoder::with_path("$.results[*].url");
    let body = json!({"results": [{"url": "a"}, {"name": "no url"}, {"url": "b"}]});
    assert_eq!(decoder.decode(&body).unwrap(), vec![json!("a"), json!("b")]);
}

#[test]
fn test_select_values_plain_path() {
    let body = json!({"data": [{"id": 1}]});
    assert_eq!(select_values(&body, "data").unwrap(), vec![json!([{"id": 1}])]);
    assert!(select_values(&body, "missing").unwrap().is_empty());
}

#[test]
fn test_select_values_invalid_wildcard_path() {
    let err = select_values(&json!({}), "results[*").unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}

// ============================================================================
// Path Helper Tests
// ============================================================================

#[test]
fn test_extract_path_nested() {
    let value = json!({"meta": {"next": "abc"}});
    assert_eq!(extract_path(&value, "meta.next"), Some(&json!("abc")));
    assert_eq!(extract_path(&value, "$.meta.next"), Some(&json!("abc")));
    assert_eq!(extract_path(&value, "meta.missing"), None);
}

#[test]
fn test_extract_path_negative_index() {
    let value = json!({"data": [{"id": "pi_1"}, {"id": "pi_2"}], "has_more": true});
    assert_eq!(extract_path(&value, "data[-1].id"), Some(&json!("pi_2")));
    assert_eq!(extract_path(&value, "data[0].id"), Some(&json!("pi_1")));
    assert_eq!(extract_path(&value, "data[5].id"), None);
}

#[test]
fn test_extract_path_negative_index_on_empty_array() {
    let value = json!({"data": []});
    assert_eq!(extract_path(&value, "data[-1].id"), None);
}

#[test]
fn test_into_records_rejects_scalars() {
    let err = into_records(vec![json!({"id": 1}), json!(42)]).unwrap_err();
    assert!(err.to_string().contains("number"));
}

#[test]
fn test_value_to_string() {
    assert_eq!(value_to_string(&json!("a")), Some("a".to_string()));
    assert_eq!(value_to_string(&json!(8863)), Some("8863".to_string()));
    assert_eq!(value_to_string(&json!(null)), None);
}
