use serde_json::json;
use wfcore::template::{check_value, resolve, resolve_text, resolve_value, tokens};
use wfcore::TemplateError;

#[test]
fn test_resolve_nested_number() {
    let state = json!({ "a": { "b": 5 } });
    assert_eq!(resolve("{{a.b}}", &state).unwrap(), "5");
}

#[test]
fn test_missing_path_resolves_to_null() {
    assert_eq!(resolve("{{missing.path}}", &json!({})).unwrap(), "null");
}

#[test]
fn test_strings_are_json_quoted() {
    let state = json!({ "form": { "response_data": { "name": "bob" } } });
    let body = resolve(r#"{"user": {{form.response_data.name}}}"#, &state).unwrap();
    assert_eq!(body, r#"{"user": "bob"}"#);
}

#[test]
fn test_array_index_segments() {
    let state = json!({ "items": [{ "id": 7 }, { "id": 9 }] });
    assert_eq!(resolve("{{items.1.id}}", &state).unwrap(), "9");
    assert_eq!(resolve("{{items.5.id}}", &state).unwrap(), "null");
}

#[test]
fn test_whitespace_inside_braces_is_trimmed() {
    let state = json!({ "u": 1 });
    assert_eq!(resolve("value={{ u }}", &state).unwrap(), "value=1");
}

#[test]
fn test_single_braces_are_plain_text() {
    let state = json!({ "x": true });
    assert_eq!(
        resolve(r#"{"a": {"b": {{x}}}}"#, &state).unwrap(),
        r#"{"a": {"b": true}}"#
    );
}

#[test]
fn test_resolve_text_inserts_raw_strings() {
    let state = json!({ "host": "example.com", "id": 3 });
    assert_eq!(
        resolve_text("https://{{host}}/items/{{id}}", &state).unwrap(),
        "https://example.com/items/3"
    );
}

#[test]
fn test_unclosed_token_is_an_error() {
    assert_eq!(
        resolve("hello {{name", &json!({})),
        Err(TemplateError::Unclosed { offset: 6 })
    );
}

#[test]
fn test_nested_token_is_an_error() {
    assert!(matches!(
        resolve("{{a {{b}}", &json!({})),
        Err(TemplateError::Nested { .. })
    ));
}

#[test]
fn test_empty_and_invalid_paths() {
    assert!(matches!(resolve("{{ }}", &json!({})), Err(TemplateError::Empty { .. })));
    assert!(matches!(
        resolve("{{a..b}}", &json!({})),
        Err(TemplateError::InvalidPath { .. })
    ));
}

#[test]
fn test_resolve_value_keeps_types_for_whole_tokens() {
    let state = json!({ "u": 1, "B": { "response_data": { "name": "bob" } } });
    let body = json!({
        "user": "{{u}}",
        "greeting": "hi {{B.response_data.name}}",
        "tags": ["{{B.response_data.name}}", 2],
    });
    assert_eq!(
        resolve_value(&body, &state).unwrap(),
        json!({ "user": 1, "greeting": "hi bob", "tags": ["bob", 2] })
    );
}

#[test]
fn test_tokens_and_check_value() {
    assert_eq!(tokens("{{a}} and {{ b.c }}").unwrap(), vec!["a", "b.c"]);
    assert!(check_value(&json!({ "ok": "{{a}}", "list": ["{{b"] })).is_err());
}
