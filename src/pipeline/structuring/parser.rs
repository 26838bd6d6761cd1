use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::LlmError;

/// Greedy outermost-brace span; `.` crosses newlines.
static JSON_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("static regex"));

/// Pull the first `{` .. last `}` span out of a model response and decode it
/// as a JSON object.
pub fn extract_json_object(response: &str) -> Result<Map<String, Value>, LlmError> {
    let span = JSON_SPAN
        .find(response)
        .ok_or_else(|| LlmError::InvalidModelResponse("no JSON object found in response".into()))?;

    match serde_json::from_str::<Value>(span.as_str()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(LlmError::InvalidModelResponse(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(LlmError::InvalidModelResponse(format!(
            "invalid JSON in response: {e}"
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// First option whose lower-cased form occurs in the trimmed, lower-cased
/// response; `options[0]` otherwise. `options` must be non-empty.
pub fn pick_option<'a>(response: &str, options: &'a [String]) -> &'a str {
    let response = response.trim().to_lowercase();
    options
        .iter()
        .find(|option| response.contains(&option.to_lowercase()))
        .or_else(|| options.first())
        .map(String::as_str)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_from_chatty_response() {
        let response = "Here you go:\n```json\n{\n  \"category\": \"Finance\",\n  \"year\": \"2024\"\n}\n```";
        let map = extract_json_object(response).unwrap();
        assert_eq!(map["category"], "Finance");
        assert_eq!(map["year"], "2024");
    }

    #[test]
    fn span_is_greedy_across_nested_objects() {
        let map = extract_json_object(r#"{"a": {"b": 1}, "c": "d"}"#).unwrap();
        assert_eq!(map["a"]["b"], 1);
        assert_eq!(map["c"], "d");
    }

    #[test]
    fn no_braces_is_invalid_response() {
        let err = extract_json_object("nothing here").unwrap_err();
        assert!(matches!(err, LlmError::InvalidModelResponse(_)));
    }

    #[test]
    fn two_objects_make_an_invalid_span() {
        let err = extract_json_object(r#"{"a": 1} and {"b": 2}"#).unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn truncated_json_is_invalid_response() {
        assert!(extract_json_object(r#"{"category": "Work", }"#).is_err());
    }

    #[test]
    fn pick_option_prefers_list_order() {
        let options = vec!["Report".to_string(), "Annual Report".to_string()];
        assert_eq!(pick_option("Annual Report", &options), "Report");
        assert_eq!(pick_option("  REPORT ", &options), "Report");
        assert_eq!(pick_option("memo", &options), "Report");
    }

    #[test]
    fn pick_option_handles_non_ascii() {
        let options = vec!["合同".to_string(), "发票".to_string()];
        assert_eq!(pick_option("这是发票", &options), "发票");
    }
}
