use serde_json::{Map, Value};

/// Extracts a JSON object from free-form model output.
///
/// The raw text may be wrapped in triple-backtick code fences or surrounded
/// by prose. Returns `None` when no object can be recovered; callers treat
/// that as a recoverable per-unit failure. `extra` entries are merged into
/// the result, but never overwrite keys the model itself produced.
pub fn parse_model_json(raw: &str, extra: &Map<String, Value>) -> Option<Map<String, Value>> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    let mut parsed = parse_object(cleaned).or_else(|| {
        let start = cleaned.find('{')?;
        let end = cleaned.rfind('}')?;
        if end <= start {
            return None;
        }
        parse_object(&cleaned[start..=end])
    })?;

    for (key, value) in extra {
        parsed.entry(key.clone()).or_insert_with(|| value.clone());
    }
    Some(parsed)
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_extra() -> Map<String, Value> {
        Map::new()
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"riassunto\":\"x\",\"tags\":[\"a\"]}\n```";
        let parsed = parse_model_json(raw, &no_extra()).unwrap();
        assert_eq!(parsed.get("riassunto").unwrap(), "x");
        assert_eq!(parsed.get("tags").unwrap(), &json!(["a"]));
    }

    #[test]
    fn garbage_is_unparseable() {
        assert!(parse_model_json("not json at all", &no_extra()).is_none());
    }

    #[test]
    fn recovers_object_embedded_in_prose() {
        let parsed = parse_model_json("prefix {\"riassunto\":\"y\"} suffix", &no_extra()).unwrap();
        assert_eq!(parsed.get("riassunto").unwrap(), "y");
    }

    #[test]
    fn top_level_array_is_rejected() {
        assert!(parse_model_json("[1, 2, 3]", &no_extra()).is_none());
    }

    #[test]
    fn extra_keys_fill_gaps_but_never_overwrite() {
        let mut extra = Map::new();
        extra.insert("pagine".to_string(), json!([1, 2]));
        extra.insert("riassunto".to_string(), json!("ignored"));
        let parsed = parse_model_json("{\"riassunto\":\"kept\"}", &extra).unwrap();
        assert_eq!(parsed.get("riassunto").unwrap(), "kept");
        assert_eq!(parsed.get("pagine").unwrap(), &json!([1, 2]));
    }
}
