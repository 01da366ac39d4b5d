use serde_json::{Map, Value};

// Request metadata that changes on every fetch; keeping it would defeat
// content hashing.
const EXCLUDED_KEYS: [&str; 6] = [
    "fetched_at",
    "requested_at",
    "request_id",
    "response_headers",
    "http_status",
    "api_version",
];

fn sorted_array_keys(entity: &str) -> &'static [&'static str] {
    match entity {
        "item" => &["smallImageUrls", "mediumImageUrls", "tagIds"],
        _ => &[],
    }
}

/// Deterministic form of a raw upstream payload: keys sorted, volatile keys
/// elided, strings trimmed with CR/CRLF unified to LF (empty → null), and the
/// per-entity designated arrays sorted. Idempotent.
pub fn canonicalize(entity: &str, raw: &Value) -> Value {
    let entity = entity.to_lowercase();
    canonicalize_value(raw, sorted_array_keys(&entity), None)
}

fn canonicalize_value(value: &Value, sort_keys: &[&str], parent_key: Option<&str>) -> Value {
    match value {
        Value::Object(map) => {
            // serde_json's map is a BTreeMap, so iteration (and later
            // serialization) is already in ascending key order.
            let mut normalized = Map::new();
            for (key, entry) in map {
                if EXCLUDED_KEYS.contains(&key.as_str()) {
                    continue;
                }
                normalized.insert(key.clone(), canonicalize_value(entry, sort_keys, Some(key)));
            }
            Value::Object(normalized)
        }
        Value::Array(entries) => {
            let mut normalized: Vec<Value> = entries
                .iter()
                .map(|entry| canonicalize_value(entry, sort_keys, parent_key))
                .collect();
            if parent_key.is_some_and(|key| sort_keys.contains(&key)) {
                normalized.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
            }
            Value::Array(normalized)
        }
        Value::String(s) => {
            let unified = s.replace("\r\n", "\n").replace('\r', "\n");
            let trimmed = unified.trim();
            if trimmed.is_empty() {
                Value::Null
            } else {
                Value::String(trimmed.to_string())
            }
        }
        other => other.clone(),
    }
}

// Strings order by their bare form, everything else by its minimal JSON form
// (keys inside containers are already sorted by the map representation).
fn sort_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn canonicalizes_item_payload() {
        let raw = json!({
            "itemCode": "shop:123",
            "smallImageUrls": ["2", "1"],
            "mediumImageUrls": ["b", "a"],
            "tagIds": [3, 1, 2],
            "request_id": "x",
            "fetched_at": "t",
            "nested": {"b": " B ", "a": "A"}
        });

        let canonical = canonicalize("item", &raw);

        assert_eq!(
            canonical,
            json!({
                "itemCode": "shop:123",
                "mediumImageUrls": ["a", "b"],
                "nested": {"a": "A", "b": "B"},
                "smallImageUrls": ["1", "2"],
                "tagIds": [1, 2, 3]
            })
        );
    }

    #[test]
    fn is_idempotent() {
        let raw = json!({
            "itemCode": " code \r\n",
            "tagIds": ["3", 1, 2],
            "caption": "line1\r\nline2\rline3",
            "empty": "   "
        });

        let once = canonicalize("item", &raw);
        let twice = canonicalize("item", &once);

        assert_eq!(once, twice);
    }

    #[test]
    fn normalizes_strings() {
        let raw = json!({"a": "  x\r\ny\rz  ", "b": " \t "});
        let canonical = canonicalize("genre", &raw);
        assert_eq!(canonical, json!({"a": "x\ny\nz", "b": null}));
    }

    #[test]
    fn only_designated_arrays_are_sorted() {
        let raw = json!({"items": [3, 1, 2], "tagIds": [3, 1, 2]});

        let ranking = canonicalize("ranking", &raw);
        assert_eq!(ranking["items"], json!([3, 1, 2]));
        assert_eq!(ranking["tagIds"], json!([3, 1, 2]));

        let item = canonicalize("item", &raw);
        assert_eq!(item["items"], json!([3, 1, 2]));
        assert_eq!(item["tagIds"], json!([1, 2, 3]));
    }

    #[test]
    fn sorts_container_entries_by_minimal_json_form() {
        let raw = json!({"smallImageUrls": [{"imageUrl": "b"}, {"imageUrl": "a"}]});
        let canonical = canonicalize("item", &raw);
        assert_eq!(
            canonical["smallImageUrls"],
            json!([{"imageUrl": "a"}, {"imageUrl": "b"}])
        );
    }

    #[test]
    fn drops_volatile_keys_at_any_depth() {
        let raw = json!({
            "api_version": 2,
            "nested": {"http_status": 200, "keep": 1}
        });
        let canonical = canonicalize("tag", &raw);
        assert_eq!(canonical, json!({"nested": {"keep": 1}}));
    }
}
