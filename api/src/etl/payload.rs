use serde_json::Value;

/// First value present under any of `keys`. Presence wins over content, so a
/// stored null is still "found".
pub fn pick<'a>(map: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| map.get(*key))
}

pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn pick_i64(map: &Value, keys: &[&str]) -> Option<i64> {
    pick(map, keys).and_then(as_i64)
}

pub fn pick_i32(map: &Value, keys: &[&str]) -> Option<i32> {
    pick_i64(map, keys).and_then(|v| i32::try_from(v).ok())
}

pub fn pick_f64(map: &Value, keys: &[&str]) -> Option<f64> {
    pick(map, keys).and_then(as_f64)
}

pub fn pick_str(map: &Value, keys: &[&str]) -> Option<String> {
    pick(map, keys)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Entries of a ranked/search payload. Upstream wraps them as `items` or
/// `Items`, each entry either a flat map or `{Item: {...}}`; the shape
/// variance stops here.
pub fn extract_items(normalized: &Value) -> Vec<&Value> {
    let items = normalized
        .get("items")
        .and_then(Value::as_array)
        .or_else(|| normalized.get("Items").and_then(Value::as_array));
    let Some(items) = items else {
        return Vec::new();
    };
    items.iter().filter_map(unwrap_item).collect()
}

fn unwrap_item(entry: &Value) -> Option<&Value> {
    if !entry.is_object() {
        return None;
    }
    match entry.get("Item") {
        Some(inner) if inner.is_object() => Some(inner),
        _ => Some(entry),
    }
}

/// The single item map of a search payload: the payload itself when it
/// carries `itemCode`, otherwise the first wrapped entry.
pub fn extract_item_payload(normalized: &Value) -> Option<&Value> {
    if normalized.get("itemCode").is_some() {
        return Some(normalized);
    }
    extract_items(normalized).into_iter().next()
}

/// `tagIds` as integers, accepting digit strings.
pub fn extract_tag_ids(item: &Value) -> Vec<i64> {
    item.get("tagIds")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(as_i64).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn unwraps_lowercase_items() {
        let payload = json!({"items": [{"itemCode": "a"}, {"itemCode": "b"}]});
        let items = extract_items(&payload);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["itemCode"], "a");
    }

    #[test]
    fn unwraps_capitalized_and_wrapped_items() {
        let payload = json!({"Items": [{"Item": {"itemCode": "a"}}, {"itemCode": "b"}]});
        let items = extract_items(&payload);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["itemCode"], "a");
        assert_eq!(items[1]["itemCode"], "b");
    }

    #[test]
    fn extract_item_payload_prefers_direct_form() {
        let direct = json!({"itemCode": "x"});
        assert_eq!(extract_item_payload(&direct).unwrap()["itemCode"], "x");

        let wrapped = json!({"Items": [{"Item": {"itemCode": "y"}}]});
        assert_eq!(extract_item_payload(&wrapped).unwrap()["itemCode"], "y");

        assert!(extract_item_payload(&json!({"count": 0})).is_none());
    }

    #[test]
    fn tag_ids_accept_ints_and_digit_strings() {
        let item = json!({"tagIds": [1, "2", "x", null, 3.5]});
        assert_eq!(extract_tag_ids(&item), vec![1, 2]);
    }

    #[test]
    fn pick_takes_the_first_present_key() {
        let map = json!({"genre_id": 7});
        assert_eq!(pick_i64(&map, &["genreId", "genre_id"]), Some(7));
        assert_eq!(pick_i64(&map, &["missing"]), None);
    }

    #[test]
    fn numeric_coercions() {
        assert_eq!(as_i64(&json!("42")), Some(42));
        assert_eq!(as_i64(&json!(42)), Some(42));
        assert_eq!(as_i64(&json!("4.2")), None);
        assert_eq!(as_f64(&json!("4.2")), Some(4.2));
    }
}
