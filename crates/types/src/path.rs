//! Dotted path selection over JSON values (`menu.links[0].id`).

use serde_json::Value;

/// Selects a nested value using a dotted path with optional `[index]` accessors.
///
/// A missing or blank path returns the value itself. Returns `None` when any segment
/// does not resolve.
pub fn select_path<'a>(value: &'a Value, path: Option<&str>) -> Option<&'a Value> {
    let Some(path) = path else {
        return Some(value);
    };
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Some(value);
    }

    let mut current = value;
    for segment in trimmed.split('.') {
        if segment.is_empty() {
            continue;
        }
        let (key, indices) = split_indices(segment);
        if !key.is_empty() {
            current = current.get(key)?;
        }
        for index in indices {
            current = current.get(index)?;
        }
    }
    Some(current)
}

fn split_indices(segment: &str) -> (&str, Vec<usize>) {
    let bytes = segment.as_bytes();
    let key_end = bytes.iter().position(|byte| *byte == b'[').unwrap_or(bytes.len());
    let key = &segment[..key_end];

    let mut indices = Vec::new();
    let mut cursor = key_end;
    while cursor < bytes.len() && bytes[cursor] == b'[' {
        cursor += 1;
        let start = cursor;
        while cursor < bytes.len() && bytes[cursor] != b']' {
            cursor += 1;
        }
        if cursor <= start {
            break;
        }
        if let Ok(index) = segment[start..cursor].trim().parse::<usize>() {
            indices.push(index);
        }
        cursor += 1;
    }
    (key, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn selects_nested_keys_and_indices() {
        let value = json!({ "menu": { "links": [ { "id": "a" }, { "id": "b" } ] } });
        assert_eq!(select_path(&value, Some("menu.links[1].id")), Some(&json!("b")));
    }

    #[test]
    fn blank_path_returns_root() {
        let value = json!({ "id": 1 });
        assert_eq!(select_path(&value, None), Some(&value));
        assert_eq!(select_path(&value, Some("  ")), Some(&value));
    }

    #[test]
    fn missing_segment_returns_none() {
        let value = json!({ "id": 1 });
        assert_eq!(select_path(&value, Some("label")), None);
        assert_eq!(select_path(&value, Some("id[3]")), None);
    }
}
