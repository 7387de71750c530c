//! Helpers for free-form JSON values: dotted-path assignment, `--set` parsing and
//! RFC 7386 merge patches.

use serde_json::{Map, Value as JsonValue};

use crate::error::{CoreError, Result};

/// Set a value by dotted path, creating intermediate objects as needed.
/// Non-object values on the way are replaced.
pub fn set_path(value: &mut JsonValue, path: &str, new_value: JsonValue) {
    let mut current = value;
    let mut segments = path.split('.').filter(|s| !s.is_empty()).peekable();

    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = JsonValue::Object(Map::new());
        }
        let JsonValue::Object(map) = current else {
            unreachable!("replaced with an object above");
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), new_value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()));
    }
}

/// Apply a JSON merge patch to `target` in place.
///
/// Objects merge recursively, `null` removes a key and anything else
/// (arrays included) replaces the target value.
pub fn merge_patch(target: &mut JsonValue, patch: &JsonValue) {
    let JsonValue::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = JsonValue::Object(Map::new());
    }
    if let JsonValue::Object(target_map) = target {
        for (key, patch_value) in patch_map {
            if patch_value.is_null() {
                target_map.remove(key);
            } else {
                let entry = target_map.entry(key.clone()).or_insert(JsonValue::Null);
                merge_patch(entry, patch_value);
            }
        }
    }
}

/// Parse `key.path=value` arguments into a single object.
///
/// Values that parse as JSON scalars (`true`, `3`, `null`) keep their type,
/// everything else is a string.
pub fn parse_set_values(args: &[String]) -> Result<JsonValue> {
    let mut values = JsonValue::Object(Map::new());

    for arg in args {
        let (key, raw) = arg
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| CoreError::InvalidSpec {
                message: format!("invalid --set '{}', expected key=value", arg),
            })?;

        let parsed = match serde_json::from_str::<JsonValue>(raw) {
            Ok(v) if !v.is_object() && !v.is_array() => v,
            _ => JsonValue::String(raw.to_string()),
        };
        set_path(&mut values, key, parsed);
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_patch_nested_and_null_removal() {
        let mut target = json!({
            "metadata": {"name": "cfg", "annotations": {"a": "1", "b": "2"}},
            "spec": {"list": [1, 2, 3]}
        });
        merge_patch(
            &mut target,
            &json!({
                "metadata": {"annotations": {"a": null, "c": "3"}},
                "spec": {"list": [9]}
            }),
        );

        assert_eq!(
            target,
            json!({
                "metadata": {"name": "cfg", "annotations": {"b": "2", "c": "3"}},
                "spec": {"list": [9]}
            })
        );
    }

    #[test]
    fn test_set_path() {
        let mut value = json!({"spec": "scalar"});
        set_path(&mut value, "spec.dashboardConfig.disableServiceMesh", json!(false));
        assert_eq!(value, json!({"spec": {"dashboardConfig": {"disableServiceMesh": false}}}));
    }

    #[test]
    fn test_parse_set_values() {
        let args = vec![
            "gateway.replicas=2".to_string(),
            "gateway.name=ingress".to_string(),
            "debug=true".to_string(),
        ];
        let values = parse_set_values(&args).unwrap();
        assert_eq!(values, json!({"gateway": {"replicas": 2, "name": "ingress"}, "debug": true}));

        assert!(parse_set_values(&["novalue".to_string()]).is_err());
    }
}
