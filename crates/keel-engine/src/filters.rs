//! Template helpers available to manifests

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value};

/// Replace every occurrence of `old` with `new`.
///
/// Registered both as a function and a filter:
/// `{{ replace_char(mesh.name, ".", "-") }}` or `{{ mesh.name | replace_char(".", "-") }}`
pub fn replace_char(value: String, old: String, new: String) -> String {
    value.replace(&old, &new)
}

/// Sanitize a string for use as a resource name
///
/// Usage: {{ "My Gateway" | rfc1123 }}
pub fn rfc1123(value: String) -> String {
    keel_core::to_rfc1123_subdomain(&value)
}

/// Convert a value to YAML
///
/// Usage: {{ auth.authorino.audiences | toyaml }}
pub fn toyaml(value: Value) -> Result<String, Error> {
    let json_value: serde_json::Value = serde_json::to_value(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;

    let yaml = serde_yaml::to_string(&json_value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;

    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// Usage: {{ values | tojson }}
pub fn tojson(value: Value) -> Result<String, Error> {
    let json_value: serde_json::Value = serde_json::to_value(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;

    serde_json::to_string(&json_value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

/// Usage: {{ oauth.client_secret | b64encode }}
#[must_use]
pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

/// Usage: {{ domain | quote }}
#[must_use]
pub fn quote(value: Value) -> String {
    let s = match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    };
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Newline followed by the value indented by `spaces`
///
/// Usage: {{ values.labels | toyaml | nindent(4) }}
#[must_use]
pub fn nindent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    let indented: Vec<String> = value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect();
    format!("\n{}", indented.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_char() {
        assert_eq!(
            replace_char("apps.example.com".into(), ".".into(), "-".into()),
            "apps-example-com"
        );
    }

    #[test]
    fn test_rfc1123() {
        assert_eq!(rfc1123("My Gateway".into()), "my-gateway");
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote(Value::from(r#"a"b"#)), r#""a\"b""#);
    }

    #[test]
    fn test_nindent() {
        assert_eq!(nindent("a: 1\nb: 2".into(), 2), "\n  a: 1\n  b: 2");
    }

    #[test]
    fn test_toyaml() {
        let value = Value::from_serialize(serde_json::json!({"name": "basic"}));
        assert_eq!(toyaml(value).unwrap(), "name: basic");
    }
}
