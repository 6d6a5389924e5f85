//! Recursive input sanitizer for request bodies.

use regex_lite::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Values nested deeper than this are replaced with `null`.
pub const MAX_DEPTH: usize = 32;

struct Patterns {
    script_element: Regex,
    script_tag: Regex,
    js_uri: Regex,
    event_attr: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        script_element: Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>")
            .expect("script element regex is valid"),
        script_tag: Regex::new(r"(?i)</?script\b[^>]*>").expect("script tag regex is valid"),
        js_uri: Regex::new(r"(?i)javascript\s*:").expect("javascript uri regex is valid"),
        event_attr: Regex::new(r"(?i)\bon[a-z]+\s*=").expect("event attribute regex is valid"),
    })
}

/// Strip script elements, `javascript:` URIs and `on*=` attributes.
pub fn clean_str(input: &str) -> String {
    let p = patterns();
    let out = p.script_element.replace_all(input, "");
    let out = p.script_tag.replace_all(&out, "");
    let out = p.js_uri.replace_all(&out, "");
    p.event_attr.replace_all(&out, "").into_owned()
}

/// Keep only `[A-Za-z0-9_.-]` in an object key.
pub fn clean_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect()
}

/// Sanitize a JSON value. Keys that clean to nothing are dropped.
pub fn sanitize(value: Value) -> Value {
    sanitize_at(value, 0)
}

fn sanitize_at(value: Value, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        return Value::Null;
    }
    match value {
        Value::String(s) => Value::String(clean_str(&s)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| sanitize_at(v, depth + 1))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, v) in map {
                let key = clean_key(&key);
                if key.is_empty() {
                    continue;
                }
                out.insert(key, sanitize_at(v, depth + 1));
            }
            Value::Object(out)
        }
        scalar => scalar,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_script_element_removed() {
        let out = sanitize(json!({"title": "<script>alert(1)</script>hello"}));
        assert_eq!(out, json!({"title": "hello"}));
    }

    #[test]
    fn test_multiline_and_case() {
        assert_eq!(clean_str("a<SCRIPT type=\"x\">\nx()\n</Script >b"), "ab");
        assert_eq!(clean_str("<script src=evil.js>"), "");
    }

    #[test]
    fn test_js_uri_and_event_attrs() {
        assert_eq!(clean_str("JavaScript:alert(1)"), "alert(1)");
        assert_eq!(
            clean_str("<img src=x onerror=steal()>"),
            "<img src=x steal()>"
        );
        assert_eq!(clean_str("online shopping"), "online shopping");
    }

    #[test]
    fn test_keys_cleaned_and_nested() {
        let out = sanitize(json!({
            "order id!": 5,
            "<>": "dropped",
            "items": [{"na me": "<script>x</script>pen", "qty": 2}, true, null],
        }));
        assert_eq!(
            out,
            json!({"orderid": 5, "items": [{"name": "pen", "qty": 2}, true, null]})
        );
    }

    #[test]
    fn test_depth_bounded() {
        let mut v = json!("leaf");
        for _ in 0..(MAX_DEPTH + 5) {
            v = json!([v]);
        }
        let mut out = sanitize(v);
        let mut depth = 0;
        while let Value::Array(mut items) = out {
            out = items.pop().unwrap_or(Value::Null);
            depth += 1;
        }
        assert_eq!(depth, MAX_DEPTH + 1);
        assert!(out.is_null());
    }
}
