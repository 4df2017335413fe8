//! Dotted/indexed path evaluation against response-shaped JSON values.
//!
//! `evaluate` never panics and never errors on a missing property or an
//! out-of-bounds index — both simply yield `None`. Only the path-parsing
//! step itself can reject malformed input, and even then it degrades to
//! "no segments matched" rather than raising.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Splits `items[0].name` into `[Key("items"), Index(0), Key("name")]`.
/// A leading `.` is stripped (it only matters for the `.status` special
/// case, handled by the caller before segments are ever built).
fn parse_segments(path: &str) -> Vec<Segment> {
    let path = path.strip_prefix('.').unwrap_or(path);
    let mut segments = Vec::new();
    let mut current = String::new();

    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut current)));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut current)));
                }
                let mut index = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    index.push(c);
                }
                if let Ok(i) = index.parse::<usize>() {
                    segments.push(Segment::Index(i));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        segments.push(Segment::Key(current));
    }
    segments
}

fn step(current: &Value, segment: &Segment, case_insensitive: bool) -> Option<Value> {
    match (current, segment) {
        (Value::Object(map), Segment::Key(key)) => {
            if let Some(v) = map.get(key) {
                return Some(v.clone());
            }
            if case_insensitive {
                map.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v.clone())
            } else {
                None
            }
        }
        (Value::Array(items), Segment::Index(i)) => items.get(*i).cloned(),
        _ => None,
    }
}

fn traverse(start: &Value, segments: &[Segment], case_insensitive_first: bool) -> Option<Value> {
    let mut current = start.clone();
    for (i, segment) in segments.iter().enumerate() {
        let ci = case_insensitive_first && i == 0;
        current = step(&current, segment, ci)?;
    }
    Some(current)
}

/// Evaluates `path` against `data`, a response-shaped value (typically
/// `{status, headers, body}`). Returns `None` when any segment fails to
/// resolve; never panics.
pub fn evaluate(data: &Value, path: &str) -> Option<Value> {
    if path == ".status" {
        return data.get("status").cloned();
    }

    let segments = parse_segments(path);
    let first_key = match segments.first() {
        Some(Segment::Key(k)) => Some(k.as_str()),
        _ => None,
    };

    if first_key == Some("headers") && data.get("headers").is_some() {
        let headers = data.get("headers")?;
        return traverse(headers, &segments[1..], true);
    }

    if first_key == Some("body") && data.get("body").is_some() {
        let body = data.get("body")?;
        return traverse(body, &segments[1..], false);
    }

    if segments.len() == 1 && first_key == Some("status") {
        return data.get("status").cloned();
    }

    if let (Some(Value::Object(body_map)), Some(first)) = (data.get("body"), first_key) {
        if body_map.keys().next().map(String::as_str) == Some(first) {
            let body = data.get("body")?;
            return traverse(body, &segments, false);
        }
    }

    traverse(data, &segments, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dot_status_special_case() {
        let data = json!({"status": 200, "body": {"x": 1}});
        assert_eq!(evaluate(&data, ".status"), Some(json!(200)));
    }

    #[test]
    fn single_segment_status() {
        let data = json!({"status": 404});
        assert_eq!(evaluate(&data, "status"), Some(json!(404)));
    }

    #[test]
    fn body_first_segment() {
        let data = json!({"status": 200, "body": {"x": 1}});
        assert_eq!(evaluate(&data, "body.x"), Some(json!(1)));
    }

    #[test]
    fn headers_case_insensitive() {
        let data = json!({"headers": {"Content-Type": "application/json"}});
        assert_eq!(
            evaluate(&data, "headers.content-type"),
            Some(json!("application/json"))
        );
    }

    #[test]
    fn falls_through_to_body_when_first_property_matches() {
        let data = json!({"status": 200, "body": {"x": 1, "y": 2}});
        assert_eq!(evaluate(&data, "x"), Some(json!(1)));
    }

    #[test]
    fn indexed_array_access() {
        let data = json!({"body": {"items": [{"name": "a"}, {"name": "b"}]}});
        assert_eq!(evaluate(&data, "body.items[1].name"), Some(json!("b")));
    }

    #[test]
    fn missing_property_is_none() {
        let data = json!({"body": {"x": 1}});
        assert_eq!(evaluate(&data, "body.missing"), None);
    }

    #[test]
    fn out_of_bounds_index_is_none() {
        let data = json!({"body": {"items": [1, 2]}});
        assert_eq!(evaluate(&data, "body.items[5]"), None);
    }

    #[test]
    fn indexing_non_array_is_none() {
        let data = json!({"body": {"x": 1}});
        assert_eq!(evaluate(&data, "body.x[0]"), None);
    }

    #[test]
    fn traverses_plain_context_without_response_shape() {
        let context = json!({"count": 3, "nested": {"a": 1}});
        assert_eq!(evaluate(&context, "nested.a"), Some(json!(1)));
        assert_eq!(evaluate(&context, "count"), Some(json!(3)));
    }
}
