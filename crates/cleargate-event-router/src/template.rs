//! `{{ path }}` placeholder rendering for subscription filters.

use serde_json::Value;

use crate::errors::TemplateError;
use crate::traits::TemplateEngine;

/// Resolves `{{ dotted.path }}` placeholders against a JSON context.
///
/// A template that is exactly one placeholder (surrounding whitespace
/// allowed) renders to the raw value at that path, or `None` when the path
/// is absent. Anything else renders to a string with each placeholder
/// replaced by its value: strings verbatim, other values as JSON, missing
/// paths as the empty string.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderTemplateEngine;

impl TemplateEngine for PlaceholderTemplateEngine {
    fn render(&self, template: &str, context: &Value) -> Result<Option<Value>, TemplateError> {
        let segments = parse(template)?;

        if let [Segment::Placeholder(path)] = trimmed(&segments) {
            return Ok(lookup(context, path).cloned());
        }

        let mut out = String::with_capacity(template.len());
        for segment in &segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Placeholder(path) => match lookup(context, path) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(Value::Null) | None => {}
                    Some(other) => out.push_str(&other.to_string()),
                },
            }
        }
        Ok(Some(Value::String(out)))
    }
}

/// Replace every placeholder with `replacement`, leaving the rest of the
/// template untouched. Returns `None` when the template has no content
/// besides placeholders, i.e. it is entirely dynamic.
pub fn mask_placeholders(template: &str, replacement: &str) -> Result<Option<String>, TemplateError> {
    let segments = parse(template)?;
    let dynamic_only = segments.iter().all(|s| match s {
        Segment::Text(t) => t.trim().is_empty(),
        Segment::Placeholder(_) => true,
    });
    if dynamic_only && segments.iter().any(|s| matches!(s, Segment::Placeholder(_))) {
        return Ok(None);
    }
    let masked: String = segments
        .iter()
        .map(|s| match s {
            Segment::Text(t) => *t,
            Segment::Placeholder(_) => replacement,
        })
        .collect();
    Ok(Some(masked))
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut segments = Vec::new();
    let mut pos = 0;
    while let Some(rel) = template[pos..].find("{{") {
        let open = pos + rel;
        if open > pos {
            segments.push(Segment::Text(&template[pos..open]));
        }
        let inner_start = open + 2;
        let close = template[inner_start..]
            .find("}}")
            .map(|i| inner_start + i)
            .ok_or(TemplateError::Unterminated { offset: open })?;
        let path = template[inner_start..close].trim();
        if path.is_empty() {
            return Err(TemplateError::EmptyPlaceholder { offset: open });
        }
        segments.push(Segment::Placeholder(path));
        pos = close + 2;
    }
    if pos < template.len() {
        segments.push(Segment::Text(&template[pos..]));
    }
    Ok(segments)
}

/// Drop leading and trailing whitespace-only text segments.
fn trimmed<'s, 'a>(segments: &'s [Segment<'a>]) -> &'s [Segment<'a>] {
    let blank = |s: &Segment<'_>| matches!(s, Segment::Text(t) if t.trim().is_empty());
    let start = segments.iter().position(|s| !blank(s)).unwrap_or(segments.len());
    let end = segments.iter().rposition(|s| !blank(s)).map_or(start, |i| i + 1);
    &segments[start..end]
}

/// Dotted-path lookup. Numeric segments index into arrays.
fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({"event": {"a": "x", "flag": true, "n": 3, "list": ["p", "q"]}})
    }

    fn render(t: &str) -> Option<Value> {
        PlaceholderTemplateEngine.render(t, &ctx()).unwrap()
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(render(r#"event.a:"x""#), Some(json!(r#"event.a:"x""#)));
    }

    #[test]
    fn single_placeholder_yields_raw_value() {
        assert_eq!(render("{{event.flag}}"), Some(json!(true)));
        assert_eq!(render("  {{ event.n }} "), Some(json!(3)));
        assert_eq!(render("{{event.list.1}}"), Some(json!("q")));
    }

    #[test]
    fn missing_single_placeholder_is_undefined() {
        assert_eq!(render("{{event.missing}}"), None);
    }

    #[test]
    fn interpolation_renders_text() {
        assert_eq!(
            render(r#"event.a:"{{event.a}}" and n:{{event.n}}{{event.missing}}"#),
            Some(json!(r#"event.a:"x" and n:3"#))
        );
    }

    #[test]
    fn malformed_placeholders() {
        let e = PlaceholderTemplateEngine.render("a {{event.a", &ctx());
        assert!(matches!(e, Err(TemplateError::Unterminated { offset: 2 })));
        let e = PlaceholderTemplateEngine.render("{{  }}", &ctx());
        assert!(matches!(e, Err(TemplateError::EmptyPlaceholder { offset: 0 })));
    }

    #[test]
    fn masking() {
        assert_eq!(
            mask_placeholders("event.a:{{event.b}}", "_t").unwrap(),
            Some("event.a:_t".to_string())
        );
        assert_eq!(mask_placeholders(" {{event.flag}} ", "_t").unwrap(), None);
        assert_eq!(
            mask_placeholders("event.a:x", "_t").unwrap(),
            Some("event.a:x".to_string())
        );
    }
}
