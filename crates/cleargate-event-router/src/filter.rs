//! Write-time validation of subscription filters.

use crate::errors::SubscriptionError;
use crate::registry::EVENT_PREFIX;
use crate::schema::PayloadSchema;
use crate::template::mask_placeholders;
use crate::traits::FilterEvaluator;

/// Stand-in for template placeholders while checking syntax. Placeholders
/// resolve at evaluation time, so their paths are never checked here.
const PLACEHOLDER_MASK: &str = "__template_value__";

/// Check that `where_clause` parses and that every field it references
/// resolves against `schema` once the `event.` prefix is stripped.
///
/// A filter made entirely of placeholders is accepted as-is, and a field
/// built from a placeholder is not checked.
pub fn validate_filter(
    where_clause: &str,
    schema: &dyn PayloadSchema,
    evaluator: &dyn FilterEvaluator,
) -> Result<(), SubscriptionError> {
    let masked = mask_placeholders(where_clause, PLACEHOLDER_MASK).map_err(|e| {
        SubscriptionError::FilterSyntax {
            message: e.to_string(),
        }
    })?;
    let Some(query) = masked else {
        return Ok(());
    };

    let fields =
        evaluator
            .referenced_fields(&query)
            .map_err(|e| SubscriptionError::FilterSyntax {
                message: e.to_string(),
            })?;

    let invalid_paths: Vec<String> = fields
        .into_iter()
        .filter(|field| !field.contains(PLACEHOLDER_MASK))
        .filter(|field| {
            let path = field.strip_prefix(EVENT_PREFIX).unwrap_or(field.as_str());
            schema.resolve_path(path).is_none()
        })
        .collect();

    if invalid_paths.is_empty() {
        Ok(())
    } else {
        Err(SubscriptionError::FilterValidation { invalid_paths })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::KqlEvaluator;
    use crate::schema::{FieldSchema, ObjectSchema};

    fn schema() -> ObjectSchema {
        ObjectSchema::new()
            .field("a", FieldSchema::string())
            .field(
                "repo",
                FieldSchema::object(ObjectSchema::new().field("name", FieldSchema::string())),
            )
    }

    fn check(filter: &str) -> Result<(), SubscriptionError> {
        validate_filter(filter, &schema(), &KqlEvaluator)
    }

    #[test]
    fn known_paths_pass() {
        check(r#"event.a:"x" and event.repo.name:core"#).unwrap();
        // the prefix is conventional, not mandatory
        check("a:x").unwrap();
    }

    #[test]
    fn unknown_paths_are_listed() {
        let err = check("event.a:x or event.b:y or event.repo.owner:z").unwrap_err();
        match err {
            SubscriptionError::FilterValidation { invalid_paths } => {
                assert_eq!(invalid_paths, vec!["event.b", "event.repo.owner"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn placeholders_are_exempt() {
        check("event.a:{{ event.expected }}").unwrap();
        check(r#"event.a:"{{event.whatever}}""#).unwrap();
        check("{{event.flag}}").unwrap();
    }

    #[test]
    fn placeholder_fields_are_not_resolved() {
        check("{{event.f}}:x").unwrap();
        check("event.{{event.key}}:x and event.a:y").unwrap();
        // the rest of the filter is still checked
        let err = check("{{event.f}}:x or event.b:y").unwrap_err();
        match err {
            SubscriptionError::FilterValidation { invalid_paths } => {
                assert_eq!(invalid_paths, vec!["event.b"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(matches!(
            check("event.a:"),
            Err(SubscriptionError::FilterSyntax { .. })
        ));
        assert!(matches!(
            check("event.a:{{oops"),
            Err(SubscriptionError::FilterSyntax { .. })
        ));
    }
}
