//! Structural validation
//!
//! Checks one document against the bundled model schema
//! (`schemas/model.schema.json`) and a handful of shape rules JSON Schema
//! cannot express. Pure: never fails, malformed input becomes an error issue.

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use std::sync::OnceLock;

use crate::document::ModelDocument;
use crate::issue::{Issue, IssueCode, Issues};

/// The model document schema, draft 7
pub const MODEL_SCHEMA: &str = include_str!("../schemas/model.schema.json");

fn compiled_schema() -> &'static JSONSchema {
    static SCHEMA: OnceLock<JSONSchema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let raw: Value =
            serde_json::from_str(MODEL_SCHEMA).expect("bundled model schema is valid JSON");
        JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&raw)
            .expect("bundled model schema compiles")
    })
}

/// Validate a document's shape.
///
/// Errors mean the document cannot be resolved; warnings are advisory.
pub fn validate_document(document: &ModelDocument) -> Issues {
    validate_value(document.content())
}

/// Validate a raw tree
pub fn validate_value(content: &Value) -> Issues {
    let mut found: Vec<Issue> = Vec::new();

    if let Err(errors) = compiled_schema().validate(content) {
        for error in errors {
            let pointer = error.instance_path.to_string();
            let path = if pointer.is_empty() { "/".to_string() } else { pointer };
            found.push(Issue::new(IssueCode::SchemaViolation, path, error.to_string()));
        }
    }

    check_version(content, &mut found);
    check_owners(content, &mut found);
    check_descriptions(content, &mut found);

    found.sort_by(|a, b| {
        a.path
            .cmp(&b.path)
            .then_with(|| a.code.cmp(&b.code))
            .then_with(|| a.message.cmp(&b.message))
    });
    found.dedup();

    let issues = Issues::from(found);
    if !issues.is_empty() {
        tracing::debug!(
            errors = issues.error_count(),
            warnings = issues.warning_count(),
            "structural validation finished"
        );
    }
    issues
}

fn check_version(content: &Value, found: &mut Vec<Issue>) {
    let Some(version) = content
        .get("model")
        .and_then(|m| m.get("version"))
        .and_then(Value::as_str)
    else {
        return;
    };

    if version.is_empty() {
        return;
    }

    let stripped = version.strip_prefix('v').unwrap_or(version);
    if let Err(e) = semver::Version::parse(stripped) {
        found.push(Issue::new(
            IssueCode::InvalidVersion,
            "/model/version",
            format!("'{}' is not a semantic version: {}", version, e),
        ));
    }
}

fn check_owners(content: &Value, found: &mut Vec<Issue>) {
    let owners = content
        .get("model")
        .and_then(|m| m.get("owners"))
        .and_then(Value::as_array);

    if matches!(owners, Some(list) if list.is_empty()) {
        found.push(Issue::new(
            IssueCode::MissingOwners,
            "/model/owners",
            "model declares no owners",
        ));
    }
}

fn check_descriptions(content: &Value, found: &mut Vec<Issue>) {
    let Some(entities) = content.get("entities").and_then(Value::as_array) else {
        return;
    };

    for (i, entity) in entities.iter().enumerate() {
        let Some(obj) = entity.as_object() else {
            continue;
        };
        let described = obj
            .get("description")
            .and_then(Value::as_str)
            .is_some_and(|d| !d.trim().is_empty());
        if !described {
            let name = obj.get("name").and_then(Value::as_str).unwrap_or("?");
            found.push(Issue::new(
                IssueCode::MissingDescription,
                format!("/entities/{}", i),
                format!("entity '{}' has no description", name),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "model": {
                "name": "crm",
                "version": "1.0.0",
                "domain": "sales",
                "owners": ["data-team@example.com"],
                "state": "draft"
            },
            "entities": [{
                "name": "Customer",
                "type": "table",
                "description": "Customer master",
                "fields": [{ "name": "id", "type": "integer", "primary_key": true }]
            }]
        })
    }

    #[test]
    fn test_valid_document_is_clean() {
        assert!(validate_value(&valid()).is_empty());
    }

    #[test]
    fn test_wrong_field_type_points_into_document() {
        let mut doc = valid();
        doc["entities"][0]["fields"][0]["type"] = json!(42);
        let issues = validate_value(&doc);

        assert!(issues.has_errors());
        assert!(issues
            .errors()
            .any(|i| i.path == "/entities/0/fields/0/type" && i.code == IssueCode::SchemaViolation));
    }

    #[test]
    fn test_bad_enum_and_missing_required() {
        let mut doc = valid();
        doc["model"]["state"] = json!("shipped");
        doc["entities"][0]["type"] = json!("cube");
        doc["model"].as_object_mut().unwrap().remove("domain");
        let issues = validate_value(&doc);

        assert!(issues.errors().any(|i| i.path == "/model/state"));
        assert!(issues.errors().any(|i| i.path == "/entities/0/type"));
        assert!(issues.errors().any(|i| i.path == "/model"));
    }

    #[test]
    fn test_malformed_input_is_an_issue_not_a_panic() {
        let issues = validate_value(&json!(["not", "a", "model"]));
        assert!(issues.has_errors());
        assert_eq!(issues.all()[0].path, "/");
    }

    #[test]
    fn test_version_must_be_semver() {
        let mut doc = valid();
        doc["model"]["version"] = json!("one");
        let issues = validate_value(&doc);
        assert_eq!(issues.with_code(IssueCode::InvalidVersion).count(), 1);

        doc["model"]["version"] = json!("v2.1.0");
        assert!(validate_value(&doc).is_empty());
    }

    #[test]
    fn test_missing_description_is_warning() {
        let mut doc = valid();
        doc["entities"][0].as_object_mut().unwrap().remove("description");
        let issues = validate_value(&doc);
        assert!(!issues.has_errors());
        assert_eq!(issues.warning_count(), 1);
        assert_eq!(issues.all()[0].path, "/entities/0");
    }

    #[test]
    fn test_rule_requires_target() {
        let mut doc = valid();
        doc["rules"] = json!([
            { "name": "positive_id", "target": "Customer.id", "expression": "id > 0" },
            { "name": "orphan" }
        ]);
        let issues = validate_value(&doc);
        assert_eq!(issues.error_count(), 1);
        assert!(issues.errors().any(|i| i.path == "/rules/1"));
    }
}
