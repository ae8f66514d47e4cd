//! Issues
//!
//! Validation findings shared by the structural validator, the resolver and
//! the semantic validator. Every finding carries a slash-delimited pointer into
//! the document (or graph) it was raised against.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Issue Codes
// =============================================================================

/// Code categorizing an issue; the code fixes the severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    // === Structural ===
    /// Document does not match the declared model shape
    SchemaViolation,
    /// `model.version` is not a semantic version
    InvalidVersion,
    /// Document could not be interpreted at all
    MalformedDocument,
    /// Entity has no description
    MissingDescription,
    /// Model lists no owners
    MissingOwners,

    // === Resolution ===
    /// Two distinct models contribute the same entity name
    DuplicateEntity,
    /// Import allow-list names an entity the target does not declare
    ImportEntityNotFound,
    /// Imported document declares a different model name than requested
    ImportNameMismatch,

    // === Semantic ===
    /// Entity, relationship, index or glossary term declared twice
    DuplicateName,
    /// Field declared twice within one entity
    DuplicateField,
    /// Table without primary key
    MissingPrimaryKey,
    /// Relationship endpoint names a field that does not exist
    MissingFields,
    /// Relationship endpoint is not `Entity.Field` or names an unknown entity
    InvalidFieldReference,
    /// Index names an unknown entity or field
    InvalidIndex,
    /// Glossary link does not resolve
    DanglingGlossaryLink,
    /// Deprecated field without a deprecation message
    DeprecatedWithoutMessage,
    /// Field flagged both computed and primary key
    ComputedPrimaryKey,
    /// Computed field without an expression
    ComputedWithoutExpression,
    /// Governance classification for a field that does not exist
    GovernanceOrphan,
    /// Rule target names no existing entity or field
    DanglingRuleTarget,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaViolation => "SCHEMA_VIOLATION",
            Self::InvalidVersion => "INVALID_VERSION",
            Self::MalformedDocument => "MALFORMED_DOCUMENT",
            Self::MissingDescription => "MISSING_DESCRIPTION",
            Self::MissingOwners => "MISSING_OWNERS",
            Self::DuplicateEntity => "DUPLICATE_ENTITY",
            Self::ImportEntityNotFound => "IMPORT_ENTITY_NOT_FOUND",
            Self::ImportNameMismatch => "IMPORT_NAME_MISMATCH",
            Self::DuplicateName => "DUPLICATE_NAME",
            Self::DuplicateField => "DUPLICATE_FIELD",
            Self::MissingPrimaryKey => "MISSING_PRIMARY_KEY",
            Self::MissingFields => "MISSING_FIELDS",
            Self::InvalidFieldReference => "INVALID_FIELD_REFERENCE",
            Self::InvalidIndex => "INVALID_INDEX",
            Self::DanglingGlossaryLink => "DANGLING_GLOSSARY_LINK",
            Self::DeprecatedWithoutMessage => "DEPRECATED_WITHOUT_MESSAGE",
            Self::ComputedPrimaryKey => "COMPUTED_PRIMARY_KEY",
            Self::ComputedWithoutExpression => "COMPUTED_WITHOUT_EXPRESSION",
            Self::GovernanceOrphan => "GOVERNANCE_ORPHAN",
            Self::DanglingRuleTarget => "DANGLING_RULE_TARGET",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::SchemaViolation
            | Self::InvalidVersion
            | Self::MalformedDocument
            | Self::ImportEntityNotFound
            | Self::DuplicateName
            | Self::DuplicateField
            | Self::MissingPrimaryKey
            | Self::MissingFields
            | Self::InvalidFieldReference
            | Self::InvalidIndex => Severity::Error,

            Self::MissingDescription
            | Self::MissingOwners
            | Self::DuplicateEntity
            | Self::ImportNameMismatch
            | Self::DanglingGlossaryLink
            | Self::DeprecatedWithoutMessage
            | Self::ComputedPrimaryKey
            | Self::ComputedWithoutExpression
            | Self::GovernanceOrphan
            | Self::DanglingRuleTarget => Severity::Warning,
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Issue severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Issue
// =============================================================================

/// A single validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Slash-delimited pointer, e.g. `/entities/3/fields/1/type`
    pub path: String,
    /// Human-readable message
    pub message: String,
    pub severity: Severity,
    pub code: IssueCode,
}

impl Issue {
    pub fn new(code: IssueCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            severity: code.severity(),
            code,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "[{}] {} {}: {}", self.code, self.severity, path, self.message)
    }
}

// =============================================================================
// Issue Collection
// =============================================================================

/// Ordered collection of issues from one or more validation passes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Issues {
    items: Vec<Issue>,
}

impl Issues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: Issue) {
        self.items.push(issue);
    }

    /// Record an issue for `code` at `path`
    pub fn report(&mut self, code: IssueCode, path: impl Into<String>, message: impl Into<String>) {
        self.push(Issue::new(code, path, message));
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Issue::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.items.iter().filter(|i| i.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.items.iter().filter(|i| i.is_warning())
    }

    pub fn with_code(&self, code: IssueCode) -> impl Iterator<Item = &Issue> {
        self.items.iter().filter(move |i| i.code == code)
    }

    pub fn all(&self) -> &[Issue] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Append another collection, preserving order
    pub fn merge(&mut self, other: Issues) {
        self.items.extend(other.items);
    }

    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for item in &self.items {
            output.push_str(&format!("{}\n", item));
        }

        if !self.is_empty() {
            output.push_str(&format!(
                "\n{} error(s), {} warning(s)\n",
                self.error_count(),
                self.warning_count()
            ));
        }

        output
    }
}

impl fmt::Display for Issues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

impl From<Vec<Issue>> for Issues {
    fn from(items: Vec<Issue>) -> Self {
        Self { items }
    }
}

impl From<Issues> for Vec<Issue> {
    fn from(issues: Issues) -> Self {
        issues.items
    }
}

impl Extend<Issue> for Issues {
    fn extend<T: IntoIterator<Item = Issue>>(&mut self, iter: T) {
        self.items.extend(iter);
    }
}

impl IntoIterator for Issues {
    type Item = Issue;
    type IntoIter = std::vec::IntoIter<Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Issues {
    type Item = &'a Issue;
    type IntoIter = std::slice::Iter<'a, Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Escape one segment of a slash-delimited pointer
pub(crate) fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
