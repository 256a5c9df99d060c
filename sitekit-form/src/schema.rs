//! Whole-form validation.
//!
//! A [`Schema`] checks a [`FormValues`] set and reports [`SchemaIssue`]s
//! keyed by field name. The engine runs it twice: on a single-field
//! projection when one field changes, and on the full value set on submit.
//! Schemas should therefore only check the fields present in the values.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use smol_str::SmolStr;

use crate::values::{FormValues, is_blank};

/// One validation failure reported by a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaIssue {
    /// Name of the offending field.
    pub path: SmolStr,
    /// Message shown to the user.
    pub message: String,
}

impl SchemaIssue {
    /// Creates an issue for `path`.
    pub fn new(path: impl Into<SmolStr>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Validates a set of form values.
pub trait Schema: Send + Sync {
    /// Returns every issue found, or `Ok(())`.
    fn validate(&self, values: &FormValues) -> Result<(), Vec<SchemaIssue>>;
}

impl<F> Schema for F
where
    F: Fn(&FormValues) -> Result<(), Vec<SchemaIssue>> + Send + Sync,
{
    fn validate(&self, values: &FormValues) -> Result<(), Vec<SchemaIssue>> {
        (self)(values)
    }
}

static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

/// A built-in check on one field.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Looks like an e-mail address.
    Email,
    /// At least this many characters (or items).
    MinLength(usize),
    /// At most this many characters (or items).
    MaxLength(usize),
    /// Text matches the expression.
    Pattern(Regex),
    /// Number within the inclusive bounds.
    Range {
        /// Lower bound.
        min: Option<f64>,
        /// Upper bound.
        max: Option<f64>,
    },
    /// Text is one of the listed options.
    OneOf(Vec<String>),
}

impl Rule {
    /// Compiles `pattern` into a [`Rule::Pattern`].
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Rule::Pattern)
    }

    /// Default message for a failed check, naming the field as `subject`.
    fn message(&self, subject: &str) -> String {
        match self {
            Rule::Email => "Invalid email address".to_owned(),
            Rule::MinLength(min) => format!("{subject} must be at least {min} characters"),
            Rule::MaxLength(max) => format!("{subject} must be at most {max} characters"),
            Rule::Pattern(_) => format!("{subject} has an invalid format"),
            Rule::Range { min, max } => match (min, max) {
                (Some(min), Some(max)) => format!("{subject} must be between {min} and {max}"),
                (Some(min), None) => format!("{subject} must be at least {min}"),
                (None, Some(max)) => format!("{subject} must be at most {max}"),
                (None, None) => format!("{subject} must be a number"),
            },
            Rule::OneOf(options) => format!("{subject} must be one of: {}", options.join(", ")),
        }
    }

    fn check(&self, value: &Value) -> bool {
        match self {
            Rule::Email => value
                .as_str()
                .zip(EMAIL.as_ref())
                .is_some_and(|(text, email)| email.is_match(text)),
            Rule::MinLength(min) => length(value).is_some_and(|len| len >= *min),
            Rule::MaxLength(max) => length(value).is_some_and(|len| len <= *max),
            Rule::Pattern(pattern) => value.as_str().is_some_and(|text| pattern.is_match(text)),
            Rule::Range { min, max } => number(value).is_some_and(|n| {
                min.is_none_or(|min| n >= min) && max.is_none_or(|max| n <= max)
            }),
            Rule::OneOf(options) => value
                .as_str()
                .is_some_and(|text| options.iter().any(|option| option == text)),
        }
    }
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::String(text) => Some(text.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct FieldRule {
    field: SmolStr,
    rule: Rule,
    message: Option<String>,
}

/// Rule-based [`Schema`].
///
/// Empty values pass every rule (use a required field for presence), and
/// rules on fields missing from the values are skipped. Default messages
/// name the field by the label given to [`RuleSchema::label`], or by its
/// name.
///
/// ```
/// use serde_json::json;
/// use sitekit_form::{FormValues, Rule, RuleSchema, Schema};
///
/// let schema = RuleSchema::new()
///     .rule("email", Rule::Email)
///     .rule_with_message("name", Rule::MinLength(2), "Name is too short");
///
/// let values: FormValues = [("name", json!("A")), ("email", json!("a@b.com"))]
///     .into_iter()
///     .collect();
/// let issues = schema.validate(&values).unwrap_err();
/// assert_eq!(issues.len(), 1);
/// assert_eq!(issues[0].message, "Name is too short");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleSchema {
    rules: Vec<FieldRule>,
    labels: IndexMap<SmolStr, String>,
}

impl RuleSchema {
    /// Creates a schema without rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names `field` as `label` in default messages.
    pub fn label(mut self, field: impl Into<SmolStr>, label: impl Into<String>) -> Self {
        self.labels.insert(field.into(), label.into());
        self
    }

    /// Adds `rule` on `field` with its default message.
    pub fn rule(mut self, field: impl Into<SmolStr>, rule: Rule) -> Self {
        self.rules.push(FieldRule {
            field: field.into(),
            rule,
            message: None,
        });
        self
    }

    /// Adds `rule` on `field` with a custom message.
    pub fn rule_with_message(
        mut self,
        field: impl Into<SmolStr>,
        rule: Rule,
        message: impl Into<String>,
    ) -> Self {
        self.rules.push(FieldRule {
            field: field.into(),
            rule,
            message: Some(message.into()),
        });
        self
    }
}

impl Schema for RuleSchema {
    fn validate(&self, values: &FormValues) -> Result<(), Vec<SchemaIssue>> {
        let issues: Vec<SchemaIssue> = self
            .rules
            .iter()
            .filter_map(|FieldRule { field, rule, message }| {
                let value = values.get(field)?;
                if is_blank(value) || rule.check(value) {
                    return None;
                }
                let message = message.clone().unwrap_or_else(|| {
                    let subject = self.labels.get(field).map_or(field.as_str(), String::as_str);
                    rule.message(subject)
                });
                Some(SchemaIssue::new(field.clone(), message))
            })
            .collect();

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(pairs: &[(&str, Value)]) -> FormValues {
        pairs
            .iter()
            .map(|(name, value)| (*name, value.clone()))
            .collect()
    }

    #[test]
    fn test_email_rule() {
        let schema = RuleSchema::new().rule("email", Rule::Email);
        assert!(schema.validate(&values(&[("email", json!("a@b.com"))])).is_ok());
        let issues = schema
            .validate(&values(&[("email", json!("bad"))]))
            .unwrap_err();
        assert_eq!(issues, vec![SchemaIssue::new("email", "Invalid email address")]);
    }

    #[test]
    fn test_blank_and_missing_fields_are_skipped() {
        let schema = RuleSchema::new()
            .rule("email", Rule::Email)
            .rule("name", Rule::MinLength(3));
        assert!(schema.validate(&values(&[("email", json!(""))])).is_ok());
        assert!(schema.validate(&FormValues::new()).is_ok());
    }

    #[test]
    fn test_length_counts_chars() {
        let schema = RuleSchema::new().rule("name", Rule::MaxLength(3));
        assert!(schema.validate(&values(&[("name", json!("äöü"))])).is_ok());
        assert!(schema.validate(&values(&[("name", json!("abcd"))])).is_err());
    }

    #[test]
    fn test_range_accepts_numeric_strings() {
        let schema = RuleSchema::new().rule(
            "age",
            Rule::Range {
                min: Some(18.0),
                max: Some(99.0),
            },
        );
        assert!(schema.validate(&values(&[("age", json!(30))])).is_ok());
        assert!(schema.validate(&values(&[("age", json!("42"))])).is_ok());
        let issues = schema.validate(&values(&[("age", json!(7))])).unwrap_err();
        assert_eq!(issues[0].message, "age must be between 18 and 99");
    }

    #[test]
    fn test_label_names_field_in_default_messages() {
        let schema = RuleSchema::new()
            .label("age", "Age")
            .rule(
                "age",
                Rule::Range {
                    min: Some(18.0),
                    max: Some(99.0),
                },
            )
            .rule_with_message("nick", Rule::MinLength(3), "Pick a longer nickname");
        let issues = schema
            .validate(&values(&[("age", json!(7)), ("nick", json!("x"))]))
            .unwrap_err();
        assert_eq!(issues[0].message, "Age must be between 18 and 99");
        assert_eq!(issues[1].message, "Pick a longer nickname");
    }

    #[test]
    fn test_one_of_and_pattern() {
        let schema = RuleSchema::new()
            .rule("plan", Rule::OneOf(vec!["basic".into(), "pro".into()]))
            .rule("zip", Rule::pattern(r"^\d{5}$").unwrap());
        let issues = schema
            .validate(&values(&[("plan", json!("gold")), ("zip", json!("1234"))]))
            .unwrap_err();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].path, "plan");
        assert_eq!(issues[1].path, "zip");
    }

    #[test]
    fn test_closure_schema() {
        let schema = |values: &FormValues| {
            if values.get_str("password") == values.get_str("confirm") {
                Ok(())
            } else {
                Err(vec![SchemaIssue::new("confirm", "Passwords do not match")])
            }
        };
        let result = schema.validate(&values(&[
            ("password", json!("x")),
            ("confirm", json!("y")),
        ]));
        assert!(result.is_err());
    }
}
