//! Static field descriptors.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::values::FormValues;

/// Custom validator: returns an error message when the value is rejected.
pub type ValidatorFn = Arc<dyn Fn(&Value, &FormValues) -> Option<String> + Send + Sync>;

/// Applied to a value before it is stored.
pub type TransformFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Input kind of a field. Decides the empty value and how raw input is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Free text.
    #[default]
    Text,
    /// E-mail address.
    Email,
    /// Password.
    Password,
    /// Number; raw input is parsed.
    Number,
    /// Phone number.
    Tel,
    /// URL.
    Url,
    /// Multi-line text.
    Textarea,
    /// One of a set of options.
    Select,
    /// Boolean toggle.
    Checkbox,
    /// Date string.
    Date,
}

impl FieldType {
    /// Value of a field of this kind before any input.
    pub fn empty_value(self) -> Value {
        match self {
            FieldType::Checkbox => Value::Bool(false),
            _ => Value::String(String::new()),
        }
    }

    /// Reads raw input as a value of this kind.
    ///
    /// Numbers that do not parse are kept as text so validators can reject them.
    pub fn coerce(self, raw: &str) -> Value {
        match self {
            FieldType::Checkbox => {
                Value::Bool(matches!(raw.trim(), "true" | "on" | "1" | "checked"))
            }
            FieldType::Number => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Value::Null;
                }
                if let Ok(int) = trimmed.parse::<i64>() {
                    return Value::from(int);
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(raw.to_owned()))
            }
            _ => Value::String(raw.to_owned()),
        }
    }
}

/// Descriptor of one form field.
///
/// ```
/// use serde_json::{Value, json};
/// use sitekit_form::{FieldConfig, FieldType};
///
/// let age = FieldConfig::new("age")
///     .kind(FieldType::Number)
///     .label("Age")
///     .required()
///     .validate(|value, _| match value.as_i64() {
///         Some(age) if age < 18 => Some("Must be an adult".into()),
///         _ => None,
///     });
/// assert_eq!(age.initial_value(), &Value::String(String::new()));
/// ```
#[derive(Clone)]
pub struct FieldConfig {
    name: SmolStr,
    kind: FieldType,
    label: Option<String>,
    required: bool,
    validator: Option<ValidatorFn>,
    transform: Option<TransformFn>,
    initial: Option<Value>,
    depends_on: Vec<SmolStr>,
}

impl FieldConfig {
    /// Creates a plain text field.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            kind: FieldType::default(),
            label: None,
            required: false,
            validator: None,
            transform: None,
            initial: None,
            depends_on: Vec::new(),
        }
    }

    /// Sets the input kind.
    pub fn kind(mut self, kind: FieldType) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the label used in messages.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Rejects empty values.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Adds a custom validator, called with the field value and all values.
    pub fn validate<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value, &FormValues) -> Option<String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Adds a transform applied before values are stored.
    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Sets the initial value.
    pub fn initial(mut self, value: impl Into<Value>) -> Self {
        self.initial = Some(value.into());
        self
    }

    /// Revalidates this field when `field` changes, once this field was touched.
    pub fn depends_on(mut self, field: impl Into<SmolStr>) -> Self {
        self.depends_on.push(field.into());
        self
    }

    /// Field name.
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    /// Input kind.
    pub fn field_type(&self) -> FieldType {
        self.kind
    }

    /// Label, falling back to the name.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Whether empty values are rejected.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Initial value, or the empty value of the field kind.
    pub fn initial_value(&self) -> &Value {
        match &self.initial {
            Some(value) => value,
            None if self.kind == FieldType::Checkbox => &UNCHECKED,
            None => &EMPTY_STRING,
        }
    }

    /// Fields this one is revalidated with.
    pub fn dependencies(&self) -> &[SmolStr] {
        &self.depends_on
    }

    pub(crate) fn apply_transform(&self, value: Value) -> Value {
        match &self.transform {
            Some(transform) => transform(value),
            None => value,
        }
    }

    pub(crate) fn run_validator(&self, value: &Value, values: &FormValues) -> Option<String> {
        self.validator
            .as_ref()
            .and_then(|validator| validator(value, values))
    }
}

static EMPTY_STRING: Value = Value::String(String::new());
static UNCHECKED: Value = Value::Bool(false);

impl fmt::Debug for FieldConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("required", &self.required)
            .field("validator", &self.validator.is_some())
            .field("transform", &self.transform.is_some())
            .field("initial", &self.initial)
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_coercion() {
        assert_eq!(FieldType::Number.coerce("42"), json!(42));
        assert_eq!(FieldType::Number.coerce(" 2.5 "), json!(2.5));
        assert_eq!(FieldType::Number.coerce(""), json!(null));
        assert_eq!(FieldType::Number.coerce("abc"), json!("abc"));
    }

    #[test]
    fn test_checkbox_coercion() {
        assert_eq!(FieldType::Checkbox.coerce("on"), json!(true));
        assert_eq!(FieldType::Checkbox.coerce("true"), json!(true));
        assert_eq!(FieldType::Checkbox.coerce(""), json!(false));
    }

    #[test]
    fn test_text_is_kept_verbatim() {
        assert_eq!(FieldType::Email.coerce(" a@b.c "), json!(" a@b.c "));
    }

    #[test]
    fn test_initial_values() {
        assert_eq!(FieldConfig::new("a").initial_value(), &json!(""));
        assert_eq!(
            FieldConfig::new("b")
                .kind(FieldType::Checkbox)
                .initial_value(),
            &json!(false)
        );
        assert_eq!(FieldConfig::new("c").initial(3).initial_value(), &json!(3));
    }

    #[test]
    fn test_label_falls_back_to_name() {
        assert_eq!(FieldConfig::new("email").display_label(), "email");
        assert_eq!(
            FieldConfig::new("email").label("E-mail").display_label(),
            "E-mail"
        );
    }
}
