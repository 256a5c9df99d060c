//! Field values keyed by name.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

/// Current values of a form, in field declaration order.
///
/// Values are plain JSON; use [`FormValues::deserialize`] to read them into
/// a typed struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormValues(IndexMap<SmolStr, Value>);

impl FormValues {
    /// Creates an empty value set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `name`, if the field exists.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Value of `name` as a string slice.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Sets `name` to `value`, keeping the position of an existing field.
    pub fn insert(&mut self, name: impl Into<SmolStr>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    /// Returns `true` if `name` has a value.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterates over `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &Value)> {
        self.0.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A value set holding only `name`, used to run a schema against one field.
    pub fn project(&self, name: &str) -> FormValues {
        let mut projected = FormValues::new();
        if let Some((key, value)) = self.0.get_key_value(name) {
            projected.0.insert(key.clone(), value.clone());
        }
        projected
    }

    /// Converts the values into a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        )
    }

    /// Deserializes the values into `T`.
    ///
    /// ```
    /// use serde::Deserialize;
    /// use serde_json::json;
    /// use sitekit_form::FormValues;
    ///
    /// #[derive(Deserialize)]
    /// struct Contact {
    ///     name: String,
    ///     subscribe: bool,
    /// }
    ///
    /// let values: FormValues = [("name", json!("Ada")), ("subscribe", json!(true))]
    ///     .into_iter()
    ///     .collect();
    /// let contact: Contact = values.deserialize().unwrap();
    /// assert_eq!(contact.name, "Ada");
    /// assert!(contact.subscribe);
    /// ```
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_json())
    }
}

impl<K: Into<SmolStr>> FromIterator<(K, Value)> for FormValues {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }
}

/// Returns `true` for values a required field rejects: `null`, `""` and `[]`.
pub(crate) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_projection_keeps_single_field() {
        let values: FormValues = [("name", json!("A")), ("email", json!("a@b.c"))]
            .into_iter()
            .collect();
        let projected = values.project("email");
        assert_eq!(projected.len(), 1);
        assert_eq!(projected.get_str("email"), Some("a@b.c"));
        assert!(values.project("missing").is_empty());
    }

    #[test]
    fn test_serializes_as_object_in_order() {
        let values: FormValues = [("b", json!(1)), ("a", json!(2))].into_iter().collect();
        assert_eq!(serde_json::to_string(&values).unwrap(), r#"{"b":1,"a":2}"#);
    }

    #[test]
    fn test_blank_values() {
        assert!(is_blank(&json!(null)));
        assert!(is_blank(&json!("")));
        assert!(is_blank(&json!([])));
        assert!(!is_blank(&json!(" ")));
        assert!(!is_blank(&json!(0)));
        assert!(!is_blank(&json!(false)));
    }
}
