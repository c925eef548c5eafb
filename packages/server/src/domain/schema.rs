//! Structural validation of untrusted inbound messages.
//!
//! A [`Schema`] maps every field a message must carry to a [`FieldRule`].
//! [`validate`] is a pure function over `serde_json::Value`, so it can be
//! tested without any networking.

use std::fmt;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// Runtime type of a JSON value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl Kind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Kind::Null,
            Value::Bool(_) => Kind::Boolean,
            Value::Number(_) => Kind::Number,
            Value::String(_) => Kind::String,
            Value::Array(_) => Kind::Array,
            Value::Object(_) => Kind::Object,
        }
    }
}

/// What a single field's value must satisfy
pub enum FieldRule {
    /// The value must be of this runtime type
    Kind(Kind),
    /// The value must be a string fully matched by the pattern
    Pattern(Regex),
    /// The value must be accepted by the predicate
    Predicate(fn(&Value) -> bool),
}

impl FieldRule {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldRule::Kind(kind) => Kind::of(value) == *kind,
            FieldRule::Pattern(regex) => value.as_str().is_some_and(|s| regex.is_match(s)),
            FieldRule::Predicate(predicate) => predicate(value),
        }
    }
}

impl fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRule::Kind(kind) => f.debug_tuple("Kind").field(kind).finish(),
            FieldRule::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            FieldRule::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Named set of mandatory fields
#[derive(Debug)]
pub struct Schema {
    name: &'static str,
    fields: Vec<(&'static str, FieldRule)>,
}

impl Schema {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Require `field` to be of the given runtime type
    pub fn kind(mut self, field: &'static str, kind: Kind) -> Self {
        self.fields.push((field, FieldRule::Kind(kind)));
        self
    }

    /// Require `field` to be a string matching `pattern` in full.
    ///
    /// The pattern is anchored here; callers write it without `^`/`$`.
    pub fn pattern(mut self, field: &'static str, pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        self.fields.push((field, FieldRule::Pattern(regex)));
        Ok(self)
    }

    /// Require `field` to satisfy `predicate`
    pub fn predicate(mut self, field: &'static str, predicate: fn(&Value) -> bool) -> Self {
        self.fields.push((field, FieldRule::Predicate(predicate)));
        self
    }

    fn rule(&self, field: &str) -> Option<&FieldRule> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, rule)| rule)
    }
}

/// Why a message was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{schema}: expected an object, got {actual:?}")]
    NotAnObject { schema: &'static str, actual: Kind },

    #[error("{schema}: field name '{field}' is not allowed")]
    IllegalFieldName { schema: &'static str, field: String },

    #[error("{schema}: unexpected field '{field}'")]
    UnknownField { schema: &'static str, field: String },

    #[error("{schema}: field '{field}' has an invalid value")]
    InvalidValue { schema: &'static str, field: String },

    #[error("{schema}: missing field '{field}'")]
    MissingField { schema: &'static str, field: String },

    #[error("{schema}: {reason}")]
    Shape { schema: &'static str, reason: String },
}

/// Letters and digits only, starting with a letter
fn is_legal_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

/// Check `value` against `schema`, returning the object unchanged on success.
pub fn validate<'a>(schema: &Schema, value: &'a Value) -> Result<&'a Map<String, Value>, ValidationError> {
    let object = value.as_object().ok_or(ValidationError::NotAnObject {
        schema: schema.name,
        actual: Kind::of(value),
    })?;

    for (field, field_value) in object {
        if !is_legal_field_name(field) {
            return Err(ValidationError::IllegalFieldName {
                schema: schema.name,
                field: field.clone(),
            });
        }
        let rule = schema.rule(field).ok_or_else(|| ValidationError::UnknownField {
            schema: schema.name,
            field: field.clone(),
        })?;
        if !rule.accepts(field_value) {
            return Err(ValidationError::InvalidValue {
                schema: schema.name,
                field: field.clone(),
            });
        }
    }

    if let Some((missing, _)) = schema
        .fields
        .iter()
        .find(|(name, _)| !object.contains_key(*name))
    {
        return Err(ValidationError::MissingField {
            schema: schema.name,
            field: missing.to_string(),
        });
    }

    Ok(object)
}

/// Validate, then deserialize into a typed payload.
pub fn validate_as<T: DeserializeOwned>(schema: &Schema, value: &Value) -> Result<T, ValidationError> {
    validate(schema, value)?;
    T::deserialize(value).map_err(|e| ValidationError::Shape {
        schema: schema.name,
        reason: e.to_string(),
    })
}
