//! Declarative configuration-field schemas for components and triggers.
//!
//! A component describes its configuration as a list of [`Field`]s. The
//! editor renders the fields; the engine uses the same schema to validate
//! user input, resolve conditional visibility, evaluate expression-bearing
//! values, and produce the immutable configuration snapshot stored on each
//! execution row.
//!
//! The wire codec for field defaults (see [`encode`]) is deliberately
//! asymmetric by type, so string-like values survive round-trips byte for
//! byte while structured values travel as JSON.

pub mod encode;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::expr::ExpressionEvaluator;

pub use encode::{decode_value, encode_default};

/// Errors raised while validating or building a configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum SchemaError {
    /// A required field is missing or a value failed a validation rule.
    #[error("invalid value for field {field:?}: {message}")]
    #[diagnostic(code(loomwork::schema::validation))]
    Validation { field: String, message: String },

    /// An expression inside a field value failed to evaluate.
    #[error("expression in field {field:?} failed: {message}")]
    #[diagnostic(code(loomwork::schema::expression))]
    Expression { field: String, message: String },

    /// A structured value could not be decoded as JSON.
    #[error("field {field:?} is not valid JSON: {source}")]
    #[diagnostic(code(loomwork::schema::decode))]
    Decode {
        field: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The type of a configuration field.
///
/// Types fall into two codec families: *string-like* types whose values
/// pass through the wire verbatim, and *structured* types whose values are
/// JSON-encoded. [`FieldType::is_string_like`] is the single source of
/// truth for that split.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    String,
    Number,
    Bool,
    Text,
    Expression,
    Select,
    MultiSelect,
    List,
    Object,
    Xml,
    /// Integration-bound resource picker (e.g. a Slack channel).
    Resource,
    Time,
    Date,
    DateTime,
    /// Ordered list of `{field, operator, value}` predicates.
    PredicateList,
}

impl FieldType {
    /// Whether values of this type travel as raw strings on the wire.
    #[must_use]
    pub fn is_string_like(&self) -> bool {
        matches!(
            self,
            FieldType::String
                | FieldType::Text
                | FieldType::Expression
                | FieldType::Select
                | FieldType::Xml
                | FieldType::Resource
                | FieldType::Time
                | FieldType::Date
                | FieldType::DateTime
        )
    }
}

/// A `{value, label}` pair for select-type fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

/// Extra type-specific options attached to a field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TypeOptions {
    /// Item schema for `List` fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<Box<Field>>,
    /// Options for `Select`/`MultiSelect` fields.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    /// Integration name a `Resource` field resolves against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration: Option<String>,
    /// Resource kind within the integration (e.g. "channel").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Operators permitted in a `PredicateList` field.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub operators: Vec<String>,
}

/// References a sibling field and the set of its values under which the
/// carrying field becomes visible or required.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCondition {
    pub field: String,
    pub values: Vec<Value>,
}

impl FieldCondition {
    /// True when the sibling's current value is one of `values`.
    ///
    /// A missing sibling never satisfies a condition.
    #[must_use]
    pub fn matches(&self, raw: &Map<String, Value>) -> bool {
        raw.get(&self.field)
            .map(|v| self.values.iter().any(|want| want == v))
            .unwrap_or(false)
    }
}

/// A single validation rule with a human-readable failure message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "camelCase")]
pub enum ValidationRule {
    MinLength { min: usize, message: String },
    MaxLength { max: usize, message: String },
    Min { min: f64, message: String },
    Max { max: f64, message: String },
    Pattern { pattern: String, message: String },
    OneOf { values: Vec<Value>, message: String },
}

impl ValidationRule {
    fn check(&self, value: &Value) -> Result<(), &str> {
        match self {
            ValidationRule::MinLength { min, message } => match value.as_str() {
                Some(s) if s.chars().count() < *min => Err(message),
                _ => Ok(()),
            },
            ValidationRule::MaxLength { max, message } => match value.as_str() {
                Some(s) if s.chars().count() > *max => Err(message),
                _ => Ok(()),
            },
            ValidationRule::Min { min, message } => match value.as_f64() {
                Some(n) if n < *min => Err(message),
                _ => Ok(()),
            },
            ValidationRule::Max { max, message } => match value.as_f64() {
                Some(n) if n > *max => Err(message),
                _ => Ok(()),
            },
            ValidationRule::Pattern { pattern, message } => match value.as_str() {
                // Anchored prefix/suffix literals only; a full regex engine
                // is more than the field model needs.
                Some(s) => {
                    let ok = if let Some(rest) = pattern.strip_prefix('^') {
                        if let Some(mid) = rest.strip_suffix('$') {
                            s == mid
                        } else {
                            s.starts_with(rest)
                        }
                    } else if let Some(head) = pattern.strip_suffix('$') {
                        s.ends_with(head)
                    } else {
                        s.contains(pattern.as_str())
                    };
                    if ok { Ok(()) } else { Err(message) }
                }
                None => Ok(()),
            },
            ValidationRule::OneOf { values, message } => {
                if values.iter().any(|v| v == value) {
                    Ok(())
                } else {
                    Err(message)
                }
            }
        }
    }
}

/// One declarative configuration field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: Option<FieldType>,
    pub description: String,
    pub required: bool,
    /// Rendered with an on/off toggle; untoggled fields are skipped.
    pub togglable: bool,
    /// Values are secrets; never echoed back in catalogue responses.
    pub sensitive: bool,
    /// Expressions are rejected for this field even when present.
    pub disallow_expression: bool,
    pub placeholder: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub type_options: TypeOptions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub visibility_conditions: Vec<FieldCondition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_conditions: Vec<FieldCondition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation_rules: Vec<ValidationRule>,
}

impl Field {
    /// Shorthand constructor used throughout component definitions.
    pub fn new(name: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            field_type: Some(field_type),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn visible_when(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.visibility_conditions.push(FieldCondition {
            field: field.into(),
            values,
        });
        self
    }

    #[must_use]
    pub fn required_when(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.required_conditions.push(FieldCondition {
            field: field.into(),
            values,
        });
        self
    }

    #[must_use]
    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.validation_rules.push(rule);
        self
    }

    /// Effective type; absent types decode as raw strings.
    #[must_use]
    pub fn effective_type(&self) -> FieldType {
        self.field_type.unwrap_or(FieldType::String)
    }

    fn is_visible(&self, raw: &Map<String, Value>) -> bool {
        self.visibility_conditions.is_empty()
            || self.visibility_conditions.iter().any(|c| c.matches(raw))
    }

    fn is_required(&self, raw: &Map<String, Value>) -> bool {
        self.required || self.required_conditions.iter().any(|c| c.matches(raw))
    }
}

/// Heuristic for values that embed an expression.
///
/// The engine only needs to know *whether* to consult the evaluator; the
/// evaluator owns the syntax beyond this marker.
#[must_use]
pub fn contains_expression(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.contains("{{"))
}

/// Build the validated configuration snapshot for a node.
///
/// Applies visibility and required conditions against the raw input,
/// evaluates expression-bearing string values through `evaluator` (unless
/// the field disallows expressions), decodes each value according to its
/// field type, and runs the field's validation rules. The returned map is
/// what gets snapshotted onto an execution row.
pub fn build_configuration(
    fields: &[Field],
    raw: &Map<String, Value>,
    evaluator: &dyn ExpressionEvaluator,
    env: &Map<String, Value>,
) -> Result<Map<String, Value>, SchemaError> {
    let mut built = Map::new();

    for field in fields {
        if !field.is_visible(raw) {
            continue;
        }

        let present = raw.get(&field.name).filter(|v| !v.is_null());
        let value = match (present, &field.default) {
            (Some(v), _) => v.clone(),
            (None, Some(default)) => default.clone(),
            (None, None) => {
                if field.is_required(raw) {
                    return Err(SchemaError::Validation {
                        field: field.name.clone(),
                        message: "value is required".into(),
                    });
                }
                continue;
            }
        };

        let value = if contains_expression(&value) {
            if field.disallow_expression {
                return Err(SchemaError::Validation {
                    field: field.name.clone(),
                    message: "expressions are not allowed for this field".into(),
                });
            }
            let expr = value.as_str().unwrap_or_default();
            evaluator
                .evaluate(expr, env)
                .map_err(|e| SchemaError::Expression {
                    field: field.name.clone(),
                    message: e.to_string(),
                })?
        } else {
            value
        };

        let decoded = decode_value(field, &value)?;

        for rule in &field.validation_rules {
            if let Err(message) = rule.check(&decoded) {
                return Err(SchemaError::Validation {
                    field: field.name.clone(),
                    message: message.to_string(),
                });
            }
        }

        built.insert(field.name.clone(), decoded);
    }

    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::LiteralEvaluator;
    use serde_json::json;

    fn raw(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn required_field_missing_fails() {
        let fields = vec![Field::new("url", "URL", FieldType::String).required()];
        let err = build_configuration(&fields, &Map::new(), &LiteralEvaluator, &Map::new())
            .unwrap_err();
        assert!(err.to_string().contains("url"));
    }

    #[test]
    fn hidden_field_is_skipped_even_when_required() {
        let fields = vec![
            Field::new("mode", "Mode", FieldType::Select),
            Field::new("body", "Body", FieldType::Text)
                .required()
                .visible_when("mode", vec![json!("custom")]),
        ];
        let built = build_configuration(
            &fields,
            &raw(&[("mode", json!("simple"))]),
            &LiteralEvaluator,
            &Map::new(),
        )
        .unwrap();
        assert!(!built.contains_key("body"));
    }

    #[test]
    fn conditional_required_enforced_when_sibling_matches() {
        let fields = vec![
            Field::new("mode", "Mode", FieldType::Select),
            Field::new("body", "Body", FieldType::Text)
                .required_when("mode", vec![json!("custom")]),
        ];
        let err = build_configuration(
            &fields,
            &raw(&[("mode", json!("custom"))]),
            &LiteralEvaluator,
            &Map::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::Validation { .. }));
    }

    #[test]
    fn defaults_fill_absent_values() {
        let fields = vec![
            Field::new("retries", "Retries", FieldType::Number).with_default(json!("3")),
        ];
        let built =
            build_configuration(&fields, &Map::new(), &LiteralEvaluator, &Map::new()).unwrap();
        assert_eq!(built["retries"], json!(3.0));
    }

    #[test]
    fn validation_rules_run_on_decoded_values() {
        let fields = vec![
            Field::new("timeout", "Timeout", FieldType::Number).with_rule(ValidationRule::Min {
                min: 1.0,
                message: "timeout must be at least 1".into(),
            }),
        ];
        let err = build_configuration(
            &fields,
            &raw(&[("timeout", json!(0))]),
            &LiteralEvaluator,
            &Map::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn disallow_expression_rejects_markers() {
        let fields = vec![{
            let mut f = Field::new("name", "Name", FieldType::String);
            f.disallow_expression = true;
            f
        }];
        let err = build_configuration(
            &fields,
            &raw(&[("name", json!("{{ $.x }}"))]),
            &LiteralEvaluator,
            &Map::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::Validation { .. }));
    }
}
