//! The value-type system: the closed set of field kinds, their conversion and validation rules,
//! the operators each kind supports, and per-cell type inference.
//!
//! [`ValueType`] is a tag; the behavior lives in [`TypeSystem`], which holds the compiled
//! configuration (noise regex, inference priority). [`TypeSystem::standard`] is the default
//! configuration and backs the convenience methods on [`ValueType`] itself.
//!
//! ```
//! use tabular_ingest::types::Value;
//! use tabular_ingest::value_type::{find_data_type_for_value, ValueType};
//!
//! assert_eq!(find_data_type_for_value("42"), ValueType::Number);
//! assert_eq!(ValueType::Number.convert(&Value::text("1,234.50")).unwrap(), Value::Float64(1234.5));
//! ```

pub mod conversion;
pub(crate) mod validation;

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{IngestionConfig, DEFAULT_NUMBER_NOISE_PATTERN};
use crate::error::{ConversionError, IngestionError, IngestionResult};
use crate::query::Operator;
use crate::types::{FieldTypeMap, Record, Value};

/// Closed set of field kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Number,
    Boolean,
    /// Structured object parsed strictly.
    Json,
    /// Structured object with store-safe keys.
    Document,
    NumberArray,
    StringArray,
    /// ISO-8601 instant.
    Date,
    /// Universal fallback; always valid.
    String,
    /// Opaque passthrough.
    Geocode,
}

impl ValueType {
    /// Every variant, in declaration order.
    pub const ALL: [ValueType; 9] = [
        ValueType::Number,
        ValueType::Boolean,
        ValueType::Json,
        ValueType::Document,
        ValueType::NumberArray,
        ValueType::StringArray,
        ValueType::Date,
        ValueType::String,
        ValueType::Geocode,
    ];

    /// Default inference priority: declaration order without [`ValueType::Geocode`].
    pub const INFERENCE_ORDER: [ValueType; 8] = [
        ValueType::Number,
        ValueType::Boolean,
        ValueType::Json,
        ValueType::Document,
        ValueType::NumberArray,
        ValueType::StringArray,
        ValueType::Date,
        ValueType::String,
    ];

    /// Stable upper-case name (`NUMBER_ARRAY`, ...).
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Number => "NUMBER",
            ValueType::Boolean => "BOOLEAN",
            ValueType::Json => "JSON",
            ValueType::Document => "DOCUMENT",
            ValueType::NumberArray => "NUMBER_ARRAY",
            ValueType::StringArray => "STRING_ARRAY",
            ValueType::Date => "DATE",
            ValueType::String => "STRING",
            ValueType::Geocode => "GEOCODE",
        }
    }

    /// Operators meaningful for this kind, in display order.
    pub fn operators(self) -> &'static [Operator] {
        use Operator::*;
        match self {
            ValueType::Number => &[
                Equals,
                NotEquals,
                NotEmpty,
                IsEmpty,
                GreaterThan,
                LessThan,
                GreaterThanEquals,
                LessThanEquals,
            ],
            ValueType::Boolean | ValueType::Geocode => &[Equals],
            ValueType::Json | ValueType::Document => &[NotEmpty, IsEmpty],
            ValueType::NumberArray | ValueType::StringArray => &[NotEmpty, IsEmpty, IsIn, IsNotIn],
            ValueType::Date => &[Equals, NotEquals, NotEmpty, IsEmpty],
            ValueType::String => &[
                Contains,
                Equals,
                NotEquals,
                NotContains,
                NotEmpty,
                IsEmpty,
                StartsWith,
                EndsWith,
                NotStartsWith,
                NotEndsWith,
            ],
        }
    }

    pub fn supports(self, operator: Operator) -> bool {
        self.operators().contains(&operator)
    }

    /// Convert with the standard configuration. See [`TypeSystem::convert`].
    pub fn convert(self, value: &Value) -> Result<Value, ConversionError> {
        TypeSystem::standard().convert(self, value)
    }

    /// Validate with the standard configuration. See [`TypeSystem::is_valid`].
    pub fn is_valid(self, value: &Value, pattern: Option<&Regex>, strict: bool) -> bool {
        TypeSystem::standard().is_valid(self, value, pattern, strict)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueType {
    type Err = IngestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValueType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| IngestionError::InvalidRequest {
                message: format!("unknown value type '{s}'"),
            })
    }
}

static STANDARD: LazyLock<TypeSystem> = LazyLock::new(|| TypeSystem {
    noise: Regex::new(DEFAULT_NUMBER_NOISE_PATTERN).expect("default number noise pattern is valid"),
    inference_order: ValueType::INFERENCE_ORDER.to_vec(),
});

/// Compiled conversion/validation configuration.
#[derive(Debug, Clone)]
pub struct TypeSystem {
    noise: Regex,
    inference_order: Vec<ValueType>,
}

impl TypeSystem {
    /// Build from a config. Fails on an invalid noise pattern.
    pub fn new(config: &IngestionConfig) -> IngestionResult<Self> {
        let noise = Regex::new(&config.number_noise_pattern).map_err(|e| IngestionError::InvalidConfig {
            message: format!("number_noise_pattern: {e}"),
        })?;
        Ok(Self {
            noise,
            inference_order: config.inference_order.clone(),
        })
    }

    /// The default configuration, compiled once.
    pub fn standard() -> &'static TypeSystem {
        &STANDARD
    }

    pub fn noise(&self) -> &Regex {
        &self.noise
    }

    pub fn inference_order(&self) -> &[ValueType] {
        &self.inference_order
    }

    /// Convert a raw value into the in-memory representation of `value_type`.
    ///
    /// Values that already have the target representation pass through.
    pub fn convert(&self, value_type: ValueType, value: &Value) -> Result<Value, ConversionError> {
        match value_type {
            ValueType::Number => match value {
                Value::Int64(_) | Value::Float64(_) => Ok(value.clone()),
                other => conversion::convert_number(&self.noise, &other.to_text()),
            },
            ValueType::Boolean => Ok(Value::Bool(conversion::convert_boolean(value))),
            ValueType::Json => conversion::convert_json(value),
            ValueType::Document => conversion::convert_document(&self.noise, value),
            ValueType::NumberArray => match value {
                Value::Array(items) => items
                    .iter()
                    .map(|v| self.convert(ValueType::Number, v))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                other => conversion::convert_number_array(&self.noise, &other.to_text()).map(Value::Array),
            },
            ValueType::StringArray => match value {
                Value::Array(_) => Ok(value.clone()),
                other => Ok(Value::Array(
                    conversion::convert_string_array(&other.to_text())
                        .into_iter()
                        .map(Value::Utf8)
                        .collect(),
                )),
            },
            ValueType::Date => match value {
                Value::Date(_) => Ok(value.clone()),
                other => conversion::convert_date(&other.to_text()).map(Value::Date),
            },
            ValueType::String => Ok(Value::Utf8(value.to_text())),
            ValueType::Geocode => Ok(value.clone()),
        }
    }

    /// Check `value` against `value_type`.
    ///
    /// `pattern`, when given, replaces the type check for `NUMBER` and `STRING`.
    pub fn is_valid(&self, value_type: ValueType, value: &Value, pattern: Option<&Regex>, strict: bool) -> bool {
        validation::is_valid(&self.noise, value_type, value, pattern, strict)
    }

    /// Infer the kind of a raw cell: the first type in the inference order that leniently
    /// validates, `STRING` for blank text or when nothing matches.
    pub fn find_data_type_for_value(&self, text: &str) -> ValueType {
        if text.trim().is_empty() {
            return ValueType::String;
        }
        let value = Value::text(text);
        self.inference_order
            .iter()
            .copied()
            .filter(|t| *t != ValueType::Geocode)
            .find(|t| self.is_valid(*t, &value, None, false))
            .unwrap_or(ValueType::String)
    }

    /// Convert, falling back to the raw value on failure. Empty values pass through untouched.
    pub fn convert_or_raw(&self, field: &str, value: Value, value_type: ValueType) -> Value {
        if value.is_empty() {
            return value;
        }
        match self.convert(value_type, &value) {
            Ok(converted) => converted,
            Err(e) => {
                warn!(field, raw = %value, value_type = %value_type, error = %e, "keeping raw value");
                value
            }
        }
    }

    /// Convert every field of a record: declared fields by their type, other text fields by
    /// inference when `infer` is set.
    pub fn convert_record(&self, record: Record, field_types: &FieldTypeMap, infer: bool) -> Record {
        record
            .into_iter()
            .map(|(field, value)| {
                let target = match field_types.declared(&field) {
                    Some(t) => Some(t),
                    None => match &value {
                        Value::Utf8(text) if infer && !text.is_empty() => Some(self.find_data_type_for_value(text)),
                        _ => None,
                    },
                };
                let value = match target {
                    Some(t) => self.convert_or_raw(&field, value, t),
                    None => value,
                };
                (field, value)
            })
            .collect()
    }

    pub fn strip_trailing_zeros(&self, text: &str, one_decimal: bool) -> String {
        conversion::strip_trailing_zeros(&self.noise, text, one_decimal)
    }

    pub fn to_f64_or_default(&self, text: &str, one_decimal: bool) -> f64 {
        conversion::to_f64_or_default(&self.noise, text, one_decimal)
    }

    pub fn to_i64_or_default(&self, text: &str) -> i64 {
        conversion::to_i64_or_default(&self.noise, text)
    }

    /// Replace `record[field]` by its date conversion when present and non-empty.
    pub fn convert_date_field(&self, record: &mut Record, field: &str) -> Result<(), ConversionError> {
        if let Some(v) = record.get(field).filter(|v| !v.is_empty()) {
            let converted = self.convert(ValueType::Date, v)?;
            record.insert(field, converted);
        }
        Ok(())
    }

    /// Replace a [`Value::Date`] at `record[field]` by its text form.
    pub fn render_date_field(&self, record: &mut Record, field: &str) {
        if let Some(v @ Value::Date(_)) = record.get(field) {
            let text = v.to_text();
            record.insert(field, text);
        }
    }
}

/// Infer the kind of a raw cell with the standard configuration.
pub fn find_data_type_for_value(text: &str) -> ValueType {
    TypeSystem::standard().find_data_type_for_value(text)
}
