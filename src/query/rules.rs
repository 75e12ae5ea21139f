//! Typed filter rules.
//!
//! A [`QueryBuilder`] turns `(field, operator, raw value)` triples into a [`RuleSet`], checking
//! each operator against the field's declared [`ValueType`] and converting the operand to that
//! type. A rule set yields either a store-native [`Filter`] or an in-memory predicate.

use serde::{Deserialize, Serialize};

use crate::error::{IngestionError, IngestionResult};
use crate::types::{FieldTypeMap, Record, Value};
use crate::value_type::{TypeSystem, ValueType};

use super::filter::{field_value, Filter};
use super::operator::Operator;

/// One `field <operator> value` condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterRule {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

/// Wire form of a rule, as received from a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRule {
    pub field: String,
    /// Operator wire code, e.g. `"starts with"`.
    pub operator: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// Builds a [`RuleSet`] against declared field types.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    field_types: FieldTypeMap,
    types: TypeSystem,
    rules: Vec<FilterRule>,
}

impl QueryBuilder {
    pub fn new(field_types: FieldTypeMap) -> Self {
        Self {
            field_types,
            types: TypeSystem::standard().clone(),
            rules: Vec::new(),
        }
    }

    /// Use a non-default conversion configuration.
    pub fn with_type_system(mut self, types: TypeSystem) -> Self {
        self.types = types;
        self
    }

    /// Add a rule. The operator must be supported by the field's declared type.
    pub fn rule(mut self, field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> IngestionResult<Self> {
        let field = field.into();
        let value_type = self.field_types.get(&field);
        if !value_type.supports(operator) {
            return Err(IngestionError::UnsupportedOperator {
                field,
                operator: operator.code().to_string(),
                value_type: value_type.to_string(),
            });
        }
        let value = self.operand(&field, operator, value_type, value.into());
        self.rules.push(FilterRule { field, operator, value });
        Ok(self)
    }

    /// Add a rule from its wire form. Unknown operator codes are rejected.
    pub fn raw_rule(self, raw: &RawRule) -> IngestionResult<Self> {
        let operator = Operator::decode(&raw.operator).ok_or_else(|| IngestionError::InvalidRequest {
            message: format!("unknown operator '{}'", raw.operator),
        })?;
        let value = raw.value.clone().map(Value::Utf8).unwrap_or(Value::Null);
        self.rule(raw.field.clone(), operator, value)
    }

    fn operand(&self, field: &str, operator: Operator, value_type: ValueType, value: Value) -> Value {
        match operator {
            Operator::IsEmpty | Operator::NotEmpty => Value::Null,
            // Text operators take the operand verbatim.
            Operator::Contains
            | Operator::NotContains
            | Operator::StartsWith
            | Operator::EndsWith
            | Operator::NotStartsWith
            | Operator::NotEndsWith => value,
            _ => self.types.convert_or_raw(field, value, value_type),
        }
    }

    pub fn build(self) -> RuleSet {
        RuleSet {
            rules: self.rules,
            types: self.types,
        }
    }
}

/// A conjunction of [`FilterRule`]s.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<FilterRule>,
    types: TypeSystem,
}

impl RuleSet {
    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    /// Store-native form. An empty rule set matches everything.
    pub fn to_filter(&self) -> Filter {
        Filter::and(
            self.rules
                .iter()
                .map(|r| r.operator.to_fragment_in(&self.types, &r.field, &r.value)),
        )
    }

    /// In-memory form of [`Self::to_filter`].
    pub fn matches(&self, record: &Record) -> bool {
        self.rules
            .iter()
            .all(|r| r.operator.evaluate_in(&self.types, field_value(record, &r.field), &r.value))
    }

    /// Records for which every rule holds, in input order.
    pub fn filter<'a>(&'a self, records: impl IntoIterator<Item = &'a Record> + 'a) -> impl Iterator<Item = &'a Record> + 'a {
        records.into_iter().filter(move |r| self.matches(r))
    }
}
