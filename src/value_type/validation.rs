//! Validity predicates, one per [`ValueType`].
//!
//! *Strict* mode asks "is this already the typed in-memory value"; *lenient* mode asks "would
//! conversion of this text succeed". Lenient validation never raises.

use regex::Regex;

use crate::types::Value;

use super::conversion;
use super::ValueType;

pub(crate) fn is_valid(
    noise: &Regex,
    value_type: ValueType,
    value: &Value,
    pattern: Option<&Regex>,
    strict: bool,
) -> bool {
    match value_type {
        ValueType::Number => match pattern {
            Some(p) if !value.is_null() => p.is_match(&value.to_text()),
            _ => is_number(noise, value, strict),
        },
        ValueType::Boolean => is_boolean(value, strict),
        ValueType::Json => is_json(value, strict),
        ValueType::Document => is_document(noise, value, strict),
        ValueType::NumberArray => is_number_array(noise, value, strict),
        ValueType::StringArray => is_string_array(value, strict),
        ValueType::Date => is_date(value, strict),
        ValueType::String => match pattern {
            Some(p) => p.is_match(&value.to_text()),
            None => is_string(value, strict),
        },
        ValueType::Geocode => true,
    }
}

fn is_number(noise: &Regex, value: &Value, strict: bool) -> bool {
    if strict || value.is_number() {
        return value.is_number();
    }
    match value {
        Value::Null => false,
        other => conversion::is_numeric_text(noise, &other.to_text()),
    }
}

fn is_boolean(value: &Value, strict: bool) -> bool {
    match value {
        Value::Bool(_) => true,
        Value::Null => false,
        _ if strict => false,
        other => {
            let text = other.to_text();
            text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false")
        }
    }
}

fn is_json(value: &Value, strict: bool) -> bool {
    match value {
        Value::Document(_) => true,
        _ if strict => false,
        Value::Null => false,
        other => conversion::convert_json(other).is_ok(),
    }
}

fn is_document(noise: &Regex, value: &Value, strict: bool) -> bool {
    match value {
        Value::Document(_) => true,
        _ if strict => false,
        Value::Null => false,
        other => conversion::convert_document(noise, other).is_ok(),
    }
}

fn is_number_array(noise: &Regex, value: &Value, strict: bool) -> bool {
    match value {
        Value::Array(items) => !items.is_empty() && items.iter().all(|v| is_number(noise, v, strict)),
        _ if strict => false,
        Value::Null => false,
        other => conversion::strict_number_array(noise, &other.to_text()).is_ok(),
    }
}

fn is_string_array(value: &Value, strict: bool) -> bool {
    match value {
        Value::Array(items) => !items.is_empty() && items.iter().all(|v| is_string(v, strict)),
        _ if strict => false,
        Value::Null => false,
        other => conversion::strict_string_array(&other.to_text()).is_ok(),
    }
}

fn is_date(value: &Value, strict: bool) -> bool {
    match value {
        Value::Date(_) => true,
        _ if strict => false,
        Value::Null => false,
        other => conversion::convert_date(&other.to_text()).is_ok(),
    }
}

fn is_string(value: &Value, strict: bool) -> bool {
    !strict || matches!(value, Value::Utf8(_) | Value::Null)
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use super::*;
    use crate::config::DEFAULT_NUMBER_NOISE_PATTERN;

    static NOISE: LazyLock<Regex> = LazyLock::new(|| Regex::new(DEFAULT_NUMBER_NOISE_PATTERN).unwrap());

    fn lenient(t: ValueType, raw: &str) -> bool {
        is_valid(&NOISE, t, &Value::text(raw), None, false)
    }

    fn strict(t: ValueType, v: Value) -> bool {
        is_valid(&NOISE, t, &v, None, true)
    }

    #[test]
    fn strict_mode_checks_in_memory_representation() {
        assert!(strict(ValueType::Number, Value::Int64(1)));
        assert!(!strict(ValueType::Number, Value::text("1")));
        assert!(strict(ValueType::Boolean, Value::Bool(false)));
        assert!(!strict(ValueType::Boolean, Value::text("false")));
        assert!(!strict(ValueType::Date, Value::text("2024-01-02T03:04:05.000Z")));
        assert!(strict(ValueType::String, Value::Null));
        assert!(!strict(ValueType::String, Value::Int64(3)));
        assert!(strict(ValueType::StringArray, Value::Array(vec![Value::text("a")])));
        assert!(!strict(ValueType::NumberArray, Value::Array(vec![])));
    }

    #[test]
    fn lenient_mode_checks_parseability() {
        assert!(lenient(ValueType::Number, "1,234.5"));
        assert!(!lenient(ValueType::Number, "12abc"));
        assert!(lenient(ValueType::Boolean, "False"));
        assert!(!lenient(ValueType::Boolean, "0"));
        assert!(lenient(ValueType::Json, r#"{"k": 1}"#));
        assert!(!lenient(ValueType::Json, "{k: 1}"));
        assert!(lenient(ValueType::NumberArray, "[1, 2]"));
        assert!(!lenient(ValueType::NumberArray, "1, 2"));
        assert!(lenient(ValueType::StringArray, "{a,b}"));
        assert!(lenient(ValueType::Date, "2024-01-02T03:04:05.000Z"));
        assert!(!lenient(ValueType::Date, "2024-01-02"));
        assert!(lenient(ValueType::String, "anything"));
        assert!(lenient(ValueType::Geocode, "12.9,77.5"));
    }

    #[test]
    fn format_pattern_overrides_number_and_string_checks() {
        let zip = Regex::new(r"^\d{6}$").unwrap();
        let v = Value::text("560001");
        assert!(is_valid(&NOISE, ValueType::String, &v, Some(&zip), true));
        assert!(!is_valid(&NOISE, ValueType::String, &Value::text("5600"), Some(&zip), false));
        assert!(is_valid(&NOISE, ValueType::Number, &v, Some(&zip), true));
    }

    #[test]
    fn null_is_never_lenient_valid_for_typed_kinds() {
        for t in [ValueType::Number, ValueType::Boolean, ValueType::Json, ValueType::Date] {
            assert!(!is_valid(&NOISE, t, &Value::Null, None, false), "{t}");
        }
    }
}
