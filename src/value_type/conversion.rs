//! Raw-text to typed-value conversion routines.
//!
//! Every function here takes the caller's compiled noise regex instead of reading a global, so
//! alternate configurations can be tested side by side.

use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;

use crate::error::ConversionError;
use crate::types::{Value, DATE_TEXT_FORMAT};

use super::ValueType;

/// Remove every match of the noise pattern (spaces, `&nbsp;`, trailing whitespace, commas).
pub fn strip_noise(noise: &Regex, text: &str) -> String {
    noise.replace_all(text, "").into_owned()
}

fn parse_finite(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Normalize numeric text so whole numbers lose their zero fraction (`"30.00"` → `"30"`).
///
/// With `one_decimal` the value is rounded to one decimal place (`"2.96"` → `"3"`,
/// `"2.25"` → `"2.2"`); otherwise every significant decimal is kept. Text that is not a number is
/// returned unchanged.
pub fn strip_trailing_zeros(noise: &Regex, text: &str, one_decimal: bool) -> String {
    if text.is_empty() {
        return String::new();
    }
    let cleaned = strip_noise(noise, text);
    let Some(f) = parse_finite(&cleaned) else {
        return text.to_string();
    };

    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        (f as i64).to_string()
    } else if one_decimal {
        let rounded = format!("{f:.1}");
        match rounded.strip_suffix(".0") {
            Some(whole) => whole.to_string(),
            None => rounded,
        }
    } else {
        f.to_string()
    }
}

/// Convert text to a number: integer first, then float.
///
/// Empty text converts to an empty string; anything else that is not numeric after noise removal
/// is a [`ConversionError`].
pub fn convert_number(noise: &Regex, text: &str) -> Result<Value, ConversionError> {
    if text.is_empty() {
        return Ok(Value::text(""));
    }
    let normalized = strip_trailing_zeros(noise, &strip_noise(noise, text), false);
    if let Ok(i) = normalized.parse::<i64>() {
        return Ok(Value::Int64(i));
    }
    parse_finite(&normalized)
        .map(Value::Float64)
        .ok_or_else(|| ConversionError::new(ValueType::Number.name(), text, "not a number"))
}

/// Lenient float parse: empty or unparseable text yields `0.0`.
pub fn to_f64_or_default(noise: &Regex, text: &str, one_decimal: bool) -> f64 {
    let normalized = strip_trailing_zeros(noise, &strip_noise(noise, text), one_decimal);
    parse_finite(&normalized).unwrap_or_default()
}

/// Lenient integer parse: decimals are truncated, empty or unparseable text yields `0`.
pub fn to_i64_or_default(noise: &Regex, text: &str) -> i64 {
    parse_finite(&strip_noise(noise, text))
        .map(|f| f.trunc() as i64)
        .unwrap_or_default()
}

pub fn convert_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        other => other.to_text().eq_ignore_ascii_case("true"),
    }
}

/// Parse an ISO-8601 instant such as `2024-01-02T03:04:05.000Z`.
///
/// The separator must be an uppercase `T` and the zone either `Z` or a numeric offset.
pub fn convert_date(text: &str) -> Result<DateTime<Utc>, ConversionError> {
    if !has_instant_layout(text) {
        return Err(ConversionError::new(
            ValueType::Date.name(),
            text,
            "expected yyyy-MM-ddTHH:mm:ss with a Z or offset zone",
        ));
    }
    DateTime::parse_from_rfc3339(text)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| ConversionError::new(ValueType::Date.name(), text, e.to_string()))
}

fn has_instant_layout(text: &str) -> bool {
    let zoned = text.ends_with('Z')
        || text
            .len()
            .checked_sub(6)
            .and_then(|i| text.get(i..))
            .is_some_and(|zone| zone.starts_with(['+', '-']) && zone.as_bytes()[3] == b':');
    text.as_bytes().get(10) == Some(&b'T') && zoned
}

/// Parse text in the fixed `yyyy-MM-dd'T'HH:mm:ss.SSS'Z'` layout.
pub fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, DATE_TEXT_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_object(text: &str) -> Result<IndexMap<String, Value>, serde_json::Error> {
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)?;
    Ok(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
}

/// Strict structured-object parse used by the `JSON` type.
pub fn convert_json(value: &Value) -> Result<Value, ConversionError> {
    if let Value::Document(_) = value {
        return Ok(value.clone());
    }
    let text = value.to_text();
    parse_object(&text)
        .map(Value::Document)
        .map_err(|e| ConversionError::new(ValueType::Json.name(), text, e.to_string()))
}

/// Parse text into a sub-document.
///
/// Text that parses as an object is returned as is. Otherwise a second attempt doubles every
/// dot, parses, then maps `..` back to `_` in keys and `.` in string values.
pub fn convert_document(noise: &Regex, value: &Value) -> Result<Value, ConversionError> {
    if let Value::Document(_) = value {
        return Ok(value.clone());
    }
    let text = value.to_text();

    match parse_object(&text) {
        Ok(doc) => Ok(Value::Document(doc)),
        Err(first) => {
            debug!(raw = %text, error = %first, "retrying document parse with doubled dots");
            let escaped = if !is_numeric_text(noise, &text) && text.contains('.') {
                text.replace('.', "..")
            } else {
                text.clone()
            };
            let doc = parse_object(&escaped)
                .map_err(|e| ConversionError::new(ValueType::Document.name(), &text, e.to_string()))?;
            let doc = replace_in_keys(doc, "..", "_");
            Ok(Value::Document(replace_in_values(doc, "..", ".")))
        }
    }
}

fn replace_in_keys(doc: IndexMap<String, Value>, from: &str, to: &str) -> IndexMap<String, Value> {
    doc.into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::Document(inner) => Value::Document(replace_in_keys(inner, from, to)),
                other => other,
            };
            (k.replace(from, to), v)
        })
        .collect()
}

fn replace_in_values(doc: IndexMap<String, Value>, from: &str, to: &str) -> IndexMap<String, Value> {
    doc.into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::Document(inner) => Value::Document(replace_in_values(inner, from, to)),
                Value::Utf8(s) => Value::Utf8(s.replace(from, to)),
                other => other,
            };
            (k, v)
        })
        .collect()
}

/// `true` when text is numeric after noise removal.
pub fn is_numeric_text(noise: &Regex, text: &str) -> bool {
    parse_finite(&strip_noise(noise, text)).is_some()
}

pub fn is_enclosed_in_brackets(text: &str) -> bool {
    (text.starts_with('{') && text.ends_with('}')) || (text.starts_with('[') && text.ends_with(']'))
}

fn split_items(inner: &str) -> Vec<String> {
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn bracket_inner(text: &str) -> Option<&str> {
    if text.len() >= 2 && is_enclosed_in_brackets(text) {
        Some(&text[1..text.len() - 1])
    } else {
        None
    }
}

/// Split text into trimmed, non-empty items.
///
/// An enclosing `{}`/`[]` pair is stripped first; otherwise the text is split on `,` when it has
/// one, or taken as a single item.
pub fn convert_string_array(text: &str) -> Vec<String> {
    match bracket_inner(text) {
        Some(inner) => split_items(inner),
        None if text.contains(',') => split_items(text),
        None => split_items(text.trim()),
    }
}

/// Like [`convert_string_array`] but the text must be bracketed.
pub fn strict_string_array(text: &str) -> Result<Vec<String>, ConversionError> {
    bracket_inner(text).map(split_items).ok_or_else(|| {
        ConversionError::new(ValueType::StringArray.name(), text, "expected an enclosing [] or {} pair")
    })
}

fn items_to_numbers(noise: &Regex, raw: &str, items: Vec<String>) -> Result<Vec<Value>, ConversionError> {
    items
        .iter()
        .map(|item| {
            convert_number(noise, item)
                .map_err(|_| ConversionError::new(ValueType::NumberArray.name(), raw, format!("'{item}' is not a number")))
        })
        .collect()
}

pub fn convert_number_array(noise: &Regex, text: &str) -> Result<Vec<Value>, ConversionError> {
    items_to_numbers(noise, text, convert_string_array(text))
}

pub fn strict_number_array(noise: &Regex, text: &str) -> Result<Vec<Value>, ConversionError> {
    items_to_numbers(noise, text, strict_string_array(text)?)
}

/// Coerce a comparison operand: number first, then the fixed date layout, else unchanged.
pub fn coerce_number_or_date(noise: &Regex, value: &Value) -> Value {
    let Value::Utf8(text) = value else {
        return value.clone();
    };
    if text.is_empty() {
        return value.clone();
    }
    if let Ok(n) = convert_number(noise, text) {
        return n;
    }
    match parse_date_text(text).or_else(|| convert_date(text).ok()) {
        Some(d) => Value::Date(d),
        None => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use super::*;
    use crate::config::DEFAULT_NUMBER_NOISE_PATTERN;

    static NOISE: LazyLock<Regex> = LazyLock::new(|| Regex::new(DEFAULT_NUMBER_NOISE_PATTERN).unwrap());

    #[test]
    fn numbers_lose_thousands_separators_and_padding() {
        assert_eq!(convert_number(&NOISE, "1,234").unwrap(), Value::Int64(1234));
        assert_eq!(convert_number(&NOISE, "1,234.50").unwrap(), Value::Float64(1234.5));
        assert_eq!(convert_number(&NOISE, " 42 ").unwrap(), Value::Int64(42));
        assert_eq!(convert_number(&NOISE, "7&nbsp;").unwrap(), Value::Int64(7));
        assert_eq!(convert_number(&NOISE, "7\u{00A0}").unwrap(), Value::Int64(7));
        assert_eq!(convert_number(&NOISE, "30.000").unwrap(), Value::Int64(30));
    }

    #[test]
    fn non_numbers_are_conversion_errors() {
        let err = convert_number(&NOISE, "abc").unwrap_err();
        assert_eq!(err.target, "NUMBER");
        assert_eq!(err.raw, "abc");
        assert!(convert_number(&NOISE, "NaN").is_err());
        assert!(convert_number(&NOISE, "inf").is_err());
        assert_eq!(convert_number(&NOISE, "").unwrap(), Value::text(""));
    }

    #[test]
    fn trailing_zero_formatting() {
        assert_eq!(strip_trailing_zeros(&NOISE, "1234.50", false), "1234.5");
        assert_eq!(strip_trailing_zeros(&NOISE, "12.000", false), "12");
        assert_eq!(strip_trailing_zeros(&NOISE, "2.96", true), "3");
        assert_eq!(strip_trailing_zeros(&NOISE, "2.34", true), "2.3");
        assert_eq!(strip_trailing_zeros(&NOISE, "0.125", false), "0.125");
        assert_eq!(strip_trailing_zeros(&NOISE, "n/a", false), "n/a");
    }

    #[test]
    fn lenient_numeric_helpers_default_to_zero() {
        assert_eq!(to_f64_or_default(&NOISE, "", false), 0.0);
        assert_eq!(to_f64_or_default(&NOISE, "x", false), 0.0);
        assert_eq!(to_f64_or_default(&NOISE, "1,000.25", false), 1000.25);
        assert_eq!(to_i64_or_default(&NOISE, "9.9"), 9);
        assert_eq!(to_i64_or_default(&NOISE, "oops"), 0);
    }

    #[test]
    fn booleans_only_accept_true_case_insensitively() {
        assert!(convert_boolean(&Value::text("TRUE")));
        assert!(convert_boolean(&Value::text("true")));
        assert!(!convert_boolean(&Value::text("yes")));
        assert!(!convert_boolean(&Value::Null));
    }

    #[test]
    fn dates_require_an_iso_instant() {
        let d = convert_date("2024-01-02T03:04:05.000Z").unwrap();
        assert_eq!(Value::Date(d).to_text(), "2024-01-02T03:04:05.000Z");
        assert!(convert_date("02/01/2024").is_err());
    }

    #[test]
    fn parsed_documents_keep_their_keys() {
        let v = convert_document(&NOISE, &Value::text(r#"{"a.b": "x.y", "n": {"c.d": 1}}"#)).unwrap();
        let Value::Document(doc) = v else { panic!("expected document") };
        assert_eq!(doc.get("a.b"), Some(&Value::text("x.y")));
        let Some(Value::Document(inner)) = doc.get("n") else { panic!("expected nested document") };
        assert_eq!(inner.get("c.d"), Some(&Value::Int64(1)));
    }

    #[test]
    fn dates_reject_loose_rfc3339_variants() {
        assert!(convert_date("2024-01-02 03:04:05Z").is_err());
        assert!(convert_date("2024-01-02t03:04:05z").is_err());
        assert!(convert_date("2024-01-02T03:04:05").is_err());
        assert!(convert_date("2024-01-02T03:04:05+02:00").is_ok());
        assert!(convert_date("2024-01-02T03:04:05.5-05:30").is_ok());
    }

    #[test]
    fn documents_reject_non_objects() {
        assert!(convert_document(&NOISE, &Value::text("[1, 2]")).is_err());
        assert!(convert_document(&NOISE, &Value::text("plain text")).is_err());
        assert!(convert_json(&Value::text("{a:1}")).is_err());
    }

    #[test]
    fn string_arrays_split_and_drop_empties() {
        assert_eq!(convert_string_array("{a:1,b:2}"), vec!["a:1", "b:2"]);
        assert_eq!(convert_string_array("[x, , y]"), vec!["x", "y"]);
        assert_eq!(convert_string_array("p,q"), vec!["p", "q"]);
        assert_eq!(convert_string_array(" solo "), vec!["solo"]);
        assert!(strict_string_array("p,q").is_err());
    }

    #[test]
    fn number_arrays_convert_each_item() {
        assert_eq!(
            convert_number_array(&NOISE, "[1, 2.5]").unwrap(),
            vec![Value::Int64(1), Value::Float64(2.5)]
        );
        assert!(strict_number_array(&NOISE, "[1, x]").is_err());
    }

    #[test]
    fn comparison_operands_coerce_number_then_date() {
        assert_eq!(coerce_number_or_date(&NOISE, &Value::text("10")), Value::Int64(10));
        assert!(matches!(
            coerce_number_or_date(&NOISE, &Value::text("2024-01-02T03:04:05.000Z")),
            Value::Date(_)
        ));
        assert_eq!(coerce_number_or_date(&NOISE, &Value::text("abc")), Value::text("abc"));
    }
}
