use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Value;
use crate::value_type::conversion::coerce_number_or_date;
use crate::value_type::TypeSystem;

use super::filter::{compare_values, member_of, pattern_matches, text_regex, value_matches, CompareOp, Filter};

/// Characters escaped before a text operand is embedded in a regex fragment.
const REGEX_SPECIAL: &[char] = &['.', '*', '+', '?', '^', '$', '{', '}', '(', ')', '|', '[', ']', '\\'];

/// Comparison operator.
///
/// Each operator has a stable textual [`code`](Operator::code) (its serialized form), an
/// in-memory predicate ([`Operator::evaluate`]) and a store-native form
/// ([`Operator::to_fragment`]). For any value pair the two select the same documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Equals,
    #[serde(rename = "!=")]
    NotEquals,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "not contains")]
    NotContains,
    #[serde(rename = "not empty")]
    NotEmpty,
    #[serde(rename = "is empty")]
    IsEmpty,
    #[serde(rename = "starts with")]
    StartsWith,
    #[serde(rename = "ends with")]
    EndsWith,
    #[serde(rename = "not starts with")]
    NotStartsWith,
    #[serde(rename = "not ends with")]
    NotEndsWith,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterThanEquals,
    #[serde(rename = "<=")]
    LessThanEquals,
    #[serde(rename = "in")]
    IsIn,
    #[serde(rename = "not in")]
    IsNotIn,
}

#[derive(Clone, Copy)]
enum TextMatch {
    Contains,
    Prefix,
    Suffix,
}

impl TextMatch {
    /// Literal, anchored pattern for `rhs`.
    fn pattern(self, rhs: &Value) -> String {
        let escaped = escape_regex(&rhs.to_text());
        match self {
            TextMatch::Contains => escaped,
            TextMatch::Prefix => format!("^{escaped}"),
            TextMatch::Suffix => format!("{escaped}$"),
        }
    }
}

impl Operator {
    pub const ALL: [Operator; 16] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::Contains,
        Operator::NotContains,
        Operator::NotEmpty,
        Operator::IsEmpty,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::NotStartsWith,
        Operator::NotEndsWith,
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::GreaterThanEquals,
        Operator::LessThanEquals,
        Operator::IsIn,
        Operator::IsNotIn,
    ];

    /// Wire representation.
    pub fn code(self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::Contains => "contains",
            Operator::NotContains => "not contains",
            Operator::NotEmpty => "not empty",
            Operator::IsEmpty => "is empty",
            Operator::StartsWith => "starts with",
            Operator::EndsWith => "ends with",
            Operator::NotStartsWith => "not starts with",
            Operator::NotEndsWith => "not ends with",
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::GreaterThanEquals => ">=",
            Operator::LessThanEquals => "<=",
            Operator::IsIn => "in",
            Operator::IsNotIn => "not in",
        }
    }

    /// Look up an operator by its wire code. Unknown codes yield `None`.
    pub fn decode(code: &str) -> Option<Operator> {
        Operator::ALL.into_iter().find(|op| op.code() == code)
    }

    fn text_match(self) -> Option<(TextMatch, bool)> {
        match self {
            Operator::Contains => Some((TextMatch::Contains, false)),
            Operator::NotContains => Some((TextMatch::Contains, true)),
            Operator::StartsWith => Some((TextMatch::Prefix, false)),
            Operator::NotStartsWith => Some((TextMatch::Prefix, true)),
            Operator::EndsWith => Some((TextMatch::Suffix, false)),
            Operator::NotEndsWith => Some((TextMatch::Suffix, true)),
            _ => None,
        }
    }

    fn compare_op(self) -> Option<CompareOp> {
        match self {
            Operator::GreaterThan => Some(CompareOp::Gt),
            Operator::LessThan => Some(CompareOp::Lt),
            Operator::GreaterThanEquals => Some(CompareOp::Gte),
            Operator::LessThanEquals => Some(CompareOp::Lte),
            _ => None,
        }
    }

    /// In-memory predicate with the standard type configuration.
    pub fn evaluate(self, lhs: &Value, rhs: &Value) -> bool {
        self.evaluate_in(TypeSystem::standard(), lhs, rhs)
    }

    /// In-memory predicate: does a document whose field holds `lhs` satisfy `field <op> rhs`?
    ///
    /// Text operators match with the same case-insensitive pattern the fragment carries.
    pub fn evaluate_in(self, types: &TypeSystem, lhs: &Value, rhs: &Value) -> bool {
        if let Some((kind, negated)) = self.text_match() {
            if rhs.is_null() {
                return negated;
            }
            let regex = text_regex(&kind.pattern(rhs), true);
            return pattern_matches(regex.as_ref(), lhs, negated);
        }
        if let Some(op) = self.compare_op() {
            if rhs.is_null() {
                return false;
            }
            return compare_values(op, lhs, &coerce_number_or_date(types.noise(), rhs), rhs);
        }
        match self {
            Operator::Equals => value_matches(lhs, rhs),
            Operator::NotEquals => !value_matches(lhs, rhs),
            Operator::IsEmpty => member_of(lhs, &empty_markers()),
            Operator::NotEmpty => !member_of(lhs, &empty_markers()),
            Operator::IsIn => match rhs {
                Value::Array(items) => member_of(lhs, items),
                _ => false,
            },
            Operator::IsNotIn => match rhs {
                Value::Array(items) => !member_of(lhs, items),
                _ => true,
            },
            _ => false,
        }
    }

    /// Store-native fragment with the standard type configuration.
    pub fn to_fragment(self, field: &str, rhs: &Value) -> Filter {
        self.to_fragment_in(TypeSystem::standard(), field, rhs)
    }

    /// Store-native fragment selecting documents where `field <op> rhs` holds.
    pub fn to_fragment_in(self, types: &TypeSystem, field: &str, rhs: &Value) -> Filter {
        let field = field.to_string();
        if let Some((kind, negated)) = self.text_match() {
            if rhs.is_null() {
                return if negated { Filter::All } else { Filter::Nothing };
            }
            return Filter::Regex {
                field,
                pattern: kind.pattern(rhs),
                case_insensitive: true,
                negated,
            };
        }
        if let Some(op) = self.compare_op() {
            if rhs.is_null() {
                return Filter::Nothing;
            }
            return Filter::Compare {
                field,
                op,
                value: coerce_number_or_date(types.noise(), rhs),
                raw: rhs.clone(),
            };
        }
        match self {
            Operator::Equals => Filter::Eq {
                field,
                value: rhs.clone(),
            },
            Operator::NotEquals => Filter::Ne {
                field,
                value: rhs.clone(),
            },
            Operator::IsEmpty => Filter::In {
                field,
                values: empty_markers(),
            },
            Operator::NotEmpty => Filter::NotIn {
                field,
                values: empty_markers(),
            },
            Operator::IsIn => match rhs {
                Value::Array(items) => Filter::In {
                    field,
                    values: items.clone(),
                },
                _ => Filter::Nothing,
            },
            Operator::IsNotIn => match rhs {
                Value::Array(items) => Filter::NotIn {
                    field,
                    values: items.clone(),
                },
                _ => Filter::All,
            },
            _ => Filter::Nothing,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

fn empty_markers() -> Vec<Value> {
    vec![Value::Null, Value::text("")]
}

/// Backslash-escape regex metacharacters so `text` matches literally.
pub fn escape_regex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if REGEX_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique_and_decode_back() {
        for op in Operator::ALL {
            assert_eq!(Operator::decode(op.code()), Some(op));
        }
        let mut codes: Vec<_> = Operator::ALL.iter().map(|o| o.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), Operator::ALL.len());
        assert_eq!(Operator::decode("like"), None);
    }

    #[test]
    fn serializes_as_wire_code() {
        assert_eq!(serde_json::to_string(&Operator::NotStartsWith).unwrap(), r#""not starts with""#);
        let op: Operator = serde_json::from_str(r#"">=""#).unwrap();
        assert_eq!(op, Operator::GreaterThanEquals);
    }

    #[test]
    fn text_operators_are_case_insensitive() {
        let lhs = Value::text("Alice Smith");
        assert!(Operator::Contains.evaluate(&lhs, &Value::text("SMITH")));
        assert!(Operator::StartsWith.evaluate(&lhs, &Value::text("al")));
        assert!(Operator::EndsWith.evaluate(&lhs, &Value::text("ITH")));
        assert!(Operator::NotContains.evaluate(&lhs, &Value::text("bob")));
        assert!(!Operator::NotStartsWith.evaluate(&lhs, &Value::text("ALI")));
    }

    #[test]
    fn text_operators_with_missing_operand() {
        let lhs = Value::text("x");
        assert!(!Operator::Contains.evaluate(&lhs, &Value::Null));
        assert!(Operator::NotEndsWith.evaluate(&lhs, &Value::Null));
    }

    #[test]
    fn regex_fragment_escapes_metacharacters() {
        let f = Operator::StartsWith.to_fragment("price", &Value::text("$1.00 (net)"));
        assert_eq!(
            f,
            Filter::Regex {
                field: "price".into(),
                pattern: r"^\$1\.00 \(net\)".into(),
                case_insensitive: true,
                negated: false,
            }
        );
    }

    #[test]
    fn ordering_is_numeric_for_numbers_and_lexical_otherwise() {
        assert!(Operator::GreaterThan.evaluate(&Value::Int64(10), &Value::text("9")));
        assert!(Operator::LessThanEquals.evaluate(&Value::Float64(9.0), &Value::Int64(9)));
        assert!(Operator::GreaterThan.evaluate(&Value::text("pear"), &Value::text("apple")));
        assert!(!Operator::GreaterThan.evaluate(&Value::Int64(10), &Value::Null));
        assert!(!Operator::LessThan.evaluate(&Value::Null, &Value::Int64(10)));
    }

    #[test]
    fn text_operators_fold_case_like_the_fragment() {
        assert!(Operator::Contains.evaluate(&Value::text("ſ"), &Value::text("S")));
        assert!(!Operator::Contains.evaluate(&Value::text("İ"), &Value::text("i")));
        assert!(Operator::NotStartsWith.evaluate(&Value::text("İstanbul"), &Value::text("i")));
    }

    #[test]
    fn ordering_text_against_itself_is_reflexive() {
        for text in ["30.0", "1,234", "007", "2024-01-02T03:04:05Z"] {
            let v = Value::text(text);
            assert!(Operator::LessThanEquals.evaluate(&v, &v), "{text}");
            assert!(Operator::GreaterThanEquals.evaluate(&v, &v), "{text}");
            assert!(!Operator::LessThan.evaluate(&v, &v), "{text}");
        }
        assert!(Operator::GreaterThan.evaluate(&Value::text("1,5"), &Value::text("1,234")));
    }

    #[test]
    fn membership_requires_a_collection() {
        let list = Value::Array(vec![Value::text("a"), Value::text("b")]);
        assert!(Operator::IsIn.evaluate(&Value::text("a"), &list));
        assert!(!Operator::IsIn.evaluate(&Value::text("a"), &Value::text("a")));
        assert!(Operator::IsNotIn.evaluate(&Value::text("c"), &list));
        assert!(Operator::IsNotIn.evaluate(&Value::text("a"), &Value::text("a")));
    }

    #[test]
    fn emptiness() {
        assert!(Operator::IsEmpty.evaluate(&Value::Null, &Value::Null));
        assert!(Operator::IsEmpty.evaluate(&Value::text(""), &Value::Null));
        assert!(Operator::NotEmpty.evaluate(&Value::Int64(0), &Value::Null));
        assert_eq!(
            Operator::IsEmpty.to_fragment("f", &Value::Null).to_document(),
            serde_json::json!({"f": {"$in": [null, ""]}})
        );
    }

    #[test]
    fn equality_crosses_numeric_representations() {
        assert!(Operator::Equals.evaluate(&Value::Int64(2), &Value::Float64(2.0)));
        assert!(Operator::NotEquals.evaluate(&Value::Int64(2), &Value::text("2")));
    }
}
