//! Comparison operators and the query fragments they produce.
//!
//! - [`Operator`]: the closed operator set with stable wire codes, an in-memory predicate and a
//!   store-native [`Filter`] form that select the same documents
//! - [`Filter`]: the fragment type handed to a [`crate::store::DocumentStore`]
//! - [`QueryBuilder`] / [`RuleSet`]: typed rules checked against declared field types

pub mod filter;
pub mod operator;
pub mod rules;

pub use filter::{CompareOp, CompiledFilter, Filter};
pub use operator::{escape_regex, Operator};
pub use rules::{FilterRule, QueryBuilder, RawRule, RuleSet};
