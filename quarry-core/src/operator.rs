//! SQL operator types and conversions

use std::borrow::Cow;
use std::fmt::{self, Display};

use crate::{Error, Result};

/// Operators accepted from runtime strings
const SUPPORTED: &[&str] = &[
    "=", "!=", "<>", ">", ">=", "<", "<=", "LIKE", "ILIKE", "NOT LIKE", "NOT ILIKE", "IN",
    "NOT IN", "BETWEEN", "NOT BETWEEN", "IS NULL", "IS NOT NULL", "EXISTS", "NOT EXISTS", "RAW",
    "@>", "<@", "&&", "ANY",
];

/// SQL comparison operator
///
/// Constants cover the supported set. Operators parsed from runtime strings
/// are normalized to upper case and checked by [`Operator::validate`];
/// operators built with [`Operator::custom`] come from `'static` source text
/// and are always accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator(Cow<'static, str>);

impl Operator {
    pub const GT: Self = Operator(Cow::Borrowed(">"));
    pub const LT: Self = Operator(Cow::Borrowed("<"));
    pub const EQ: Self = Operator(Cow::Borrowed("="));
    pub const NEQ: Self = Operator(Cow::Borrowed("!="));
    pub const GTE: Self = Operator(Cow::Borrowed(">="));
    pub const LTE: Self = Operator(Cow::Borrowed("<="));
    pub const LIKE: Self = Operator(Cow::Borrowed("LIKE"));
    pub const ILIKE: Self = Operator(Cow::Borrowed("ILIKE"));
    pub const NOT_LIKE: Self = Operator(Cow::Borrowed("NOT LIKE"));
    pub const NOT_ILIKE: Self = Operator(Cow::Borrowed("NOT ILIKE"));
    pub const IN: Self = Operator(Cow::Borrowed("IN"));
    pub const NOT_IN: Self = Operator(Cow::Borrowed("NOT IN"));
    pub const BETWEEN: Self = Operator(Cow::Borrowed("BETWEEN"));
    pub const NOT_BETWEEN: Self = Operator(Cow::Borrowed("NOT BETWEEN"));
    pub const IS_NULL: Self = Operator(Cow::Borrowed("IS NULL"));
    pub const IS_NOT_NULL: Self = Operator(Cow::Borrowed("IS NOT NULL"));
    pub const EXISTS: Self = Operator(Cow::Borrowed("EXISTS"));
    pub const NOT_EXISTS: Self = Operator(Cow::Borrowed("NOT EXISTS"));
    /// Raw SQL condition: the column holds SQL text, the value its `?` parameters
    pub const RAW: Self = Operator(Cow::Borrowed("RAW"));
    /// Array/JSON containment
    pub const CONTAINS: Self = Operator(Cow::Borrowed("@>"));
    pub const CONTAINED_BY: Self = Operator(Cow::Borrowed("<@"));
    /// Array overlap
    pub const OVERLAPS: Self = Operator(Cow::Borrowed("&&"));
    /// Value equals any element of an array column
    pub const ANY: Self = Operator(Cow::Borrowed("ANY"));

    /// Create a custom operator for database-specific operations
    ///
    /// # Examples
    /// ```
    /// use quarry_core::Operator;
    ///
    /// // PostgreSQL full-text search
    /// let fts_op = Operator::custom("@@");
    ///
    /// // PostGIS distance operator
    /// let distance_op = Operator::custom("<->");
    /// ```
    pub const fn custom(op: &'static str) -> Self {
        Operator(Cow::Borrowed(op))
    }

    /// Parse an operator from a runtime string, rejecting unsupported ones
    pub fn parse(op: &str) -> Result<Self> {
        let operator = Operator(Cow::Owned(normalize(op)));
        operator.validate()?;
        Ok(operator)
    }

    /// Get the string representation of the operator
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that this operator is in the supported set
    pub fn validate(&self) -> Result<()> {
        match &self.0 {
            Cow::Borrowed(_) => Ok(()),
            Cow::Owned(op) if SUPPORTED.contains(&op.as_str()) => Ok(()),
            Cow::Owned(op) => Err(Error::invalid_operator(op.clone())),
        }
    }

    /// `IS NULL` / `IS NOT NULL`, which take no value
    pub fn is_null_check(&self) -> bool {
        *self == Self::IS_NULL || *self == Self::IS_NOT_NULL
    }

    pub fn is_raw(&self) -> bool {
        *self == Self::RAW
    }

    pub fn is_between(&self) -> bool {
        *self == Self::BETWEEN || *self == Self::NOT_BETWEEN
    }

    pub fn is_in(&self) -> bool {
        *self == Self::IN || *self == Self::NOT_IN
    }

    pub fn is_exists(&self) -> bool {
        *self == Self::EXISTS || *self == Self::NOT_EXISTS
    }

    /// LIKE family, whose values pass through the LIKE-pattern escaper
    pub fn is_like(&self) -> bool {
        *self == Self::LIKE
            || *self == Self::ILIKE
            || *self == Self::NOT_LIKE
            || *self == Self::NOT_ILIKE
    }

    /// Array operators rendered by the dialect rather than as `col OP value`
    pub fn is_array(&self) -> bool {
        *self == Self::CONTAINS
            || *self == Self::CONTAINED_BY
            || *self == Self::OVERLAPS
            || *self == Self::ANY
    }
}

fn normalize(op: &str) -> String {
    op.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

impl Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trait for types that can be converted to SQL operators
pub trait IntoOperator {
    fn into_operator(self) -> Operator;
}

impl IntoOperator for Operator {
    fn into_operator(self) -> Operator {
        self
    }
}

/// String operators are normalized here and checked at validation time,
/// so an unknown operator surfaces as `Error::InvalidOperator` from `to_sql()`.
impl IntoOperator for &str {
    fn into_operator(self) -> Operator {
        let normalized = normalize(self);
        match SUPPORTED.iter().find(|op| **op == normalized) {
            Some(op) => Operator(Cow::Borrowed(*op)),
            None => Operator(Cow::Owned(normalized)),
        }
    }
}

impl IntoOperator for String {
    fn into_operator(self) -> Operator {
        self.as_str().into_operator()
    }
}

/// Convenience module for operator constants
pub mod op {
    use super::Operator;

    pub const GT: Operator = Operator::GT;
    pub const LT: Operator = Operator::LT;
    pub const EQ: Operator = Operator::EQ;
    pub const NEQ: Operator = Operator::NEQ;
    pub const GTE: Operator = Operator::GTE;
    pub const LTE: Operator = Operator::LTE;
    pub const LIKE: Operator = Operator::LIKE;
    pub const ILIKE: Operator = Operator::ILIKE;
    pub const NOT_LIKE: Operator = Operator::NOT_LIKE;
    pub const IN: Operator = Operator::IN;
    pub const NOT_IN: Operator = Operator::NOT_IN;
    pub const BETWEEN: Operator = Operator::BETWEEN;
    pub const IS_NULL: Operator = Operator::IS_NULL;
    pub const IS_NOT_NULL: Operator = Operator::IS_NOT_NULL;
    pub const CONTAINS: Operator = Operator::CONTAINS;
    pub const OVERLAPS: Operator = Operator::OVERLAPS;
}
