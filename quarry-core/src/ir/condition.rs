//! WHERE/HAVING/JOIN-ON condition fragments

use crate::{Operator, Value};

use super::query::SelectQuery;
use super::RawSql;

/// Logical keyword stored on a condition and rendered *before* it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Logical {
    #[default]
    And,
    Or,
}

impl Logical {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Logical::And => "AND",
            Logical::Or => "OR",
        }
    }
}

/// Subquery usable as a condition operand, a table source or a CTE body
#[derive(Debug, Clone, PartialEq)]
pub enum Subquery {
    /// SQL text with `?` markers, renumbered for the target dialect
    Raw(RawSql),
    /// A nested SELECT rendered by the same dialect
    Select(Box<SelectQuery>),
}

impl Subquery {
    pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Subquery::Raw(RawSql::new(sql, params))
    }
}

impl From<SelectQuery> for Subquery {
    fn from(query: SelectQuery) -> Self {
        Subquery::Select(Box::new(query))
    }
}

/// Right-hand side of a condition
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Operand {
    /// No value (`IS NULL`, `IS NOT NULL`)
    #[default]
    None,
    /// A bound parameter
    Value(Value),
    /// A column reference, escaped as an identifier rather than parameterized
    Column(String),
    /// A LIKE pattern whose wildcards are intended; bound without escaping
    Pattern(String),
    Subquery(Subquery),
}

impl Operand {
    pub fn is_none(&self) -> bool {
        matches!(self, Operand::None)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Operand::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl<T: Into<Value>> From<T> for Operand {
    fn from(value: T) -> Self {
        Operand::Value(value.into())
    }
}

/// A single condition: `column operator value`, preceded by `logical`
///
/// For [`Operator::RAW`] the column holds the SQL text and the value an
/// array of `?` substitutions. For `EXISTS`/`NOT EXISTS` the column is
/// empty and the value is a subquery.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereCondition {
    pub column: String,
    pub operator: Operator,
    pub value: Operand,
    pub logical: Logical,
    /// When set, the left-hand side is the JSON text at this path of `column`
    pub json_path: Option<String>,
}

impl WhereCondition {
    pub fn new(column: impl Into<String>, operator: Operator, value: impl Into<Operand>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
            logical: Logical::And,
            json_path: None,
        }
    }

    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::EQ, Operand::Value(value.into()))
    }

    /// `column IS NULL` / `IS NOT NULL`
    pub fn null_check(column: impl Into<String>, negated: bool) -> Self {
        let operator = if negated {
            Operator::IS_NOT_NULL
        } else {
            Operator::IS_NULL
        };
        Self::new(column, operator, Operand::None)
    }

    /// Raw SQL with `?` markers
    pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self::new(sql, Operator::RAW, Operand::Value(Value::Array(params)))
    }

    /// `left = right` between two columns (JOIN ON, MERGE ON)
    pub fn columns(left: impl Into<String>, operator: Operator, right: impl Into<String>) -> Self {
        Self::new(left, operator, Operand::Column(right.into()))
    }

    /// `[NOT] EXISTS (subquery)`
    pub fn exists(subquery: impl Into<Subquery>, negated: bool) -> Self {
        let operator = if negated {
            Operator::NOT_EXISTS
        } else {
            Operator::EXISTS
        };
        Self::new("", operator, Operand::Subquery(subquery.into()))
    }

    pub fn with_logical(mut self, logical: Logical) -> Self {
        self.logical = logical;
        self
    }

    pub fn or(self) -> Self {
        self.with_logical(Logical::Or)
    }

    pub fn with_json_path(mut self, path: impl Into<String>) -> Self {
        self.json_path = Some(path.into());
        self
    }

    /// Parameters of a RAW condition
    pub fn raw_params(&self) -> &[Value] {
        match &self.value {
            Operand::Value(Value::Array(params)) => params,
            _ => &[],
        }
    }
}
