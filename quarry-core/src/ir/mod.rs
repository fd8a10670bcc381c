//! Dialect-independent query representation
//!
//! The IR is plain data. Builders mutate it; [`crate::validate`] checks it;
//! [`crate::Dialect`] renders it.

pub mod clause;
pub mod condition;
pub mod expression;
pub mod query;

pub use clause::{
    Assignment, ConflictAction, ConflictClause, CteClause, JoinClause, JoinType, MatchedAction,
    NullsOrder, OrderClause, SetOperation, SortDirection, TableRef, UnionClause,
};
pub use condition::{Logical, Operand, Subquery, WhereCondition};
pub use expression::{
    AggregateFunction, AggregationExpression, ArrayOp, ArrayOperation, CaseWhen,
    ConditionalExpression, FrameBound, FrameExclude, FrameUnits, JsonOp, JsonOperation,
    PivotClause, UnpivotClause, WindowFrame, WindowFunction,
};
pub use query::{
    DeleteQuery, InsertQuery, MergeQuery, Record, SelectItem, SelectQuery, Statement,
    UpdateQuery,
};

use crate::{Error, Result, Value};

/// SQL text with `?` markers and the parameters that fill them, in order
#[derive(Debug, Clone, PartialEq)]
pub struct RawSql {
    pub sql: String,
    pub params: Vec<Value>,
}

impl RawSql {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Raw SQL for `context`, rejecting blank text
    pub fn non_empty(
        context: &'static str,
        sql: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<Self> {
        let sql = sql.into();
        if sql.trim().is_empty() {
            return Err(Error::EmptyRawSql { context });
        }
        Ok(Self::new(sql, params))
    }

    /// Number of `?` markers in the text
    pub fn marker_count(&self) -> usize {
        self.sql.matches('?').count()
    }
}

/// Append a RAW condition to the WHERE list of `query`
///
/// # Examples
/// ```
/// use quarry_core::ir::{add_raw_where_condition, SelectQuery};
///
/// let mut query = SelectQuery::new();
/// add_raw_where_condition(&mut query, "age > ?", vec![18.into()]).unwrap();
/// assert_eq!(query.where_.len(), 1);
/// assert!(add_raw_where_condition(&mut query, "  ", vec![]).is_err());
/// ```
pub fn add_raw_where_condition(
    query: &mut SelectQuery,
    sql: &str,
    params: Vec<Value>,
) -> Result<()> {
    let raw = RawSql::non_empty("WHERE", sql, params)?;
    query.where_.push(WhereCondition::raw(raw.sql, raw.params));
    Ok(())
}

/// Append a verbatim ORDER BY expression to `query`
pub fn add_raw_order_by(query: &mut SelectQuery, sql: &str, params: Vec<Value>) -> Result<()> {
    let raw = RawSql::non_empty("ORDER BY", sql, params)?;
    query.order_by.push(OrderClause::expression(raw.sql, raw.params));
    Ok(())
}
