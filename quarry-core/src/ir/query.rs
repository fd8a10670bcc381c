//! Statement IR: one accumulator struct per query kind

use crate::Value;

use super::clause::{
    Assignment, ConflictClause, CteClause, JoinClause, MatchedAction, OrderClause, TableRef,
    UnionClause,
};
use super::condition::WhereCondition;
use super::expression::{
    AggregationExpression, ArrayOperation, ConditionalExpression, JsonOperation, PivotClause,
    UnpivotClause, WindowFunction,
};
use super::RawSql;

/// One insert row; column order is preserved
pub type Record = Vec<(String, Value)>;

/// Plain select-list entry
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`, `col`, `t.*` or `col AS alias`
    Column(String),
    /// Verbatim expression with `?` markers
    Raw(RawSql),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    pub columns: Vec<SelectItem>,
    pub aggregations: Vec<AggregationExpression>,
    pub windows: Vec<WindowFunction>,
    pub conditionals: Vec<ConditionalExpression>,
    pub json_operations: Vec<JsonOperation>,
    pub array_operations: Vec<ArrayOperation>,
    pub from: Option<TableRef>,
    pub distinct: bool,
    pub where_: Vec<WhereCondition>,
    pub joins: Vec<JoinClause>,
    pub group_by: Vec<String>,
    pub having: Vec<WhereCondition>,
    pub order_by: Vec<OrderClause>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub limit_raw: Option<RawSql>,
    pub offset_raw: Option<RawSql>,
    pub unions: Vec<UnionClause>,
    pub ctes: Vec<CteClause>,
    pub pivot: Option<PivotClause>,
    pub unpivot: Option<UnpivotClause>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when anything besides plain columns contributes to the select list
    pub fn has_computed_items(&self) -> bool {
        !self.aggregations.is_empty()
            || !self.windows.is_empty()
            || !self.conditionals.is_empty()
            || !self.json_operations.is_empty()
            || !self.array_operations.is_empty()
            || self.pivot.is_some()
    }

    /// ORDER BY or LIMIT/OFFSET present, which matters when nested in a set operation
    pub fn has_ordering_or_limit(&self) -> bool {
        !self.order_by.is_empty()
            || self.limit.is_some()
            || self.offset.is_some()
            || self.limit_raw.is_some()
            || self.offset_raw.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InsertQuery {
    pub into: Option<String>,
    pub values: Vec<Record>,
    pub returning: Vec<String>,
    pub conflict: Option<ConflictClause>,
}

impl InsertQuery {
    /// Union of record keys in first-seen order
    pub fn columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for record in &self.values {
            for (column, _) in record {
                if !columns.contains(&column.as_str()) {
                    columns.push(column);
                }
            }
        }
        columns
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateQuery {
    pub table: Option<String>,
    pub set: Vec<(String, Assignment)>,
    pub where_: Vec<WhereCondition>,
    pub returning: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteQuery {
    pub from: Option<String>,
    pub where_: Vec<WhereCondition>,
    pub returning: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergeQuery {
    pub into: Option<String>,
    pub alias: Option<String>,
    pub using: Option<TableRef>,
    pub on: Vec<WhereCondition>,
    pub when_matched: Option<MatchedAction>,
    pub when_not_matched: Option<Vec<(String, Assignment)>>,
    pub returning: Vec<String>,
}

/// Any statement IR, as handed to a dialect
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectQuery),
    Insert(InsertQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
    Merge(MergeQuery),
}

impl Statement {
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Select(_) => "SELECT",
            Statement::Insert(_) => "INSERT",
            Statement::Update(_) => "UPDATE",
            Statement::Delete(_) => "DELETE",
            Statement::Merge(_) => "MERGE",
        }
    }
}
