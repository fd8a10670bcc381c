//! Clause fragments: tables, joins, ordering, CTEs, set operations,
//! conflict handling and assignments

use crate::Value;

use super::condition::{Subquery, WhereCondition};
use super::query::SelectQuery;
use super::RawSql;

/// A table source for FROM, JOIN and MERGE USING
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    Table {
        name: String,
        alias: Option<String>,
    },
    Subquery {
        query: Subquery,
        alias: Option<String>,
    },
    /// Table-valued function call such as `generate_series(?, ?)`
    Function {
        call: RawSql,
        alias: Option<String>,
        ordinality: bool,
    },
}

impl TableRef {
    pub fn table(name: impl Into<String>) -> Self {
        TableRef::Table {
            name: name.into(),
            alias: None,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            TableRef::Table { alias, .. }
            | TableRef::Subquery { alias, .. }
            | TableRef::Function { alias, .. } => alias.as_deref(),
        }
    }

    pub fn set_alias(&mut self, new_alias: impl Into<String>) {
        match self {
            TableRef::Table { alias, .. }
            | TableRef::Subquery { alias, .. }
            | TableRef::Function { alias, .. } => *alias = Some(new_alias.into()),
        }
    }

    /// Table name, when this is a plain table
    pub fn name(&self) -> Option<&str> {
        match self {
            TableRef::Table { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl From<&str> for TableRef {
    fn from(name: &str) -> Self {
        TableRef::table(name)
    }
}

impl From<String> for TableRef {
    fn from(name: String) -> Self {
        TableRef::table(name)
    }
}

/// JOIN types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    Lateral,
}

impl JoinType {
    /// Joins that take no ON clause
    pub fn allows_empty_on(&self) -> bool {
        matches!(self, JoinType::Cross | JoinType::Lateral)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: TableRef,
    pub on: Vec<WhereCondition>,
    /// Emit `LATERAL` before the table
    pub lateral: bool,
}

impl JoinClause {
    pub fn new(join_type: JoinType, table: impl Into<TableRef>) -> Self {
        Self {
            join_type,
            table: table.into(),
            on: Vec::new(),
            lateral: join_type == JoinType::Lateral,
        }
    }

    pub fn on(mut self, condition: WhereCondition) -> Self {
        self.on.push(condition);
        self
    }
}

/// Sort direction for ORDER BY
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// ORDER BY entry: a column, or (when `is_expression`) raw SQL with its own params
#[derive(Debug, Clone, PartialEq)]
pub struct OrderClause {
    pub column: String,
    pub direction: SortDirection,
    pub nulls: Option<NullsOrder>,
    pub is_expression: bool,
    pub params: Vec<Value>,
}

impl OrderClause {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
            nulls: None,
            is_expression: false,
            params: Vec::new(),
        }
    }

    pub fn expression(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            column: sql.into(),
            direction: SortDirection::Asc,
            nulls: None,
            is_expression: true,
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CteClause {
    pub name: String,
    pub columns: Vec<String>,
    pub query: Subquery,
    pub recursive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperation {
    Union,
    UnionAll,
    Intersect,
    Except,
    /// Rendered as `EXCEPT`; none of the supported engines know `MINUS`
    Minus,
}

impl SetOperation {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SetOperation::Union => "UNION",
            SetOperation::UnionAll => "UNION ALL",
            SetOperation::Intersect => "INTERSECT",
            SetOperation::Except | SetOperation::Minus => "EXCEPT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionClause {
    pub operation: SetOperation,
    pub query: Box<SelectQuery>,
}

/// Right-hand side of `SET col = ...`
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Value(Value),
    Column(String),
    /// The value proposed for insertion (`EXCLUDED.col`, `VALUES(col)`)
    Excluded,
    Raw(RawSql),
    /// `col + value` or `col - value`
    Delta { subtract: bool, by: Value },
}

impl<T: Into<Value>> From<T> for Assignment {
    fn from(value: T) -> Self {
        Assignment::Value(value.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    DoNothing,
    DoUpdate,
}

/// `ON CONFLICT` handling for INSERT
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictClause {
    pub target: Vec<String>,
    pub action: ConflictAction,
    pub update: Vec<(String, Assignment)>,
    pub where_: Vec<WhereCondition>,
}

impl ConflictClause {
    pub fn new(target: Vec<String>) -> Self {
        Self {
            target,
            action: ConflictAction::DoNothing,
            update: Vec::new(),
            where_: Vec::new(),
        }
    }
}

/// MERGE action for rows that matched
#[derive(Debug, Clone, PartialEq)]
pub enum MatchedAction {
    Update(Vec<(String, Assignment)>),
    Delete,
}
