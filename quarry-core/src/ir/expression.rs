//! Select-list expressions: aggregates, window functions, CASE/COALESCE/NULLIF,
//! JSON and array operations, pivot/unpivot descriptors

use crate::Value;

use super::clause::OrderClause;
use super::condition::{Operand, WhereCondition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    ArrayAgg,
    JsonAgg,
    /// Concatenation with the given separator (bound as a parameter)
    StringAgg(String),
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::ArrayAgg => "ARRAY_AGG",
            AggregateFunction::JsonAgg => "JSON_AGG",
            AggregateFunction::StringAgg(_) => "STRING_AGG",
        }
    }
}

/// `FUNC([DISTINCT] column) [AS alias]`
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationExpression {
    pub function: AggregateFunction,
    pub column: String,
    pub distinct: bool,
    pub alias: Option<String>,
}

impl AggregationExpression {
    pub fn new(function: AggregateFunction, column: impl Into<String>) -> Self {
        Self {
            function,
            column: column.into(),
            distinct: false,
            alias: None,
        }
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameUnits {
    Rows,
    Range,
    Groups,
}

impl FrameUnits {
    pub fn as_sql(&self) -> &'static str {
        match self {
            FrameUnits::Rows => "ROWS",
            FrameUnits::Range => "RANGE",
            FrameUnits::Groups => "GROUPS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(u64),
    CurrentRow,
    Following(u64),
    UnboundedFollowing,
}

impl FrameBound {
    pub fn to_sql(&self) -> String {
        match self {
            FrameBound::UnboundedPreceding => "UNBOUNDED PRECEDING".to_string(),
            FrameBound::Preceding(n) => format!("{n} PRECEDING"),
            FrameBound::CurrentRow => "CURRENT ROW".to_string(),
            FrameBound::Following(n) => format!("{n} FOLLOWING"),
            FrameBound::UnboundedFollowing => "UNBOUNDED FOLLOWING".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameExclude {
    CurrentRow,
    Group,
    Ties,
    NoOthers,
}

impl FrameExclude {
    pub fn as_sql(&self) -> &'static str {
        match self {
            FrameExclude::CurrentRow => "CURRENT ROW",
            FrameExclude::Group => "GROUP",
            FrameExclude::Ties => "TIES",
            FrameExclude::NoOthers => "NO OTHERS",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowFrame {
    pub units: FrameUnits,
    pub start: FrameBound,
    pub end: Option<FrameBound>,
    pub exclude: Option<FrameExclude>,
}

impl WindowFrame {
    pub fn rows(start: FrameBound, end: Option<FrameBound>) -> Self {
        Self {
            units: FrameUnits::Rows,
            start,
            end,
            exclude: None,
        }
    }
}

/// `FUNC(args) OVER (PARTITION BY .. ORDER BY .. frame) [AS alias]`
#[derive(Debug, Clone, PartialEq)]
pub struct WindowFunction {
    pub function: String,
    pub args: Vec<String>,
    pub partition_by: Vec<String>,
    pub order_by: Vec<OrderClause>,
    pub frame: Option<WindowFrame>,
    pub alias: Option<String>,
}

impl WindowFunction {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            args: Vec::new(),
            partition_by: Vec::new(),
            order_by: Vec::new(),
            frame: None,
            alias: None,
        }
    }

    pub fn arg(mut self, column: impl Into<String>) -> Self {
        self.args.push(column.into());
        self
    }

    pub fn partition_by(mut self, column: impl Into<String>) -> Self {
        self.partition_by.push(column.into());
        self
    }

    pub fn order_by(mut self, order: OrderClause) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn frame(mut self, frame: WindowFrame) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// One `WHEN <conditions> THEN <result>` arm
#[derive(Debug, Clone, PartialEq)]
pub struct CaseWhen {
    pub conditions: Vec<WhereCondition>,
    pub result: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalExpression {
    Case {
        whens: Vec<CaseWhen>,
        otherwise: Option<Operand>,
        alias: Option<String>,
    },
    Coalesce {
        columns: Vec<String>,
        alias: Option<String>,
    },
    NullIf {
        left: String,
        right: String,
        alias: Option<String>,
    },
}

impl ConditionalExpression {
    pub fn alias(&self) -> Option<&str> {
        match self {
            ConditionalExpression::Case { alias, .. }
            | ConditionalExpression::Coalesce { alias, .. }
            | ConditionalExpression::NullIf { alias, .. } => alias.as_deref(),
        }
    }
}

/// JSON operation on a column; paths are dotted keys with numeric array indexes
#[derive(Debug, Clone, PartialEq)]
pub enum JsonOp {
    Extract(String),
    ExtractText(String),
    Contains(Value),
    HasKey(String),
    ArrayLength(Option<String>),
    TypeOf(Option<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonOperation {
    pub column: String,
    pub op: JsonOp,
    pub alias: Option<String>,
}

/// Array operation on a column; indexes are 1-based
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayOp {
    Length,
    Element(u32),
    Slice(u32, u32),
    Contains(Value),
    Overlaps(Value),
    Join(String),
    Unnest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayOperation {
    pub column: String,
    pub op: ArrayOp,
    pub alias: Option<String>,
}

/// Rotate `pivot_column` values into columns via conditional aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct PivotClause {
    pub aggregate: AggregateFunction,
    pub value_column: String,
    pub pivot_column: String,
    pub values: Vec<Value>,
}

/// Rotate `columns` into (`name_column`, `value_column`) rows
#[derive(Debug, Clone, PartialEq)]
pub struct UnpivotClause {
    pub name_column: String,
    pub value_column: String,
    pub columns: Vec<String>,
}

/// Label used for a pivoted column
pub fn pivot_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::I32(i) => i.to_string(),
        Value::I64(i) => i.to_string(),
        Value::F32(f) => f.to_string(),
        Value::F64(f) => f.to_string(),
        other => other.to_json().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bounds() {
        assert_eq!(FrameBound::Preceding(3).to_sql(), "3 PRECEDING");
        assert_eq!(FrameBound::CurrentRow.to_sql(), "CURRENT ROW");
        assert_eq!(FrameExclude::NoOthers.as_sql(), "NO OTHERS");
    }

    #[test]
    fn test_aggregate_names() {
        assert_eq!(AggregateFunction::StringAgg(", ".into()).name(), "STRING_AGG");
        let agg = AggregationExpression::new(AggregateFunction::Count, "id")
            .distinct()
            .alias("n");
        assert!(agg.distinct);
        assert_eq!(agg.alias.as_deref(), Some("n"));
    }

    #[test]
    fn test_pivot_label() {
        assert_eq!(pivot_label(&Value::from("q1")), "q1");
        assert_eq!(pivot_label(&Value::I32(2024)), "2024");
    }
}
