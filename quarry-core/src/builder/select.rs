//! SELECT query builder implementation

use super::{Deferred, Filterable, IntoColumns, IntoCondition, IntoSubquery, QueryBuilder};
use crate::ir::{
    AggregateFunction, AggregationExpression, ArrayOp, ArrayOperation, CaseWhen,
    ConditionalExpression, CteClause, JoinClause, JoinType, JsonOp, JsonOperation, NullsOrder,
    Operand, OrderClause, PivotClause, RawSql, SelectItem, SelectQuery, SetOperation,
    SortDirection, Subquery, TableRef, UnionClause, UnpivotClause, WhereCondition, WindowFunction,
};
use crate::render::BuiltQuery;
use crate::sanitize::split_alias;
use crate::{Dialect, Error, IntoOperator, Operator, Result, Value};

/// SELECT query builder
///
/// # Examples
/// ```
/// use quarry_core::{from, op, Filterable, QueryBuilder};
///
/// let query = from("users")
///     .columns(["id", "name"])
///     .where_(("age", op::GTE, 18))
///     .order_by_desc("created_at")
///     .limit(10);
/// assert_eq!(
///     query.to_sql().unwrap(),
///     r#"SELECT "id", "name" FROM "users" WHERE "age" >= $1 ORDER BY "created_at" DESC LIMIT 10"#
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct SelectBuilder {
    query: SelectQuery,
    dialect: Dialect,
    deferred: Option<Deferred>,
}

impl SelectBuilder {
    /// Create an empty SELECT builder; `from` is required before building
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// The IR accumulated so far
    pub fn query(&self) -> &SelectQuery {
        &self.query
    }

    pub fn into_query(self) -> SelectQuery {
        self.query
    }

    /// Unwrap a nested query, recording its failure on this builder
    fn nested(&mut self, subquery: impl IntoSubquery) -> Option<Subquery> {
        match subquery.into_subquery() {
            Ok(query) => Some(query),
            Err(e) => {
                Deferred::record(&mut self.deferred, e);
                None
            }
        }
    }

    fn raw(&mut self, context: &'static str, sql: &str, params: Vec<Value>) -> Option<RawSql> {
        match RawSql::non_empty(context, sql, params) {
            Ok(raw) => Some(raw),
            Err(e) => {
                Deferred::record(&mut self.deferred, e);
                None
            }
        }
    }

    fn invalid(&mut self, message: &str) {
        Deferred::record(&mut self.deferred, Error::invalid_query(message));
    }

    // ---- Select list ----

    /// Select specific columns; `"col AS alias"` entries are aliased
    pub fn columns<C: IntoColumns>(mut self, columns: C) -> Self {
        self.query
            .columns
            .extend(columns.into_columns().into_iter().map(SelectItem::Column));
        self
    }

    /// Select all columns (equivalent to SELECT *)
    pub fn select_all(mut self) -> Self {
        self.query.columns = vec![SelectItem::Column("*".to_string())];
        self
    }

    /// Verbatim select-list expression with `?` markers
    pub fn select_raw(mut self, sql: &str, params: Vec<Value>) -> Self {
        if let Some(raw) = self.raw("SELECT", sql, params) {
            self.query.columns.push(SelectItem::Raw(raw));
        }
        self
    }

    pub fn distinct(mut self) -> Self {
        self.query.distinct = true;
        self
    }

    // ---- FROM ----

    /// Set the FROM table; `"users AS u"` sets an alias
    pub fn from(mut self, table: &str) -> Self {
        self.query.from = Some(match split_alias(table) {
            Some((name, alias)) => TableRef::Table {
                name: name.to_string(),
                alias: Some(alias.to_string()),
            },
            None => TableRef::table(table),
        });
        self
    }

    pub fn from_subquery(mut self, subquery: impl IntoSubquery, alias: &str) -> Self {
        if let Some(query) = self.nested(subquery) {
            self.query.from = Some(TableRef::Subquery {
                query,
                alias: Some(alias.to_string()),
            });
        }
        self
    }

    /// Table-valued function, e.g. `generate_series(?, ?)`
    pub fn from_function(mut self, call: &str, params: Vec<Value>, alias: &str) -> Self {
        if let Some(call) = self.raw("FROM", call, params) {
            self.query.from = Some(TableRef::Function {
                call,
                alias: Some(alias.to_string()),
                ordinality: false,
            });
        }
        self
    }

    /// Add `WITH ORDINALITY` to the FROM function
    pub fn with_ordinality(mut self) -> Self {
        match &mut self.query.from {
            Some(TableRef::Function { ordinality, .. }) => *ordinality = true,
            _ => self.invalid("with_ordinality() requires a table function in FROM"),
        }
        self
    }

    /// Alias the FROM source
    pub fn alias(mut self, alias: &str) -> Self {
        match &mut self.query.from {
            Some(from) => from.set_alias(alias),
            None => self.invalid("alias() requires a FROM source"),
        }
        self
    }

    // ---- Joins ----

    fn join_columns(mut self, join_type: JoinType, table: &str, left: &str, right: &str) -> Self {
        let on = WhereCondition::columns(left, Operator::EQ, right);
        self.query
            .joins
            .push(JoinClause::new(join_type, table_ref(table)).on(on));
        self
    }

    /// `INNER JOIN table ON left = right`
    pub fn inner_join(self, table: &str, left_column: &str, right_column: &str) -> Self {
        self.join_columns(JoinType::Inner, table, left_column, right_column)
    }

    pub fn left_join(self, table: &str, left_column: &str, right_column: &str) -> Self {
        self.join_columns(JoinType::Left, table, left_column, right_column)
    }

    pub fn right_join(self, table: &str, left_column: &str, right_column: &str) -> Self {
        self.join_columns(JoinType::Right, table, left_column, right_column)
    }

    pub fn full_join(self, table: &str, left_column: &str, right_column: &str) -> Self {
        self.join_columns(JoinType::Full, table, left_column, right_column)
    }

    pub fn cross_join(mut self, table: &str) -> Self {
        self.query
            .joins
            .push(JoinClause::new(JoinType::Cross, table_ref(table)));
        self
    }

    /// Join with an arbitrary ON condition list
    pub fn join_on(mut self, join_type: JoinType, table: &str, on: Vec<WhereCondition>) -> Self {
        let mut join = JoinClause::new(join_type, table_ref(table));
        join.on = on;
        self.query.joins.push(join);
        self
    }

    /// Join a derived table
    pub fn join_subquery(
        mut self,
        join_type: JoinType,
        subquery: impl IntoSubquery,
        alias: &str,
        on: Vec<WhereCondition>,
    ) -> Self {
        if let Some(query) = self.nested(subquery) {
            let table = TableRef::Subquery {
                query,
                alias: Some(alias.to_string()),
            };
            let mut join = JoinClause::new(join_type, table);
            join.on = on;
            self.query.joins.push(join);
        }
        self
    }

    /// `CROSS JOIN LATERAL (subquery)`, or `INNER JOIN LATERAL ... ON` with conditions
    pub fn lateral_join(
        self,
        subquery: impl IntoSubquery,
        alias: &str,
        on: Vec<WhereCondition>,
    ) -> Self {
        self.join_subquery(JoinType::Lateral, subquery, alias, on)
    }

    /// Join a table-valued function
    pub fn join_function(
        mut self,
        join_type: JoinType,
        call: &str,
        params: Vec<Value>,
        alias: &str,
        on: Vec<WhereCondition>,
    ) -> Self {
        if let Some(call) = self.raw("JOIN", call, params) {
            let table = TableRef::Function {
                call,
                alias: Some(alias.to_string()),
                ordinality: false,
            };
            let mut join = JoinClause::new(join_type, table);
            join.on = on;
            self.query.joins.push(join);
        }
        self
    }

    // ---- Grouping ----

    pub fn group_by<C: IntoColumns>(mut self, columns: C) -> Self {
        self.query.group_by.extend(columns.into_columns());
        self
    }

    /// Add a HAVING condition; aggregates go through `having_raw`
    pub fn having<C: IntoCondition>(mut self, condition: C) -> Self {
        self.query.having.push(condition.into_condition());
        self
    }

    pub fn or_having<C: IntoCondition>(mut self, condition: C) -> Self {
        self.query.having.push(condition.into_condition().or());
        self
    }

    pub fn having_raw(mut self, sql: &str, params: Vec<Value>) -> Self {
        if let Some(raw) = self.raw("HAVING", sql, params) {
            self.query.having.push(WhereCondition::raw(raw.sql, raw.params));
        }
        self
    }

    // ---- Ordering and paging ----

    pub fn order_by(mut self, column: &str, direction: SortDirection) -> Self {
        self.query.order_by.push(OrderClause::new(column, direction));
        self
    }

    pub fn order_by_asc(self, column: &str) -> Self {
        self.order_by(column, SortDirection::Asc)
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by(column, SortDirection::Desc)
    }

    pub fn order_by_nulls(mut self, column: &str, direction: SortDirection, nulls: NullsOrder) -> Self {
        let mut order = OrderClause::new(column, direction);
        order.nulls = Some(nulls);
        self.query.order_by.push(order);
        self
    }

    /// Verbatim ORDER BY expression, direction included
    pub fn order_by_raw(mut self, sql: &str, params: Vec<Value>) -> Self {
        if let Some(raw) = self.raw("ORDER BY", sql, params) {
            self.query
                .order_by
                .push(OrderClause::expression(raw.sql, raw.params));
        }
        self
    }

    pub fn limit(mut self, count: u64) -> Self {
        self.query.limit = Some(count);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// LIMIT expression with `?` markers; takes precedence over `limit`
    pub fn limit_raw(mut self, sql: &str, params: Vec<Value>) -> Self {
        if let Some(raw) = self.raw("LIMIT", sql, params) {
            self.query.limit_raw = Some(raw);
        }
        self
    }

    pub fn offset_raw(mut self, sql: &str, params: Vec<Value>) -> Self {
        if let Some(raw) = self.raw("OFFSET", sql, params) {
            self.query.offset_raw = Some(raw);
        }
        self
    }

    // ---- Set operations ----

    fn set_operation(mut self, operation: SetOperation, other: SelectBuilder) -> Self {
        if let Some(deferred) = other.deferred {
            self.deferred.get_or_insert(deferred);
        }
        self.query.unions.push(UnionClause {
            operation,
            query: Box::new(other.query),
        });
        self
    }

    pub fn union(self, other: SelectBuilder) -> Self {
        self.set_operation(SetOperation::Union, other)
    }

    pub fn union_all(self, other: SelectBuilder) -> Self {
        self.set_operation(SetOperation::UnionAll, other)
    }

    pub fn intersect(self, other: SelectBuilder) -> Self {
        self.set_operation(SetOperation::Intersect, other)
    }

    pub fn except(self, other: SelectBuilder) -> Self {
        self.set_operation(SetOperation::Except, other)
    }

    /// Rendered as EXCEPT
    pub fn minus(self, other: SelectBuilder) -> Self {
        self.set_operation(SetOperation::Minus, other)
    }

    // ---- CTEs ----

    fn cte(mut self, name: &str, columns: Vec<String>, query: Subquery, recursive: bool) -> Self {
        self.query.ctes.push(CteClause {
            name: name.to_string(),
            columns,
            query,
            recursive,
        });
        self
    }

    /// `WITH name AS (query)`
    pub fn with(mut self, name: &str, query: impl IntoSubquery) -> Self {
        match self.nested(query) {
            Some(query) => self.cte(name, Vec::new(), query, false),
            None => self,
        }
    }

    /// `WITH RECURSIVE name(columns) AS (query)`
    pub fn with_recursive<C: IntoColumns>(
        mut self,
        name: &str,
        columns: C,
        query: impl IntoSubquery,
    ) -> Self {
        match self.nested(query) {
            Some(query) => self.cte(name, columns.into_columns(), query, true),
            None => self,
        }
    }

    /// CTE body as raw SQL with `?` markers
    pub fn with_raw(mut self, name: &str, sql: &str, params: Vec<Value>) -> Self {
        match self.raw("WITH", sql, params) {
            Some(raw) => self.cte(name, Vec::new(), Subquery::Raw(raw), false),
            None => self,
        }
    }

    // ---- Window functions ----

    pub fn window(mut self, window: WindowFunction) -> Self {
        self.query.windows.push(window);
        self
    }

    // ---- Aggregates ----

    /// Add an aggregate expression to the select list
    pub fn aggregate(mut self, aggregation: AggregationExpression) -> Self {
        self.query.aggregations.push(aggregation);
        self
    }

    fn simple_aggregate(self, function: AggregateFunction, column: &str, alias: Option<&str>) -> Self {
        let mut aggregation = AggregationExpression::new(function, column);
        aggregation.alias = alias.map(str::to_string);
        self.aggregate(aggregation)
    }

    /// `COUNT(*)`
    pub fn count(self) -> Self {
        self.simple_aggregate(AggregateFunction::Count, "*", None)
    }

    pub fn count_as(self, alias: &str) -> Self {
        self.simple_aggregate(AggregateFunction::Count, "*", Some(alias))
    }

    pub fn count_distinct(self, column: &str, alias: &str) -> Self {
        self.aggregate(
            AggregationExpression::new(AggregateFunction::Count, column)
                .distinct()
                .alias(alias),
        )
    }

    pub fn sum(self, column: &str, alias: &str) -> Self {
        self.simple_aggregate(AggregateFunction::Sum, column, Some(alias))
    }

    pub fn avg(self, column: &str, alias: &str) -> Self {
        self.simple_aggregate(AggregateFunction::Avg, column, Some(alias))
    }

    pub fn min(self, column: &str, alias: &str) -> Self {
        self.simple_aggregate(AggregateFunction::Min, column, Some(alias))
    }

    pub fn max(self, column: &str, alias: &str) -> Self {
        self.simple_aggregate(AggregateFunction::Max, column, Some(alias))
    }

    pub fn string_agg(self, column: &str, separator: &str, alias: &str) -> Self {
        self.simple_aggregate(
            AggregateFunction::StringAgg(separator.to_string()),
            column,
            Some(alias),
        )
    }

    pub fn array_agg(self, column: &str, alias: &str) -> Self {
        self.simple_aggregate(AggregateFunction::ArrayAgg, column, Some(alias))
    }

    pub fn json_agg(self, column: &str, alias: &str) -> Self {
        self.simple_aggregate(AggregateFunction::JsonAgg, column, Some(alias))
    }

    // ---- Conditional expressions ----

    /// `CASE WHEN .. THEN .. [ELSE ..] END AS alias`
    ///
    /// Each arm is a condition and the value it yields.
    pub fn case_when<C, V>(mut self, arms: Vec<(C, V)>, otherwise: Option<Value>, alias: &str) -> Self
    where
        C: IntoCondition,
        V: Into<Value>,
    {
        let whens = arms
            .into_iter()
            .map(|(condition, result)| CaseWhen {
                conditions: vec![condition.into_condition()],
                result: Operand::Value(result.into()),
            })
            .collect();
        self.query.conditionals.push(ConditionalExpression::Case {
            whens,
            otherwise: otherwise.map(Operand::Value),
            alias: Some(alias.to_string()),
        });
        self
    }

    /// Add any CASE/COALESCE/NULLIF expression
    pub fn conditional(mut self, expression: ConditionalExpression) -> Self {
        self.query.conditionals.push(expression);
        self
    }

    pub fn coalesce<C: IntoColumns>(mut self, columns: C, alias: &str) -> Self {
        self.query.conditionals.push(ConditionalExpression::Coalesce {
            columns: columns.into_columns(),
            alias: Some(alias.to_string()),
        });
        self
    }

    pub fn nullif(mut self, left: &str, right: &str, alias: &str) -> Self {
        self.query.conditionals.push(ConditionalExpression::NullIf {
            left: left.to_string(),
            right: right.to_string(),
            alias: Some(alias.to_string()),
        });
        self
    }

    // ---- JSON and array operations ----

    fn json_op(mut self, column: &str, op: JsonOp, alias: &str) -> Self {
        self.query.json_operations.push(JsonOperation {
            column: column.to_string(),
            op,
            alias: Some(alias.to_string()),
        });
        self
    }

    /// JSON value at a dotted path (`address.city`, `items.0`)
    pub fn json_extract(self, column: &str, path: &str, alias: &str) -> Self {
        self.json_op(column, JsonOp::Extract(path.to_string()), alias)
    }

    /// Text at a dotted path
    pub fn json_extract_text(self, column: &str, path: &str, alias: &str) -> Self {
        self.json_op(column, JsonOp::ExtractText(path.to_string()), alias)
    }

    pub fn json_contains(self, column: &str, value: impl Into<Value>, alias: &str) -> Self {
        self.json_op(column, JsonOp::Contains(value.into()), alias)
    }

    pub fn json_has_key(self, column: &str, path: &str, alias: &str) -> Self {
        self.json_op(column, JsonOp::HasKey(path.to_string()), alias)
    }

    pub fn json_array_length(self, column: &str, path: Option<&str>, alias: &str) -> Self {
        self.json_op(column, JsonOp::ArrayLength(path.map(str::to_string)), alias)
    }

    pub fn json_type(self, column: &str, path: Option<&str>, alias: &str) -> Self {
        self.json_op(column, JsonOp::TypeOf(path.map(str::to_string)), alias)
    }

    fn array_op(mut self, column: &str, op: ArrayOp, alias: &str) -> Self {
        self.query.array_operations.push(ArrayOperation {
            column: column.to_string(),
            op,
            alias: Some(alias.to_string()),
        });
        self
    }

    pub fn array_length(self, column: &str, alias: &str) -> Self {
        self.array_op(column, ArrayOp::Length, alias)
    }

    /// Element at a 1-based index
    pub fn array_element(mut self, column: &str, index: u32, alias: &str) -> Self {
        if index == 0 {
            self.invalid("array indexes are 1-based");
            return self;
        }
        self.array_op(column, ArrayOp::Element(index), alias)
    }

    /// Elements `from..=to`, 1-based
    pub fn array_slice(mut self, column: &str, from: u32, to: u32, alias: &str) -> Self {
        if from == 0 || to < from {
            self.invalid("array slices need 1 <= from <= to");
            return self;
        }
        self.array_op(column, ArrayOp::Slice(from, to), alias)
    }

    pub fn array_contains(self, column: &str, values: impl Into<Value>, alias: &str) -> Self {
        self.array_op(column, ArrayOp::Contains(values.into()), alias)
    }

    pub fn array_overlaps(self, column: &str, values: impl Into<Value>, alias: &str) -> Self {
        self.array_op(column, ArrayOp::Overlaps(values.into()), alias)
    }

    pub fn array_join(self, column: &str, separator: &str, alias: &str) -> Self {
        self.array_op(column, ArrayOp::Join(separator.to_string()), alias)
    }

    pub fn unnest(self, column: &str, alias: &str) -> Self {
        self.array_op(column, ArrayOp::Unnest, alias)
    }

    /// WHERE condition with an array operator (`@>`, `<@`, `&&`, `ANY`)
    pub fn where_array<O: IntoOperator>(
        mut self,
        column: &str,
        operator: O,
        value: impl Into<Value>,
    ) -> Self {
        self.query
            .where_
            .push(WhereCondition::new(column, operator.into_operator(), value.into()));
        self
    }

    // ---- Pivot / unpivot ----

    /// One aggregated column per value of `pivot_column`
    pub fn pivot<I, V>(
        mut self,
        aggregate: AggregateFunction,
        value_column: &str,
        pivot_column: &str,
        values: I,
    ) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.query.pivot = Some(PivotClause {
            aggregate,
            value_column: value_column.to_string(),
            pivot_column: pivot_column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Turn `columns` into (`name_column`, `value_column`) rows
    pub fn unpivot<C: IntoColumns>(mut self, name_column: &str, value_column: &str, columns: C) -> Self {
        self.query.unpivot = Some(UnpivotClause {
            name_column: name_column.to_string(),
            value_column: value_column.to_string(),
            columns: columns.into_columns(),
        });
        self
    }
}

pub(super) fn table_ref(table: &str) -> TableRef {
    match split_alias(table) {
        Some((name, alias)) => TableRef::Table {
            name: name.to_string(),
            alias: Some(alias.to_string()),
        },
        None => TableRef::table(table),
    }
}

impl Filterable for SelectBuilder {
    fn push_where(&mut self, condition: WhereCondition) {
        self.query.where_.push(condition);
    }

    fn defer(&mut self, error: Error) {
        Deferred::record(&mut self.deferred, error);
    }
}

impl QueryBuilder for SelectBuilder {
    fn target_dialect(&self) -> Dialect {
        self.dialect
    }

    fn build_with(&self, dialect: Dialect) -> Result<BuiltQuery> {
        Deferred::check(&self.deferred)?;
        dialect.build_select(&self.query)
    }
}

impl IntoSubquery for SelectBuilder {
    fn into_subquery(self) -> Result<Subquery> {
        Deferred::check(&self.deferred)?;
        Ok(Subquery::Select(Box::new(self.query)))
    }
}
