//! Pre-render validation, one entry point per statement kind
//!
//! Each function fails on the first violation and otherwise returns `Ok(())`.
//! Nothing is rendered until validation passes.

use crate::ir::{
    ArrayOp, Assignment, ConditionalExpression, ConflictClause, DeleteQuery, InsertQuery,
    JoinClause, JsonOp, MatchedAction, MergeQuery, Operand, OrderClause, RawSql, SelectItem,
    SelectQuery, Subquery, TableRef, UpdateQuery, WhereCondition,
};
use crate::sanitize::{is_valid_identifier, sanitize_json_path, split_alias};
use crate::{Error, Result, Value};

pub fn validate_select(query: &SelectQuery) -> Result<()> {
    let from = query
        .from
        .as_ref()
        .ok_or_else(|| Error::missing_clause("SELECT", "FROM"))?;
    validate_table_ref(from)?;

    for cte in &query.ctes {
        validate_alias(&cte.name)?;
        for column in &cte.columns {
            validate_column(column)?;
        }
        validate_subquery(&cte.query)?;
    }

    for item in &query.columns {
        match item {
            SelectItem::Column(column) => validate_select_column(column)?,
            SelectItem::Raw(raw) => validate_raw("SELECT", raw)?,
        }
    }
    for agg in &query.aggregations {
        if agg.column != "*" {
            validate_column(&agg.column)?;
        }
        validate_optional_alias(agg.alias.as_deref())?;
    }
    for window in &query.windows {
        validate_function_name(&window.function)?;
        for arg in &window.args {
            if arg != "*" {
                validate_column(arg)?;
            }
        }
        validate_columns(&window.partition_by)?;
        validate_order_by(&window.order_by)?;
        validate_optional_alias(window.alias.as_deref())?;
    }
    for expr in &query.conditionals {
        match expr {
            ConditionalExpression::Case {
                whens, otherwise, ..
            } => {
                if whens.is_empty() {
                    return Err(Error::invalid_condition("CASE requires at least one WHEN"));
                }
                for when in whens {
                    validate_conditions(&when.conditions)?;
                    validate_operand(&when.result)?;
                }
                if let Some(otherwise) = otherwise {
                    validate_operand(otherwise)?;
                }
            }
            ConditionalExpression::Coalesce { columns, .. } => {
                if columns.is_empty() {
                    return Err(Error::invalid_condition("COALESCE requires arguments"));
                }
                validate_columns(columns)?;
            }
            ConditionalExpression::NullIf { left, right, .. } => {
                validate_column(left)?;
                validate_column(right)?;
            }
        }
        validate_optional_alias(expr.alias())?;
    }
    for op in &query.json_operations {
        validate_column(&op.column)?;
        match &op.op {
            JsonOp::Extract(path)
            | JsonOp::ExtractText(path)
            | JsonOp::HasKey(path) => {
                sanitize_json_path(path)?;
            }
            JsonOp::ArrayLength(Some(path)) | JsonOp::TypeOf(Some(path)) => {
                sanitize_json_path(path)?;
            }
            _ => {}
        }
        validate_optional_alias(op.alias.as_deref())?;
    }
    for op in &query.array_operations {
        validate_column(&op.column)?;
        if let ArrayOp::Slice(from, to) = op.op {
            if from == 0 || to < from {
                return Err(Error::invalid_query(format!(
                    "invalid array slice [{from}:{to}]"
                )));
            }
        }
        if let ArrayOp::Element(0) = op.op {
            return Err(Error::invalid_query("array indexes start at 1"));
        }
        validate_optional_alias(op.alias.as_deref())?;
    }
    if let Some(pivot) = &query.pivot {
        validate_column(&pivot.pivot_column)?;
        validate_column(&pivot.value_column)?;
        if pivot.values.is_empty() {
            return Err(Error::invalid_query("PIVOT requires at least one value"));
        }
    }
    if let Some(unpivot) = &query.unpivot {
        validate_alias(&unpivot.name_column)?;
        validate_alias(&unpivot.value_column)?;
        if unpivot.columns.is_empty() {
            return Err(Error::invalid_query("UNPIVOT requires at least one column"));
        }
        validate_columns(&unpivot.columns)?;
    }

    validate_conditions(&query.where_)?;
    for join in &query.joins {
        validate_join(join)?;
    }
    validate_columns(&query.group_by)?;
    validate_conditions(&query.having)?;
    validate_order_by(&query.order_by)?;
    if let Some(raw) = &query.limit_raw {
        validate_raw("LIMIT", raw)?;
    }
    if let Some(raw) = &query.offset_raw {
        validate_raw("OFFSET", raw)?;
    }
    for union in &query.unions {
        validate_select(&union.query)?;
    }
    Ok(())
}

pub fn validate_insert(query: &InsertQuery) -> Result<()> {
    let into = query
        .into
        .as_deref()
        .ok_or_else(|| Error::missing_clause("INSERT", "INTO"))?;
    validate_table_name(into)?;

    if query.values.is_empty() || query.values.iter().any(|record| record.is_empty()) {
        return Err(Error::missing_clause("INSERT", "VALUES"));
    }
    for record in &query.values {
        for (column, _) in record {
            validate_column(column)?;
        }
    }
    if let Some(conflict) = &query.conflict {
        validate_conflict(conflict)?;
    }
    validate_columns(&query.returning)
}

pub fn validate_update(query: &UpdateQuery) -> Result<()> {
    let table = query
        .table
        .as_deref()
        .ok_or_else(|| Error::missing_clause("UPDATE", "a table"))?;
    validate_table_name(table)?;

    if query.set.is_empty() {
        return Err(Error::missing_clause("UPDATE", "SET"));
    }
    validate_assignments(&query.set)?;
    validate_conditions(&query.where_)?;
    validate_columns(&query.returning)
}

/// DELETE additionally refuses to run without a WHERE clause
pub fn validate_delete(query: &DeleteQuery) -> Result<()> {
    let from = query
        .from
        .as_deref()
        .ok_or_else(|| Error::missing_clause("DELETE", "FROM"))?;
    validate_table_name(from)?;

    if query.where_.is_empty() {
        return Err(Error::missing_clause("DELETE", "a WHERE clause"));
    }
    validate_conditions(&query.where_)?;
    validate_columns(&query.returning)
}

pub fn validate_merge(query: &MergeQuery) -> Result<()> {
    let into = query
        .into
        .as_deref()
        .ok_or_else(|| Error::missing_clause("MERGE", "INTO"))?;
    validate_table_name(into)?;
    validate_optional_alias(query.alias.as_deref())?;

    let using = query
        .using
        .as_ref()
        .ok_or_else(|| Error::missing_clause("MERGE", "USING"))?;
    validate_table_ref(using)?;

    if query.on.is_empty() {
        return Err(Error::missing_clause("MERGE", "ON"));
    }
    validate_conditions(&query.on)?;

    if query.when_matched.is_none() && query.when_not_matched.is_none() {
        return Err(Error::missing_clause("MERGE", "a WHEN clause"));
    }
    if let Some(MatchedAction::Update(set)) = &query.when_matched {
        if set.is_empty() {
            return Err(Error::missing_clause("MERGE", "SET"));
        }
        validate_assignments(set)?;
    }
    if let Some(values) = &query.when_not_matched {
        if values.is_empty() {
            return Err(Error::missing_clause("MERGE", "VALUES"));
        }
        validate_assignments(values)?;
    }
    validate_columns(&query.returning)
}

/// Validate every condition of a WHERE/HAVING/ON list
pub fn validate_conditions(conditions: &[WhereCondition]) -> Result<()> {
    conditions.iter().try_for_each(validate_condition)
}

pub fn validate_condition(condition: &WhereCondition) -> Result<()> {
    let operator = &condition.operator;

    // RAW is the caller's responsibility beyond having text
    if operator.is_raw() {
        if condition.column.trim().is_empty() {
            return Err(Error::invalid_condition("RAW condition requires SQL text"));
        }
        let markers = condition.column.matches('?').count();
        let params = condition.raw_params().len();
        if markers != params {
            return Err(Error::invalid_condition(format!(
                "RAW condition has {markers} placeholders but {params} parameters"
            )));
        }
        return Ok(());
    }

    operator.validate()?;

    if operator.is_exists() {
        return match &condition.value {
            Operand::Subquery(subquery) => validate_subquery(subquery),
            _ => Err(Error::invalid_condition(format!(
                "{operator} requires a subquery"
            ))),
        };
    }

    validate_column(&condition.column)?;
    if let Some(path) = &condition.json_path {
        sanitize_json_path(path)?;
    }

    if operator.is_null_check() {
        return Ok(());
    }
    if condition.value.is_none() {
        return Err(Error::invalid_condition(format!(
            "'{} {operator}' requires a value",
            condition.column
        )));
    }

    if operator.is_between() {
        match condition.value.as_value() {
            Some(Value::Array(pair)) if pair.len() == 2 => {}
            _ => {
                return Err(Error::invalid_condition(format!(
                    "{operator} on '{}' requires exactly two values",
                    condition.column
                )))
            }
        }
    }
    if operator.is_in() {
        match &condition.value {
            Operand::Value(Value::Array(_)) | Operand::Subquery(_) => {}
            _ => {
                return Err(Error::invalid_condition(format!(
                    "{operator} on '{}' requires a list of values",
                    condition.column
                )))
            }
        }
    }
    validate_operand(&condition.value)
}

pub fn validate_join(join: &JoinClause) -> Result<()> {
    validate_table_ref(&join.table)?;
    if join.on.is_empty() && !join.join_type.allows_empty_on() {
        return Err(Error::invalid_condition(format!(
            "{:?} JOIN requires an ON clause",
            join.join_type
        )));
    }
    validate_conditions(&join.on)
}

fn validate_operand(operand: &Operand) -> Result<()> {
    match operand {
        Operand::Column(column) => validate_column(column),
        Operand::Subquery(subquery) => validate_subquery(subquery),
        _ => Ok(()),
    }
}

fn validate_subquery(subquery: &Subquery) -> Result<()> {
    match subquery {
        Subquery::Raw(raw) => validate_raw("subquery", raw),
        Subquery::Select(query) => validate_select(query),
    }
}

fn validate_table_ref(table: &TableRef) -> Result<()> {
    match table {
        TableRef::Table { name, alias } => {
            validate_table_name(name)?;
            validate_optional_alias(alias.as_deref())
        }
        TableRef::Subquery { query, alias } => {
            validate_subquery(query)?;
            validate_optional_alias(alias.as_deref())
        }
        TableRef::Function { call, alias, .. } => {
            validate_raw("table function", call)?;
            validate_optional_alias(alias.as_deref())
        }
    }
}

fn validate_table_name(name: &str) -> Result<()> {
    if is_valid_identifier(name) && !name.ends_with('*') {
        Ok(())
    } else {
        Err(Error::invalid_identifier(name))
    }
}

/// `*`, `col AS alias` or a bare identifier
fn validate_select_column(entry: &str) -> Result<()> {
    if entry == "*" {
        return Ok(());
    }
    match split_alias(entry) {
        Some((column, alias)) => {
            validate_column(column)?;
            if !is_single_identifier(alias) {
                return Err(Error::invalid_column_alias(alias));
            }
            Ok(())
        }
        None => validate_column(entry),
    }
}

fn validate_column(column: &str) -> Result<()> {
    if is_valid_identifier(column) {
        Ok(())
    } else {
        Err(Error::invalid_column_name(column))
    }
}

fn validate_columns(columns: &[String]) -> Result<()> {
    columns.iter().try_for_each(|c| validate_column(c))
}

fn is_single_identifier(name: &str) -> bool {
    !name.contains('.') && name != "*" && is_valid_identifier(name)
}

fn validate_alias(alias: &str) -> Result<()> {
    if is_single_identifier(alias) {
        Ok(())
    } else {
        Err(Error::invalid_column_alias(alias))
    }
}

fn validate_optional_alias(alias: Option<&str>) -> Result<()> {
    alias.map_or(Ok(()), validate_alias)
}

fn validate_function_name(name: &str) -> Result<()> {
    if is_single_identifier(name) {
        Ok(())
    } else {
        Err(Error::invalid_identifier(name))
    }
}

fn validate_order_by(order_by: &[OrderClause]) -> Result<()> {
    for order in order_by {
        if order.is_expression {
            if order.column.trim().is_empty() {
                return Err(Error::EmptyRawSql {
                    context: "ORDER BY",
                });
            }
        } else {
            validate_column(&order.column)?;
        }
    }
    Ok(())
}

fn validate_raw(context: &'static str, raw: &RawSql) -> Result<()> {
    if raw.sql.trim().is_empty() {
        return Err(Error::EmptyRawSql { context });
    }
    if raw.marker_count() != raw.params.len() {
        return Err(Error::invalid_query(format!(
            "raw {context} has {} placeholders but {} parameters",
            raw.marker_count(),
            raw.params.len()
        )));
    }
    Ok(())
}

fn validate_assignments(assignments: &[(String, Assignment)]) -> Result<()> {
    for (column, assignment) in assignments {
        validate_column(column)?;
        match assignment {
            Assignment::Column(source) => validate_column(source)?,
            Assignment::Raw(raw) => validate_raw("SET", raw)?,
            Assignment::Value(_) | Assignment::Excluded | Assignment::Delta { .. } => {}
        }
    }
    Ok(())
}

fn validate_conflict(conflict: &ConflictClause) -> Result<()> {
    validate_columns(&conflict.target)?;
    validate_assignments(&conflict.update)?;
    validate_conditions(&conflict.where_)
}
