//! Statement composition shared across dialects
//!
//! SELECT, UPDATE and DELETE have a common shape on all three engines; the
//! dialect hooks cover the differences. INSERT and MERGE diverge enough that
//! each dialect module composes them from the pieces here.

use crate::ir::{
    DeleteQuery, InsertQuery, SelectItem, SelectQuery, TableRef, UnpivotClause, UpdateQuery,
};
use crate::{Error, Result, Value};

use super::clauses;
use super::RenderContext;

pub fn select(ctx: &mut RenderContext, query: &SelectQuery) -> Result<String> {
    let mut sql = String::new();

    if !query.ctes.is_empty() {
        sql.push_str(&clauses::ctes(ctx, &query.ctes)?);
        sql.push(' ');
    }

    sql.push_str("SELECT ");
    if query.distinct {
        sql.push_str("DISTINCT ");
    }
    sql.push_str(&select_list(ctx, query)?);

    let from = query
        .from
        .as_ref()
        .ok_or_else(|| Error::missing_clause("SELECT", "FROM"))?;
    sql.push_str(" FROM ");
    match &query.unpivot {
        Some(unpivot) => sql.push_str(&unpivot_source(ctx, from, unpivot)?),
        None => sql.push_str(&clauses::table_ref(ctx, from)?),
    }

    for join in &query.joins {
        sql.push(' ');
        sql.push_str(&clauses::join(ctx, join)?);
    }

    if !query.where_.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses::conditions(ctx, &query.where_)?);
    }

    if !query.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&ctx.ident_list(&query.group_by)?);
    }

    if !query.having.is_empty() {
        sql.push_str(" HAVING ");
        sql.push_str(&clauses::conditions(ctx, &query.having)?);
    }

    sql.push_str(&clauses::set_operations(ctx, &query.unions)?);

    if !query.order_by.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&clauses::order_by(ctx, &query.order_by)?);
    }

    sql.push_str(&clauses::limit_offset(ctx, query)?);
    Ok(sql)
}

/// Plain columns first, then computed items by kind; `*` when nothing is selected
fn select_list(ctx: &mut RenderContext, query: &SelectQuery) -> Result<String> {
    let mut items = Vec::new();
    for item in &query.columns {
        items.push(match item {
            SelectItem::Column(column) => ctx.column(column)?,
            SelectItem::Raw(raw) => ctx.raw(&raw.sql, &raw.params)?,
        });
    }
    for agg in &query.aggregations {
        items.push(clauses::aggregation(ctx, agg)?);
    }
    for window in &query.windows {
        items.push(clauses::window(ctx, window)?);
    }
    for expr in &query.conditionals {
        items.push(clauses::conditional(ctx, expr)?);
    }
    for op in &query.json_operations {
        let expr = ctx.dialect().json_operation(ctx, op)?;
        items.push(format!("{expr}{}", ctx.alias(op.alias.as_deref())?));
    }
    for op in &query.array_operations {
        let expr = ctx.dialect().array_operation(ctx, op)?;
        items.push(format!("{expr}{}", ctx.alias(op.alias.as_deref())?));
    }
    if let Some(pivot) = &query.pivot {
        items.extend(clauses::pivot(ctx, pivot)?);
    }

    if items.is_empty() {
        Ok("*".to_string())
    } else {
        Ok(items.join(", "))
    }
}

/// `(SELECT 'a' AS name, "a" AS value FROM src UNION ALL ...) AS "src"`
fn unpivot_source(
    ctx: &mut RenderContext,
    from: &TableRef,
    unpivot: &UnpivotClause,
) -> Result<String> {
    let name_column = ctx.ident(&unpivot.name_column)?;
    let value_column = ctx.ident(&unpivot.value_column)?;
    let mut branches = Vec::with_capacity(unpivot.columns.len());
    for column in &unpivot.columns {
        let label = ctx.literal(&Value::String(column.clone()));
        let source = ctx.ident(column)?;
        let table = clauses::table_ref(ctx, from)?;
        branches.push(format!(
            "SELECT {label} AS {name_column}, {source} AS {value_column} FROM {table}"
        ));
    }
    let alias = from
        .alias()
        .or_else(|| from.name().and_then(|name| name.rsplit('.').next()))
        .unwrap_or("unpivoted");
    Ok(format!(
        "({}) AS {}",
        branches.join(" UNION ALL "),
        ctx.ident(alias)?
    ))
}

pub fn update(ctx: &mut RenderContext, query: &UpdateQuery) -> Result<String> {
    let table = query
        .table
        .as_deref()
        .ok_or_else(|| Error::missing_clause("UPDATE", "a table"))?;
    let mut sql = format!(
        "UPDATE {} SET {}",
        ctx.ident(table)?,
        clauses::assignments(ctx, &query.set)?
    );
    if !query.where_.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses::conditions(ctx, &query.where_)?);
    }
    sql.push_str(&clauses::returning(ctx, &query.returning)?);
    Ok(sql)
}

pub fn delete(ctx: &mut RenderContext, query: &DeleteQuery) -> Result<String> {
    let table = query
        .from
        .as_deref()
        .ok_or_else(|| Error::missing_clause("DELETE", "FROM"))?;
    let mut sql = format!("DELETE FROM {}", ctx.ident(table)?);
    if !query.where_.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses::conditions(ctx, &query.where_)?);
    }
    sql.push_str(&clauses::returning(ctx, &query.returning)?);
    Ok(sql)
}

/// `INTO "t" ("a", "b") VALUES (...), (...)`, without the leading verb
///
/// Records missing a column get the dialect's missing-value marker.
pub fn insert_rows(ctx: &mut RenderContext, query: &InsertQuery) -> Result<String> {
    let table = query
        .into
        .as_deref()
        .ok_or_else(|| Error::missing_clause("INSERT", "INTO"))?;
    let columns = query.columns();
    let quoted = columns
        .iter()
        .map(|c| ctx.ident(c))
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::with_capacity(query.values.len());
    for record in &query.values {
        let mut cells = Vec::with_capacity(columns.len());
        for column in &columns {
            let cell = match record.iter().find(|(name, _)| name == column) {
                Some((_, value)) => ctx.add_param(value.clone()),
                None => ctx.dialect().missing_value(ctx),
            };
            cells.push(cell);
        }
        rows.push(format!("({})", cells.join(", ")));
    }

    Ok(format!(
        "INTO {} ({}) VALUES {}",
        ctx.ident(table)?,
        quoted.join(", "),
        rows.join(", ")
    ))
}
