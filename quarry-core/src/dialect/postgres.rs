//! PostgreSQL rendering rules

use crate::ir::{
    ArrayOp, ArrayOperation, ConflictAction, InsertQuery, JsonOp, JsonOperation, MatchedAction,
    MergeQuery,
};
use crate::render::{clauses, statement, RenderContext};
use crate::sanitize::{is_index_segment, sanitize_json_path};
use crate::{Error, Operator, Result, Value};

use super::{float_literal, hex, quote_whole_token, string_literal, DataType};

pub fn escape_identifier(name: &str) -> String {
    quote_whole_token(name, '"')
}

pub fn escape_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Value::I32(i) => i.to_string(),
        Value::I64(i) => i.to_string(),
        Value::F32(f) => float_literal(*f as f64),
        Value::F64(f) => float_literal(*f),
        Value::String(s) => string_literal(s),
        Value::Bytes(b) => format!("'\\x{}'", hex(b)),
        Value::Json(j) => format!("CAST({} AS JSONB)", string_literal(&j.to_string())),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(escape_value).collect();
            format!("ARRAY[{}]", items.join(", "))
        }
    }
}

/// Cast appended to a placeholder; JSON and arrays reach the server as text
pub fn param_cast(value: &Value) -> Option<String> {
    match value {
        Value::Json(_) => Some("jsonb".to_string()),
        Value::Array(items) => Some(format!("{}[]", element_type(items))),
        _ => None,
    }
}

fn element_type(items: &[Value]) -> &'static str {
    match items.iter().find(|v| !v.is_null()) {
        Some(Value::Bool(_)) => "bool",
        Some(Value::I32(_)) => "int4",
        Some(Value::I64(_)) => "int8",
        Some(Value::F32(_)) => "float4",
        Some(Value::F64(_)) => "float8",
        Some(Value::Bytes(_)) => "bytea",
        Some(Value::Json(_)) => "jsonb",
        // multidimensional arrays share the element type's `[]` cast
        Some(Value::Array(inner)) => element_type(inner),
        Some(Value::String(_)) | Some(Value::Null) | None => "text",
    }
}

/// Array input syntax, `{1,2}` or `{"a","b \"c\""}`, for binding as text
pub fn array_literal(items: &[Value]) -> String {
    let elements: Vec<String> = items.iter().map(array_element).collect();
    format!("{{{}}}", elements.join(","))
}

fn array_element(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => (if *b { "t" } else { "f" }).to_string(),
        Value::I32(i) => i.to_string(),
        Value::I64(i) => i.to_string(),
        Value::F32(f) => f.to_string(),
        Value::F64(f) => f.to_string(),
        Value::String(s) => quote_element(s),
        Value::Bytes(b) => quote_element(&format!("\\x{}", hex(b))),
        Value::Json(j) => quote_element(&j.to_string()),
        Value::Array(inner) => array_literal(inner),
    }
}

fn quote_element(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

pub fn data_type(data_type: DataType) -> String {
    match data_type {
        DataType::Boolean => "BOOLEAN".into(),
        DataType::SmallInt => "SMALLINT".into(),
        DataType::Integer => "INTEGER".into(),
        DataType::BigInt => "BIGINT".into(),
        DataType::Real => "REAL".into(),
        DataType::Double => "DOUBLE PRECISION".into(),
        DataType::Decimal(p, s) => format!("NUMERIC({p}, {s})"),
        DataType::Text => "TEXT".into(),
        DataType::Varchar(n) => format!("VARCHAR({n})"),
        DataType::Char(n) => format!("CHAR({n})"),
        DataType::Bytes => "BYTEA".into(),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME".into(),
        DataType::Timestamp => "TIMESTAMP".into(),
        DataType::TimestampTz => "TIMESTAMPTZ".into(),
        DataType::Json => "JSONB".into(),
        DataType::Uuid => "UUID".into(),
        DataType::Serial => "SERIAL".into(),
        DataType::BigSerial => "BIGSERIAL".into(),
    }
}

pub fn limit_syntax(limit: Option<u64>, offset: Option<u64>) -> String {
    match (limit, offset) {
        (Some(l), Some(o)) => format!("LIMIT {l} OFFSET {o}"),
        (Some(l), None) => format!("LIMIT {l}"),
        (None, Some(o)) => format!("OFFSET {o}"),
        (None, None) => String::new(),
    }
}

fn path_key(segment: &str) -> String {
    if is_index_segment(segment) {
        segment.to_string()
    } else {
        string_literal(segment)
    }
}

/// `col->'a'->'b'`, with `->>` on the last step when `as_text`
pub fn json_path(column: &str, segments: &[&str], as_text: bool) -> String {
    let mut sql = column.to_string();
    for (i, segment) in segments.iter().enumerate() {
        let arrow = if as_text && i == segments.len() - 1 {
            "->>"
        } else {
            "->"
        };
        sql.push_str(arrow);
        sql.push_str(&path_key(segment));
    }
    sql
}

fn optional_path(column: &str, path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => Ok(json_path(column, &sanitize_json_path(path)?, false)),
        None => Ok(column.to_string()),
    }
}

pub fn json_operation(ctx: &mut RenderContext, op: &JsonOperation) -> Result<String> {
    let column = ctx.ident(&op.column)?;
    match &op.op {
        JsonOp::Extract(path) => Ok(json_path(&column, &sanitize_json_path(path)?, false)),
        JsonOp::ExtractText(path) => Ok(json_path(&column, &sanitize_json_path(path)?, true)),
        JsonOp::Contains(value) => {
            let param = ctx.add_param(Value::Json(value.to_json()));
            Ok(format!("{column} @> {param}"))
        }
        JsonOp::HasKey(path) => {
            let segments = sanitize_json_path(path)?;
            let (key, parents) = segments
                .split_last()
                .ok_or_else(|| Error::invalid_identifier(path.as_str()))?;
            Ok(format!(
                "{} ? {}",
                json_path(&column, parents, false),
                string_literal(key)
            ))
        }
        JsonOp::ArrayLength(path) => Ok(format!(
            "jsonb_array_length({})",
            optional_path(&column, path.as_deref())?
        )),
        JsonOp::TypeOf(path) => Ok(format!(
            "jsonb_typeof({})",
            optional_path(&column, path.as_deref())?
        )),
    }
}

pub fn array_operation(ctx: &mut RenderContext, op: &ArrayOperation) -> Result<String> {
    let column = ctx.ident(&op.column)?;
    match &op.op {
        ArrayOp::Length => Ok(format!("array_length({column}, 1)")),
        ArrayOp::Element(index) => Ok(format!("{column}[{index}]")),
        ArrayOp::Slice(from, to) => Ok(format!("{column}[{from}:{to}]")),
        ArrayOp::Contains(value) => Ok(format!("{column} @> {}", ctx.add_param(value.clone()))),
        ArrayOp::Overlaps(value) => Ok(format!("{column} && {}", ctx.add_param(value.clone()))),
        ArrayOp::Join(separator) => {
            let sep = ctx.add_param(Value::String(separator.clone()));
            Ok(format!("array_to_string({column}, {sep})"))
        }
        ArrayOp::Unnest => Ok(format!("unnest({column})")),
    }
}

pub fn array_condition(lhs: &str, op: &Operator, rhs: &str) -> Result<String> {
    if *op == Operator::ANY {
        Ok(format!("{rhs} = ANY({lhs})"))
    } else {
        Ok(format!("{lhs} {op} {rhs}"))
    }
}

/// `ON CONFLICT (...) DO NOTHING | DO UPDATE SET ...`, shared with SQLite
pub(crate) fn on_conflict(ctx: &mut RenderContext, query: &InsertQuery) -> Result<String> {
    let conflict = match &query.conflict {
        Some(conflict) => conflict,
        None => return Ok(String::new()),
    };
    let mut sql = String::from(" ON CONFLICT");
    if !conflict.target.is_empty() {
        sql.push_str(&format!(" ({})", ctx.ident_list(&conflict.target)?));
    }
    match conflict.action {
        ConflictAction::DoNothing => sql.push_str(" DO NOTHING"),
        ConflictAction::DoUpdate => {
            if conflict.target.is_empty() {
                return Err(Error::invalid_query(
                    "ON CONFLICT DO UPDATE requires a conflict target",
                ));
            }
            let set = super::conflict_assignments(query, conflict);
            sql.push_str(" DO UPDATE SET ");
            sql.push_str(&clauses::assignments(ctx, &set)?);
            if !conflict.where_.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses::conditions(ctx, &conflict.where_)?);
            }
        }
    }
    Ok(sql)
}

pub fn build_insert(ctx: &mut RenderContext, query: &InsertQuery) -> Result<String> {
    let mut sql = format!("INSERT {}", statement::insert_rows(ctx, query)?);
    sql.push_str(&on_conflict(ctx, query)?);
    sql.push_str(&clauses::returning(ctx, &query.returning)?);
    Ok(sql)
}

/// Native `MERGE INTO ... USING ... ON ... WHEN ...`
pub fn build_merge(ctx: &mut RenderContext, query: &MergeQuery) -> Result<String> {
    let into = query
        .into
        .as_deref()
        .ok_or_else(|| Error::missing_clause("MERGE", "INTO"))?;
    let using = query
        .using
        .as_ref()
        .ok_or_else(|| Error::missing_clause("MERGE", "USING"))?;

    let mut sql = format!(
        "MERGE INTO {}{} USING {} ON {}",
        ctx.ident(into)?,
        ctx.alias(query.alias.as_deref())?,
        clauses::table_ref(ctx, using)?,
        clauses::conditions(ctx, &query.on)?
    );

    match &query.when_matched {
        Some(MatchedAction::Update(set)) => {
            super::reject_excluded(set)?;
            sql.push_str(" WHEN MATCHED THEN UPDATE SET ");
            sql.push_str(&clauses::assignments(ctx, set)?);
        }
        Some(MatchedAction::Delete) => sql.push_str(" WHEN MATCHED THEN DELETE"),
        None => {}
    }

    if let Some(values) = &query.when_not_matched {
        super::reject_excluded(values)?;
        let columns: Vec<String> = values.iter().map(|(c, _)| c.clone()).collect();
        let mut cells = Vec::with_capacity(values.len());
        for (column, value) in values {
            cells.push(clauses::assignment(ctx, column, value)?);
        }
        sql.push_str(&format!(
            " WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
            ctx.ident_list(&columns)?,
            cells.join(", ")
        ));
    }

    sql.push_str(&clauses::returning(ctx, &query.returning)?);
    Ok(sql)
}
