//! SQLite rendering rules
//!
//! Arrays and JSON documents are stored as JSON text and queried through the
//! JSON1 functions. LIKE gets an explicit `ESCAPE '\'` since SQLite has no
//! default escape character.

use crate::ir::{
    ArrayOp, ArrayOperation, Assignment, InsertQuery, JsonOp, JsonOperation, MatchedAction,
    MergeQuery,
};
use crate::render::{clauses, statement, RenderContext};
use crate::sanitize::sanitize_json_path;
use crate::{Error, Operator, Result, Value};

use super::{float_literal, hex, json_path_literal, quote_whole_token, string_literal, DataType};

const NAME: &str = "SQLite";

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
        Value::Bytes(b) => format!("X'{}'", hex(b)),
        Value::Json(j) => format!("json({})", string_literal(&j.to_string())),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(escape_value).collect();
            format!("json_array({})", items.join(", "))
        }
    }
}

/// Type names resolve to SQLite's storage affinities
pub fn data_type(data_type: DataType) -> String {
    match data_type {
        DataType::Boolean
        | DataType::SmallInt
        | DataType::Integer
        | DataType::BigInt
        | DataType::Serial
        | DataType::BigSerial => "INTEGER".into(),
        DataType::Real | DataType::Double => "REAL".into(),
        DataType::Decimal(..) => "NUMERIC".into(),
        DataType::Text
        | DataType::Varchar(_)
        | DataType::Char(_)
        | DataType::Date
        | DataType::Time
        | DataType::Timestamp
        | DataType::TimestampTz
        | DataType::Json
        | DataType::Uuid => "TEXT".into(),
        DataType::Bytes => "BLOB".into(),
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

pub fn like(lhs: &str, op: &Operator, rhs: &str) -> String {
    let sql = if *op == Operator::ILIKE {
        format!("LOWER({lhs}) LIKE LOWER({rhs})")
    } else if *op == Operator::NOT_ILIKE {
        format!("LOWER({lhs}) NOT LIKE LOWER({rhs})")
    } else {
        format!("{lhs} {op} {rhs}")
    };
    format!("{sql} ESCAPE '\\'")
}

pub fn json_extract(column: &str, segments: &[&str]) -> String {
    format!("json_extract({column}, {})", json_path_literal(segments))
}

fn optional_path(column: &str, path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => Ok(format!(
            "{column}, {}",
            json_path_literal(&sanitize_json_path(path)?)
        )),
        None => Ok(column.to_string()),
    }
}

pub fn json_operation(ctx: &mut RenderContext, op: &JsonOperation) -> Result<String> {
    let column = ctx.ident(&op.column)?;
    match &op.op {
        JsonOp::Extract(path) | JsonOp::ExtractText(path) => {
            Ok(json_extract(&column, &sanitize_json_path(path)?))
        }
        JsonOp::Contains(_) => Err(Error::unsupported(NAME, "JSON containment")),
        JsonOp::HasKey(path) => Ok(format!(
            "json_type({column}, {}) IS NOT NULL",
            json_path_literal(&sanitize_json_path(path)?)
        )),
        JsonOp::ArrayLength(path) => Ok(format!(
            "json_array_length({})",
            optional_path(&column, path.as_deref())?
        )),
        JsonOp::TypeOf(path) => Ok(format!(
            "json_type({})",
            optional_path(&column, path.as_deref())?
        )),
    }
}

fn contains(array: &str, items: &str) -> String {
    format!(
        "NOT EXISTS (SELECT value FROM json_each({items}) EXCEPT SELECT value FROM json_each({array}))"
    )
}

fn overlaps(left: &str, right: &str) -> String {
    format!(
        "EXISTS (SELECT value FROM json_each({left}) INTERSECT SELECT value FROM json_each({right}))"
    )
}

pub fn array_operation(ctx: &mut RenderContext, op: &ArrayOperation) -> Result<String> {
    let column = ctx.ident(&op.column)?;
    match &op.op {
        ArrayOp::Length => Ok(format!("json_array_length({column})")),
        ArrayOp::Element(index) => Ok(format!("json_extract({column}, '$[{}]')", index - 1)),
        ArrayOp::Slice(..) => Err(Error::unsupported(NAME, "array slices")),
        ArrayOp::Contains(value) => {
            let param = ctx.add_param(value.clone());
            Ok(contains(&column, &param))
        }
        ArrayOp::Overlaps(value) => {
            let param = ctx.add_param(value.clone());
            Ok(overlaps(&column, &param))
        }
        ArrayOp::Join(separator) => {
            let sep = ctx.add_param(Value::String(separator.clone()));
            Ok(format!(
                "(SELECT group_concat(value, {sep}) FROM json_each({column}))"
            ))
        }
        ArrayOp::Unnest => Err(Error::unsupported(NAME, "array unnest")),
    }
}

pub fn array_condition(lhs: &str, op: &Operator, rhs: &str) -> Result<String> {
    if *op == Operator::CONTAINS {
        Ok(contains(lhs, rhs))
    } else if *op == Operator::CONTAINED_BY {
        Ok(contains(rhs, lhs))
    } else if *op == Operator::OVERLAPS {
        Ok(overlaps(lhs, rhs))
    } else if *op == Operator::ANY {
        Ok(format!("{rhs} IN (SELECT value FROM json_each({lhs}))"))
    } else {
        Err(Error::unsupported(NAME, format!("operator {op}")))
    }
}

pub fn build_insert(ctx: &mut RenderContext, query: &InsertQuery) -> Result<String> {
    let mut sql = format!("INSERT {}", statement::insert_rows(ctx, query)?);
    sql.push_str(&super::postgres::on_conflict(ctx, query)?);
    sql.push_str(&clauses::returning(ctx, &query.returning)?);
    Ok(sql)
}

/// Conflict target for an emulated MERGE: the target-side columns of the ON
/// conditions, unqualified
fn merge_target(query: &MergeQuery) -> Vec<String> {
    let mut target = Vec::new();
    for cond in &query.on {
        if cond.column.is_empty() || cond.operator.is_raw() {
            continue;
        }
        let column = unqualified(&cond.column);
        if !target.iter().any(|t: &String| t == column) {
            target.push(column.to_string());
        }
    }
    target
}

/// `"s.id"` names one identifier on SQLite, so source columns drop their qualifier
fn unqualified(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

/// `DO UPDATE` cannot see the source table; read the inserted copy through `excluded`
fn conflict_update(
    ctx: &mut RenderContext,
    set: &[(String, Assignment)],
    values: &[(String, Assignment)],
) -> Result<String> {
    let mut parts = Vec::with_capacity(set.len());
    for (column, value) in set {
        let target = ctx.ident(column)?;
        let rendered = match value {
            Assignment::Column(source) => {
                let source = unqualified(source);
                let inserted = values.iter().find(|(_, v)| {
                    matches!(v, Assignment::Column(c) if unqualified(c) == source)
                });
                match inserted {
                    Some((insert_column, _)) => ctx.dialect().excluded(ctx, insert_column)?,
                    None => {
                        return Err(Error::invalid_query(format!(
                            "MERGE on SQLite can only update '{column}' from a source column \
                             that is also inserted, '{source}' is not"
                        )))
                    }
                }
            }
            other => clauses::assignment(ctx, column, other)?,
        };
        parts.push(format!("{target} = {rendered}"));
    }
    Ok(parts.join(", "))
}

/// MERGE emulated as `INSERT ... SELECT ... WHERE true ON CONFLICT (...) DO ...`
///
/// `WHERE true` keeps SQLite from parsing `ON CONFLICT` as a join constraint.
pub fn build_merge(ctx: &mut RenderContext, query: &MergeQuery) -> Result<String> {
    let into = query
        .into
        .as_deref()
        .ok_or_else(|| Error::missing_clause("MERGE", "INTO"))?;
    let using = query
        .using
        .as_ref()
        .ok_or_else(|| Error::missing_clause("MERGE", "USING"))?;
    let values = query
        .when_not_matched
        .as_ref()
        .ok_or_else(|| Error::unsupported(NAME, "MERGE without WHEN NOT MATCHED"))?;
    super::reject_excluded(values)?;

    let update = match &query.when_matched {
        Some(MatchedAction::Update(set)) => {
            super::reject_excluded(set)?;
            Some(set)
        }
        Some(MatchedAction::Delete) => {
            return Err(Error::unsupported(NAME, "MERGE WHEN MATCHED THEN DELETE"))
        }
        None => None,
    };

    let target = merge_target(query);
    if target.is_empty() {
        return Err(Error::invalid_query(
            "MERGE on SQLite needs column comparisons in ON to derive a conflict target",
        ));
    }

    let columns: Vec<String> = values.iter().map(|(c, _)| c.clone()).collect();
    let mut cells = Vec::with_capacity(values.len());
    for (column, value) in values {
        cells.push(match value {
            Assignment::Column(source) => ctx.ident(unqualified(source))?,
            other => clauses::assignment(ctx, column, other)?,
        });
    }

    let mut sql = format!(
        "INSERT INTO {} ({}) SELECT {} FROM {} WHERE true ON CONFLICT ({})",
        ctx.ident(into)?,
        ctx.ident_list(&columns)?,
        cells.join(", "),
        clauses::table_ref(ctx, using)?,
        ctx.ident_list(&target)?
    );
    match update {
        Some(set) => {
            sql.push_str(" DO UPDATE SET ");
            sql.push_str(&conflict_update(ctx, set, values)?);
        }
        None => sql.push_str(" DO NOTHING"),
    }
    sql.push_str(&clauses::returning(ctx, &query.returning)?);
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConflictAction, ConflictClause, TableRef, WhereCondition};
    use crate::Dialect;

    fn ctx() -> RenderContext {
        RenderContext::new(Dialect::Sqlite)
    }

    #[test]
    fn test_escape_value() {
        assert_eq!(escape_value(&Value::Bool(true)), "TRUE");
        assert_eq!(escape_value(&Value::Bytes(vec![0xab])), "X'ab'");
        assert_eq!(
            escape_value(&Value::from(vec![1, 2])),
            "json_array(1, 2)"
        );
        assert_eq!(
            escape_value(&Value::Json(serde_json::json!({"k": "v"}))),
            "json('{\"k\":\"v\"}')"
        );
    }

    #[test]
    fn test_data_type_affinities() {
        assert_eq!(data_type(DataType::Boolean), "INTEGER");
        assert_eq!(data_type(DataType::Decimal(10, 2)), "NUMERIC");
        assert_eq!(data_type(DataType::TimestampTz), "TEXT");
        assert_eq!(data_type(DataType::Bytes), "BLOB");
    }

    #[test]
    fn test_like_has_escape_clause() {
        assert_eq!(
            like("\"name\"", &Operator::LIKE, "?"),
            "\"name\" LIKE ? ESCAPE '\\'"
        );
        assert_eq!(
            like("\"name\"", &Operator::ILIKE, "?"),
            "LOWER(\"name\") LIKE LOWER(?) ESCAPE '\\'"
        );
    }

    #[test]
    fn test_offset_without_limit() {
        assert_eq!(limit_syntax(None, Some(20)), "OFFSET 20");
    }

    #[test]
    fn test_json_operations() {
        let mut ctx = ctx();
        let op = JsonOperation {
            column: "data".into(),
            op: JsonOp::ExtractText("address.city".into()),
            alias: None,
        };
        assert_eq!(
            json_operation(&mut ctx, &op).unwrap(),
            "json_extract(\"data\", '$.address.city')"
        );

        let op = JsonOperation {
            column: "data".into(),
            op: JsonOp::HasKey("email".into()),
            alias: None,
        };
        assert_eq!(
            json_operation(&mut ctx, &op).unwrap(),
            "json_type(\"data\", '$.email') IS NOT NULL"
        );

        let op = JsonOperation {
            column: "data".into(),
            op: JsonOp::Contains(Value::from("x")),
            alias: None,
        };
        assert!(matches!(
            json_operation(&mut ctx, &op).unwrap_err(),
            Error::UnsupportedFeature { .. }
        ));
    }

    #[test]
    fn test_array_operations() {
        let mut ctx = ctx();
        let join = ArrayOperation {
            column: "tags".into(),
            op: ArrayOp::Join(", ".into()),
            alias: None,
        };
        assert_eq!(
            array_operation(&mut ctx, &join).unwrap(),
            "(SELECT group_concat(value, ?) FROM json_each(\"tags\"))"
        );
        assert_eq!(
            array_condition("\"tags\"", &Operator::ANY, "?").unwrap(),
            "? IN (SELECT value FROM json_each(\"tags\"))"
        );
        assert_eq!(
            array_condition("\"tags\"", &Operator::CONTAINS, "?").unwrap(),
            "NOT EXISTS (SELECT value FROM json_each(?) EXCEPT SELECT value FROM json_each(\"tags\"))"
        );
    }

    #[test]
    fn test_insert_on_conflict() {
        let mut ctx = ctx();
        let mut conflict = ConflictClause::new(vec!["email".into()]);
        conflict.action = ConflictAction::DoUpdate;
        let query = InsertQuery {
            into: Some("users".into()),
            values: vec![vec![("email".into(), "a@b.c".into()), ("name".into(), "A".into())]],
            returning: vec!["id".into()],
            conflict: Some(conflict),
        };
        assert_eq!(
            build_insert(&mut ctx, &query).unwrap(),
            "INSERT INTO \"users\" (\"email\", \"name\") VALUES (?, ?) \
             ON CONFLICT (\"email\") DO UPDATE SET \"name\" = excluded.\"name\" RETURNING \"id\""
        );
    }

    #[test]
    fn test_merge_emulation() {
        let mut ctx = ctx();
        let query = MergeQuery {
            into: Some("users".into()),
            alias: None,
            using: Some(TableRef::table("staging")),
            on: vec![WhereCondition::columns("users.id", Operator::EQ, "staging.id")],
            when_matched: None,
            when_not_matched: Some(vec![
                ("id".into(), Assignment::Column("staging.id".into())),
                ("name".into(), Assignment::Value("x".into())),
            ]),
            returning: vec![],
        };
        assert_eq!(
            build_merge(&mut ctx, &query).unwrap(),
            "INSERT INTO \"users\" (\"id\", \"name\") SELECT \"id\", ? \
             FROM \"staging\" WHERE true ON CONFLICT (\"id\") DO NOTHING"
        );
    }

    #[test]
    fn test_merge_emulation_updates_through_excluded() {
        let mut ctx = ctx();
        let query = MergeQuery {
            into: Some("users".into()),
            alias: None,
            using: Some(TableRef::table("staging")),
            on: vec![WhereCondition::columns("users.id", Operator::EQ, "staging.id")],
            when_matched: Some(MatchedAction::Update(vec![
                ("name".into(), Assignment::Column("staging.full_name".into())),
                ("visits".into(), Assignment::Delta { subtract: false, by: 1.into() }),
            ])),
            when_not_matched: Some(vec![
                ("id".into(), Assignment::Column("staging.id".into())),
                ("name".into(), Assignment::Column("staging.full_name".into())),
            ]),
            returning: vec![],
        };
        assert_eq!(
            build_merge(&mut ctx, &query).unwrap(),
            "INSERT INTO \"users\" (\"id\", \"name\") SELECT \"id\", \"full_name\" \
             FROM \"staging\" WHERE true ON CONFLICT (\"id\") \
             DO UPDATE SET \"name\" = excluded.\"name\", \"visits\" = \"visits\" + ?"
        );
    }

    #[test]
    fn test_merge_emulation_rejects_update_from_uninserted_column() {
        let mut ctx = ctx();
        let query = MergeQuery {
            into: Some("users".into()),
            alias: None,
            using: Some(TableRef::table("staging")),
            on: vec![WhereCondition::columns("users.id", Operator::EQ, "staging.id")],
            when_matched: Some(MatchedAction::Update(vec![(
                "name".into(),
                Assignment::Column("staging.nickname".into()),
            )])),
            when_not_matched: Some(vec![("id".into(), Assignment::Column("staging.id".into()))]),
            returning: vec![],
        };
        assert!(matches!(
            build_merge(&mut ctx, &query).unwrap_err(),
            Error::InvalidQuery { .. }
        ));
    }
}
