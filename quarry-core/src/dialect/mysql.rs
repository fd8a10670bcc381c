//! MySQL rendering rules
//!
//! Arrays are JSON arrays on MySQL, so array operations map onto the JSON
//! functions. There is no RETURNING and no MERGE; MERGE is emulated with
//! `INSERT ... SELECT ... ON DUPLICATE KEY UPDATE`.

use crate::ir::{
    ArrayOp, ArrayOperation, ConflictAction, InsertQuery, JsonOp, JsonOperation, MatchedAction,
    MergeQuery,
};
use crate::render::{clauses, statement, RenderContext};
use crate::sanitize::sanitize_json_path;
use crate::{Error, Operator, Result, Value};

use super::{float_literal, hex, json_path_literal, DataType};

/// Largest row count MySQL accepts, used for OFFSET without LIMIT
pub const MAX_ROWS: &str = "18446744073709551615";

const NAME: &str = "MySQL";

/// Backtick-quote each dotted segment; `*` segments stay bare
pub fn escape_identifier(name: &str) -> String {
    name.split('.')
        .map(|segment| {
            if segment == "*" {
                "*".to_string()
            } else {
                format!("`{}`", segment.replace('`', "``"))
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// MySQL treats backslash as an escape inside strings, so it is doubled too
fn string_literal(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

pub fn escape_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        Value::I32(i) => i.to_string(),
        Value::I64(i) => i.to_string(),
        Value::F32(f) => float_literal(*f as f64),
        Value::F64(f) => float_literal(*f),
        Value::String(s) => string_literal(s),
        Value::Bytes(b) => format!("X'{}'", hex(b)),
        Value::Json(j) => format!("CAST({} AS JSON)", string_literal(&j.to_string())),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(escape_value).collect();
            format!("JSON_ARRAY({})", items.join(", "))
        }
    }
}

pub fn data_type(data_type: DataType) -> String {
    match data_type {
        DataType::Boolean => "TINYINT(1)".into(),
        DataType::SmallInt => "SMALLINT".into(),
        DataType::Integer => "INT".into(),
        DataType::BigInt => "BIGINT".into(),
        DataType::Real => "FLOAT".into(),
        DataType::Double => "DOUBLE".into(),
        DataType::Decimal(p, s) => format!("DECIMAL({p}, {s})"),
        DataType::Text => "TEXT".into(),
        DataType::Varchar(n) => format!("VARCHAR({n})"),
        DataType::Char(n) => format!("CHAR({n})"),
        DataType::Bytes => "BLOB".into(),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME".into(),
        DataType::Timestamp => "DATETIME".into(),
        DataType::TimestampTz => "TIMESTAMP".into(),
        DataType::Json => "JSON".into(),
        DataType::Uuid => "CHAR(36)".into(),
        DataType::Serial => "INT AUTO_INCREMENT".into(),
        DataType::BigSerial => "BIGINT AUTO_INCREMENT".into(),
    }
}

/// `LIMIT offset, count`; an OFFSET alone needs the max-rows sentinel
pub fn limit_syntax(limit: Option<u64>, offset: Option<u64>) -> String {
    match (limit, offset) {
        (Some(l), Some(o)) => format!("LIMIT {o}, {l}"),
        (Some(l), None) => format!("LIMIT {l}"),
        (None, Some(o)) => format!("LIMIT {o}, {MAX_ROWS}"),
        (None, None) => String::new(),
    }
}

/// LIKE is case-insensitive under most collations but ILIKE does not exist
pub fn like(lhs: &str, op: &Operator, rhs: &str) -> String {
    if *op == Operator::ILIKE {
        format!("LOWER({lhs}) LIKE LOWER({rhs})")
    } else if *op == Operator::NOT_ILIKE {
        format!("LOWER({lhs}) NOT LIKE LOWER({rhs})")
    } else {
        format!("{lhs} {op} {rhs}")
    }
}

pub fn json_extract(column: &str, segments: &[&str]) -> String {
    format!("JSON_EXTRACT({column}, {})", json_path_literal(segments))
}

pub fn json_text(column: &str, segments: &[&str]) -> String {
    format!("JSON_UNQUOTE({})", json_extract(column, segments))
}

pub fn json_operation(ctx: &mut RenderContext, op: &JsonOperation) -> Result<String> {
    let column = ctx.ident(&op.column)?;
    match &op.op {
        JsonOp::Extract(path) => Ok(json_extract(&column, &sanitize_json_path(path)?)),
        JsonOp::ExtractText(path) => Ok(json_text(&column, &sanitize_json_path(path)?)),
        JsonOp::Contains(value) => {
            let param = ctx.add_param(Value::Json(value.to_json()));
            Ok(format!("JSON_CONTAINS({column}, {param})"))
        }
        JsonOp::HasKey(path) => Ok(format!(
            "JSON_CONTAINS_PATH({column}, 'one', {})",
            json_path_literal(&sanitize_json_path(path)?)
        )),
        JsonOp::ArrayLength(None) => Ok(format!("JSON_LENGTH({column})")),
        JsonOp::ArrayLength(Some(path)) => Ok(format!(
            "JSON_LENGTH({column}, {})",
            json_path_literal(&sanitize_json_path(path)?)
        )),
        JsonOp::TypeOf(None) => Ok(format!("JSON_TYPE({column})")),
        JsonOp::TypeOf(Some(path)) => Ok(format!(
            "JSON_TYPE({})",
            json_extract(&column, &sanitize_json_path(path)?)
        )),
    }
}

pub fn array_operation(ctx: &mut RenderContext, op: &ArrayOperation) -> Result<String> {
    let column = ctx.ident(&op.column)?;
    match &op.op {
        ArrayOp::Length => Ok(format!("JSON_LENGTH({column})")),
        ArrayOp::Element(index) => Ok(format!("JSON_EXTRACT({column}, '$[{}]')", index - 1)),
        ArrayOp::Slice(from, to) => Ok(format!(
            "JSON_EXTRACT({column}, '$[{} to {}]')",
            from - 1,
            to - 1
        )),
        ArrayOp::Contains(value) => {
            let param = ctx.add_param(value.clone());
            Ok(format!("JSON_CONTAINS({column}, {param})"))
        }
        ArrayOp::Overlaps(value) => {
            let param = ctx.add_param(value.clone());
            Ok(format!("JSON_OVERLAPS({column}, {param})"))
        }
        ArrayOp::Join(_) => Err(Error::unsupported(NAME, "array join")),
        ArrayOp::Unnest => Err(Error::unsupported(NAME, "array unnest")),
    }
}

pub fn array_condition(lhs: &str, op: &Operator, rhs: &str) -> Result<String> {
    if *op == Operator::CONTAINS {
        Ok(format!("JSON_CONTAINS({lhs}, {rhs})"))
    } else if *op == Operator::CONTAINED_BY {
        Ok(format!("JSON_CONTAINS({rhs}, {lhs})"))
    } else if *op == Operator::OVERLAPS {
        Ok(format!("JSON_OVERLAPS({lhs}, {rhs})"))
    } else if *op == Operator::ANY {
        Ok(format!("{rhs} MEMBER OF({lhs})"))
    } else {
        Err(Error::unsupported(NAME, format!("operator {op}")))
    }
}

/// `ON DUPLICATE KEY UPDATE ...`, the only conflict form MySQL has
fn on_duplicate_key(ctx: &mut RenderContext, query: &InsertQuery) -> Result<String> {
    let conflict = match &query.conflict {
        Some(conflict) if conflict.action == ConflictAction::DoUpdate => conflict,
        _ => return Ok(String::new()),
    };
    if !conflict.where_.is_empty() {
        return Err(Error::unsupported(NAME, "a WHERE clause on conflict updates"));
    }
    let set = super::conflict_assignments(query, conflict);
    Ok(format!(
        " ON DUPLICATE KEY UPDATE {}",
        clauses::assignments(ctx, &set)?
    ))
}

pub fn build_insert(ctx: &mut RenderContext, query: &InsertQuery) -> Result<String> {
    let ignore = matches!(
        &query.conflict,
        Some(conflict) if conflict.action == ConflictAction::DoNothing
    );
    let mut sql = String::from(if ignore { "INSERT IGNORE " } else { "INSERT " });
    sql.push_str(&statement::insert_rows(ctx, query)?);
    sql.push_str(&on_duplicate_key(ctx, query)?);
    sql.push_str(&clauses::returning(ctx, &query.returning)?);
    Ok(sql)
}

/// MERGE emulated as `INSERT ... SELECT ... FROM source ON DUPLICATE KEY UPDATE`
///
/// Matching relies on the target's unique keys; the ON conditions are not rendered.
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

    let columns: Vec<String> = values.iter().map(|(c, _)| c.clone()).collect();
    let mut cells = Vec::with_capacity(values.len());
    for (column, value) in values {
        cells.push(clauses::assignment(ctx, column, value)?);
    }

    let mut sql = format!(
        "INSERT {}INTO {} ({}) SELECT {} FROM {}",
        if update.is_none() { "IGNORE " } else { "" },
        ctx.ident(into)?,
        ctx.ident_list(&columns)?,
        cells.join(", "),
        clauses::table_ref(ctx, using)?
    );
    if let Some(set) = update {
        sql.push_str(" ON DUPLICATE KEY UPDATE ");
        sql.push_str(&clauses::assignments(ctx, set)?);
    }
    sql.push_str(&clauses::returning(ctx, &query.returning)?);
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Assignment, ConflictClause, TableRef, WhereCondition};
    use crate::Dialect;

    fn ctx() -> RenderContext {
        RenderContext::new(Dialect::Mysql)
    }

    #[test]
    fn test_escape_value() {
        assert_eq!(escape_value(&Value::from("it's \\ ok")), "'it''s \\\\ ok'");
        assert_eq!(escape_value(&Value::Bytes(vec![1, 255])), "X'01ff'");
        assert_eq!(
            escape_value(&Value::from(vec!["a", "b"])),
            "JSON_ARRAY('a', 'b')"
        );
        assert_eq!(
            escape_value(&Value::Json(serde_json::json!([1]))),
            "CAST('[1]' AS JSON)"
        );
    }

    #[test]
    fn test_ilike_lowered() {
        assert_eq!(
            like("`name`", &Operator::ILIKE, "?"),
            "LOWER(`name`) LIKE LOWER(?)"
        );
        assert_eq!(like("`name`", &Operator::LIKE, "?"), "`name` LIKE ?");
    }

    #[test]
    fn test_json_operations() {
        let mut ctx = ctx();
        let op = JsonOperation {
            column: "data".into(),
            op: JsonOp::ExtractText("items.0.sku".into()),
            alias: None,
        };
        assert_eq!(
            json_operation(&mut ctx, &op).unwrap(),
            "JSON_UNQUOTE(JSON_EXTRACT(`data`, '$.items[0].sku'))"
        );

        let op = JsonOperation {
            column: "data".into(),
            op: JsonOp::HasKey("email".into()),
            alias: None,
        };
        assert_eq!(
            json_operation(&mut ctx, &op).unwrap(),
            "JSON_CONTAINS_PATH(`data`, 'one', '$.email')"
        );
    }

    #[test]
    fn test_array_operations() {
        let mut ctx = ctx();
        let element = ArrayOperation {
            column: "tags".into(),
            op: ArrayOp::Element(1),
            alias: None,
        };
        assert_eq!(
            array_operation(&mut ctx, &element).unwrap(),
            "JSON_EXTRACT(`tags`, '$[0]')"
        );
        let join = ArrayOperation {
            column: "tags".into(),
            op: ArrayOp::Join(",".into()),
            alias: None,
        };
        assert!(matches!(
            array_operation(&mut ctx, &join).unwrap_err(),
            Error::UnsupportedFeature { .. }
        ));
        assert_eq!(
            array_condition("`tags`", &Operator::ANY, "?").unwrap(),
            "? MEMBER OF(`tags`)"
        );
    }

    #[test]
    fn test_insert_ignore_and_duplicate_key() {
        let mut ctx = ctx();
        let mut query = InsertQuery {
            into: Some("users".into()),
            values: vec![vec![("email".into(), "a@b.c".into()), ("name".into(), "A".into())]],
            conflict: Some(ConflictClause::new(vec!["email".into()])),
            ..Default::default()
        };
        assert_eq!(
            build_insert(&mut ctx, &query).unwrap(),
            "INSERT IGNORE INTO `users` (`email`, `name`) VALUES (?, ?)"
        );

        if let Some(conflict) = query.conflict.as_mut() {
            conflict.action = ConflictAction::DoUpdate;
        }
        let mut ctx = RenderContext::new(Dialect::Mysql);
        assert_eq!(
            build_insert(&mut ctx, &query).unwrap(),
            "INSERT INTO `users` (`email`, `name`) VALUES (?, ?) \
             ON DUPLICATE KEY UPDATE `name` = VALUES(`name`)"
        );
    }

    #[test]
    fn test_conflict_where_unsupported() {
        let mut ctx = ctx();
        let mut conflict = ConflictClause::new(vec!["id".into()]);
        conflict.action = ConflictAction::DoUpdate;
        conflict.where_.push(WhereCondition::eq("active", true));
        let query = InsertQuery {
            into: Some("users".into()),
            values: vec![vec![("id".into(), 1.into())]],
            conflict: Some(conflict),
            ..Default::default()
        };
        assert!(build_insert(&mut ctx, &query).is_err());
    }

    #[test]
    fn test_merge_emulation() {
        let mut ctx = ctx();
        let query = MergeQuery {
            into: Some("users".into()),
            alias: None,
            using: Some(TableRef::table("staging")),
            on: vec![WhereCondition::columns("users.id", Operator::EQ, "staging.id")],
            when_matched: Some(MatchedAction::Update(vec![(
                "name".into(),
                Assignment::Column("staging.name".into()),
            )])),
            when_not_matched: Some(vec![
                ("id".into(), Assignment::Column("staging.id".into())),
                ("name".into(), Assignment::Column("staging.name".into())),
            ]),
            returning: vec![],
        };
        assert_eq!(
            build_merge(&mut ctx, &query).unwrap(),
            "INSERT INTO `users` (`id`, `name`) SELECT `staging`.`id`, `staging`.`name` \
             FROM `staging` ON DUPLICATE KEY UPDATE `name` = `staging`.`name`"
        );

        let delete = MergeQuery {
            when_matched: Some(MatchedAction::Delete),
            ..query
        };
        assert!(matches!(
            build_merge(&mut ctx, &delete).unwrap_err(),
            Error::UnsupportedFeature { .. }
        ));
    }
}
