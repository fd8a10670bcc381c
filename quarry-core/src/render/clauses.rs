//! Clause renderers shared by every dialect
//!
//! Each function renders one IR fragment into `ctx`, appending parameters as
//! it goes. Dialect differences are delegated back to [`crate::Dialect`].

use crate::ir::{
    AggregationExpression, Assignment, ConditionalExpression, CteClause, JoinClause, JoinType,
    Operand, OrderClause, PivotClause, SelectQuery, Subquery, TableRef, UnionClause,
    WhereCondition, WindowFrame, WindowFunction,
};
use crate::sanitize::{escape_like_value, sanitize_json_path};
use crate::{Error, Operator, Result, Value};

use super::statement;
use super::RenderContext;

/// Render a condition list; the first condition gets no logical keyword and
/// every later one is preceded by its own
pub fn conditions(ctx: &mut RenderContext, conditions: &[WhereCondition]) -> Result<String> {
    let mut sql = String::new();
    for (i, cond) in conditions.iter().enumerate() {
        if i > 0 {
            sql.push(' ');
            sql.push_str(cond.logical.as_sql());
            sql.push(' ');
        }
        sql.push_str(&condition(ctx, cond)?);
    }
    Ok(sql)
}

pub fn condition(ctx: &mut RenderContext, cond: &WhereCondition) -> Result<String> {
    let op = &cond.operator;

    if op.is_raw() {
        return ctx.raw(&cond.column, cond.raw_params());
    }

    if op.is_exists() {
        return match &cond.value {
            Operand::Subquery(sub) => Ok(format!("{op} ({})", subquery(ctx, sub)?)),
            _ => Err(Error::invalid_condition(format!("{op} requires a subquery"))),
        };
    }

    let lhs = match &cond.json_path {
        Some(path) => {
            let segments = sanitize_json_path(path)?;
            let column = ctx.ident(&cond.column)?;
            ctx.dialect().json_text_path(&column, &segments)
        }
        None => ctx.ident(&cond.column)?,
    };

    if op.is_null_check() {
        return Ok(format!("{lhs} {op}"));
    }

    if op.is_between() {
        let (low, high) = match cond.value.as_value() {
            Some(Value::Array(pair)) if pair.len() == 2 => (pair[0].clone(), pair[1].clone()),
            _ => {
                return Err(Error::invalid_condition(format!(
                    "{op} requires exactly two values"
                )))
            }
        };
        let low = ctx.add_param(low);
        let high = ctx.add_param(high);
        return Ok(format!("{lhs} {op} {low} AND {high}"));
    }

    if op.is_in() {
        return match &cond.value {
            Operand::Value(Value::Array(items)) if items.is_empty() => {
                // An empty list matches nothing (IN) or everything (NOT IN)
                Ok(if *op == Operator::IN {
                    "1 = 0".to_string()
                } else {
                    "1 = 1".to_string()
                })
            }
            Operand::Value(Value::Array(items)) => {
                let placeholders: Vec<String> =
                    items.iter().map(|v| ctx.add_param(v.clone())).collect();
                Ok(format!("{lhs} {op} ({})", placeholders.join(", ")))
            }
            Operand::Subquery(sub) => Ok(format!("{lhs} {op} ({})", subquery(ctx, sub)?)),
            _ => Err(Error::invalid_condition(format!(
                "{op} requires a list of values"
            ))),
        };
    }

    if op.is_like() {
        let rhs = match &cond.value {
            Operand::Value(value) => ctx.add_param(escape_like_value(value.clone())),
            other => operand(ctx, other)?,
        };
        return Ok(ctx.dialect().like(&lhs, op, &rhs));
    }

    if op.is_array() {
        let rhs = operand(ctx, &cond.value)?;
        return ctx.dialect().array_condition(&lhs, op, &rhs);
    }

    let rhs = operand(ctx, &cond.value)?;
    Ok(format!("{lhs} {op} {rhs}"))
}

/// Right-hand side of a comparison
pub fn operand(ctx: &mut RenderContext, operand: &Operand) -> Result<String> {
    match operand {
        Operand::None => Err(Error::invalid_condition("missing comparison value")),
        Operand::Value(value) => Ok(ctx.add_param(value.clone())),
        Operand::Column(column) => ctx.ident(column),
        Operand::Pattern(pattern) => Ok(ctx.add_param(Value::String(pattern.clone()))),
        Operand::Subquery(sub) => Ok(format!("({})", subquery(ctx, sub)?)),
    }
}

/// Subquery body, without surrounding parentheses
pub fn subquery(ctx: &mut RenderContext, sub: &Subquery) -> Result<String> {
    match sub {
        Subquery::Raw(raw) => ctx.raw(&raw.sql, &raw.params),
        Subquery::Select(query) => statement::select(ctx, query),
    }
}

pub fn table_ref(ctx: &mut RenderContext, table: &TableRef) -> Result<String> {
    match table {
        TableRef::Table { name, alias } => {
            Ok(format!("{}{}", ctx.ident(name)?, ctx.alias(alias.as_deref())?))
        }
        TableRef::Subquery { query, alias } => {
            let body = subquery(ctx, query)?;
            Ok(format!("({body}){}", ctx.alias(alias.as_deref())?))
        }
        TableRef::Function {
            call,
            alias,
            ordinality,
        } => {
            let mut sql = ctx.raw(&call.sql, &call.params)?;
            if *ordinality {
                if !ctx.dialect().supports_ordinality() {
                    return Err(Error::unsupported(ctx.dialect().name(), "WITH ORDINALITY"));
                }
                sql.push_str(" WITH ORDINALITY");
            }
            sql.push_str(&ctx.alias(alias.as_deref())?);
            Ok(sql)
        }
    }
}

pub fn join(ctx: &mut RenderContext, join: &JoinClause) -> Result<String> {
    let dialect = ctx.dialect();
    let keyword = match join.join_type {
        JoinType::Inner => "INNER",
        JoinType::Left => "LEFT",
        JoinType::Right => "RIGHT",
        JoinType::Full => {
            if !dialect.supports_full_join() {
                return Err(Error::unsupported(dialect.name(), "FULL JOIN"));
            }
            "FULL"
        }
        JoinType::Cross => "CROSS",
        JoinType::Lateral if join.on.is_empty() => "CROSS",
        JoinType::Lateral => "INNER",
    };
    let mut sql = format!("{keyword} JOIN ");
    if join.lateral {
        if !dialect.supports_lateral() {
            return Err(Error::unsupported(dialect.name(), "LATERAL joins"));
        }
        sql.push_str("LATERAL ");
    }
    sql.push_str(&table_ref(ctx, &join.table)?);
    if join.join_type != JoinType::Cross && !join.on.is_empty() {
        sql.push_str(" ON ");
        sql.push_str(&conditions(ctx, &join.on)?);
    }
    Ok(sql)
}

pub fn order_by(ctx: &mut RenderContext, orders: &[OrderClause]) -> Result<String> {
    let mut entries = Vec::with_capacity(orders.len());
    for order in orders {
        let expr = if order.is_expression {
            ctx.raw(&order.column, &order.params)?
        } else {
            ctx.ident(&order.column)?
        };
        entries.push(ctx.dialect().order_entry(&expr, order.direction, order.nulls));
    }
    Ok(entries.join(", "))
}

/// ` LIMIT .. OFFSET ..`, preferring raw overrides; empty when neither is set
pub fn limit_offset(ctx: &mut RenderContext, query: &SelectQuery) -> Result<String> {
    if query.limit_raw.is_none() && query.offset_raw.is_none() {
        let syntax = ctx.dialect().limit_syntax(query.limit, query.offset);
        return Ok(if syntax.is_empty() {
            syntax
        } else {
            format!(" {syntax}")
        });
    }

    let limit = match (&query.limit_raw, query.limit) {
        (Some(raw), _) => Some(ctx.raw(&raw.sql, &raw.params)?),
        (None, Some(n)) => Some(n.to_string()),
        (None, None) => None,
    };
    let offset = match (&query.offset_raw, query.offset) {
        (Some(raw), _) => Some(ctx.raw(&raw.sql, &raw.params)?),
        (None, Some(n)) => Some(n.to_string()),
        (None, None) => None,
    };

    let mut sql = String::new();
    match limit {
        Some(limit) => sql.push_str(&format!(" LIMIT {limit}")),
        None if offset.is_some() => {
            if let Some(max) = ctx.dialect().max_limit() {
                sql.push_str(&format!(" LIMIT {max}"));
            }
        }
        None => {}
    }
    if let Some(offset) = offset {
        sql.push_str(&format!(" OFFSET {offset}"));
    }
    Ok(sql)
}

pub fn window(ctx: &mut RenderContext, window: &WindowFunction) -> Result<String> {
    let args: Vec<String> = window
        .args
        .iter()
        .map(|arg| if arg == "*" { Ok("*".to_string()) } else { ctx.ident(arg) })
        .collect::<Result<_>>()?;

    let mut over = Vec::new();
    if !window.partition_by.is_empty() {
        over.push(format!("PARTITION BY {}", ctx.ident_list(&window.partition_by)?));
    }
    if !window.order_by.is_empty() {
        over.push(format!("ORDER BY {}", order_by(ctx, &window.order_by)?));
    }
    if let Some(frame) = &window.frame {
        over.push(window_frame(ctx, frame)?);
    }

    Ok(format!(
        "{}({}) OVER ({}){}",
        window.function.to_uppercase(),
        args.join(", "),
        over.join(" "),
        ctx.alias(window.alias.as_deref())?
    ))
}

fn window_frame(ctx: &RenderContext, frame: &WindowFrame) -> Result<String> {
    ctx.dialect().check_frame(frame)?;
    let mut sql = match frame.end {
        Some(end) => format!(
            "{} BETWEEN {} AND {}",
            frame.units.as_sql(),
            frame.start.to_sql(),
            end.to_sql()
        ),
        None => format!("{} {}", frame.units.as_sql(), frame.start.to_sql()),
    };
    if let Some(exclude) = frame.exclude {
        sql.push_str(" EXCLUDE ");
        sql.push_str(exclude.as_sql());
    }
    Ok(sql)
}

pub fn conditional(ctx: &mut RenderContext, expr: &ConditionalExpression) -> Result<String> {
    let body = match expr {
        ConditionalExpression::Case {
            whens, otherwise, ..
        } => {
            let mut sql = String::from("CASE");
            for when in whens {
                let cond = conditions(ctx, &when.conditions)?;
                let result = operand(ctx, &when.result)?;
                sql.push_str(&format!(" WHEN {cond} THEN {result}"));
            }
            if let Some(otherwise) = otherwise {
                sql.push_str(&format!(" ELSE {}", operand(ctx, otherwise)?));
            }
            sql.push_str(" END");
            sql
        }
        ConditionalExpression::Coalesce { columns, .. } => {
            format!("COALESCE({})", ctx.ident_list(columns)?)
        }
        ConditionalExpression::NullIf { left, right, .. } => {
            format!("NULLIF({}, {})", ctx.ident(left)?, ctx.ident(right)?)
        }
    };
    Ok(format!("{body}{}", ctx.alias(expr.alias())?))
}

pub fn aggregation(ctx: &mut RenderContext, agg: &AggregationExpression) -> Result<String> {
    let column = if agg.column == "*" {
        "*".to_string()
    } else {
        ctx.ident(&agg.column)?
    };
    let call = ctx.dialect().aggregate(ctx, &agg.function, &column, agg.distinct)?;
    Ok(format!("{call}{}", ctx.alias(agg.alias.as_deref())?))
}

/// `AGG(CASE WHEN pivot = p THEN value END) AS "<p>"` per pivot value
pub fn pivot(ctx: &mut RenderContext, pivot: &PivotClause) -> Result<Vec<String>> {
    let pivot_column = ctx.ident(&pivot.pivot_column)?;
    let value_column = ctx.ident(&pivot.value_column)?;
    let dialect = ctx.dialect();
    let mut items = Vec::with_capacity(pivot.values.len());
    for value in &pivot.values {
        let placeholder = ctx.add_param(value.clone());
        let case = format!("CASE WHEN {pivot_column} = {placeholder} THEN {value_column} END");
        let call = dialect.aggregate(ctx, &pivot.aggregate, &case, false)?;
        let label = dialect.quote(&crate::ir::expression::pivot_label(value));
        items.push(format!("{call} AS {label}"));
    }
    Ok(items)
}

/// ` UNION ...` for each set operation, nested queries rendered in place
pub fn set_operations(ctx: &mut RenderContext, unions: &[UnionClause]) -> Result<String> {
    let mut sql = String::new();
    for union in unions {
        let member = statement::select(ctx, &union.query)?;
        let member = ctx
            .dialect()
            .wrap_set_member(member, union.query.has_ordering_or_limit());
        sql.push(' ');
        sql.push_str(union.operation.as_sql());
        sql.push(' ');
        sql.push_str(&member);
    }
    Ok(sql)
}

/// `WITH [RECURSIVE] a AS (...), b AS (...)`; RECURSIVE appears once if any CTE needs it
pub fn ctes(ctx: &mut RenderContext, ctes: &[CteClause]) -> Result<String> {
    let recursive = ctes.iter().any(|cte| cte.recursive);
    let mut parts = Vec::with_capacity(ctes.len());
    for cte in ctes {
        let mut head = ctx.ident(&cte.name)?;
        if !cte.columns.is_empty() {
            head.push_str(&format!("({})", ctx.ident_list(&cte.columns)?));
        }
        let body = subquery(ctx, &cte.query)?;
        parts.push(format!("{head} AS ({body})"));
    }
    Ok(format!(
        "WITH {}{}",
        if recursive { "RECURSIVE " } else { "" },
        parts.join(", ")
    ))
}

/// One assignment's right-hand side
pub fn assignment(ctx: &mut RenderContext, column: &str, value: &Assignment) -> Result<String> {
    match value {
        Assignment::Value(value) => Ok(ctx.add_param(value.clone())),
        Assignment::Column(source) => ctx.ident(source),
        Assignment::Raw(raw) => ctx.raw(&raw.sql, &raw.params),
        Assignment::Excluded => ctx.dialect().excluded(ctx, column),
        Assignment::Delta { subtract, by } => {
            let target = ctx.ident(column)?;
            let sign = if *subtract { '-' } else { '+' };
            Ok(format!("{target} {sign} {}", ctx.add_param(by.clone())))
        }
    }
}

/// `"a" = $1, "b" = "c"`
pub fn assignments(ctx: &mut RenderContext, set: &[(String, Assignment)]) -> Result<String> {
    let mut parts = Vec::with_capacity(set.len());
    for (column, value) in set {
        let target = ctx.ident(column)?;
        parts.push(format!("{target} = {}", assignment(ctx, column, value)?));
    }
    Ok(parts.join(", "))
}

/// ` RETURNING ...` or nothing
pub fn returning(ctx: &RenderContext, columns: &[String]) -> Result<String> {
    if columns.is_empty() {
        return Ok(String::new());
    }
    if !ctx.dialect().supports_returning() {
        return Err(Error::unsupported(ctx.dialect().name(), "RETURNING"));
    }
    let columns = columns
        .iter()
        .map(|c| ctx.column(c))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(" RETURNING {}", columns.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FrameBound, FrameExclude, Logical, SortDirection};
    use crate::Dialect;

    fn render(dialect: Dialect, conds: &[WhereCondition]) -> (String, Vec<Value>) {
        let mut ctx = RenderContext::new(dialect);
        let sql = conditions(&mut ctx, conds).unwrap();
        let built = ctx.finish(sql);
        (built.sql, built.params)
    }

    #[test]
    fn test_logical_prefix_convention() {
        let conds = vec![
            WhereCondition::eq("a", 1),
            WhereCondition::eq("b", 2).with_logical(Logical::Or),
            WhereCondition::eq("c", 3).with_logical(Logical::And),
        ];
        let (sql, params) = render(Dialect::Postgres, &conds);
        assert_eq!(sql, "\"a\" = $1 OR \"b\" = $2 AND \"c\" = $3");
        assert_eq!(params, vec![Value::I32(1), Value::I32(2), Value::I32(3)]);
    }

    #[test]
    fn test_between_consumes_two_params() {
        let cond = WhereCondition::new("age", Operator::BETWEEN, Value::from([18, 65]));
        let (sql, params) = render(Dialect::Postgres, &[cond]);
        assert_eq!(sql, "\"age\" BETWEEN $1 AND $2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_in_list_and_empty_in() {
        let cond = WhereCondition::new("id", Operator::IN, Value::from(vec![1, 2, 3]));
        let (sql, params) = render(Dialect::Mysql, &[cond]);
        assert_eq!(sql, "`id` IN (?, ?, ?)");
        assert_eq!(params.len(), 3);

        let empty = WhereCondition::new("id", Operator::IN, Value::Array(vec![]));
        assert_eq!(render(Dialect::Postgres, &[empty]).0, "1 = 0");
        let empty = WhereCondition::new("id", Operator::NOT_IN, Value::Array(vec![]));
        assert_eq!(render(Dialect::Postgres, &[empty]).0, "1 = 1");
    }

    #[test]
    fn test_raw_condition_per_dialect() {
        let cond = WhereCondition::raw("age > ?", vec![18.into()]);
        let (pg, params) = render(Dialect::Postgres, &[cond.clone()]);
        assert_eq!(pg, "age > $1");
        assert_eq!(params, vec![Value::I32(18)]);
        assert_eq!(render(Dialect::Mysql, &[cond.clone()]).0, "age > ?");
        assert_eq!(render(Dialect::Sqlite, &[cond]).0, "age > ?");
    }

    #[test]
    fn test_like_escapes_value_but_not_pattern() {
        let cond = WhereCondition::new("name", Operator::LIKE, "50%");
        let (sql, params) = render(Dialect::Postgres, &[cond]);
        assert_eq!(sql, "\"name\" LIKE $1");
        assert_eq!(params, vec![Value::from("50\\%")]);

        let cond = WhereCondition::new("name", Operator::LIKE, Operand::Pattern("jo%".into()));
        let (_, params) = render(Dialect::Postgres, &[cond]);
        assert_eq!(params, vec![Value::from("jo%")]);
    }

    #[test]
    fn test_column_operand_is_not_parameterized() {
        let cond = WhereCondition::columns("created_at", Operator::LT, "updated_at");
        let (sql, params) = render(Dialect::Sqlite, &[cond]);
        assert_eq!(sql, "\"created_at\" < \"updated_at\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_null_checks() {
        let conds = vec![
            WhereCondition::null_check("deleted_at", false),
            WhereCondition::null_check("email", true),
        ];
        let (sql, params) = render(Dialect::Postgres, &conds);
        assert_eq!(sql, "\"deleted_at\" IS NULL AND \"email\" IS NOT NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_exists_subquery() {
        let cond = WhereCondition::exists(
            Subquery::raw("SELECT 1 FROM orders WHERE total > ?", vec![100.into()]),
            false,
        );
        let (sql, params) = render(Dialect::Postgres, &[cond]);
        assert_eq!(sql, "EXISTS (SELECT 1 FROM orders WHERE total > $1)");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_join_rendering() {
        let mut ctx = RenderContext::new(Dialect::Mysql);
        let inner = JoinClause::new(JoinType::Inner, "orders").on(WhereCondition::columns(
            "users.id",
            Operator::EQ,
            "orders.user_id",
        ));
        assert_eq!(
            join(&mut ctx, &inner).unwrap(),
            "INNER JOIN `orders` ON `users`.`id` = `orders`.`user_id`"
        );
        let cross = JoinClause::new(JoinType::Cross, "sizes");
        assert_eq!(join(&mut ctx, &cross).unwrap(), "CROSS JOIN `sizes`");
        let full = JoinClause::new(JoinType::Full, "x").on(WhereCondition::eq("a", 1));
        assert!(matches!(
            join(&mut ctx, &full).unwrap_err(),
            Error::UnsupportedFeature { .. }
        ));
    }

    #[test]
    fn test_window_function() {
        let mut ctx = RenderContext::new(Dialect::Postgres);
        let w = WindowFunction::new("row_number")
            .partition_by("department")
            .order_by(OrderClause::new("salary", SortDirection::Desc))
            .alias("rank");
        assert_eq!(
            window(&mut ctx, &w).unwrap(),
            "ROW_NUMBER() OVER (PARTITION BY \"department\" ORDER BY \"salary\" DESC) AS \"rank\""
        );

        let running = WindowFunction::new("sum")
            .arg("amount")
            .order_by(OrderClause::new("day", SortDirection::Asc))
            .frame(WindowFrame::rows(
                FrameBound::UnboundedPreceding,
                Some(FrameBound::CurrentRow),
            ));
        assert_eq!(
            window(&mut ctx, &running).unwrap(),
            "SUM(\"amount\") OVER (ORDER BY \"day\" ASC ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW)"
        );
    }

    #[test]
    fn test_frame_exclude_unsupported_on_mysql() {
        let mut frame = WindowFrame::rows(FrameBound::Preceding(1), None);
        frame.exclude = Some(FrameExclude::Ties);
        let w = WindowFunction::new("avg").arg("x").frame(frame);

        let mut ctx = RenderContext::new(Dialect::Sqlite);
        assert_eq!(
            window(&mut ctx, &w).unwrap(),
            "AVG(\"x\") OVER (ROWS 1 PRECEDING EXCLUDE TIES)"
        );
        let mut ctx = RenderContext::new(Dialect::Mysql);
        assert!(window(&mut ctx, &w).is_err());
    }

    #[test]
    fn test_case_expression() {
        let mut ctx = RenderContext::new(Dialect::Postgres);
        let expr = ConditionalExpression::Case {
            whens: vec![crate::ir::CaseWhen {
                conditions: vec![WhereCondition::new("age", Operator::LT, 18)],
                result: "minor".into(),
            }],
            otherwise: Some("adult".into()),
            alias: Some("bracket".into()),
        };
        let sql = conditional(&mut ctx, &expr).unwrap();
        assert_eq!(
            sql,
            "CASE WHEN \"age\" < $1 THEN $2 ELSE $3 END AS \"bracket\""
        );
        assert_eq!(ctx.param_count(), 3);

        let coalesce = ConditionalExpression::Coalesce {
            columns: vec!["nickname".into(), "name".into()],
            alias: None,
        };
        assert_eq!(
            conditional(&mut ctx, &coalesce).unwrap(),
            "COALESCE(\"nickname\", \"name\")"
        );
    }

    #[test]
    fn test_cte_recursive_emitted_once() {
        let mut ctx = RenderContext::new(Dialect::Postgres);
        let ctes_list = vec![
            CteClause {
                name: "a".into(),
                columns: vec![],
                query: Subquery::raw("SELECT 1", vec![]),
                recursive: false,
            },
            CteClause {
                name: "b".into(),
                columns: vec!["n".into()],
                query: Subquery::raw("SELECT n + 1 FROM b WHERE n < ?", vec![10.into()]),
                recursive: true,
            },
        ];
        assert_eq!(
            ctes(&mut ctx, &ctes_list).unwrap(),
            "WITH RECURSIVE \"a\" AS (SELECT 1), \"b\"(\"n\") AS (SELECT n + 1 FROM b WHERE n < $1)"
        );
    }

    #[test]
    fn test_returning_unsupported_on_mysql() {
        let ctx = RenderContext::new(Dialect::Mysql);
        assert!(returning(&ctx, &["id".to_string()]).is_err());
        assert_eq!(returning(&ctx, &[]).unwrap(), "");

        let ctx = RenderContext::new(Dialect::Sqlite);
        assert_eq!(
            returning(&ctx, &["id".to_string(), "*".to_string()]).unwrap(),
            " RETURNING \"id\", *"
        );
    }
}
