//! SQL rendering: the parameter accumulator and the build output
//!
//! Renderers write SQL strictly left to right, so parameters land in
//! [`RenderContext`] in the same order their placeholders appear in the text.
//! Nested queries (subqueries, set operations, CTEs) render into the same
//! context, which is what keeps `$N` numbering aligned with `params`.

pub mod clauses;
pub mod statement;

use serde::Serialize;

use crate::sanitize::{sanitize_identifier, sanitize_value, split_alias};
use crate::{Dialect, Error, Result, Value};

/// Output of every build: SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl BuiltQuery {
    /// SQL with every placeholder replaced by its literal; for logging only
    pub fn to_string_inlined(&self, dialect: Dialect) -> String {
        inline_params(&self.sql, &self.params, dialect)
    }
}

/// Accumulates parameters while a statement renders
#[derive(Debug)]
pub struct RenderContext {
    dialect: Dialect,
    params: Vec<Value>,
}

impl RenderContext {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Sanitize and quote an identifier
    pub fn ident(&self, name: &str) -> Result<String> {
        let name = sanitize_identifier(name)?;
        Ok(self.dialect.escape_identifier(name))
    }

    /// Quote a list of identifiers, comma separated
    pub fn ident_list(&self, names: &[String]) -> Result<String> {
        let quoted = names
            .iter()
            .map(|name| self.ident(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(quoted.join(", "))
    }

    /// A select-list column: `*`, `t.*`, `col` or `col AS alias`
    pub fn column(&self, entry: &str) -> Result<String> {
        match split_alias(entry) {
            Some((column, alias)) => Ok(format!("{} AS {}", self.ident(column)?, self.ident(alias)?)),
            None => self.ident(entry),
        }
    }

    /// ` AS "alias"` or nothing
    pub fn alias(&self, alias: Option<&str>) -> Result<String> {
        match alias {
            Some(alias) => Ok(format!(" AS {}", self.ident(alias)?)),
            None => Ok(String::new()),
        }
    }

    /// Bind a value and return the placeholder for its position
    pub fn add_param(&mut self, value: Value) -> String {
        let value = sanitize_value(value);
        let cast = self.dialect.param_cast(&value);
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len());
        match cast {
            Some(cast) => format!("{placeholder}::{cast}"),
            None => placeholder,
        }
    }

    /// Substitute each `?` in raw SQL, left to right, with a new parameter
    pub fn raw(&mut self, sql: &str, params: &[Value]) -> Result<String> {
        let mut rendered = String::with_capacity(sql.len());
        let mut remaining = params.iter();
        for c in sql.chars() {
            if c == '?' {
                let value = remaining.next().ok_or_else(|| {
                    Error::invalid_query(format!("not enough parameters for raw SQL '{sql}'"))
                })?;
                rendered.push_str(&self.add_param(value.clone()));
            } else {
                rendered.push(c);
            }
        }
        if remaining.next().is_some() {
            return Err(Error::invalid_query(format!(
                "too many parameters for raw SQL '{sql}'"
            )));
        }
        Ok(rendered)
    }

    /// Dialect literal for values embedded outside the parameter array
    pub fn literal(&self, value: &Value) -> String {
        self.dialect.escape_value(value)
    }

    pub fn finish(self, sql: String) -> BuiltQuery {
        BuiltQuery {
            sql,
            params: self.params,
        }
    }
}

/// Replace placeholders outside quoted regions with literal values
fn inline_params(sql: &str, params: &[Value], dialect: Dialect) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;
    let mut next_positional = 0usize;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                out.push(c);
            }
            '$' if dialect == Dialect::Postgres => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                let index = digits.parse::<usize>().ok().and_then(|n| n.checked_sub(1));
                match index.and_then(|i| params.get(i)) {
                    Some(value) => out.push_str(&dialect.escape_value(value)),
                    None => {
                        out.push('$');
                        out.push_str(&digits);
                    }
                }
            }
            '?' if dialect != Dialect::Postgres => match params.get(next_positional) {
                Some(value) => {
                    out.push_str(&dialect.escape_value(value));
                    next_positional += 1;
                }
                None => out.push('?'),
            },
            _ => out.push(c),
        }
    }
    out
}
