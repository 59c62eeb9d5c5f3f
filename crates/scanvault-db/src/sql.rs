//! Parameterized statement builder.
//!
//! Builds the INSERT/UPDATE/SELECT/DELETE statements of the mutation API.
//! Placeholder indices are tracked by the builder, never by callers: the
//! SET clause of an UPDATE consumes `$1..$N` and the predicate that follows
//! is numbered `$N+1..$N+M`, with parameters ordered the same way.
//!
//! When the column types of the target table are known, placeholders bound
//! to a column are written as `$n::<type>` and the value travels as text, so
//! timestamps, nulls and JSON reach typed columns without a client-side
//! type mapping.

use std::collections::HashMap;

use serde_json::Value;

use scanvault_core::{Error, OrderBy, Predicate, Record, Result};

use crate::identifiers::quote_ident;

/// Column name → SQL type as rendered by `format_type`.
pub type ColumnTypes = HashMap<String, String>;

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
    /// Per parameter: the type the placeholder is cast to, if any.
    pub casts: Vec<Option<String>>,
}

impl SqlStatement {
    /// Append a parameter and return its placeholder text.
    fn push(&mut self, value: Value, cast: Option<&String>) -> String {
        self.params.push(value);
        self.casts.push(cast.cloned());
        match cast {
            Some(ty) => format!("${}::{}", self.params.len(), ty),
            None => format!("${}", self.params.len()),
        }
    }
}

/// Shift every `$n` placeholder in `sql` by `offset`.
///
/// Placeholders inside single-quoted literals (including `E'...'` escape
/// strings), double-quoted identifiers and dollar-quoted bodies are left
/// untouched, as is a `$` that continues an identifier.
pub fn shift_placeholders(sql: &str, offset: usize) -> String {
    if offset == 0 {
        return sql.to_string();
    }

    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let prev = i.checked_sub(1).map(|p| chars[p]);
        match c {
            '\'' | '"' => {
                // Copy the quoted section verbatim; doubled quotes are escapes
                // and simply reopen the section. E'...' literals also honor
                // backslash escapes.
                let backslash_escapes = c == '\'' && is_escape_prefix(&chars, i);
                out.push(c);
                i += 1;
                while i < chars.len() {
                    out.push(chars[i]);
                    if backslash_escapes && chars[i] == '\\' {
                        if let Some(next) = chars.get(i + 1) {
                            out.push(*next);
                        }
                        i += 2;
                        continue;
                    }
                    if chars[i] == c {
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            // `$` inside an identifier such as `col$1` is not a placeholder.
            '$' if prev.is_some_and(is_ident_char) => {
                out.push(c);
                i += 1;
            }
            '$' if chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_digit() {
                    end += 1;
                }
                let digits: String = chars[start..end].iter().collect();
                match digits.parse::<usize>() {
                    Ok(n) => out.push_str(&format!("${}", n + offset)),
                    Err(_) => {
                        out.push('$');
                        out.push_str(&digits);
                    }
                }
                i = end;
            }
            '$' => {
                // Dollar-quoted body: $$...$$ or $tag$...$tag$
                let tag_end = chars[i + 1..]
                    .iter()
                    .position(|ch| *ch == '$')
                    .map(|p| i + 1 + p);
                let valid_tag = tag_end.is_some_and(|end| {
                    chars[i + 1..end]
                        .iter()
                        .all(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
                });
                match (tag_end, valid_tag) {
                    (Some(end), true) => {
                        let tag: String = chars[i..=end].iter().collect();
                        let rest: String = chars[end + 1..].iter().collect();
                        match rest.find(&tag) {
                            Some(close) => {
                                let body_len = rest[..close].chars().count();
                                let section_end = end + 1 + body_len + tag.chars().count();
                                out.extend(chars[i..section_end].iter());
                                i = section_end;
                            }
                            None => {
                                out.extend(chars[i..].iter());
                                i = chars.len();
                            }
                        }
                    }
                    _ => {
                        out.push(c);
                        i += 1;
                    }
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Whether the quote at `quote` opens an `E'...'` escape string.
fn is_escape_prefix(chars: &[char], quote: usize) -> bool {
    match quote.checked_sub(1).map(|p| chars[p]) {
        Some('E') | Some('e') => quote < 2 || !is_ident_char(chars[quote - 2]),
        _ => false,
    }
}

/// Highest `$n` referenced outside quoted sections.
pub fn max_placeholder(sql: &str) -> usize {
    // Shifting by a large offset marks every real placeholder; compare
    // against the unshifted text to find them.
    let marker = 1_000_000;
    let shifted = shift_placeholders(sql, marker);
    let mut max = 0;
    let bytes = shifted.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            if end > start {
                if let Ok(n) = shifted[start..end].parse::<usize>() {
                    if n > marker {
                        max = max.max(n - marker);
                    }
                }
            }
            i = end.max(i + 1);
        } else {
            i += 1;
        }
    }
    max
}

/// Render a predicate, appending its parameters after those already in `stmt`.
pub fn render_predicate(
    predicate: &Predicate,
    stmt: &mut SqlStatement,
    types: &ColumnTypes,
) -> Result<String> {
    match predicate {
        Predicate::Conditions(conditions) => {
            if conditions.is_empty() {
                return Ok("TRUE".to_string());
            }
            let mut parts = Vec::with_capacity(conditions.len());
            for condition in conditions {
                let column = quote_ident("Column", &condition.column)?;
                if condition.op.takes_value() {
                    let placeholder =
                        stmt.push(condition.value.clone(), types.get(&condition.column));
                    parts.push(format!("{} {} {}", column, condition.op.as_sql(), placeholder));
                } else {
                    parts.push(format!("{} {}", column, condition.op.as_sql()));
                }
            }
            Ok(parts.join(" AND "))
        }
        Predicate::Raw { sql, params } => {
            let referenced = max_placeholder(sql);
            if referenced > params.len() {
                return Err(Error::InvalidInput(format!(
                    "predicate references ${} but only {} parameter(s) supplied",
                    referenced,
                    params.len()
                )));
            }
            let shifted = shift_placeholders(sql, stmt.params.len());
            for value in params {
                stmt.push(value.clone(), None);
            }
            Ok(format!("({})", shifted))
        }
    }
}

/// `INSERT INTO table (cols) VALUES ($1..$N) RETURNING *`.
pub fn build_insert(table: &str, data: &Record, types: &ColumnTypes) -> Result<SqlStatement> {
    let table = quote_ident("Table", table)?;
    let mut stmt = SqlStatement::default();
    if data.is_empty() {
        stmt.sql = format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table);
        return Ok(stmt);
    }

    let mut columns = Vec::with_capacity(data.len());
    let mut placeholders = Vec::with_capacity(data.len());
    for (column, value) in data.iter() {
        columns.push(quote_ident("Column", column)?);
        placeholders.push(stmt.push(value.clone(), types.get(column)));
    }

    stmt.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        table,
        columns.join(", "),
        placeholders.join(", ")
    );
    Ok(stmt)
}

/// `UPDATE table SET c1 = $1.. WHERE <predicate shifted past N> RETURNING *`.
///
/// The parameter list is the SET values in column order followed by the
/// predicate's parameters.
pub fn build_update(
    table: &str,
    data: &Record,
    predicate: &Predicate,
    types: &ColumnTypes,
) -> Result<SqlStatement> {
    let table = quote_ident("Table", table)?;
    if data.is_empty() {
        return Err(Error::InvalidInput(
            "update requires at least one column".to_string(),
        ));
    }

    let mut stmt = SqlStatement::default();
    let mut assignments = Vec::with_capacity(data.len());
    for (column, value) in data.iter() {
        let quoted = quote_ident("Column", column)?;
        let placeholder = stmt.push(value.clone(), types.get(column));
        assignments.push(format!("{} = {}", quoted, placeholder));
    }
    let filter = render_predicate(predicate, &mut stmt, types)?;

    stmt.sql = format!(
        "UPDATE {} SET {} WHERE {} RETURNING *",
        table,
        assignments.join(", "),
        filter
    );
    Ok(stmt)
}

/// `SELECT * FROM table [WHERE ..] [ORDER BY ..] [LIMIT $n]`.
pub fn build_select(
    table: &str,
    predicate: Option<&Predicate>,
    order_by: Option<&OrderBy>,
    limit: Option<i64>,
    types: &ColumnTypes,
) -> Result<SqlStatement> {
    let table = quote_ident("Table", table)?;
    let mut stmt = SqlStatement::default();
    let mut sql = format!("SELECT * FROM {}", table);

    if let Some(predicate) = predicate {
        let filter = render_predicate(predicate, &mut stmt, types)?;
        sql.push_str(" WHERE ");
        sql.push_str(&filter);
    }

    if let Some(order) = order_by {
        sql.push_str(&format!(
            " ORDER BY {} {}",
            quote_ident("Column", &order.column)?,
            order.direction.as_sql()
        ));
    }

    if let Some(limit) = limit {
        if limit < 0 {
            return Err(Error::InvalidInput(format!(
                "limit must not be negative, got {}",
                limit
            )));
        }
        let placeholder = stmt.push(Value::from(limit), None);
        sql.push_str(&format!(" LIMIT {}", placeholder));
    }

    stmt.sql = sql;
    Ok(stmt)
}

/// `DELETE FROM table [WHERE ..] RETURNING *`.
pub fn build_delete(
    table: &str,
    predicate: Option<&Predicate>,
    types: &ColumnTypes,
) -> Result<SqlStatement> {
    let table = quote_ident("Table", table)?;
    let mut stmt = SqlStatement::default();
    stmt.sql = match predicate {
        Some(predicate) => {
            let filter = render_predicate(predicate, &mut stmt, types)?;
            format!("DELETE FROM {} WHERE {} RETURNING *", table, filter)
        }
        None => format!("DELETE FROM {} RETURNING *", table),
    };
    Ok(stmt)
}
