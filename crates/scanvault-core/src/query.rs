//! Structured predicates and ordering for the mutation API.
//!
//! Callers describe filters as `(column, operator, value)` conditions joined
//! with AND. A raw SQL fragment with its own `$1..$M` placeholders is also
//! accepted; the statement builder renumbers it when it is appended after
//! other parameters.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Comparison operator of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    ILike,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Lt => "<",
            Operator::LtEq => "<=",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
            Operator::Like => "LIKE",
            Operator::ILike => "ILIKE",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }

    /// Whether the operator binds a parameter.
    pub fn takes_value(self) -> bool {
        !matches!(self, Operator::IsNull | Operator::IsNotNull)
    }
}

/// `column <op> value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub op: Operator,
    pub value: Value,
}

/// A row filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Conditions joined with AND. An empty list matches every row.
    Conditions(Vec<Condition>),
    /// SQL fragment whose placeholders start at `$1`, with its parameters.
    Raw { sql: String, params: Vec<Value> },
}

/// `<column> = $1`, optionally double-quoted, nothing else.
static SINGLE_EQUALITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*"?([A-Za-z_][A-Za-z0-9_]*)"?\s*=\s*\$1\s*$"#)
        .expect("single equality pattern is valid")
});

impl Predicate {
    /// `column = value`.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Conditions(vec![Condition {
            column: column.into(),
            op: Operator::Eq,
            value: value.into(),
        }])
    }

    /// Raw SQL fragment with positional parameters starting at `$1`.
    pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Predicate::Raw {
            sql: sql.into(),
            params,
        }
    }

    /// Append an AND condition.
    ///
    /// Appending to a raw predicate wraps it: `(raw) AND column op $n`.
    pub fn and(self, column: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        let condition = Condition {
            column: column.into(),
            op,
            value: value.into(),
        };
        match self {
            Predicate::Conditions(mut conditions) => {
                conditions.push(condition);
                Predicate::Conditions(conditions)
            }
            Predicate::Raw { sql, mut params } => {
                let placeholder = if op.takes_value() {
                    params.push(condition.value);
                    format!(" ${}", params.len())
                } else {
                    String::new()
                };
                Predicate::Raw {
                    sql: format!(
                        "({}) AND {} {}{}",
                        sql,
                        condition.column,
                        op.as_sql(),
                        placeholder
                    ),
                    params,
                }
            }
        }
    }

    /// Append an equality condition.
    pub fn and_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(column, Operator::Eq, value)
    }

    /// Parameters in placeholder order.
    pub fn params(&self) -> Vec<&Value> {
        match self {
            Predicate::Conditions(conditions) => conditions
                .iter()
                .filter(|c| c.op.takes_value())
                .map(|c| &c.value)
                .collect(),
            Predicate::Raw { params, .. } => params.iter().collect(),
        }
    }

    pub fn param_count(&self) -> usize {
        self.params().len()
    }

    /// An empty condition list, which matches every row.
    pub fn matches_all(&self) -> bool {
        matches!(self, Predicate::Conditions(conditions) if conditions.is_empty())
    }

    /// The only shape the emulated store can evaluate: a single equality
    /// test on one column with exactly one parameter.
    ///
    /// Returns `None` for anything richer.
    pub fn single_equality(&self) -> Option<(&str, &Value)> {
        match self {
            Predicate::Conditions(conditions) => match conditions.as_slice() {
                [only] if only.op == Operator::Eq => Some((only.column.as_str(), &only.value)),
                _ => None,
            },
            Predicate::Raw { sql, params } => {
                if params.len() != 1 {
                    return None;
                }
                let captures = SINGLE_EQUALITY.captures(sql)?;
                let column = captures.get(1)?.as_str();
                Some((column, &params[0]))
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Raw { sql, .. } => f.write_str(sql),
            Predicate::Conditions(conditions) if conditions.is_empty() => f.write_str("TRUE"),
            Predicate::Conditions(conditions) => {
                let mut index = 0;
                let parts: Vec<String> = conditions
                    .iter()
                    .map(|c| {
                        if c.op.takes_value() {
                            index += 1;
                            format!("{} {} ${}", c.column, c.op.as_sql(), index)
                        } else {
                            format!("{} {}", c.column, c.op.as_sql())
                        }
                    })
                    .collect();
                f.write_str(&parts.join(" AND "))
            }
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Ordering on a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Parse `"column"`, `"column ASC"` or `"column DESC"`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parts = input.split_whitespace();
        let column = parts
            .next()
            .ok_or_else(|| Error::InvalidInput("empty order by clause".to_string()))?;
        let direction = match parts.next().map(|d| d.to_ascii_uppercase()) {
            None => SortDirection::Asc,
            Some(d) if d == "ASC" => SortDirection::Asc,
            Some(d) if d == "DESC" => SortDirection::Desc,
            Some(d) => {
                return Err(Error::InvalidInput(format!(
                    "invalid sort direction: {}",
                    d
                )))
            }
        };
        if parts.next().is_some() {
            return Err(Error::InvalidInput(format!(
                "order by supports a single column: {}",
                input
            )));
        }
        Ok(Self {
            column: column.to_string(),
            direction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_equality_structured() {
        let predicate = Predicate::eq("id", 3);
        assert_eq!(predicate.single_equality(), Some(("id", &json!(3))));
    }

    #[test]
    fn test_single_equality_raw() {
        let predicate = Predicate::raw("name = $1", vec![json!("auth-service")]);
        assert_eq!(
            predicate.single_equality(),
            Some(("name", &json!("auth-service")))
        );

        let quoted = Predicate::raw(r#" "user_id"=$1 "#, vec![json!(9)]);
        assert_eq!(quoted.single_equality(), Some(("user_id", &json!(9))));
    }

    #[test]
    fn test_empty_conditions_match_all() {
        assert!(Predicate::Conditions(vec![]).matches_all());
        assert!(!Predicate::eq("id", 1).matches_all());
        assert!(!Predicate::raw("TRUE", vec![]).matches_all());
    }

    #[test]
    fn test_two_conditions_are_not_single_equality() {
        let structured = Predicate::eq("id", 1).and_eq("status", "done");
        assert!(structured.single_equality().is_none());

        let raw = Predicate::raw("id = $1 AND status = $2", vec![json!(1), json!("done")]);
        assert!(raw.single_equality().is_none());
    }

    #[test]
    fn test_non_equality_is_not_single_equality() {
        let predicate = Predicate::Conditions(vec![Condition {
            column: "complexity".to_string(),
            op: Operator::Gt,
            value: json!(10),
        }]);
        assert!(predicate.single_equality().is_none());
        assert!(Predicate::raw("id > $1", vec![json!(1)])
            .single_equality()
            .is_none());
    }

    #[test]
    fn test_and_on_raw_appends_placeholder() {
        let predicate = Predicate::raw("id = $1", vec![json!(1)]).and_eq("status", "done");
        match predicate {
            Predicate::Raw { sql, params } => {
                assert_eq!(sql, "(id = $1) AND status = $2");
                assert_eq!(params, vec![json!(1), json!("done")]);
            }
            _ => panic!("expected raw predicate"),
        }
    }

    #[test]
    fn test_params_skip_null_checks() {
        let predicate = Predicate::eq("project_id", 4)
            .and("finished_at", Operator::IsNull, Value::Null)
            .and_eq("status", "running");
        assert_eq!(predicate.param_count(), 2);
        assert_eq!(
            predicate.to_string(),
            "project_id = $1 AND finished_at IS NULL AND status = $2"
        );
    }

    #[test]
    fn test_order_by_parse() {
        assert_eq!(
            OrderBy::parse("created_at DESC").unwrap(),
            OrderBy::desc("created_at")
        );
        assert_eq!(OrderBy::parse("name").unwrap(), OrderBy::asc("name"));
        assert!(OrderBy::parse("name sideways").is_err());
        assert!(OrderBy::parse("").is_err());
        assert!(OrderBy::parse("a DESC b").is_err());
    }
}
