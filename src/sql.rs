//! SQL Text Helpers
//!
//! Small pure helpers for building SQL text: literal quoting, literal arrays
//! for `IN (...)` clauses, and a coarse statement classifier.

use std::fmt::Display;

/// Renders `value` as a single-quoted SQL string literal, doubling any
/// embedded single quotes.
///
/// # Examples
///
/// ```
/// use sqlhelper::sql::quote_literal;
/// assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
/// ```
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push('\'');
        }
        quoted.push(ch);
    }
    quoted.push('\'');
    quoted
}

/// Formats `items` as a parenthesized SQL literal array, one item per line.
///
/// Items are quoted with [`quote_literal`] unless `numeric` is set, in which
/// case their `Display` text is used as-is. Returns `None` for an empty list.
///
/// # Examples
///
/// ```
/// use sqlhelper::sql::list_to_sql_array;
/// assert_eq!(list_to_sql_array(&[1, 2, 3], true).as_deref(), Some("(1,\n2,\n3)"));
/// assert_eq!(list_to_sql_array(&["a", "b"], false).as_deref(), Some("('a',\n'b')"));
/// assert_eq!(list_to_sql_array::<i32>(&[], true), None);
/// ```
pub fn list_to_sql_array<T: Display>(items: &[T], numeric: bool) -> Option<String> {
    if items.is_empty() {
        return None;
    }

    let rendered: Vec<String> = items
        .iter()
        .map(|item| {
            if numeric {
                item.to_string()
            } else {
                quote_literal(&item.to_string())
            }
        })
        .collect();

    Some(format!("({})", rendered.join(",\n")))
}

/// Whether a statement produces rows, judged by its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatementType {
    /// SELECT, WITH, PRAGMA, EXPLAIN, VALUES, SHOW, DESCRIBE
    Query,
    /// Everything else: INSERT, UPDATE, DELETE, DDL, transaction control
    Statement,
}

impl StatementType {
    pub fn from_sql(sql: &str) -> Self {
        let keyword = sql
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
            .next()
            .unwrap_or("")
            .to_uppercase();

        match keyword.as_str() {
            "SELECT" | "WITH" | "PRAGMA" | "EXPLAIN" | "VALUES" | "SHOW" | "DESCRIBE" => {
                StatementType::Query
            }
            _ => StatementType::Statement,
        }
    }
}
