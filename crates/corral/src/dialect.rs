//! Backend SQL flavors.
//!
//! Escaping, literal quoting, and pagination clause generation differ per
//! backend; concrete [`Connection`](crate::connection::Connection)
//! implementations delegate those pieces to a [`Dialect`] so the rules live
//! in one place. Two reference flavors are provided: a `LIMIT`/`OFFSET`
//! backend and a `TOP n` backend without offset support.

use crate::error::{OrmError, OrmResult};
use crate::value::Value;

/// Backend-specific SQL text rules.
pub trait Dialect {
    /// Render a value as a safe SQL literal. NULL always renders as the
    /// literal `null`.
    fn quote(&self, value: &Value, requires_quoting: bool) -> String;

    /// Pagination fragment injected directly after `SELECT`.
    fn pagination_after_select(&self, max_records: u64, offset: u64) -> OrmResult<String>;

    /// Pagination fragment appended after the full statement.
    fn pagination_after_statement(&self, max_records: u64, offset: u64) -> OrmResult<String>;
}

/// `LIMIT n OFFSET m` flavor with backslash escaping.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    fn escape(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '\'' => out.push_str("\\'"),
                '"' => out.push_str("\\\""),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\0' => out.push_str("\\0"),
                '\u{1a}' => out.push_str("\\Z"),
                other => out.push(other),
            }
        }
        out
    }
}

impl Dialect for MySqlDialect {
    fn quote(&self, value: &Value, requires_quoting: bool) -> String {
        if value.is_null() {
            return "null".to_string();
        }
        let safe = Self::escape(&value.to_string());
        if requires_quoting {
            format!("'{safe}'")
        } else if safe.trim().is_empty() || safe.eq_ignore_ascii_case("null") {
            // an unquoted empty literal would not survive the parser
            "null".to_string()
        } else {
            safe
        }
    }

    fn pagination_after_select(&self, _max_records: u64, _offset: u64) -> OrmResult<String> {
        Ok(String::new())
    }

    fn pagination_after_statement(&self, max_records: u64, offset: u64) -> OrmResult<String> {
        if offset > 0 && max_records == 0 {
            return Err(OrmError::validation(
                "specifying an offset requires a max records value",
            ));
        }
        let mut sql = String::new();
        if max_records > 0 {
            sql.push_str(&format!("LIMIT {max_records}"));
            if offset > 0 {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }
        Ok(sql)
    }
}

/// `TOP n` flavor with quote-doubling escape. Offsets are not supported and
/// fail fast.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl Dialect for SqlServerDialect {
    fn quote(&self, value: &Value, requires_quoting: bool) -> String {
        if value.is_null() {
            return "null".to_string();
        }
        let safe = value.to_string().replace('\'', "''");
        if requires_quoting {
            format!("'{safe}'")
        } else if safe.trim().is_empty() || safe.eq_ignore_ascii_case("null") {
            "null".to_string()
        } else {
            safe
        }
    }

    fn pagination_after_select(&self, max_records: u64, offset: u64) -> OrmResult<String> {
        if offset > 0 {
            return Err(OrmError::validation(
                "this backend does not support pagination offsets",
            ));
        }
        Ok(if max_records > 0 {
            format!("TOP {max_records}")
        } else {
            String::new()
        })
    }

    fn pagination_after_statement(&self, _max_records: u64, offset: u64) -> OrmResult<String> {
        if offset > 0 {
            return Err(OrmError::validation(
                "this backend does not support pagination offsets",
            ));
        }
        Ok(String::new())
    }
}
