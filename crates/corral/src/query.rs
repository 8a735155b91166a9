//! Declarative selectors and SQL generation.
//!
//! A [`Selector`] describes which rows to fetch; a [`QueryBuilder`] is a
//! pure translation of (entity type, field list, selector, ordering) into a
//! backend-specific SQL string. Quoting and escaping are delegated to the
//! [`Connection`], never duplicated here, and identical inputs always
//! produce byte-identical SQL.

use crate::connection::Connection;
use crate::descriptor::EntityType;
use crate::error::{OrmError, OrmResult};
use crate::ident::check_ident;
use crate::value::Value;
use std::rc::Rc;

/// Comparison operator for [`Term::Cmp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

impl Compare {
    fn sql(&self) -> &'static str {
        match self {
            Compare::Eq => "=",
            Compare::Ne => "!=",
            Compare::Lt => "<",
            Compare::Lte => "<=",
            Compare::Gt => ">",
            Compare::Gte => ">=",
            Compare::Like => "LIKE",
        }
    }
}

/// One column predicate inside a field selector.
#[derive(Debug, Clone)]
pub enum Term {
    /// Equality; `Eq(Value::Null)` renders `IS NULL`.
    Eq(Value),
    /// Membership; an empty list renders the always-false `1=0`.
    In(Vec<Value>),
    /// Relational comparison, optionally negated.
    Cmp {
        op: Compare,
        value: Value,
        not: bool,
    },
    /// Range check, optionally negated. Bounds must be non-null scalars.
    Between {
        low: Value,
        high: Value,
        not: bool,
    },
    /// Correlated subquery: `column IN (<subquery>)`.
    Subquery(QueryBuilder),
}

impl Term {
    pub fn eq(value: impl Into<Value>) -> Self {
        Term::Eq(value.into())
    }

    /// `IS NULL`.
    pub fn null() -> Self {
        Term::Eq(Value::Null)
    }

    pub fn in_list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Term::In(values.into_iter().map(Into::into).collect())
    }

    pub fn cmp(op: Compare, value: impl Into<Value>, not: bool) -> Self {
        Term::Cmp {
            op,
            value: value.into(),
            not,
        }
    }

    pub fn ne(value: impl Into<Value>) -> Self {
        Self::cmp(Compare::Ne, value, false)
    }

    pub fn lt(value: impl Into<Value>) -> Self {
        Self::cmp(Compare::Lt, value, false)
    }

    pub fn lte(value: impl Into<Value>) -> Self {
        Self::cmp(Compare::Lte, value, false)
    }

    pub fn gt(value: impl Into<Value>) -> Self {
        Self::cmp(Compare::Gt, value, false)
    }

    pub fn gte(value: impl Into<Value>) -> Self {
        Self::cmp(Compare::Gte, value, false)
    }

    pub fn like(value: impl Into<Value>) -> Self {
        Self::cmp(Compare::Like, value, false)
    }

    pub fn not_like(value: impl Into<Value>) -> Self {
        Self::cmp(Compare::Like, value, true)
    }

    pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Term::Between {
            low: low.into(),
            high: high.into(),
            not: false,
        }
    }

    pub fn not_between(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Term::Between {
            low: low.into(),
            high: high.into(),
            not: true,
        }
    }

    pub fn subquery(query: QueryBuilder) -> Self {
        Term::Subquery(query)
    }
}

/// Declarative row filter.
#[derive(Debug, Clone)]
pub enum Selector {
    /// No filter; all rows.
    All,
    /// Shorthand for primary-key equality. Invalid on composite-key types.
    Key(Value),
    /// Column predicates, AND-joined in insertion order.
    Fields(Vec<(String, Term)>),
}

impl Selector {
    pub fn all() -> Self {
        Selector::All
    }

    pub fn key(value: impl Into<Value>) -> Self {
        Selector::Key(value.into())
    }

    pub fn field(column: impl Into<String>, term: Term) -> Self {
        Selector::Fields(vec![(column.into(), term)])
    }

    pub fn fields<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Term)>,
        S: Into<String>,
    {
        Selector::Fields(entries.into_iter().map(|(c, t)| (c.into(), t)).collect())
    }

    /// Append another predicate. Extends a field selector; a key selector is
    /// already fully determined and cannot be extended.
    pub fn and(self, column: impl Into<String>, term: Term) -> Self {
        match self {
            Selector::Fields(mut entries) => {
                entries.push((column.into(), term));
                Selector::Fields(entries)
            }
            Selector::All => Selector::field(column, term),
            key @ Selector::Key(_) => key,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selector::All)
    }
}

impl From<i64> for Selector {
    fn from(id: i64) -> Self {
        Selector::Key(Value::Int(id))
    }
}

impl From<&str> for Selector {
    fn from(id: &str) -> Self {
        Selector::Key(Value::Text(id.to_string()))
    }
}

impl From<Value> for Selector {
    fn from(id: Value) -> Self {
        Selector::Key(id)
    }
}

/// Translates one SELECT into SQL text.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    ty: Rc<EntityType>,
    fields: Option<Vec<(Option<String>, String)>>,
    selector: Selector,
    order: Vec<String>,
}

impl QueryBuilder {
    pub fn new(ty: Rc<EntityType>) -> Self {
        Self {
            ty,
            fields: None,
            selector: Selector::All,
            order: Vec::new(),
        }
    }

    /// Explicit field expressions; without this the query selects `*`.
    pub fn fields<I, S>(mut self, exprs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = self.fields.get_or_insert_with(Vec::new);
        list.extend(exprs.into_iter().map(|e| (None, e.into())));
        self
    }

    /// One field expression rendered as `expr AS alias`.
    pub fn aliased_field(mut self, alias: impl Into<String>, expr: impl Into<String>) -> Self {
        self.fields
            .get_or_insert_with(Vec::new)
            .push((Some(alias.into()), expr.into()));
        self
    }

    pub fn selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn order_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Render the full SELECT statement.
    pub fn to_sql(&self, conn: &dyn Connection) -> OrmResult<String> {
        self.render(conn, "", "")
    }

    /// Render the SELECT with the connection's pagination clauses spliced
    /// in. `max_records = 0` means no limit.
    pub fn to_sql_paginated(
        &self,
        conn: &dyn Connection,
        max_records: u64,
        offset: u64,
    ) -> OrmResult<String> {
        let after_select = conn.pagination_after_select(max_records, offset)?;
        let after_statement = conn.pagination_after_statement(max_records, offset)?;
        self.render(conn, &after_select, &after_statement)
    }

    fn render(
        &self,
        conn: &dyn Connection,
        after_select: &str,
        after_statement: &str,
    ) -> OrmResult<String> {
        let mut sql = String::from("SELECT ");
        if !after_select.is_empty() {
            sql.push_str(after_select);
            sql.push(' ');
        }
        sql.push_str(&self.render_fields());
        sql.push_str(" FROM ");
        sql.push_str(self.ty.table());
        let predicate = self.render_where(conn)?;
        if !predicate.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }
        let order = self.render_order()?;
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order);
        }
        if !after_statement.is_empty() {
            sql.push(' ');
            sql.push_str(after_statement);
        }
        Ok(sql)
    }

    fn render_fields(&self) -> String {
        match &self.fields {
            None => "*".to_string(),
            Some(list) => {
                let mut sql = String::new();
                for (i, (alias, expr)) in list.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    sql.push_str(expr);
                    if let Some(alias) = alias {
                        sql.push_str(" AS ");
                        sql.push_str(alias);
                    }
                }
                sql
            }
        }
    }

    fn render_where(&self, conn: &dyn Connection) -> OrmResult<String> {
        match &self.selector {
            Selector::All => Ok(String::new()),
            Selector::Key(value) => {
                if self.ty.has_composite_key() {
                    return Err(OrmError::validation(format!(
                        "entity type '{}' has a composite key; a scalar selector cannot address it",
                        self.ty.name()
                    )));
                }
                let column = &self.ty.id_fields()[0];
                Ok(format!(
                    "{column} = {}",
                    conn.quote(value, self.ty.requires_quoting(column))
                ))
            }
            Selector::Fields(entries) => {
                let mut sql = String::new();
                for (i, (column, term)) in entries.iter().enumerate() {
                    check_ident(column)?;
                    if i > 0 {
                        sql.push_str(" AND ");
                    }
                    self.render_term(conn, column, term, &mut sql)?;
                }
                Ok(sql)
            }
        }
    }

    fn render_term(
        &self,
        conn: &dyn Connection,
        column: &str,
        term: &Term,
        sql: &mut String,
    ) -> OrmResult<()> {
        let quoting = self.ty.requires_quoting(column);
        match term {
            Term::Subquery(sub) => {
                sql.push_str(column);
                sql.push_str(" IN (");
                sql.push_str(&sub.to_sql(conn)?);
                sql.push(')');
            }
            Term::Eq(Value::Null) => {
                sql.push_str(column);
                sql.push_str(" IS NULL");
            }
            Term::Eq(value) => {
                sql.push_str(column);
                sql.push_str(" = ");
                sql.push_str(&conn.quote(value, quoting));
            }
            Term::In(values) => {
                if values.is_empty() {
                    sql.push_str("1=0");
                } else {
                    sql.push_str(column);
                    sql.push_str(" IN (");
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 {
                            sql.push(',');
                        }
                        sql.push_str(&conn.quote(value, quoting));
                    }
                    sql.push(')');
                }
            }
            Term::Cmp { op, value, not } => {
                if *not {
                    sql.push_str("NOT ");
                }
                sql.push_str(column);
                sql.push(' ');
                sql.push_str(op.sql());
                sql.push(' ');
                sql.push_str(&conn.quote(value, quoting));
            }
            Term::Between { low, high, not } => {
                for bound in [low, high] {
                    if bound.is_null() {
                        return Err(OrmError::validation(format!(
                            "BETWEEN bounds for column '{column}' must be non-null scalars"
                        )));
                    }
                }
                if *not {
                    sql.push_str("NOT ");
                }
                sql.push_str(column);
                sql.push_str(" BETWEEN ");
                sql.push_str(&conn.quote(low, quoting));
                sql.push_str(" AND ");
                sql.push_str(&conn.quote(high, quoting));
            }
        }
        Ok(())
    }

    fn render_order(&self) -> OrmResult<String> {
        for column in &self.order {
            check_ident(column)?;
        }
        Ok(self.order.join(", "))
    }
}
