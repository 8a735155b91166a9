//! Connection contract for database backends.
//!
//! The store layer never talks to a driver directly; it goes through
//! [`Connection`], which executes SQL text, quotes literals, and reports
//! affected-row counts and generated IDs. Write statements have default
//! implementations composed from [`Connection::quote`] and
//! [`Connection::execute`], so a driver only overrides them when its backend
//! needs something special (e.g. fetching `@@IDENTITY` separately).

use crate::descriptor::EntityType;
use crate::error::OrmResult;
use crate::value::Value;
use std::collections::BTreeMap;

/// One fetched row: column name → storage value.
pub type Row = BTreeMap<String, Value>;

/// Result of an INSERT.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// Row inserted; the backend produced no generated ID.
    Inserted,
    /// Row inserted and the backend generated this auto-increment ID.
    GeneratedId(Value),
}

/// A database backend.
///
/// Implementations are expected to be request-scoped and used from a single
/// thread of control; no locking happens at this layer.
pub trait Connection {
    fn connect(&mut self) -> OrmResult<()>;

    fn disconnect(&mut self) -> OrmResult<()>;

    fn ping(&mut self) -> bool;

    /// Execute a statement that produces rows.
    fn query(&mut self, sql: &str) -> OrmResult<Vec<Row>>;

    /// Execute a statement and return the affected-row count.
    fn execute(&mut self, sql: &str) -> OrmResult<u64>;

    /// Render a value as a safe SQL literal, escaping backend
    /// metacharacters. NULL renders as the literal `null`.
    fn quote(&self, value: &Value, requires_quoting: bool) -> String;

    /// The last auto-increment ID produced on this connection, if the
    /// backend tracks one.
    fn last_insert_id(&mut self) -> OrmResult<Option<Value>> {
        Ok(None)
    }

    /// Insert `fields` as a new row of `ty`'s table.
    fn insert(&mut self, ty: &EntityType, fields: &[(String, Value)]) -> OrmResult<InsertOutcome> {
        let mut columns = String::new();
        let mut values = String::new();
        for (i, (column, value)) in fields.iter().enumerate() {
            if i > 0 {
                columns.push(',');
                values.push(',');
            }
            columns.push_str(column);
            values.push_str(&self.quote(value, ty.requires_quoting(column)));
        }
        let sql = format!("INSERT INTO {}({}) VALUES ({})", ty.table(), columns, values);
        self.execute(&sql)?;
        Ok(match self.last_insert_id()? {
            Some(id) => InsertOutcome::GeneratedId(id),
            None => InsertOutcome::Inserted,
        })
    }

    /// Update the row of `ty` identified by `id` with `fields`.
    fn update(
        &mut self,
        ty: &EntityType,
        fields: &[(String, Value)],
        id: &[(String, Value)],
    ) -> OrmResult<u64> {
        let mut sql = format!("UPDATE {} SET ", ty.table());
        for (i, (column, value)) in fields.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(column);
            sql.push_str(" = ");
            sql.push_str(&self.quote(value, ty.requires_quoting(column)));
        }
        sql.push_str(" WHERE ");
        push_id_predicate(self, ty, id, &mut sql);
        self.execute(&sql)
    }

    /// Delete the row of `ty` identified by `id`.
    fn delete(&mut self, ty: &EntityType, id: &[(String, Value)]) -> OrmResult<u64> {
        let mut sql = format!("DELETE FROM {} WHERE ", ty.table());
        push_id_predicate(self, ty, id, &mut sql);
        self.execute(&sql)
    }

    /// Pagination fragment injected directly after `SELECT`.
    fn pagination_after_select(&self, max_records: u64, offset: u64) -> OrmResult<String>;

    /// Pagination fragment appended after the full statement.
    fn pagination_after_statement(&self, max_records: u64, offset: u64) -> OrmResult<String>;

    /// Opaque transaction passthroughs. Nesting and savepoints are the
    /// caller's concern.
    fn begin_transaction(&mut self) -> OrmResult<()>;

    fn commit(&mut self) -> OrmResult<()>;

    fn rollback(&mut self) -> OrmResult<()>;
}

fn push_id_predicate<C: Connection + ?Sized>(
    conn: &C,
    ty: &EntityType,
    id: &[(String, Value)],
    sql: &mut String,
) {
    for (i, (column, value)) in id.iter().enumerate() {
        if i > 0 {
            sql.push_str(" AND ");
        }
        sql.push_str(column);
        sql.push_str(" = ");
        sql.push_str(&conn.quote(value, ty.requires_quoting(column)));
    }
}
