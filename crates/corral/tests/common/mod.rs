//! Shared fixtures: a scriptable counting connection and the zoo model.

#![allow(dead_code)]

use corral::dialect::{Dialect, MySqlDialect};
use corral::{Connection, EntityType, FieldType, OrmResult, Registry, Row, Session, Value};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Default)]
struct FakeState {
    queries: Vec<String>,
    executes: Vec<String>,
    results: VecDeque<Vec<Row>>,
    affected: VecDeque<u64>,
    auto_increment: Option<i64>,
    connects: usize,
}

/// Scriptable stub connection. Clones share state, so a test can hand one
/// clone to the session and keep another to script results and inspect the
/// SQL that was issued.
#[derive(Clone)]
pub struct FakeConnection<D: Dialect = MySqlDialect> {
    dialect: D,
    state: Rc<RefCell<FakeState>>,
}

impl FakeConnection<MySqlDialect> {
    pub fn new() -> Self {
        Self::with_dialect(MySqlDialect)
    }
}

impl<D: Dialect> FakeConnection<D> {
    pub fn with_dialect(dialect: D) -> Self {
        Self {
            dialect,
            state: Rc::new(RefCell::new(FakeState::default())),
        }
    }

    /// Enqueue the result of the next `query()` call.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.state.borrow_mut().results.push_back(rows);
    }

    /// Enqueue the affected-row count of the next `execute()` call
    /// (defaults to 1 when the queue is empty).
    pub fn push_affected(&self, rows: u64) {
        self.state.borrow_mut().affected.push_back(rows);
    }

    /// Make inserts hand out generated IDs starting at `next`.
    pub fn set_auto_increment(&self, next: i64) {
        self.state.borrow_mut().auto_increment = Some(next);
    }

    pub fn queries(&self) -> Vec<String> {
        self.state.borrow().queries.clone()
    }

    pub fn query_count(&self) -> usize {
        self.state.borrow().queries.len()
    }

    pub fn executes(&self) -> Vec<String> {
        self.state.borrow().executes.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.state.borrow().connects
    }
}

impl<D: Dialect> Connection for FakeConnection<D> {
    fn connect(&mut self) -> OrmResult<()> {
        self.state.borrow_mut().connects += 1;
        Ok(())
    }

    fn disconnect(&mut self) -> OrmResult<()> {
        Ok(())
    }

    fn ping(&mut self) -> bool {
        true
    }

    fn query(&mut self, sql: &str) -> OrmResult<Vec<Row>> {
        let mut state = self.state.borrow_mut();
        state.queries.push(sql.to_string());
        Ok(state.results.pop_front().unwrap_or_default())
    }

    fn execute(&mut self, sql: &str) -> OrmResult<u64> {
        let mut state = self.state.borrow_mut();
        state.executes.push(sql.to_string());
        Ok(state.affected.pop_front().unwrap_or(1))
    }

    fn quote(&self, value: &Value, requires_quoting: bool) -> String {
        self.dialect.quote(value, requires_quoting)
    }

    fn last_insert_id(&mut self) -> OrmResult<Option<Value>> {
        let mut state = self.state.borrow_mut();
        match state.auto_increment {
            Some(next) => {
                state.auto_increment = Some(next + 1);
                Ok(Some(Value::Int(next)))
            }
            None => Ok(None),
        }
    }

    fn pagination_after_select(&self, max_records: u64, offset: u64) -> OrmResult<String> {
        self.dialect.pagination_after_select(max_records, offset)
    }

    fn pagination_after_statement(&self, max_records: u64, offset: u64) -> OrmResult<String> {
        self.dialect.pagination_after_statement(max_records, offset)
    }

    fn begin_transaction(&mut self) -> OrmResult<()> {
        self.state.borrow_mut().executes.push("BEGIN".to_string());
        Ok(())
    }

    fn commit(&mut self) -> OrmResult<()> {
        self.state.borrow_mut().executes.push("COMMIT".to_string());
        Ok(())
    }

    fn rollback(&mut self) -> OrmResult<()> {
        self.state.borrow_mut().executes.push("ROLLBACK".to_string());
        Ok(())
    }
}

/// Build one fetched row from column/value pairs.
pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(column, value)| (column.to_string(), value.clone()))
        .collect()
}

pub const FK_PROPERTY_ANIMAL: &str = "fk_animal_property_animal";
pub const FK_PROPERTY_TYPE: &str = "fk_animal_property_type";
pub const FK_INVENTORY_ANIMAL: &str = "fk_animal_inventory_animal";

/// The menagerie model: animals owning properties and an inventory row.
pub fn zoo_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .define(
            EntityType::builder("Animal", "animal")
                .database("zoo")
                .field("name", FieldType::Text)
                .field("legs", FieldType::Numeric)
                .field("sound", FieldType::Text)
                .field("is_pet", FieldType::Bool)
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
        .define(
            EntityType::builder("AnimalPropertyType", "animal_property_type")
                .database("zoo")
                .field("name", FieldType::Text)
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
        .define(
            EntityType::builder("AnimalProperty", "animal_property")
                .database("zoo")
                .id_fields(["animal_id", "property_type_id"])
                .field("animal_id", FieldType::Numeric)
                .field("property_type_id", FieldType::Numeric)
                .field("comment", FieldType::Text)
                .field("set_on_date", FieldType::DateTime)
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
        .define(
            EntityType::builder("AnimalInventory", "animal_inventory")
                .database("zoo")
                .id_field("animal_id")
                .field("qoh", FieldType::Numeric)
                .field("last_into_stock", FieldType::DateTime)
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
        .declare_foreign_key(FK_PROPERTY_ANIMAL, "AnimalProperty", ["animal_id"], "Animal", true)
        .unwrap();
    registry
        .declare_foreign_key(
            FK_PROPERTY_TYPE,
            "AnimalProperty",
            ["property_type_id"],
            "AnimalPropertyType",
            false,
        )
        .unwrap();
    registry
        .declare_foreign_key(
            FK_INVENTORY_ANIMAL,
            "AnimalInventory",
            ["animal_id"],
            "Animal",
            true,
        )
        .unwrap();
    registry
}

/// A session over the zoo model backed by the given stub connection.
pub fn zoo_session<D: Dialect + 'static>(conn: FakeConnection<D>) -> Session {
    init_tracing();
    let session = Session::new(zoo_registry());
    session.register_connection("zoo", conn).unwrap();
    session
}

/// Route store logging through the test harness when `RUST_LOG` is set.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
