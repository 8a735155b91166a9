//! Request-scoped ownership of registry, connections, and stores.
//!
//! A [`Session`] holds what would otherwise live in process-global
//! store/connection/key caches: one logical unit of work owns one session,
//! and everything reachable from it is confined to that thread of control.
//! Multiple isolated sessions can coexist in one process, which is also what
//! keeps tests independent.

use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};
use crate::registry::Registry;
use crate::store::Store;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// One unit of work: registry + named connections + per-type stores.
pub struct Session {
    registry: Rc<Registry>,
    connections: RefCell<BTreeMap<String, Rc<RefCell<dyn Connection>>>>,
    stores: RefCell<BTreeMap<String, Rc<Store>>>,
}

impl Session {
    /// Take ownership of a fully built registry. Model registration is done
    /// at this point; the registry is immutable from here on.
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Rc::new(registry),
            connections: RefCell::new(BTreeMap::new()),
            stores: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register a named connection. Entity types refer to it through their
    /// `database` name. Duplicate registration is a configuration error.
    pub fn register_connection<C>(&self, name: impl Into<String>, connection: C) -> OrmResult<()>
    where
        C: Connection + 'static,
    {
        let name = name.into();
        let mut connections = self.connections.borrow_mut();
        if connections.contains_key(&name) {
            return Err(OrmError::configuration(format!(
                "connection '{name}' is already registered"
            )));
        }
        connections.insert(name, Rc::new(RefCell::new(connection)));
        Ok(())
    }

    /// Look up a registered connection by name.
    pub fn connection(&self, name: &str) -> OrmResult<Rc<RefCell<dyn Connection>>> {
        self.connections.borrow().get(name).cloned().ok_or_else(|| {
            OrmError::configuration(format!("connection '{name}' is not registered"))
        })
    }

    /// The store for an entity type, created (and connected) on first use.
    /// Stores backed by the same database share one connection.
    pub fn store(&self, entity: &str) -> OrmResult<Rc<Store>> {
        if let Some(store) = self.stores.borrow().get(entity) {
            return Ok(Rc::clone(store));
        }
        let ty = self.registry.entity_type(entity)?;
        let conn = self.connection(ty.database())?;
        let store = Rc::new(Store::new(ty, conn));
        store.connect()?;
        self.stores
            .borrow_mut()
            .insert(entity.to_string(), Rc::clone(&store));
        Ok(store)
    }

    /// Transaction passthroughs. This layer adds no nesting, savepoints, or
    /// retry semantics.
    pub fn begin_transaction(&self, database: &str) -> OrmResult<()> {
        self.connection(database)?.borrow_mut().begin_transaction()
    }

    pub fn commit(&self, database: &str) -> OrmResult<()> {
        self.connection(database)?.borrow_mut().commit()
    }

    pub fn rollback(&self, database: &str) -> OrmResult<()> {
        self.connection(database)?.borrow_mut().rollback()
    }

    /// Disconnect every registered connection.
    pub fn disconnect_all(&self) -> OrmResult<()> {
        for conn in self.connections.borrow().values() {
            conn.borrow_mut().disconnect()?;
        }
        Ok(())
    }
}
