//! Per-entity-type stores.
//!
//! A [`Store`] owns the identity map for one entity type, dispatches queries
//! through the type's connection, and coordinates insert/update/delete. The
//! identity map guarantees at most one live [`Entity`] state per row: any
//! fetch whose local unique id is already cached returns the cached instance
//! and drops the freshly read row.

use crate::connection::{Connection, InsertOutcome, Row};
use crate::descriptor::EntityType;
use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::query::{QueryBuilder, Selector};
use crate::session::Session;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Cache, query dispatcher, and persistence coordinator for one entity type.
pub struct Store {
    ty: Rc<EntityType>,
    conn: Rc<RefCell<dyn Connection>>,
    identity: RefCell<BTreeMap<String, Entity>>,
    fresh: RefCell<Vec<Entity>>,
}

impl Store {
    pub(crate) fn new(ty: Rc<EntityType>, conn: Rc<RefCell<dyn Connection>>) -> Self {
        Self {
            ty,
            conn,
            identity: RefCell::new(BTreeMap::new()),
            fresh: RefCell::new(Vec::new()),
        }
    }

    pub fn entity_type(&self) -> &Rc<EntityType> {
        &self.ty
    }

    /// Connect the backing database.
    pub fn connect(&self) -> OrmResult<()> {
        self.conn.borrow_mut().connect()
    }

    /// Disconnect the backing database.
    pub fn disconnect(&self) -> OrmResult<()> {
        self.conn.borrow_mut().disconnect()
    }

    /// Create a new entity from initial values: every field dirty, no
    /// identity, tracked in this store's new-entity list until saved.
    pub fn create<I, S, V>(&self, values: I) -> OrmResult<Entity>
    where
        I: IntoIterator<Item = (S, V)>,
        S: AsRef<str>,
        V: Into<Value>,
    {
        let entity = Entity::new(Rc::clone(&self.ty));
        for (field, value) in values {
            entity.set(field.as_ref(), value)?;
        }
        self.fresh.borrow_mut().push(entity.clone());
        Ok(entity)
    }

    pub(crate) fn fetch_rows(&self, selector: &Selector, order: &[&str]) -> OrmResult<Vec<Row>> {
        let builder = QueryBuilder::new(Rc::clone(&self.ty))
            .selector(selector.clone())
            .order_by(order.iter().copied());
        let sql = builder.to_sql(&*self.conn.borrow())?;
        debug!(entity = self.ty.name(), %sql, "executing query");
        self.conn.borrow_mut().query(&sql)
    }

    /// Turn fetched rows into entities, merging into the identity map. A row
    /// whose local unique id is already cached yields the cached instance.
    fn materialize(&self, rows: Vec<Row>) -> OrmResult<Vec<Entity>> {
        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            let entity = Entity::from_row(Rc::clone(&self.ty), row);
            let luid = entity.local_unique_id().ok_or_else(|| {
                OrmError::consistency(format!(
                    "row fetched for '{}' has no id value",
                    self.ty.name()
                ))
            })?;
            let cached = self.identity.borrow().get(&luid).cloned();
            match cached {
                Some(existing) => {
                    debug!(entity = self.ty.name(), id = %luid, "identity map hit, fetched row discarded");
                    entities.push(existing);
                }
                None => {
                    self.identity.borrow_mut().insert(luid, entity.clone());
                    entities.push(entity);
                }
            }
        }
        Ok(entities)
    }

    /// Fetch the single entity matching `selector`. A scalar selector is
    /// served from the identity map when possible, without a query. More
    /// than one matching row is a consistency error.
    pub fn get(&self, selector: impl Into<Selector>) -> OrmResult<Option<Entity>> {
        let selector = selector.into();
        if let Selector::Key(value) = &selector {
            if let Some(luid) = value.to_plain_string() {
                if let Some(cached) = self.identity.borrow().get(&luid) {
                    return Ok(Some(cached.clone()));
                }
            }
        }
        let rows = self.fetch_rows(&selector, &[])?;
        let mut entities = self.materialize(rows)?;
        if entities.len() > 1 {
            return Err(OrmError::consistency(format!(
                "get on '{}' matched {} rows for a supposedly unique selector",
                self.ty.name(),
                entities.len()
            )));
        }
        Ok(entities.pop())
    }

    /// Fetch every entity matching `selector`.
    ///
    /// An unfiltered, unordered call with a non-empty identity map is served
    /// from the cache (merged with not-yet-persisted new entities) without
    /// touching the database.
    pub fn get_all(&self, selector: &Selector, order: &[&str]) -> OrmResult<Vec<Entity>> {
        if selector.is_all() && order.is_empty() && !self.identity.borrow().is_empty() {
            debug!(entity = self.ty.name(), "unfiltered get_all served from cache");
            let mut entities: Vec<Entity> = self.identity.borrow().values().cloned().collect();
            entities.extend(self.fresh.borrow().iter().cloned());
            return Ok(entities);
        }
        let rows = self.fetch_rows(selector, order)?;
        self.materialize(rows)
    }

    /// Like [`Store::get_all`], keyed by the string value of `indexed_by`.
    pub fn get_all_indexed(
        &self,
        selector: &Selector,
        order: &[&str],
        indexed_by: &str,
    ) -> OrmResult<BTreeMap<String, Entity>> {
        let mut indexed = BTreeMap::new();
        for entity in self.get_all(selector, order)? {
            let key = entity.get(indexed_by)?.to_plain_string().ok_or_else(|| {
                OrmError::validation(format!(
                    "cannot index '{}' results by NULL field '{indexed_by}'",
                    self.ty.name()
                ))
            })?;
            indexed.insert(key, entity);
        }
        Ok(indexed)
    }

    /// Fetch one page. Always executes against the database; the unfiltered
    /// cache shortcut does not apply here.
    pub fn get_paginated(
        &self,
        selector: &Selector,
        order: &[&str],
        max_records: u64,
        offset: u64,
    ) -> OrmResult<Vec<Entity>> {
        let builder = QueryBuilder::new(Rc::clone(&self.ty))
            .selector(selector.clone())
            .order_by(order.iter().copied());
        let sql = builder.to_sql_paginated(&*self.conn.borrow(), max_records, offset)?;
        debug!(entity = self.ty.name(), %sql, "executing paginated query");
        let rows = self.conn.borrow_mut().query(&sql)?;
        self.materialize(rows)
    }

    /// Write the entity's dirty fields: UPDATE when it is persisted, INSERT
    /// otherwise. Returns whether a row was written. Pending changes are
    /// left for the caller to fold (see [`Entity::save`]).
    pub fn save(&self, entity: &Entity) -> OrmResult<bool> {
        if !Rc::ptr_eq(entity.entity_type(), &self.ty) {
            return Err(OrmError::validation(format!(
                "entity of type '{}' handed to the '{}' store",
                entity.entity_type().name(),
                self.ty.name()
            )));
        }
        if entity.is_persisted() {
            self.update(entity)
        } else {
            self.insert(entity)
        }
    }

    fn update(&self, entity: &Entity) -> OrmResult<bool> {
        let fields = entity.dirty_fields();
        if fields.is_empty() {
            return Ok(false);
        }
        let id = entity.id_pairs();
        if id.len() != self.ty.id_fields().len() {
            return Err(OrmError::consistency(format!(
                "cannot update '{}' without a full identity",
                self.ty.name()
            )));
        }
        let rows = self.conn.borrow_mut().update(&self.ty, &fields, &id)?;
        if rows > 1 {
            return Err(OrmError::consistency(format!(
                "update of '{}' affected {rows} rows",
                entity
                    .global_unique_id()
                    .unwrap_or_else(|| self.ty.name().to_string())
            )));
        }
        Ok(rows == 1)
    }

    fn insert(&self, entity: &Entity) -> OrmResult<bool> {
        if entity.is_persisted() {
            return Err(OrmError::consistency(format!(
                "cannot insert '{}': it is already persisted",
                entity
                    .global_unique_id()
                    .unwrap_or_else(|| self.ty.name().to_string())
            )));
        }
        if let Some(luid) = entity.local_unique_id() {
            if self.identity.borrow().contains_key(&luid) {
                return Err(OrmError::consistency(format!(
                    "cannot insert '{}:{luid}': that identity is already tracked",
                    self.ty.name()
                )));
            }
        }
        let fields = entity.dirty_fields();
        let outcome = self.conn.borrow_mut().insert(&self.ty, &fields)?;
        if let InsertOutcome::GeneratedId(id) = outcome {
            entity.set_id(id)?;
        }
        entity.set_persisted(true);
        self.forget(entity);
        match entity.local_unique_id() {
            Some(luid) => {
                self.identity.borrow_mut().insert(luid, entity.clone());
            }
            None => {
                warn!(
                    entity = self.ty.name(),
                    "inserted row has no identity and will not be tracked"
                );
            }
        }
        Ok(true)
    }

    /// Physically delete the entity's row and evict it from the identity
    /// map. Entities without a full identity cannot be deleted.
    pub fn delete(&self, entity: &Entity) -> OrmResult<()> {
        let id = entity.id_pairs();
        if id.len() != self.ty.id_fields().len() {
            return Err(OrmError::consistency(format!(
                "cannot delete '{}' without an identity",
                self.ty.name()
            )));
        }
        if let Some(luid) = entity.local_unique_id() {
            self.identity.borrow_mut().remove(&luid);
        }
        self.forget(entity);
        self.conn.borrow_mut().delete(&self.ty, &id)?;
        Ok(())
    }

    /// Drop the entity from the new-entity list.
    pub(crate) fn forget(&self, entity: &Entity) {
        self.fresh
            .borrow_mut()
            .retain(|tracked| !Entity::ptr_eq(tracked, entity));
    }

    /// Save every tracked entity, cached and new.
    pub fn save_all(&self, session: &Session) -> OrmResult<()> {
        let mut entities: Vec<Entity> = self.identity.borrow().values().cloned().collect();
        entities.extend(self.fresh.borrow().iter().cloned());
        for entity in entities {
            entity.save(session)?;
        }
        Ok(())
    }

    /// Re-read every cached entity from the database.
    pub fn refresh_all(&self, session: &Session) -> OrmResult<()> {
        let entities: Vec<Entity> = self.identity.borrow().values().cloned().collect();
        for entity in entities {
            entity.refresh(session, true)?;
        }
        Ok(())
    }

    /// Drop the identity map and the new-entity list.
    pub fn clear_cache(&self) {
        self.identity.borrow_mut().clear();
        self.fresh.borrow_mut().clear();
    }

    /// Force-populate the identity map from a query; returns how many
    /// entities are now cached from it.
    pub fn cache(&self, selector: &Selector) -> OrmResult<usize> {
        let rows = self.fetch_rows(selector, &[])?;
        Ok(self.materialize(rows)?.len())
    }

    /// Row count of the whole table, always from the database.
    pub fn count_all(&self) -> OrmResult<u64> {
        let builder = QueryBuilder::new(Rc::clone(&self.ty)).fields(["COUNT(*)"]);
        let sql = builder.to_sql(&*self.conn.borrow())?;
        debug!(entity = self.ty.name(), %sql, "executing count query");
        let rows = self.conn.borrow_mut().query(&sql)?;
        rows.first()
            .and_then(|row| row.values().next())
            .and_then(|value| value.as_int())
            .map(|count| count as u64)
            .ok_or_else(|| {
                OrmError::consistency(format!(
                    "count query for '{}' returned no countable value",
                    self.ty.name()
                ))
            })
    }
}
