//! Entity instances.
//!
//! An [`Entity`] is one in-memory record mapped to one table row. It keeps
//! two maps: `stored` (values as last synced with the backing store) and
//! `pending` (values changed since the last save). A field is dirty iff it
//! is present in `pending`; an explicit NULL overwrite is held as
//! [`Value::Null`] there, so it is never confused with "unset".
//!
//! Entities are shared handles: clones point at the same state, and the
//! store's identity map guarantees at most one live state per row. Identity
//! comparisons use [`Entity::ptr_eq`].

use crate::connection::Row;
use crate::descriptor::EntityType;
use crate::error::{OrmError, OrmResult};
use crate::query::{Compare, Selector, Term};
use crate::session::Session;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Debug, Default)]
struct EntityState {
    stored: BTreeMap<String, Value>,
    pending: BTreeMap<String, Value>,
    owned: BTreeMap<String, Vec<Entity>>,
    persisted: bool,
    marked_for_deletion: bool,
}

/// Shared handle to one record's state.
#[derive(Debug, Clone)]
pub struct Entity {
    ty: Rc<EntityType>,
    state: Rc<RefCell<EntityState>>,
}

impl Entity {
    pub(crate) fn new(ty: Rc<EntityType>) -> Self {
        Self {
            ty,
            state: Rc::new(RefCell::new(EntityState::default())),
        }
    }

    /// Materialize from a fetched row: fully stored, clean, persisted.
    pub(crate) fn from_row(ty: Rc<EntityType>, row: Row) -> Self {
        Self {
            ty,
            state: Rc::new(RefCell::new(EntityState {
                stored: row,
                persisted: true,
                ..EntityState::default()
            })),
        }
    }

    pub fn entity_type(&self) -> &Rc<EntityType> {
        &self.ty
    }

    /// Whether two handles point at the same record state.
    pub fn ptr_eq(a: &Entity, b: &Entity) -> bool {
        Rc::ptr_eq(&a.state, &b.state)
    }

    /// Current value of `field`, pending-first, passed through the column
    /// codec. Never-set fields read as NULL.
    pub fn get(&self, field: &str) -> OrmResult<Value> {
        let raw = self.raw_value(field);
        self.ty.field_type(field).convert_from_database(&raw)
    }

    /// Set `field`, converting through the column codec. Setting a field
    /// back to its stored value clears the pending override instead of
    /// recording a no-op diff.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> OrmResult<()> {
        let value = value.into();
        let converted = if value.is_null() {
            Value::Null
        } else {
            self.ty.field_type(field).convert_to_database(&value)?
        };
        let mut state = self.state.borrow_mut();
        if state.stored.get(field) == Some(&converted) {
            state.pending.remove(field);
        } else {
            state.pending.insert(field.to_string(), converted);
        }
        Ok(())
    }

    /// Storage-form value, pending-first, NULL when absent from both maps.
    pub(crate) fn raw_value(&self, field: &str) -> Value {
        let state = self.state.borrow();
        state
            .pending
            .get(field)
            .or_else(|| state.stored.get(field))
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn is_dirty(&self) -> bool {
        !self.state.borrow().pending.is_empty()
    }

    /// The changed fields in storage form, ready for INSERT/UPDATE.
    pub fn dirty_fields(&self) -> Vec<(String, Value)> {
        self.state
            .borrow()
            .pending
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Fold pending changes into the stored map and mark everything clean.
    pub fn clear_dirty(&self) {
        let mut state = self.state.borrow_mut();
        let pending = std::mem::take(&mut state.pending);
        state.stored.extend(pending);
    }

    /// Scalar identity of a single-key entity. `None` for composite-key
    /// types (see [`Entity::id_pairs`]) and for entities without identity.
    pub fn id(&self) -> Option<Value> {
        if self.ty.has_composite_key() {
            return None;
        }
        let raw = self.raw_value(&self.ty.id_fields()[0]);
        if raw.is_null() { None } else { Some(raw) }
    }

    /// ID field → value pairs, omitting any field currently NULL.
    pub fn id_pairs(&self) -> Vec<(String, Value)> {
        self.ty
            .id_fields()
            .iter()
            .filter_map(|field| {
                let raw = self.raw_value(field);
                if raw.is_null() {
                    None
                } else {
                    Some((field.clone(), raw))
                }
            })
            .collect()
    }

    /// Assign the scalar ID. Composite keys are assigned atomically through
    /// their normal field setters, never through this method.
    pub fn set_id(&self, value: impl Into<Value>) -> OrmResult<()> {
        if self.ty.has_composite_key() {
            return Err(OrmError::validation(format!(
                "entity type '{}' has a composite key; assign its ID fields individually",
                self.ty.name()
            )));
        }
        let field = self.ty.id_fields()[0].clone();
        self.set(&field, value)
    }

    /// String identity scoped to this entity type: the ID value, or the ID
    /// fields joined with `-` for composite keys. `None` while any ID field
    /// is unset.
    pub fn local_unique_id(&self) -> Option<String> {
        let mut parts = Vec::with_capacity(self.ty.id_fields().len());
        for field in self.ty.id_fields() {
            parts.push(self.raw_value(field).to_plain_string()?);
        }
        Some(parts.join("-"))
    }

    /// Identity unique across all entity types.
    pub fn global_unique_id(&self) -> Option<String> {
        Some(format!("{}:{}", self.ty.name(), self.local_unique_id()?))
    }

    pub fn is_persisted(&self) -> bool {
        self.state.borrow().persisted
    }

    pub(crate) fn set_persisted(&self, persisted: bool) {
        self.state.borrow_mut().persisted = persisted;
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.state.borrow().marked_for_deletion
    }

    /// Mark this record for deletion. A marked child is physically deleted
    /// and evicted when its owner saves.
    pub fn mark_for_deletion(&self) {
        self.state.borrow_mut().marked_for_deletion = true;
    }

    // ==================== persistence ====================

    /// Save this entity and cascade into every cached owned child.
    ///
    /// Children get their foreign-key column stamped with this entity's ID
    /// before saving; children marked for deletion are deleted and evicted
    /// instead. The cascade aborts on the first error. Returns whether any
    /// row-level write occurred.
    pub fn save(&self, session: &Session) -> OrmResult<bool> {
        if self.is_marked_for_deletion() {
            return Ok(false);
        }
        let store = session.store(self.ty.name())?;
        let mut wrote = false;
        if self.is_dirty() {
            wrote = store.save(self)?;
            self.clear_dirty();
        }
        let keys: Vec<String> = self.state.borrow().owned.keys().cloned().collect();
        for key in keys {
            let fk = session.registry().resolve(&key)?;
            let (primary_column, foreign_column) = fk.single_column_pair()?;
            let parent_id = self.get(primary_column)?;
            let children = self.cached_owned(&key);
            for child in children {
                if child.is_marked_for_deletion() {
                    if child.is_persisted() {
                        child.delete(session)?;
                        wrote = true;
                    } else {
                        session.store(child.entity_type().name())?.forget(&child);
                    }
                    self.uncache_owned_instance(&key, &child);
                } else {
                    child.set(foreign_column, parent_id.clone())?;
                    if child.save(session)? {
                        wrote = true;
                    }
                }
            }
        }
        Ok(wrote)
    }

    /// Delete this record, cascading into every cached owned child first
    /// (deepest child rows go first).
    pub fn delete(&self, session: &Session) -> OrmResult<()> {
        let keys: Vec<String> = self.state.borrow().owned.keys().cloned().collect();
        for key in keys {
            for child in self.cached_owned(&key) {
                child.delete(session)?;
            }
        }
        self.state.borrow_mut().owned.clear();
        let store = session.store(self.ty.name())?;
        if self.is_persisted() {
            store.delete(self)?;
        } else {
            store.forget(self);
        }
        let mut state = self.state.borrow_mut();
        state.marked_for_deletion = true;
        state.persisted = false;
        Ok(())
    }

    /// Re-read this row from the store. A vanished row marks this entity
    /// for deletion rather than failing.
    pub fn refresh(&self, session: &Session, cascade: bool) -> OrmResult<()> {
        let store = session.store(self.ty.name())?;
        let id = self.id_pairs();
        if id.len() != self.ty.id_fields().len() {
            return Err(OrmError::consistency(format!(
                "cannot refresh '{}' without a full identity",
                self.ty.name()
            )));
        }
        let selector =
            Selector::fields(id.into_iter().map(|(column, value)| (column, Term::Eq(value))));
        let mut rows = store.fetch_rows(&selector, &[])?;
        if rows.len() > 1 {
            return Err(OrmError::consistency(format!(
                "refresh of '{}' matched {} rows",
                self.global_unique_id().unwrap_or_default(),
                rows.len()
            )));
        }
        match rows.pop() {
            Some(row) => {
                let mut state = self.state.borrow_mut();
                state.stored = row;
                state.pending.clear();
            }
            None => self.mark_for_deletion(),
        }
        if cascade {
            let keys: Vec<String> = self.state.borrow().owned.keys().cloned().collect();
            for key in keys {
                for child in self.cached_owned(&key) {
                    if !child.is_marked_for_deletion() {
                        child.refresh(session, true)?;
                    }
                }
            }
        }
        Ok(())
    }

    // ==================== owned relationships ====================

    fn cached_owned(&self, key: &str) -> Vec<Entity> {
        self.state
            .borrow()
            .owned
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    fn owned_key_for(&self, session: &Session, key_name: &str) -> OrmResult<Rc<crate::registry::ForeignKey>> {
        let fk = session.registry().resolve(key_name)?;
        if !fk.is_owned() || fk.primary_entity() != self.ty.name() {
            return Err(OrmError::validation(format!(
                "'{key_name}' is not an owned relationship of entity type '{}'",
                self.ty.name()
            )));
        }
        Ok(fk)
    }

    /// All cached children of the given owned relationship, querying the
    /// foreign store on first access.
    pub fn owned_instances(&self, session: &Session, key_name: &str) -> OrmResult<Vec<Entity>> {
        let fk = self.owned_key_for(session, key_name)?;
        let (primary_column, foreign_column) = fk.single_column_pair()?;
        if !self.state.borrow().owned.contains_key(key_name) {
            let parent_id = self.get(primary_column)?;
            let children = if parent_id.is_null() {
                Vec::new()
            } else {
                let child_store = session.store(fk.foreign_entity())?;
                child_store.get_all(&Selector::field(foreign_column, Term::Eq(parent_id)), &[])?
            };
            self.state
                .borrow_mut()
                .owned
                .insert(key_name.to_string(), children);
        }
        Ok(self.cached_owned(key_name))
    }

    /// First cached child matching `selector`.
    ///
    /// This is a linear scan of the cache; it assumes small child counts
    /// (on the order of twenty). Callers with large fan-outs should query
    /// the child store directly instead.
    pub fn owned_instance(
        &self,
        session: &Session,
        key_name: &str,
        selector: &Selector,
    ) -> OrmResult<Option<Entity>> {
        for child in self.owned_instances(session, key_name)? {
            if child.matches(selector)? {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Put `child` under the given owned relationship; it will be saved and
    /// deleted together with this entity from now on.
    pub fn add_owned_instance(
        &self,
        session: &Session,
        key_name: &str,
        child: &Entity,
    ) -> OrmResult<()> {
        let fk = self.owned_key_for(session, key_name)?;
        if fk.foreign_entity() != child.entity_type().name() {
            return Err(OrmError::validation(format!(
                "'{key_name}' links to '{}', not '{}'",
                fk.foreign_entity(),
                child.entity_type().name()
            )));
        }
        self.attach_owned(key_name, child.clone());
        Ok(())
    }

    /// Mark `child` for deletion and detach it from the cache.
    pub fn remove_owned_instance(&self, key_name: &str, child: &Entity) {
        child.mark_for_deletion();
        self.uncache_owned_instance(key_name, child);
    }

    /// Detach `child` from the cache without deleting it.
    pub fn uncache_owned_instance(&self, key_name: &str, child: &Entity) {
        if let Some(list) = self.state.borrow_mut().owned.get_mut(key_name) {
            list.retain(|entry| !Entity::ptr_eq(entry, child));
        }
    }

    /// Insert into the owned cache, replacing any entry with the same local
    /// unique id.
    pub(crate) fn attach_owned(&self, key_name: &str, child: Entity) {
        enum Slot {
            Skip,
            Push,
            Replace(usize),
        }
        let child_luid = child.local_unique_id();
        let slot = {
            let state = self.state.borrow();
            match state.owned.get(key_name) {
                None => Slot::Push,
                Some(list) if list.iter().any(|entry| Entity::ptr_eq(entry, &child)) => Slot::Skip,
                Some(list) => match &child_luid {
                    Some(luid) => list
                        .iter()
                        .position(|entry| entry.local_unique_id().as_ref() == Some(luid))
                        .map(Slot::Replace)
                        .unwrap_or(Slot::Push),
                    None => Slot::Push,
                },
            }
        };
        let mut state = self.state.borrow_mut();
        let list = state.owned.entry(key_name.to_string()).or_default();
        match slot {
            Slot::Skip => {}
            Slot::Push => list.push(child),
            Slot::Replace(i) => list[i] = child,
        }
    }

    pub(crate) fn cached_owned_keys(&self) -> Vec<String> {
        self.state.borrow().owned.keys().cloned().collect()
    }

    pub(crate) fn cached_owned_children(&self, key: &str) -> Vec<Entity> {
        self.cached_owned(key)
    }

    pub(crate) fn field_names(&self) -> Vec<String> {
        let state = self.state.borrow();
        let mut names: Vec<String> = state.stored.keys().cloned().collect();
        for key in state.pending.keys() {
            if !state.stored.contains_key(key) {
                names.push(key.clone());
            }
        }
        names.sort();
        names
    }

    // ==================== in-memory matching ====================

    /// Evaluate a selector against this entity's current field values.
    /// Used by the owned-instance cache scan; `LIKE` and subquery terms are
    /// not supported in memory.
    pub fn matches(&self, selector: &Selector) -> OrmResult<bool> {
        match selector {
            Selector::All => Ok(true),
            Selector::Key(value) => {
                if self.ty.has_composite_key() {
                    return Err(OrmError::validation(format!(
                        "entity type '{}' has a composite key; a scalar selector cannot address it",
                        self.ty.name()
                    )));
                }
                let field = self.ty.id_fields()[0].clone();
                Ok(loose_eq(&self.get(&field)?, value))
            }
            Selector::Fields(entries) => {
                for (column, term) in entries {
                    if !self.matches_term(column, term)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    fn matches_term(&self, column: &str, term: &Term) -> OrmResult<bool> {
        let value = self.get(column)?;
        match term {
            Term::Eq(Value::Null) => Ok(value.is_null()),
            Term::Eq(expected) => Ok(loose_eq(&value, expected)),
            Term::In(expected) => Ok(expected.iter().any(|e| loose_eq(&value, e))),
            Term::Cmp { op, value: rhs, not } => {
                let hit = match op {
                    Compare::Eq => loose_eq(&value, rhs),
                    Compare::Ne => !loose_eq(&value, rhs),
                    Compare::Lt => loose_cmp(&value, rhs).is_some_and(|o| o.is_lt()),
                    Compare::Lte => loose_cmp(&value, rhs).is_some_and(|o| o.is_le()),
                    Compare::Gt => loose_cmp(&value, rhs).is_some_and(|o| o.is_gt()),
                    Compare::Gte => loose_cmp(&value, rhs).is_some_and(|o| o.is_ge()),
                    Compare::Like => {
                        return Err(OrmError::validation(
                            "LIKE is not supported for in-memory matching",
                        ));
                    }
                };
                Ok(hit != *not)
            }
            Term::Between { low, high, not } => {
                let hit = loose_cmp(&value, low).is_some_and(|o| o.is_ge())
                    && loose_cmp(&value, high).is_some_and(|o| o.is_le());
                Ok(hit != *not)
            }
            Term::Subquery(_) => Err(OrmError::validation(
                "subqueries are not supported for in-memory matching",
            )),
        }
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return a.is_null() && b.is_null();
    }
    if let (Some(x), Some(y)) = (a.as_float(), b.as_float()) {
        return x == y;
    }
    a.to_plain_string() == b.to_plain_string()
}

fn loose_cmp(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    if let (Some(x), Some(y)) = (a.as_float(), b.as_float()) {
        return x.partial_cmp(&y);
    }
    Some(a.to_plain_string()?.cmp(&b.to_plain_string()?))
}
