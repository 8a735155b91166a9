//! Eager loading across foreign-key graphs.
//!
//! [`Store::load_foreign`] fetches the rows of related entity types for
//! every entity matching a selector, one query per relationship filtered
//! through a correlated subquery, and attaches the loaded children into
//! their parents' owned caches. Nested [`RelationTree`]s walk transitive
//! relationships the same way.

use crate::error::{OrmError, OrmResult};
use crate::query::{QueryBuilder, Selector, Term};
use crate::session::Session;
use crate::store::Store;
use std::rc::Rc;

/// One relationship to load, optionally with further relationships to load
/// from the far side.
#[derive(Debug, Clone)]
pub struct RelationTree {
    name: String,
    nested: Vec<RelationTree>,
}

impl RelationTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nested: Vec::new(),
        }
    }

    /// Continue loading through `nested` once this relationship's far side
    /// is loaded.
    pub fn with(mut self, nested: RelationTree) -> Self {
        self.nested.push(nested);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl From<&str> for RelationTree {
    fn from(name: &str) -> Self {
        RelationTree::new(name)
    }
}

impl Store {
    /// Eagerly load the given relationships for every entity of this type
    /// matching `selector`.
    ///
    /// When this type is the primary side of an owned relationship, the
    /// foreign side is fetched with `foreign_column IN (<subquery over the
    /// primary side>)` and each child is attached to its parent's owned
    /// cache (parents resolve through primary-key lookups, so the identity
    /// map absorbs most of them). When this type is the foreign side, the
    /// mirrored traversal loads the primary side. Relationships spanning
    /// more than one column cannot be traversed.
    pub fn load_foreign(
        &self,
        session: &Session,
        relations: &[RelationTree],
        selector: &Selector,
    ) -> OrmResult<()> {
        for relation in relations {
            let fk = session.registry().resolve(relation.name())?;
            if fk.primary_entity() == self.entity_type().name() {
                if !fk.is_owned() {
                    return Err(OrmError::validation(format!(
                        "relationship '{}' is not owned by entity type '{}'",
                        relation.name(),
                        self.entity_type().name()
                    )));
                }
                let (primary_column, foreign_column) = fk.single_column_pair()?;
                let sub = QueryBuilder::new(Rc::clone(self.entity_type()))
                    .fields([primary_column])
                    .selector(selector.clone());
                let child_selector = Selector::field(foreign_column, Term::subquery(sub));
                let child_store = session.store(fk.foreign_entity())?;
                let children = child_store.get_all(&child_selector, &[])?;
                for child in &children {
                    let parent_id = child.get(foreign_column)?;
                    if parent_id.is_null() {
                        continue;
                    }
                    if let Some(parent) = self.get(parent_id)? {
                        parent.attach_owned(relation.name(), child.clone());
                    }
                }
                if !relation.nested.is_empty() {
                    child_store.load_foreign(session, &relation.nested, &child_selector)?;
                }
            } else if fk.foreign_entity() == self.entity_type().name() {
                let (primary_column, foreign_column) = fk.single_column_pair()?;
                let sub = QueryBuilder::new(Rc::clone(self.entity_type()))
                    .fields([foreign_column])
                    .selector(selector.clone());
                let parent_selector = Selector::field(primary_column, Term::subquery(sub));
                let parent_store = session.store(fk.primary_entity())?;
                parent_store.get_all(&parent_selector, &[])?;
                if fk.is_owned() {
                    let children = self.get_all(selector, &[])?;
                    for child in &children {
                        let parent_id = child.get(foreign_column)?;
                        if parent_id.is_null() {
                            continue;
                        }
                        if let Some(parent) = parent_store.get(parent_id)? {
                            parent.attach_owned(relation.name(), child.clone());
                        }
                    }
                }
                if !relation.nested.is_empty() {
                    parent_store.load_foreign(session, &relation.nested, &parent_selector)?;
                }
            } else {
                return Err(OrmError::validation(format!(
                    "relationship '{}' is not declared for entity type '{}'",
                    relation.name(),
                    self.entity_type().name()
                )));
            }
        }
        Ok(())
    }
}
