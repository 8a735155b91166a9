//! Tree export/import.
//!
//! Entities round-trip through a plain nested mapping (id, scalar fields in
//! their domain representation, and a `children` block keyed by relationship
//! name) suitable for JSON transport of whole owned graphs.

use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::session::Session;
use crate::store::Store;
use crate::value::Value;
use serde_json::{Map, json};

impl Entity {
    /// Export this entity and its cached owned graph as a nested mapping.
    pub fn to_tree(&self) -> OrmResult<serde_json::Value> {
        let mut fields = Map::new();
        for name in self.field_names() {
            fields.insert(name.clone(), self.get(&name)?.to_json());
        }
        let ty = self.entity_type();
        let pairs = self.id_pairs();
        let id = if pairs.len() != ty.id_fields().len() {
            serde_json::Value::Null
        } else if ty.has_composite_key() {
            let mut map = Map::new();
            for (field, value) in pairs {
                map.insert(field, value.to_json());
            }
            serde_json::Value::Object(map)
        } else {
            pairs[0].1.to_json()
        };
        let mut children = Map::new();
        for key in self.cached_owned_keys() {
            let trees: OrmResult<Vec<serde_json::Value>> = self
                .cached_owned_children(&key)
                .iter()
                .map(|child| child.to_tree())
                .collect();
            children.insert(key, serde_json::Value::Array(trees?));
        }
        Ok(json!({ "id": id, "fields": fields, "children": children }))
    }
}

impl Store {
    /// Rebuild an entity graph from [`Entity::to_tree`] output. The entity
    /// and its children come back all-dirty and unsaved, attached through
    /// their owned relationships; a following `save` persists the graph.
    pub fn from_tree(&self, session: &Session, tree: &serde_json::Value) -> OrmResult<Entity> {
        let tree = tree
            .as_object()
            .ok_or_else(|| OrmError::validation("entity tree must be a mapping"))?;
        let fields = tree
            .get("fields")
            .and_then(serde_json::Value::as_object)
            .ok_or_else(|| OrmError::validation("entity tree is missing its 'fields' block"))?;
        let mut values = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            values.push((name.clone(), Value::from_json(value)?));
        }
        let entity = self.create(values)?;
        if let Some(children) = tree.get("children").and_then(serde_json::Value::as_object) {
            for (key_name, list) in children {
                let fk = session.registry().resolve(key_name)?;
                let child_store = session.store(fk.foreign_entity())?;
                let list = list.as_array().ok_or_else(|| {
                    OrmError::validation(format!(
                        "children block '{key_name}' must be an array of entity trees"
                    ))
                })?;
                for item in list {
                    let child = child_store.from_tree(session, item)?;
                    entity.add_owned_instance(session, key_name, &child)?;
                }
            }
        }
        Ok(entity)
    }
}
