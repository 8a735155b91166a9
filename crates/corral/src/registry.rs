//! Model registry: entity types and named foreign keys.
//!
//! The registry is an explicit value built once at startup and handed to the
//! [`Session`](crate::session::Session); there is no process-global state.
//! Registration errors are configuration errors and surface immediately.

use crate::descriptor::EntityType;
use crate::error::{OrmError, OrmResult};
use crate::ident::check_ident;
use std::collections::BTreeMap;
use std::rc::Rc;

/// A named relationship between two entity types.
///
/// The primary side owns the referenced ID columns; the foreign side carries
/// them. `owned` relationships additionally participate in cascade
/// save/delete and in the primary side's owned-instance caches.
#[derive(Debug)]
pub struct ForeignKey {
    name: String,
    primary_entity: String,
    primary_columns: Vec<String>,
    foreign_entity: String,
    foreign_columns: Vec<String>,
    owned: bool,
}

impl ForeignKey {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_entity(&self) -> &str {
        &self.primary_entity
    }

    pub fn primary_columns(&self) -> &[String] {
        &self.primary_columns
    }

    pub fn foreign_entity(&self) -> &str {
        &self.foreign_entity
    }

    pub fn foreign_columns(&self) -> &[String] {
        &self.foreign_columns
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// The single primary/foreign column pair, or a validation error for
    /// multi-column keys. Relationship traversal is a stated single-column
    /// limitation.
    pub fn single_column_pair(&self) -> OrmResult<(&str, &str)> {
        if self.primary_columns.len() != 1 || self.foreign_columns.len() != 1 {
            return Err(OrmError::validation(format!(
                "foreign key '{}' spans multiple columns; traversal supports single-column keys only",
                self.name
            )));
        }
        Ok((&self.primary_columns[0], &self.foreign_columns[0]))
    }
}

/// Registry of entity types and foreign keys.
#[derive(Debug, Default)]
pub struct Registry {
    entities: BTreeMap<String, Rc<EntityType>>,
    keys: BTreeMap<String, Rc<ForeignKey>>,
    owned: BTreeMap<String, Vec<Rc<ForeignKey>>>,
    referencing: BTreeMap<String, Vec<Rc<ForeignKey>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type. Duplicate names are configuration errors.
    pub fn define(&mut self, ty: EntityType) -> OrmResult<()> {
        let name = ty.name().to_string();
        if self.entities.contains_key(&name) {
            return Err(OrmError::configuration(format!(
                "entity type '{name}' is already defined"
            )));
        }
        self.entities.insert(name, Rc::new(ty));
        Ok(())
    }

    /// Look up an entity type.
    pub fn entity_type(&self, name: &str) -> OrmResult<Rc<EntityType>> {
        self.entities.get(name).cloned().ok_or_else(|| {
            OrmError::configuration(format!("entity type '{name}' was not defined"))
        })
    }

    /// Declare a named foreign key.
    ///
    /// `foreign_type` is the entity carrying `foreign_columns`; the primary
    /// columns are implied by `primary_type`'s ID fields. With `owned = true`
    /// the key is also recorded in the primary side's owned index, enabling
    /// owned-instance caches and cascade save/delete.
    pub fn declare_foreign_key<S>(
        &mut self,
        name: impl Into<String>,
        foreign_type: &str,
        foreign_columns: impl IntoIterator<Item = S>,
        primary_type: &str,
        owned: bool,
    ) -> OrmResult<()>
    where
        S: Into<String>,
    {
        let name = name.into();
        if self.keys.contains_key(&name) {
            return Err(OrmError::configuration(format!(
                "foreign key '{name}' was already declared"
            )));
        }
        let primary = self.entity_type(primary_type)?;
        let foreign = self.entity_type(foreign_type)?;
        let foreign_columns: Vec<String> =
            foreign_columns.into_iter().map(Into::into).collect();
        for column in &foreign_columns {
            check_ident(column)?;
        }
        let primary_columns = primary.id_fields().to_vec();
        if primary_columns.len() != foreign_columns.len() {
            return Err(OrmError::configuration(format!(
                "foreign key '{name}': {} primary column(s) vs {} foreign column(s)",
                primary_columns.len(),
                foreign_columns.len()
            )));
        }
        let key = Rc::new(ForeignKey {
            name: name.clone(),
            primary_entity: primary.name().to_string(),
            primary_columns,
            foreign_entity: foreign.name().to_string(),
            foreign_columns,
            owned,
        });
        if owned {
            self.owned
                .entry(key.primary_entity.clone())
                .or_default()
                .push(Rc::clone(&key));
        }
        self.referencing
            .entry(key.foreign_entity.clone())
            .or_default()
            .push(Rc::clone(&key));
        self.keys.insert(name, key);
        Ok(())
    }

    /// Resolve a foreign key by name.
    pub fn resolve(&self, name: &str) -> OrmResult<Rc<ForeignKey>> {
        self.keys.get(name).cloned().ok_or_else(|| {
            OrmError::configuration(format!("foreign key '{name}' was not declared"))
        })
    }

    /// Owned relationships where `entity` is the primary side.
    pub fn owned_keys(&self, entity: &str) -> &[Rc<ForeignKey>] {
        self.owned.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Relationships where `entity` is the foreign side.
    pub fn referencing_keys(&self, entity: &str) -> &[Rc<ForeignKey>] {
        self.referencing
            .get(entity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        let mut reg = Registry::new();
        reg.define(EntityType::builder("Animal", "animal").build().unwrap())
            .unwrap();
        reg.define(
            EntityType::builder("AnimalInventory", "animal_inventory")
                .id_field("animal_id")
                .build()
                .unwrap(),
        )
        .unwrap();
        reg
    }

    #[test]
    fn duplicate_entity_type_is_configuration_error() {
        let mut reg = registry();
        let err = reg
            .define(EntityType::builder("Animal", "animal").build().unwrap())
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn declare_and_resolve() {
        let mut reg = registry();
        reg.declare_foreign_key("fk_inventory_animal", "AnimalInventory", ["animal_id"], "Animal", true)
            .unwrap();
        let key = reg.resolve("fk_inventory_animal").unwrap();
        assert_eq!(key.primary_entity(), "Animal");
        assert_eq!(key.primary_columns(), ["id".to_string()]);
        assert_eq!(key.foreign_columns(), ["animal_id".to_string()]);
        assert!(key.is_owned());
        assert_eq!(reg.owned_keys("Animal").len(), 1);
        assert_eq!(reg.referencing_keys("AnimalInventory").len(), 1);
    }

    #[test]
    fn duplicate_key_name_is_configuration_error() {
        let mut reg = registry();
        reg.declare_foreign_key("fk", "AnimalInventory", ["animal_id"], "Animal", false)
            .unwrap();
        let err = reg
            .declare_foreign_key("fk", "AnimalInventory", ["animal_id"], "Animal", false)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn unknown_key_is_configuration_error() {
        let reg = registry();
        assert!(reg.resolve("nope").unwrap_err().is_configuration());
    }

    #[test]
    fn column_multiplicity_must_match() {
        let mut reg = registry();
        let err = reg
            .declare_foreign_key("fk2", "AnimalInventory", ["a", "b"], "Animal", false)
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
