//! Entity-type descriptors.
//!
//! An [`EntityType`] is the static, table-level half of an entity: logical
//! name, backing connection, table name, ID field(s), and per-column codecs.
//! Descriptors are built once at model-registration time and are immutable
//! afterwards; stores, query builders, and entities all read table metadata
//! from here instead of resolving it through type lookups.

use crate::error::{OrmError, OrmResult};
use crate::field::FieldType;
use crate::ident::check_ident;
use std::collections::BTreeMap;

/// Immutable descriptor for one entity type / table.
#[derive(Debug)]
pub struct EntityType {
    name: String,
    database: String,
    table: String,
    id_fields: Vec<String>,
    fields: BTreeMap<String, FieldType>,
    numeric_ids: bool,
}

impl EntityType {
    /// Start building a descriptor. `name` is the logical entity name used
    /// for store lookup and global unique ids; `table` is the SQL table.
    pub fn builder(name: impl Into<String>, table: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder {
            name: name.into(),
            database: "default".to_string(),
            table: table.into(),
            id_fields: vec!["id".to_string()],
            fields: BTreeMap::new(),
            numeric_ids: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The named connection this type is stored on.
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// The ID field list. Length 1 means a scalar key.
    pub fn id_fields(&self) -> &[String] {
        &self.id_fields
    }

    pub fn has_composite_key(&self) -> bool {
        self.id_fields.len() > 1
    }

    /// Codec for a column. Undeclared columns default to [`FieldType::Text`],
    /// except ID columns of a numeric-ID type, which default to
    /// [`FieldType::Numeric`].
    pub fn field_type(&self, column: &str) -> FieldType {
        if let Some(ft) = self.fields.get(column) {
            return *ft;
        }
        if self.numeric_ids && self.id_fields.iter().any(|f| f == column) {
            FieldType::Numeric
        } else {
            FieldType::Text
        }
    }

    /// Whether literals of the given column need quoting.
    pub fn requires_quoting(&self, column: &str) -> bool {
        self.field_type(column).requires_quoting()
    }
}

/// Builder for [`EntityType`]. The ID field set can only be assigned here;
/// once built it is immutable.
#[derive(Debug)]
pub struct EntityTypeBuilder {
    name: String,
    database: String,
    table: String,
    id_fields: Vec<String>,
    fields: BTreeMap<String, FieldType>,
    numeric_ids: bool,
}

impl EntityTypeBuilder {
    /// Name of the connection this type lives on (default `"default"`).
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.database = name.into();
        self
    }

    /// Use a single ID column (default `"id"`).
    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_fields = vec![field.into()];
        self
    }

    /// Use a composite key; the order given here is the order used when
    /// joining local unique ids.
    pub fn id_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.id_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Declare a column codec.
    pub fn field(mut self, column: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(column.into(), ty);
        self
    }

    /// Mark the ID column(s) as string-valued rather than numeric.
    pub fn string_ids(mut self) -> Self {
        self.numeric_ids = false;
        self
    }

    pub fn build(self) -> OrmResult<EntityType> {
        if self.name.is_empty() {
            return Err(OrmError::validation("entity type name cannot be empty"));
        }
        check_ident(&self.table)?;
        if self.id_fields.is_empty() {
            return Err(OrmError::validation(format!(
                "entity type '{}' must declare at least one ID field",
                self.name
            )));
        }
        for field in self.id_fields.iter().chain(self.fields.keys()) {
            check_ident(field)?;
        }
        Ok(EntityType {
            name: self.name,
            database: self.database,
            table: self.table,
            id_fields: self.id_fields,
            fields: self.fields,
            numeric_ids: self.numeric_ids,
        })
    }
}
