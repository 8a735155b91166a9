//! Convenient imports for typical `corral` usage.
//!
//! This module is intentionally small and focused on the most common APIs so
//! applications can start with:
//!
//! ```ignore
//! use corral::prelude::*;
//! ```

pub use crate::{
    Connection, Entity, EntityType, FieldType, OrmError, OrmResult, Registry, RelationTree,
    Selector, Session, Store, Term, Value,
};
