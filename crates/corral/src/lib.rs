//! # corral
//!
//! A lightweight, dialect-agnostic ORM core for Rust.
//!
//! ## Features
//!
//! - **Identity-mapped stores**: at most one live [`Entity`] per row; every
//!   fetch of the same id returns the same shared instance
//! - **Dirty tracking**: entities diff pending changes against stored state
//!   and write only what changed
//! - **Declarative selectors**: [`Selector`]/[`Term`] translate to SQL with
//!   IN lists, comparisons, BETWEEN, NULL checks, and correlated subqueries
//! - **Owned relationship graphs**: lazily cached children with cascading
//!   save/delete and eager loading through [`RelationTree`]
//! - **Backend-delegated SQL text**: quoting, escaping, and pagination
//!   clauses come from the [`Connection`], never from this layer
//! - **Explicit registration**: an application-owned [`Registry`] and
//!   [`Session`] replace process-global model state
//!
//! ## Getting started
//!
//! ```ignore
//! use corral::prelude::*;
//!
//! let mut registry = Registry::new();
//! registry.define(
//!     EntityType::builder("Animal", "animal")
//!         .database("zoo")
//!         .field("name", FieldType::Text)
//!         .field("legs", FieldType::Numeric)
//!         .build()?,
//! )?;
//!
//! let session = Session::new(registry);
//! session.register_connection("zoo", my_connection)?;
//!
//! let animals = session.store("Animal")?;
//! let cow = animals.get(Selector::key(3))?;
//! let quadrupeds = animals.get_all(&Selector::field("legs", Term::eq(4)), &["name"])?;
//! ```
//!
//! This layer assumes single-threaded, request-scoped use: one session per
//! logical unit of work. See the concurrency notes on [`Session`].

pub mod connection;
pub mod descriptor;
pub mod dialect;
pub mod eager;
pub mod entity;
pub mod error;
pub mod export;
pub mod field;
pub mod ident;
pub mod prelude;
pub mod query;
pub mod registry;
pub mod session;
pub mod store;
pub mod value;

pub use connection::{Connection, InsertOutcome, Row};
pub use descriptor::{EntityType, EntityTypeBuilder};
pub use dialect::{Dialect, MySqlDialect, SqlServerDialect};
pub use eager::RelationTree;
pub use entity::Entity;
pub use error::{OrmError, OrmResult};
pub use field::FieldType;
pub use query::{Compare, QueryBuilder, Selector, Term};
pub use registry::{ForeignKey, Registry};
pub use session::Session;
pub use store::Store;
pub use value::Value;
