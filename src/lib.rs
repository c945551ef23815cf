//! Tributary – a federation layer over independently administered record sources.
//!
//! Every source, be it a literal table, an SQLite table or a composition of
//! other sources, implements the [`datasource::Datasource`] contract. Rows are
//! [`dataset::Dataset`]s addressed by column name with an opaque key, and
//! queries are conjunctions of [`query::QueryPart`]s with optional leading and
//! trailing `*` wildcards.
//!
//! ## Modules
//! * [`dataset`] – Schemas, rows and result collections.
//! * [`query`] – Query parts, wildcard matching and named queries.
//! * [`datasource`] – The datasource contract and timeout bookkeeping.
//! * [`ram`], [`sqlite`] – Backends for literal tables and SQLite tables.
//! * [`union`], [`attach`], [`overlay`], [`prefer`], [`schema`] – Composite
//!   operators, each wrapping one or two already constructed datasources.
//! * [`transform`] – Pseudo-columns computed from a row's real columns.
//! * [`search`] – Free-text search with progressive relaxation.
//! * [`registry`] – Builds the named datasource graph from declarations.
//! * [`config`], [`interface`], [`server`] – Settings, the application facade
//!   and its HTTP surface.
//!
//! ## Composition
//! Sources are declared in order and may only reference sources declared
//! before them:
//! ```toml
//! [[datasource]]
//! name = "people"
//! type = "conf"
//! schema = ["id", "Vorname", "Nachname"]
//! keys = ["id"]
//! data = [["1", "Anna", "Müller"]]
//!
//! [[datasource]]
//! name = "corrections"
//! type = "conf"
//! schema = ["id", "Vorname", "Nachname"]
//! keys = ["id"]
//! data = [["1", "Anna", "Meier"]]
//!
//! [[datasource]]
//! name = "main"
//! type = "prefer"
//! source = "people"
//! over = "corrections"
//! ```
//! A node that cannot be constructed is logged and skipped; the rest of the
//! graph is still built.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tributary::datasource::Datasource;
//! use tributary::query::QueryPart;
//! use tributary::ram::RamDatasource;
//! use tributary::union::UnionDatasource;
//!
//! let mut a = RamDatasource::new("a", vec!["x".into()]).unwrap();
//! a.insert("1", [("x", "1")]).unwrap();
//! let mut b = RamDatasource::new("b", vec!["x".into()]).unwrap();
//! b.insert("2", [("x", "2")]).unwrap();
//! let union = UnionDatasource::new("u", Arc::new(a), Arc::new(b)).unwrap();
//! let found = union.find(&[QueryPart::new("x", "*")], Duration::from_secs(1)).unwrap();
//! assert_eq!(found.len(), 2);
//! ```

pub mod attach;
pub mod config;
pub mod dataset;
pub mod datasource;
pub mod error;
pub mod interface;
pub mod overlay;
pub mod prefer;
pub mod query;
pub mod ram;
pub mod registry;
pub mod schema;
pub mod search;
pub mod server;
pub mod sqlite;
pub mod transform;
pub mod union;
