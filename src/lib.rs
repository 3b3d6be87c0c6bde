//! Customer / Item / Review schema on SQLite.
//!
//! `Database` owns the rows and keeps both sides of each relationship
//! consistent, `SchemaGraph` is the loaded ownership graph, and
//! `serialize` renders graph nodes to JSON under back-edge exclusion rules.

pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod logging;
pub mod models;
pub mod serialize;

pub use config::DbConfig;
pub use db::Database;
pub use error::{Result, StoreError};
pub use graph::SchemaGraph;
pub use models::{Customer, Item, Review};
pub use serialize::{Entity, SerializeRules};
