//! Database schema, migrations, and query builders.

pub mod accounts;
pub mod migrations;
pub mod tables;
pub mod users;

pub use tables::*;

/// A built statement: SQL text plus bound values.
pub type Built = (String, sea_query::Values);
