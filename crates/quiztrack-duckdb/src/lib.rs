pub mod analytics_impl;
pub mod backend;
pub mod guard;
pub mod queries;
pub mod schema;
pub mod site;

pub use backend::DuckDbBackend;

/// Re-export the `duckdb` crate so consumers (especially tests) can use
/// `quiztrack_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
