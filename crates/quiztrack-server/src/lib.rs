pub mod app;
pub mod auth;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod recorder;
pub mod routes;
pub mod state;
