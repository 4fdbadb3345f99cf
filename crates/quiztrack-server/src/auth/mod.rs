pub mod handlers;
pub mod jwt;
