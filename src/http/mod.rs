//! HTTP surface: router, health and admin endpoints

pub mod middleware;
pub mod routes;

pub use routes::build_router;
