//! HTTP surface: router, handlers, and auth middleware

pub mod middleware;
pub mod routes;

pub use routes::build_router;
