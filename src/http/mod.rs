//! HTTP API: routes, handlers and middleware

pub mod auth;
pub mod error;
pub mod middleware;
pub mod rooms;
pub mod routes;
pub mod social;

pub use error::AppError;
pub use routes::build_router;
