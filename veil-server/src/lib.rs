pub mod auth;
pub mod handlers;
pub mod routes;

pub use routes::{AppState, build_router};
