//! HTTP query API
//!
//! Read-only search endpoints plus health, status and reindex, mounted
//! under `/api/v1`.

pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;

pub use handlers::AppState;
pub use routes::create_router;
pub use server::HttpServer;
