mod routes;
mod server;

pub use routes::{ErrorResponse, GenerateResponse, HealthCheckResponse, StatusQuery, routes};
pub use server::{DEFAULT_MAX_BODY_BYTES, ServerConfig, serve};
