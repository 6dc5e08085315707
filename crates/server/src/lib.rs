//! imgshift Server - HTTP REST API for image upload and transformation
//!
//! This crate exposes the imgshift service over HTTP:
//!
//! - **Accounts**: registration and login issuing short-lived bearer tokens
//! - **Images**: owner-scoped upload, listing, retrieval, deletion and transform
//! - **Compress**: anonymous batch transform of uploaded files
//! - **Health & Metrics**: liveness/readiness probes and Prometheus metrics
//!
//! # Features
//!
//! - **Authentication**: HS256 JWT bearer tokens, argon2 password hashes
//! - **Middleware**: Rate limiting, compression, CORS, request ID tracking, structured logging
//! - **Configuration**: Environment variable and file-based configuration
//! - **Error Handling**: One JSON envelope with error codes for every failure
//! - **Graceful Shutdown**: Proper signal handling for production deployments
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! ## Public Endpoints
//!
//! - `GET /` - API information
//! - `GET /api/v1/health-check` - Liveness probe
//! - `GET /ready` - Readiness probe
//! - `GET /metrics` - Prometheus metrics
//! - `POST /api/v1/auth/register` - Create an account
//! - `POST /api/v1/auth/login` - Obtain a token
//! - `POST /api/v1/compress` - Batch transform (rate limited)
//!
//! ## Protected Endpoints (Bearer token required, rate limited)
//!
//! - `POST /api/v1/images` - Upload images
//! - `GET /api/v1/images` - List own images
//! - `GET /api/v1/images/{id}` - Get one image
//! - `DELETE /api/v1/images/{id}` - Delete one image
//! - `POST /api/v1/images/{id}/transform` - Transform a stored image

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
