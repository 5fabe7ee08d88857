//! # Actix Middleware Library
//!
//! Shared middleware for the housing marketplace Actix services
//!
//! ## Modules
//! - `jwt_auth`: bearer-token identity provider (RS256 / HS256)
//! - `metrics`: Prometheus HTTP metrics middleware

pub mod jwt_auth;
pub mod metrics;

pub use jwt_auth::{bearer_token, Claims, JwtAuthMiddleware, JwtError, JwtValidator, UserId};
pub use metrics::MetricsMiddleware;
