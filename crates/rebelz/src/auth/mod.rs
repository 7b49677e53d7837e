//! Authentication module.
//!
//! JWT validation middleware with support for:
//! - HS256 token validation (production)
//! - Dev bypass mode with configurable test users
//!
//! The agent endpoints additionally accept anonymous callers through the
//! `OptionalIdentity` extractor.

mod claims;
mod config;
mod error;
mod middleware;

pub use claims::{Claims, Role};
pub use config::{AuthConfig, ConfigValidationError, DevUser};
pub use error::AuthError;
pub use middleware::{
    AuthState, CurrentUser, Identity, OptionalIdentity, RequireStaff, auth_middleware,
};
