//! Authentication configuration.

use super::Role;
use serde::{Deserialize, Serialize};

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enable development mode (bypass JWT validation).
    pub dev_mode: bool,

    /// JWT secret for HS256. Supports `env:VAR_NAME` indirection.
    /// REQUIRED when dev_mode is false.
    pub jwt_secret: Option<String>,

    /// Development users (only used in dev mode).
    /// Passwords are stored as bcrypt hashes.
    pub dev_users: Vec<DevUser>,

    /// Allowed CORS origins.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            // No default JWT secret, must be explicitly configured
            jwt_secret: None,
            dev_users: Vec::new(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8080".to_string(),
            ],
        }
    }
}

impl AuthConfig {
    /// Resolve the JWT secret, expanding `env:VAR_NAME` syntax.
    pub fn resolve_jwt_secret(&self) -> Result<Option<String>, ConfigValidationError> {
        match &self.jwt_secret {
            None => Ok(None),
            Some(value) => {
                if let Some(var_name) = value.strip_prefix("env:") {
                    match std::env::var(var_name) {
                        Ok(secret) if !secret.is_empty() => Ok(Some(secret)),
                        Ok(_) => Err(ConfigValidationError::EnvVarEmpty(var_name.to_string())),
                        Err(_) => Err(ConfigValidationError::EnvVarNotFound(var_name.to_string())),
                    }
                } else {
                    Ok(Some(value.clone()))
                }
            }
        }
    }

    /// Validate the configuration for the current mode.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.dev_mode {
            let secret = self.resolve_jwt_secret()?;
            match secret {
                None => return Err(ConfigValidationError::MissingJwtSecret),
                Some(secret) if secret.len() < 32 => {
                    return Err(ConfigValidationError::JwtSecretTooShort);
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// JWT secret is required in production mode.
    MissingJwtSecret,
    /// JWT secret is too short (minimum 32 characters).
    JwtSecretTooShort,
    /// Environment variable not found (for `env:VAR_NAME` syntax).
    EnvVarNotFound(String),
    /// Environment variable is empty (for `env:VAR_NAME` syntax).
    EnvVarEmpty(String),
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingJwtSecret => {
                write!(
                    f,
                    "JWT secret is required when dev_mode is false. Set jwt_secret in config or point it at an environment variable with env:VAR_NAME."
                )
            }
            Self::JwtSecretTooShort => {
                write!(f, "JWT secret must be at least 32 characters long.")
            }
            Self::EnvVarNotFound(var) => {
                write!(f, "Environment variable '{var}' not found (referenced via env:{var} in config).")
            }
            Self::EnvVarEmpty(var) => {
                write!(f, "Environment variable '{var}' is empty (referenced via env:{var} in config).")
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Development user configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevUser {
    /// User ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Password hash (bcrypt).
    pub password_hash: String,
    /// Role.
    pub role: Role,
}

impl DevUser {
    /// Verify a password against this user's hash.
    pub fn verify_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_secret() {
        let config = AuthConfig::default();
        assert!(!config.dev_mode);
        assert!(config.jwt_secret.is_none());
        assert!(config.dev_users.is_empty());
    }

    #[test]
    fn test_dev_mode_valid_without_secret() {
        let config = AuthConfig {
            dev_mode: true,
            ..AuthConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_production_requires_long_secret() {
        let mut config = AuthConfig::default();
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigValidationError::MissingJwtSecret
        );

        config.jwt_secret = Some("tooshort".to_string());
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigValidationError::JwtSecretTooShort
        );

        config.jwt_secret = Some("a-very-long-and-secure-jwt-secret-32+".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_env_indirection() {
        // SAFETY: test-only environment variable with a unique name
        unsafe {
            std::env::set_var("REBELZ_TEST_JWT_SECRET", "secret-from-env-at-least-32-chars-x");
        }
        let config = AuthConfig {
            jwt_secret: Some("env:REBELZ_TEST_JWT_SECRET".to_string()),
            ..AuthConfig::default()
        };
        assert_eq!(
            config.resolve_jwt_secret().unwrap(),
            Some("secret-from-env-at-least-32-chars-x".to_string())
        );
        // SAFETY: cleaning up test environment variable
        unsafe {
            std::env::remove_var("REBELZ_TEST_JWT_SECRET");
        }

        let missing = AuthConfig {
            jwt_secret: Some("env:REBELZ_TEST_MISSING_VAR".to_string()),
            ..AuthConfig::default()
        };
        assert_eq!(
            missing.resolve_jwt_secret().unwrap_err(),
            ConfigValidationError::EnvVarNotFound("REBELZ_TEST_MISSING_VAR".to_string())
        );
    }

    #[test]
    fn test_dev_user_password_verification() {
        let hash = bcrypt::hash("correctpassword", bcrypt::DEFAULT_COST).unwrap();
        let user = DevUser {
            id: "test".to_string(),
            name: "Test".to_string(),
            email: "test@example.com".to_string(),
            password_hash: hash,
            role: Role::User,
        };
        assert!(user.verify_password("correctpassword"));
        assert!(!user.verify_password("wrongpassword"));
        assert!(!user.verify_password(""));
    }
}
