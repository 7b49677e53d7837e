//! Authentication middleware and extractors.

use axum::{
    extract::{FromRef, FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use log::{debug, warn};
use std::sync::Arc;

use super::{AuthConfig, AuthError, Claims, DevUser, Role};

/// Extract a Bearer token from an Authorization header value.
fn bearer_token_from_header(header_value: &str) -> Result<&str, AuthError> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next().ok_or(AuthError::InvalidAuthHeader)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }

    let token = parts.next().ok_or(AuthError::InvalidAuthHeader)?;
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }

    if parts.next().is_some() {
        return Err(AuthError::InvalidAuthHeader);
    }

    Ok(token)
}

fn token_from_cookie_header<'a>(cookie_header: &'a str, cookie_name: &str) -> Option<&'a str> {
    cookie_header.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name.trim() == cookie_name {
            Some(value.trim())
        } else {
            None
        }
    })
}

fn token_from_query(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key == "token" {
            urlencoding::decode(value).ok().map(|s| s.into_owned())
        } else {
            None
        }
    })
}

/// Authentication state shared across handlers.
#[derive(Clone)]
pub struct AuthState {
    config: Arc<AuthConfig>,
    decoding_key: Option<DecodingKey>,
}

impl AuthState {
    /// Create new auth state from config.
    /// Resolves `env:VAR_NAME` syntax in jwt_secret at construction time.
    pub fn new(mut config: AuthConfig) -> Self {
        if let Ok(Some(resolved)) = config.resolve_jwt_secret() {
            config.jwt_secret = Some(resolved);
        }

        let decoding_key = config
            .jwt_secret
            .as_ref()
            .map(|s| DecodingKey::from_secret(s.as_bytes()));

        Self {
            config: Arc::new(config),
            decoding_key,
        }
    }

    pub fn is_dev_mode(&self) -> bool {
        self.config.dev_mode
    }

    pub fn dev_users(&self) -> &[DevUser] {
        &self.config.dev_users
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.config.allowed_origins
    }

    /// Validate credentials in dev mode with bcrypt verification.
    pub fn validate_dev_credentials(&self, username: &str, password: &str) -> Option<&DevUser> {
        if !self.config.dev_mode {
            return None;
        }

        self.config
            .dev_users
            .iter()
            .find(|u| (u.id == username || u.email == username) && u.verify_password(password))
    }

    /// Validate a JWT token. In dev mode, `dev:<user_id>` tokens resolve to
    /// the matching configured dev user.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        if self.config.dev_mode {
            if let Some(user_id) = token.strip_prefix("dev:") {
                return self.dev_user_claims(user_id);
            }
        }

        let decoding_key = self
            .decoding_key
            .as_ref()
            .ok_or_else(|| AuthError::Internal("no JWT secret configured".to_string()))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear(); // Allow missing iss/aud

        let token_data = decode::<Claims>(token, decoding_key, &validation).map_err(|e| {
            warn!("JWT validation failed: {e:?}");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        Ok(token_data.claims)
    }

    fn dev_user_claims(&self, user_id: &str) -> Result<Claims, AuthError> {
        let user = self
            .config
            .dev_users
            .iter()
            .find(|u| u.id == user_id)
            .ok_or(AuthError::UserNotFound)?;

        Ok(Claims {
            sub: user.id.clone(),
            iss: Some("dev".to_string()),
            aud: None,
            exp: Utc::now().timestamp() + 3600 * 24,
            iat: Some(Utc::now().timestamp()),
            email: Some(user.email.clone()),
            name: Some(user.name.clone()),
            preferred_username: Some(user.id.clone()),
            roles: vec![user.role.to_string()],
            role: Some(user.role.to_string()),
        })
    }

    pub fn generate_dev_token(&self, user: &DevUser) -> Result<String, AuthError> {
        self.generate_token(&user.id, &user.email, &user.name, &user.role.to_string())
    }

    /// Generate an HS256 JWT for a user. 24 hour expiry.
    pub fn generate_token(
        &self,
        user_id: &str,
        email: &str,
        name: &str,
        role: &str,
    ) -> Result<String, AuthError> {
        use jsonwebtoken::{EncodingKey, Header, encode};

        let secret = self
            .config
            .jwt_secret
            .as_ref()
            .ok_or_else(|| AuthError::Internal("no JWT secret configured".to_string()))?;

        let claims = Claims {
            sub: user_id.to_string(),
            iss: Some("rebelz-backend".to_string()),
            aud: None,
            exp: Utc::now().timestamp() + 3600 * 24,
            iat: Some(Utc::now().timestamp()),
            email: Some(email.to_string()),
            name: Some(name.to_string()),
            preferred_username: Some(user_id.to_string()),
            roles: vec![role.to_string()],
            role: Some(role.to_string()),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| AuthError::Internal(e.to_string()))
    }
}

/// Authenticated user extracted from request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub claims: Claims,
}

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.claims.sub
    }

    pub fn role(&self) -> Role {
        self.claims.effective_role()
    }

    pub fn is_admin(&self) -> bool {
        self.claims.is_admin()
    }

    pub fn is_staff(&self) -> bool {
        self.claims.is_staff()
    }

    pub fn display_name(&self) -> &str {
        self.claims.display_name()
    }

    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.claims.sub.clone(),
            display_name: self.claims.display_name().to_string(),
        }
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthError::MissingAuthHeader)
    }
}

/// Minimal identity handed to the action bridge and the agent collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
}

/// Optional identity for the agent endpoints, which accept anonymous
/// callers. Reads a Bearer header or `token` query parameter directly, so it
/// works on routes outside the auth middleware. An invalid token degrades to
/// anonymous instead of rejecting the stream.
#[derive(Debug, Clone)]
pub struct OptionalIdentity(pub Option<Identity>);

impl<S> FromRequestParts<S> for OptionalIdentity
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthState::from_ref(state);

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| bearer_token_from_header(h).ok())
            .map(str::to_string)
            .or_else(|| parts.uri.query().and_then(token_from_query));

        let identity = token.and_then(|token| match auth.validate_token(&token) {
            Ok(claims) => {
                let user = CurrentUser { claims };
                Some(user.identity())
            }
            Err(e) => {
                warn!("agent stream credential rejected, continuing anonymous: {e}");
                None
            }
        });

        Ok(OptionalIdentity(identity))
    }
}

/// Authentication middleware.
///
/// Validates JWT tokens and injects `CurrentUser` into request extensions.
/// Supports multiple auth methods in priority order:
/// 1. Authorization: Bearer <token> header
/// 2. auth_token cookie
/// 3. token query parameter (for WebSocket connections)
/// 4. X-Dev-User header (dev mode only)
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    // Cookie auth for browser clients (EventSource/WebSocket can't set headers).
    let cookie_token = req
        .headers()
        .get(axum::http::header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookie_header| token_from_cookie_header(cookie_header, "auth_token"));

    let query_token = req.uri().query().and_then(token_from_query);

    let claims = if let Some(header) = auth_header {
        let token = bearer_token_from_header(header)?;
        auth.validate_token(token)?
    } else if let Some(token) = cookie_token {
        auth.validate_token(token)?
    } else if let Some(ref token) = query_token {
        auth.validate_token(token)?
    } else if auth.is_dev_mode() {
        if let Some(user_id) = req
            .headers()
            .get("X-Dev-User")
            .and_then(|h| h.to_str().ok())
        {
            debug!("using dev user: {user_id}");
            auth.validate_token(&format!("dev:{user_id}"))?
        } else {
            return Err(AuthError::MissingAuthHeader);
        }
    } else {
        return Err(AuthError::MissingAuthHeader);
    };

    let user = CurrentUser { claims };
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

/// Require a staff role (instructor or admin).
///
/// Use as an extractor in handlers that require staff access.
#[derive(Debug, Clone)]
pub struct RequireStaff(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireStaff
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthError::MissingAuthHeader)?;

        if !user.is_staff() {
            return Err(AuthError::InsufficientPermissions(
                "staff role required".to_string(),
            ));
        }

        Ok(RequireStaff(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_dev_user(id: &str, password: &str, role: Role) -> DevUser {
        let password_hash =
            bcrypt::hash(password, bcrypt::DEFAULT_COST).expect("failed to hash password");
        DevUser {
            id: id.to_string(),
            name: format!("{id} name"),
            email: format!("{id}@localhost"),
            password_hash,
            role,
        }
    }

    #[test]
    fn test_bearer_token_from_header() {
        assert_eq!(
            bearer_token_from_header("Bearer abc.def.ghi").unwrap(),
            "abc.def.ghi"
        );
        assert_eq!(
            bearer_token_from_header("bearer   token123").unwrap(),
            "token123"
        );

        for case in ["", "Bearer", "Bearer ", "Token x", "Bearer token extra"] {
            assert!(bearer_token_from_header(case).is_err(), "{case} should fail");
        }
    }

    #[test]
    fn test_token_from_query() {
        assert_eq!(token_from_query("token=abc&x=1"), Some("abc".to_string()));
        assert_eq!(token_from_query("x=1&token=a%2Bb"), Some("a+b".to_string()));
        assert_eq!(token_from_query("x=1"), None);
    }

    #[test]
    fn test_validate_dev_credentials() {
        let config = AuthConfig {
            dev_mode: true,
            dev_users: vec![
                make_dev_user("dev", "devpassword123", Role::Admin),
                make_dev_user("user", "userpassword123", Role::User),
            ],
            ..AuthConfig::default()
        };
        let state = AuthState::new(config);

        let user = state.validate_dev_credentials("dev", "devpassword123");
        assert_eq!(user.unwrap().role, Role::Admin);

        // email works as the login name too
        assert!(state.validate_dev_credentials("user@localhost", "userpassword123").is_some());
        assert!(state.validate_dev_credentials("dev", "wrong").is_none());
    }

    #[test]
    fn test_generate_and_validate_token() {
        let config = AuthConfig {
            dev_mode: true,
            dev_users: vec![make_dev_user("dev", "devpassword123", Role::Admin)],
            jwt_secret: Some("test-secret-for-unit-tests-minimum-32-chars".to_string()),
            ..AuthConfig::default()
        };
        let state = AuthState::new(config);

        let dev_user = &state.dev_users()[0];
        let token = state.generate_dev_token(dev_user).unwrap();

        let claims = state.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "dev");
        assert!(claims.is_admin());
    }

    #[test]
    fn test_dev_token_validation() {
        let config = AuthConfig {
            dev_mode: true,
            dev_users: vec![make_dev_user("instructor", "pw123456789", Role::Instructor)],
            ..AuthConfig::default()
        };
        let state = AuthState::new(config);

        let claims = state.validate_token("dev:instructor").unwrap();
        assert_eq!(claims.sub, "instructor");
        assert!(claims.is_staff());
        assert!(!claims.is_admin());

        assert!(state.validate_token("dev:unknown").is_err());
    }

    #[test]
    fn test_dev_token_rejected_outside_dev_mode() {
        let config = AuthConfig {
            dev_mode: false,
            jwt_secret: Some("test-secret-for-unit-tests-minimum-32-chars".to_string()),
            dev_users: vec![make_dev_user("dev", "pw123456789", Role::Admin)],
            ..AuthConfig::default()
        };
        let state = AuthState::new(config);
        assert!(state.validate_token("dev:dev").is_err());
    }
}
