//! JWT claims and user roles.

use serde::{Deserialize, Serialize};

/// User role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular member.
    #[default]
    User,
    /// Instructor. Staff, but below admin.
    Instructor,
    /// Administrator.
    Admin,
}

impl Role {
    /// Instructors and admins are staff.
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Instructor | Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Instructor => write!(f, "instructor"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "instructor" => Ok(Role::Instructor),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// JWT claims structure.
///
/// Supports both standard OIDC claims and custom claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,

    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,

    /// Audience.
    #[serde(default)]
    pub aud: Option<Vec<String>>,

    /// Expiration time (as Unix timestamp).
    pub exp: i64,

    /// Issued at (as Unix timestamp).
    #[serde(default)]
    pub iat: Option<i64>,

    /// User's email.
    #[serde(default)]
    pub email: Option<String>,

    /// User's name.
    #[serde(default)]
    pub name: Option<String>,

    /// User's preferred username.
    #[serde(default)]
    pub preferred_username: Option<String>,

    /// User's roles.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Custom role claim (alternative to roles array).
    #[serde(default)]
    pub role: Option<String>,
}

impl Claims {
    /// Get the effective role for the user. The highest role named in
    /// either claim wins.
    pub fn effective_role(&self) -> Role {
        let mut best = Role::User;
        let candidates = self.role.iter().chain(self.roles.iter());
        for candidate in candidates {
            match candidate.to_lowercase().as_str() {
                "admin" => return Role::Admin,
                "instructor" => best = Role::Instructor,
                _ => {}
            }
        }
        best
    }

    pub fn is_admin(&self) -> bool {
        self.effective_role() == Role::Admin
    }

    pub fn is_staff(&self) -> bool {
        self.effective_role().is_staff()
    }

    /// Get the display name for the user.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.preferred_username.as_deref())
            .or(self.email.as_deref())
            .unwrap_or(&self.sub)
    }
}
