//! Core data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role granted to an identity
#[derive(Debug, Clone, Copy, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    /// Stored form, prefixed with `ROLE_`
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "ROLE_USER",
            Role::Admin => "ROLE_ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    /// Accepts both the stored form (`ROLE_ADMIN`) and the bare name (`admin`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_uppercase();
        match upper.strip_prefix("ROLE_").unwrap_or(&upper) {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// A registered user record
///
/// `password_hash` holds a PHC-format verifier, never the plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(username: impl Into<String>, password_hash: String, role: Role) -> Self {
        Self {
            username: username.into(),
            password_hash,
            role,
            created_at: Utc::now(),
        }
    }
}

/// Public view of an identity, safe to render or serialize
#[derive(Debug, Clone, Serialize)]
pub struct IdentityInfo {
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&Identity> for IdentityInfo {
    fn from(identity: &Identity) -> Self {
        Self {
            username: identity.username.clone(),
            role: identity.role,
            created_at: identity.created_at,
        }
    }
}

/// Login or registration form submission
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both fields must be present after trimming the username
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}
