use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Which side of an appointment the signed-in user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    #[default]
    Patient,
    Professional,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Professional => "professional",
        }
    }
}

// Anything the backend sends that is not "professional" is treated as a patient,
// which is the role with the fewest privileges on the call side.
impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "professional" => Role::Professional,
            _ => Role::Patient,
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "crate::ids::deserialize")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, alias = "user_type")]
    pub role: Role,
    /// Remaining profile fields, passed through untouched.
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            role,
            profile: Map::new(),
        }
    }

    pub fn is_professional(&self) -> bool {
        self.role == Role::Professional
    }

    /// Name shown to other participants; falls back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user: User,
}

/// Body returned by `/auth/login` and `/auth/register`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user: User,
}

/// Body returned by `/auth/me`.
#[derive(Debug, Clone, Deserialize)]
pub struct MeResponse {
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub user_type: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Role-specific profile fields (specialty, CRM number, birth date...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The subset of JWT claims the client looks at. The signature is never
/// checked client side; the server remains the authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: Option<Value>,
    pub exp: Option<i64>,
    pub iat: Option<i64>,
    pub email: Option<String>,
    pub role: Option<String>,
}
