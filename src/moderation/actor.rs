/// Actors and their roles
use crate::error::{ModerationError, ModResult};
use serde::{Deserialize, Serialize};

/// Role levels, ordered by privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Ordinary community member
    Member,
    /// Can review reports and appeals
    Moderator,
    /// Full access, including hard deletes
    Administrator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Moderator => "moderator",
            Role::Administrator => "administrator",
        }
    }

    pub fn from_str(s: &str) -> ModResult<Self> {
        match s.to_lowercase().as_str() {
            "member" => Ok(Role::Member),
            "moderator" => Ok(Role::Moderator),
            "administrator" | "admin" => Ok(Role::Administrator),
            _ => Err(ModerationError::Validation(format!("Invalid role: {}", s))),
        }
    }

    /// Check if this role can perform actions requiring another role
    pub fn can_act_as(&self, required: Role) -> bool {
        self >= &required
    }

    pub fn is_staff(&self) -> bool {
        self.can_act_as(Role::Moderator)
    }
}

/// An authenticated identity acting on the desk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn member(id: impl Into<String>) -> Self {
        Self::new(id, Role::Member)
    }

    pub fn moderator(id: impl Into<String>) -> Self {
        Self::new(id, Role::Moderator)
    }

    pub fn administrator(id: impl Into<String>) -> Self {
        Self::new(id, Role::Administrator)
    }
}
