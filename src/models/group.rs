use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::models::HabitType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    #[error("You are not a member of this group")]
    NotMember,
    #[error("Forbidden: {0}")]
    Forbidden(&'static str),
    #[error("Invalid role '{0}' (use admin or member)")]
    InvalidRole(String),
    #[error("Cannot remove the owner")]
    CannotRemoveOwner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    /// Owners and admins may edit the group and its habits.
    pub fn can_manage(&self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            _ => Err(anyhow::anyhow!("Unknown role: {}", s)),
        }
    }
}

pub fn require_manager(role: Role) -> Result<(), GroupError> {
    if role.can_manage() {
        Ok(())
    } else {
        Err(GroupError::Forbidden("only the owner or an admin can do that"))
    }
}

pub fn require_owner(role: Role) -> Result<(), GroupError> {
    if role == Role::Owner {
        Ok(())
    } else {
        Err(GroupError::Forbidden("only the owner can do that"))
    }
}

/// Only the owner changes roles, only to admin or member, and never their own.
pub fn check_role_change(requester: Role, target: Role, new_role: &str) -> Result<Role, GroupError> {
    require_owner(requester)?;
    if target == Role::Owner {
        return Err(GroupError::Forbidden("the owner's role cannot be changed"));
    }
    match Role::from_str(new_role) {
        Ok(role @ (Role::Admin | Role::Member)) => Ok(role),
        _ => Err(GroupError::InvalidRole(new_role.to_string())),
    }
}

/// Members may leave on their own; owners and admins may remove others.
/// The owner is never removed, not even by themselves.
pub fn check_removal(
    requester_id: i64,
    requester_role: Role,
    target_id: i64,
    target_role: Role,
) -> Result<(), GroupError> {
    if target_role == Role::Owner {
        return Err(GroupError::CannotRemoveOwner);
    }
    if requester_id != target_id {
        require_manager(requester_role)?;
    }
    Ok(())
}

/// Eight upper-case hex characters, e.g. `3F9A0C1B`.
pub fn generate_join_code() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub emoji: String,
    pub color: String,
    pub join_code: String,
    pub end_date: Option<String>,
    pub owner_id: i64,
}

/// Optional group fields for create and edit.
#[derive(Debug, Clone, Default)]
pub struct GroupDraft {
    pub name: Option<String>,
    pub description: Option<String>,
    pub emoji: Option<String>,
    pub color: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub role: Role,
    pub joined_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupHabit {
    pub id: i64,
    pub group_id: i64,
    pub name: String,
    pub habit_type: HabitType,
    pub color: String,
    pub target_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessage {
    pub id: i64,
    pub group_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub text: String,
    pub created_at: String,
}
