use std::fmt;
use std::str::FromStr;

use rbac_core::{Attributes, now_rfc3339};
use serde::{Deserialize, Serialize};

use crate::error::RbacError;
use crate::model::derive_id;

pub const ROLE_SUPER_ADMIN_NAME: &str = "超级管理员";
pub const ROLE_ADMIN_NAME: &str = "管理员";
pub const ROLE_EMPLOYEE_NAME: &str = "普通员工";

/// Role classification.
///
/// `All` is a filter value for tree queries and is never stored on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleType {
    All,
    /// Built-in, cannot be deleted.
    System,
    /// User-defined.
    Normal,
}

impl RoleType {
    /// Numeric code stored in the `type` column.
    pub fn as_i64(self) -> i64 {
        match self {
            RoleType::All => 0,
            RoleType::System => 1,
            RoleType::Normal => 2,
        }
    }

    pub fn from_i64(code: i64) -> Option<Self> {
        match code {
            0 => Some(RoleType::All),
            1 => Some(RoleType::System),
            2 => Some(RoleType::Normal),
            _ => None,
        }
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoleType::All => "ALL",
            RoleType::System => "SYSTEM",
            RoleType::Normal => "NORMAL",
        };
        f.write_str(s)
    }
}

/// Accepts `ALL` / `SYSTEM` / `NORMAL` (any case) or the numeric code.
impl FromStr for RoleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<i64>() {
            return RoleType::from_i64(code).ok_or_else(|| format!("unknown role type code {}", code));
        }
        match s.to_ascii_uppercase().as_str() {
            "ALL" => Ok(RoleType::All),
            "SYSTEM" => Ok(RoleType::System),
            "NORMAL" => Ok(RoleType::Normal),
            _ => Err(format!("unknown role type '{}'", s)),
        }
    }
}

/// A node in the role tree.
///
/// Identity is content-derived: `unique_id = hash(parent_id or "" + "-" + name)`.
/// Two roles with the same parent and name are the same role. Renaming or
/// reparenting changes identity and goes through
/// [`RbacService::relocate_role`](crate::service::RbacService::relocate_role).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Content-derived identifier (64 hex chars).
    pub unique_id: String,

    /// Display name. Unique only together with the parent.
    pub name: String,

    /// Parent role id (None = root).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(rename = "type")]
    pub role_type: RoleType,

    /// Populated by the tree resolver, never stored.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Role>,

    /// RFC 3339 creation timestamp.
    pub created_at: String,

    /// RFC 3339 last update timestamp.
    pub updated_at: String,
}

impl Role {
    /// Build a role and derive its identity. An empty parent means root.
    pub fn new(parent_id: Option<&str>, name: &str, role_type: RoleType) -> Result<Self, RbacError> {
        if name.is_empty() {
            return Err(RbacError::InvalidIdentity("role name is required".into()));
        }
        if role_type == RoleType::All {
            return Err(RbacError::Validation(
                "role type ALL is a filter value and cannot be stored".into(),
            ));
        }

        let parent_id = parent_id.filter(|p| !p.is_empty());
        let now = now_rfc3339();
        Ok(Self {
            unique_id: role_unique_id(parent_id, name),
            name: name.to_string(),
            parent_id: parent_id.map(str::to_string),
            role_type,
            children: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Build a role from an attribute bag (`name`, `parentID`, `type`).
    /// A missing `type` defaults to NORMAL.
    pub fn from_attributes(attrs: &Attributes) -> Result<Self, RbacError> {
        let name = attrs.get_string("name", "");
        let parent_id = attrs.get_opt_string("parentID");
        let role_type = match attrs.get("type") {
            None => RoleType::Normal,
            Some(v) => {
                let raw = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                raw.parse::<RoleType>().map_err(RbacError::Validation)?
            }
        };
        Self::new(parent_id.as_deref(), &name, role_type)
    }

    /// Recompute the identity from the current parent and name.
    pub fn composed_unique_id(&self) -> String {
        role_unique_id(self.parent_id.as_deref(), &self.name)
    }

    /// Name under which the role is registered with a policy engine.
    pub fn rule_name(&self) -> &str {
        &self.unique_id
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_system(&self) -> bool {
        self.role_type == RoleType::System
    }

    /// Number of nodes in this subtree, self included.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Role::subtree_len).sum::<usize>()
    }
}

/// Identity of a role with the given parent (None = root) and name.
pub fn role_unique_id(parent_id: Option<&str>, name: &str) -> String {
    derive_id(&[parent_id.unwrap_or(""), name])
}

/// Identity of the super-admin seed role.
pub fn root_role_id() -> String {
    role_unique_id(None, ROLE_SUPER_ADMIN_NAME)
}

/// Identity of the admin seed role.
pub fn admin_role_id() -> String {
    role_unique_id(None, ROLE_ADMIN_NAME)
}

/// Identity of the employee seed role.
pub fn employee_role_id() -> String {
    role_unique_id(None, ROLE_EMPLOYEE_NAME)
}
