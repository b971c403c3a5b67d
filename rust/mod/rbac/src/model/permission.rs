use rbac_core::{Attributes, now_rfc3339};
use serde::{Deserialize, Serialize};

use crate::error::RbacError;
use crate::model::derive_id;

pub const PERMISSION_TYPE_NORMAL: i64 = 1;
pub const PERMISSION_TYPE_MODULE: i64 = 2;

/// Whether a permission is a leaf grant or a module grouping other permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionKind {
    #[default]
    Normal,
    Module,
}

impl PermissionKind {
    pub fn as_i64(self) -> i64 {
        match self {
            PermissionKind::Normal => PERMISSION_TYPE_NORMAL,
            PermissionKind::Module => PERMISSION_TYPE_MODULE,
        }
    }

    pub fn from_i64(code: i64) -> Option<Self> {
        match code {
            PERMISSION_TYPE_NORMAL => Some(PermissionKind::Normal),
            PERMISSION_TYPE_MODULE => Some(PermissionKind::Module),
            _ => None,
        }
    }
}

/// An (action, object) grant.
///
/// Identity: `unique_id = hash(action + "-" + object_value)`. The alias is a
/// human-facing label with its own uniqueness domain, checked by
/// [`RbacService::check_alias_available`](crate::service::RbacService::check_alias_available).
///
/// Example:
///   action = "read", object_value = "report", object_alias = "Reports"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    /// Content-derived identifier (64 hex chars).
    pub unique_id: String,

    /// Human-readable label. Two identities must not share one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_alias: Option<String>,

    /// Resource being authorized.
    pub object_value: String,

    /// Verb being authorized.
    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Id of the module-kind permission this one belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,

    #[serde(rename = "type", default)]
    pub kind: PermissionKind,

    /// RFC 3339 creation timestamp.
    pub created_at: String,

    /// RFC 3339 last update timestamp.
    pub updated_at: String,
}

impl Permission {
    /// Build a leaf permission and derive its identity.
    pub fn new(action: &str, object_value: &str) -> Result<Self, RbacError> {
        if action.is_empty() {
            return Err(RbacError::InvalidIdentity("permission action is required".into()));
        }
        if object_value.is_empty() {
            return Err(RbacError::InvalidIdentity(
                "permission object value is required".into(),
            ));
        }

        let now = now_rfc3339();
        Ok(Self {
            unique_id: permission_unique_id(action, object_value),
            object_alias: None,
            object_value: object_value.to_string(),
            action: action.to_string(),
            description: None,
            module_id: None,
            kind: PermissionKind::Normal,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Build a permission from an attribute bag (`action`, `objectValue`,
    /// `objectAlias`, `description`, `moduleID`, `type`). Empty optional
    /// fields are treated as absent.
    pub fn from_attributes(attrs: &Attributes) -> Result<Self, RbacError> {
        let mut permission = Self::new(
            &attrs.get_string("action", ""),
            &attrs.get_string("objectValue", ""),
        )?;
        permission.object_alias = attrs.get_opt_string("objectAlias");
        permission.description = attrs.get_opt_string("description");
        permission.module_id = attrs.get_opt_string("moduleID");

        let code = attrs.get_i64("type", PERMISSION_TYPE_NORMAL);
        permission.kind = PermissionKind::from_i64(code)
            .ok_or_else(|| RbacError::Validation(format!("unknown permission type {}", code)))?;

        Ok(permission)
    }

    pub fn composed_unique_id(&self) -> String {
        permission_unique_id(&self.action, &self.object_value)
    }

    /// Name under which the permission is registered with a policy engine:
    /// `{alias}-{first 5 id chars}`, or the bare id when there is no alias.
    pub fn rule_name(&self) -> String {
        match &self.object_alias {
            Some(alias) => {
                let short = self.unique_id.get(..5).unwrap_or(&self.unique_id);
                format!("{}-{}", alias, short)
            }
            None => self.unique_id.clone(),
        }
    }

    pub fn is_module(&self) -> bool {
        self.kind == PermissionKind::Module
    }
}

/// Identity of the permission granting `action` on `object_value`.
pub fn permission_unique_id(action: &str, object_value: &str) -> String {
    derive_id(&[action, object_value])
}
