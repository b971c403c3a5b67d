use serde_json::{Value, json};

use rbac::{Permission, PermissionKind, RbacError, RbacService};
use rbac_core::Attributes;

type CmdResult = Result<Value, RbacError>;

fn parse_attrs(body: &str) -> Result<Attributes, RbacError> {
    serde_json::from_str(body)
        .map_err(|e| RbacError::Validation(format!("attributes must be a JSON object: {}", e)))
}

/// Flags of `perm add`.
pub struct NewPermission {
    pub action: String,
    pub object: String,
    pub alias: Option<String>,
    pub description: Option<String>,
    pub module: Option<String>,
    pub as_module: bool,
}

fn to_json<T: serde::Serialize>(v: &T) -> CmdResult {
    serde_json::to_value(v).map_err(|e| RbacError::Internal(e.to_string()))
}

pub fn add(svc: &RbacService, new: NewPermission) -> CmdResult {
    let mut permission = Permission::new(&new.action, &new.object)?;
    permission.object_alias = new.alias.filter(|a| !a.is_empty());
    permission.description = new.description.filter(|d| !d.is_empty());
    permission.module_id = new.module.filter(|m| !m.is_empty());
    if new.as_module {
        permission.kind = PermissionKind::Module;
    }

    let saved = svc.save_permission(permission)?;
    let mut out = to_json(&saved)?;
    out["rule_name"] = Value::String(saved.rule_name());
    Ok(out)
}

pub fn create(svc: &RbacService, body: &str) -> CmdResult {
    to_json(&svc.create_permission(&parse_attrs(body)?)?)
}

pub fn get(svc: &RbacService, id: &str) -> CmdResult {
    to_json(&svc.get_permission(id)?)
}

pub fn check_alias(svc: &RbacService, alias: &str, own_id: &str) -> CmdResult {
    svc.check_alias_available(alias, own_id)?;
    Ok(json!({ "alias": alias, "available": true }))
}

pub fn module(svc: &RbacService, id: &str) -> CmdResult {
    to_json(&svc.list_module_permissions(id)?)
}

pub fn delete(svc: &RbacService, id: &str) -> CmdResult {
    svc.delete_permission(id)?;
    Ok(json!({ "deleted": id }))
}
