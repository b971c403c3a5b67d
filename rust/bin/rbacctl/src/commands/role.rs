use serde_json::{Value, json};

use rbac::{Conditions, RbacError, RbacService, Role, RoleType};
use rbac_core::Attributes;

type CmdResult = Result<Value, RbacError>;

fn parse_attrs(body: &str) -> Result<Attributes, RbacError> {
    serde_json::from_str(body)
        .map_err(|e| RbacError::Validation(format!("attributes must be a JSON object: {}", e)))
}

fn to_json<T: serde::Serialize>(v: &T) -> CmdResult {
    serde_json::to_value(v).map_err(|e| RbacError::Internal(e.to_string()))
}

fn parse_type(raw: &str) -> Result<RoleType, RbacError> {
    raw.parse::<RoleType>().map_err(RbacError::Validation)
}

pub fn seed(svc: &RbacService) -> CmdResult {
    to_json(&svc.seed_roles()?)
}

pub fn add(svc: &RbacService, name: &str, parent: Option<&str>, role_type: &str) -> CmdResult {
    let role = Role::new(parent, name, parse_type(role_type)?)?;
    to_json(&svc.save_role(role)?)
}

pub fn create(svc: &RbacService, body: &str) -> CmdResult {
    to_json(&svc.create_role(&parse_attrs(body)?)?)
}

pub fn get(svc: &RbacService, id: &str) -> CmdResult {
    to_json(&svc.get_role(id)?)
}

pub fn tree(svc: &RbacService, parent: Option<&str>, role_type: &str, recurse: bool) -> CmdResult {
    let nodes = svc.resolve_tree(&Conditions::new(), parse_type(role_type)?, parent, recurse)?;
    to_json(&nodes)
}

pub fn exists(svc: &RbacService, name: &str, parent: Option<&str>, exclude_self: bool) -> CmdResult {
    let role = Role::new(parent, name, RoleType::Normal)?;
    let exists = svc.role_exists(&role, exclude_self)?;
    Ok(json!({ "name": name, "exists": exists }))
}

pub fn relocate(svc: &RbacService, id: &str, parent: Option<&str>, name: &str) -> CmdResult {
    to_json(&svc.relocate_role(id, parent, name)?)
}

pub fn delete(svc: &RbacService, id: &str) -> CmdResult {
    svc.delete_role(id)?;
    Ok(json!({ "deleted": id }))
}
