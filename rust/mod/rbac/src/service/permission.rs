use rbac_core::{Attributes, now_rfc3339};
use rbac_sql::Value;
use tracing::{debug, info};

use crate::error::RbacError;
use crate::model::{Permission, PermissionKind};
use crate::service::{Conditions, PERMISSION_COLUMNS, RbacService};

impl RbacService {
    /// Build a permission from raw attributes and persist it.
    pub fn create_permission(&self, attrs: &Attributes) -> Result<Permission, RbacError> {
        self.save_permission(Permission::from_attributes(attrs)?)
    }

    /// Persist a constructed permission.
    ///
    /// Same (action, object) = same permission: an existing record keeps its
    /// identity and creation time. Alias, description and module are replaced
    /// only where `permission` supplies them, and a leaf may be promoted to a
    /// module but not back. The alias is checked before every write.
    pub fn save_permission(&self, permission: Permission) -> Result<Permission, RbacError> {
        if permission.unique_id != permission.composed_unique_id() {
            return Err(RbacError::InvalidIdentity(format!(
                "permission id {} does not match its action and object",
                permission.unique_id
            )));
        }

        if let Some(ref module_id) = permission.module_id {
            self.check_module(module_id, &permission.unique_id)?;
        }
        if let Some(ref alias) = permission.object_alias {
            self.check_alias_available(alias, &permission.unique_id)?;
        }

        let existing = self.find_record::<Permission>(&self.permissions_table, &permission.unique_id)?;
        let saved = match existing {
            Some(mut existing) => {
                if existing.action != permission.action
                    || existing.object_value != permission.object_value
                {
                    return Err(RbacError::Conflict(format!(
                        "permission id {} already belongs to {}-{}",
                        existing.unique_id, existing.action, existing.object_value
                    )));
                }
                // Absent fields keep their stored value; a module is never
                // demoted implicitly.
                if permission.object_alias.is_some() {
                    existing.object_alias = permission.object_alias;
                }
                if permission.description.is_some() {
                    existing.description = permission.description;
                }
                if permission.module_id.is_some() {
                    existing.module_id = permission.module_id;
                }
                if permission.kind == PermissionKind::Module {
                    existing.kind = PermissionKind::Module;
                }
                existing.updated_at = now_rfc3339();

                let indexes = permission_indexes(&existing);
                self.update_record(&self.permissions_table, &existing.unique_id, &existing, &indexes)
                    .map_err(alias_conflict)?;
                debug!("updated permission {}", existing.unique_id);
                existing
            }
            None => {
                let mut indexes = permission_indexes(&permission);
                indexes.push(("created_at", Value::Text(permission.created_at.clone())));
                self.insert_record(&self.permissions_table, &permission.unique_id, &permission, &indexes)
                    .map_err(alias_conflict)?;
                info!(
                    "created permission {}-{} ({})",
                    permission.action, permission.object_value, permission.unique_id
                );
                permission
            }
        };

        Ok(saved)
    }

    /// Fail with `AliasTaken` if a permission other than `own_id` already uses
    /// `alias`. An empty alias is never taken.
    ///
    /// Advisory: the unique index on `object_alias` settles races between the
    /// check and the write.
    pub fn check_alias_available(&self, alias: &str, own_id: &str) -> Result<(), RbacError> {
        if alias.is_empty() {
            return Ok(());
        }
        let conditions = Conditions::new()
            .eq("object_alias", alias)
            .ne("id", own_id);
        let holder: Option<Permission> =
            self.first_record(&self.permissions_table, PERMISSION_COLUMNS, &conditions)?;
        match holder {
            Some(p) => Err(RbacError::AliasTaken(format!(
                "alias '{}' is used by permission {}",
                alias, p.unique_id
            ))),
            None => Ok(()),
        }
    }

    /// Get a permission by id.
    pub fn get_permission(&self, id: &str) -> Result<Permission, RbacError> {
        self.get_record(&self.permissions_table, id)
    }

    /// Permissions matching `conditions`, in insertion order.
    pub fn list_permissions(&self, conditions: &Conditions) -> Result<Vec<Permission>, RbacError> {
        self.list_records(&self.permissions_table, PERMISSION_COLUMNS, conditions)
    }

    /// Members of a module.
    pub fn list_module_permissions(&self, module_id: &str) -> Result<Vec<Permission>, RbacError> {
        self.list_permissions(&Conditions::new().eq("module_id", module_id))
    }

    /// Delete a permission. A module that still has members is rejected.
    pub fn delete_permission(&self, id: &str) -> Result<(), RbacError> {
        let permission = self.get_permission(id)?;
        if permission.is_module() {
            let members = self.count_records(
                &self.permissions_table,
                PERMISSION_COLUMNS,
                &Conditions::new().eq("module_id", id),
            )?;
            if members > 0 {
                return Err(RbacError::Conflict(format!(
                    "module {} still has {} member permission(s)",
                    id, members
                )));
            }
        }

        self.delete_record(&self.permissions_table, id)?;
        info!("deleted permission {}", id);
        Ok(())
    }

    fn check_module(&self, module_id: &str, own_id: &str) -> Result<(), RbacError> {
        if module_id == own_id {
            return Err(RbacError::Validation(format!(
                "permission {} cannot be its own module",
                own_id
            )));
        }
        match self.find_record::<Permission>(&self.permissions_table, module_id)? {
            Some(module) if module.kind == PermissionKind::Module => Ok(()),
            Some(_) => Err(RbacError::Validation(format!(
                "permission {} is not a module",
                module_id
            ))),
            None => Err(RbacError::Validation(format!(
                "module '{}' does not exist",
                module_id
            ))),
        }
    }
}

fn permission_indexes(p: &Permission) -> Vec<(&'static str, Value)> {
    vec![
        ("object_alias", Value::from(p.object_alias.clone())),
        ("object_value", Value::Text(p.object_value.clone())),
        ("action", Value::Text(p.action.clone())),
        ("module_id", Value::from(p.module_id.clone())),
        ("type", Value::Integer(p.kind.as_i64())),
        ("updated_at", Value::Text(p.updated_at.clone())),
    ]
}

/// A unique violation on the alias index means another writer won the race.
fn alias_conflict(e: RbacError) -> RbacError {
    match e {
        RbacError::Conflict(msg) if msg.contains("object_alias") => RbacError::AliasTaken(msg),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::{broken_service, test_service};
    use serde_json::json;

    fn attrs(v: serde_json::Value) -> Attributes {
        Attributes::from(v)
    }

    #[test]
    fn test_create_is_idempotent() {
        let svc = test_service();
        let p0 = svc
            .create_permission(&attrs(json!({"action": "read", "objectValue": "report"})))
            .unwrap();
        let again = svc
            .create_permission(&attrs(json!({"action": "read", "objectValue": "report"})))
            .unwrap();
        assert_eq!(p0.unique_id, again.unique_id);
        assert_eq!(p0.created_at, again.created_at);
        assert_eq!(svc.list_permissions(&Conditions::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_updates_mutable_fields() {
        let svc = test_service();
        let p = svc
            .create_permission(&attrs(json!({"action": "read", "objectValue": "report"})))
            .unwrap();
        assert!(p.object_alias.is_none());

        let updated = svc
            .create_permission(&attrs(json!({
                "action": "read",
                "objectValue": "report",
                "objectAlias": "Reports",
                "description": "read reports",
            })))
            .unwrap();
        assert_eq!(updated.unique_id, p.unique_id);

        let stored = svc.get_permission(&p.unique_id).unwrap();
        assert_eq!(stored.object_alias.as_deref(), Some("Reports"));
        assert_eq!(stored.description.as_deref(), Some("read reports"));

        let by_alias = svc
            .list_permissions(&Conditions::new().eq("object_alias", "Reports"))
            .unwrap();
        assert_eq!(by_alias.len(), 1);
    }

    #[test]
    fn test_bare_recreate_keeps_stored_fields() {
        let svc = test_service();
        let module = svc
            .create_permission(&attrs(json!({
                "action": "*", "objectValue": "reporting", "type": 2,
            })))
            .unwrap();
        let p0 = svc
            .create_permission(&attrs(json!({
                "action": "read",
                "objectValue": "report",
                "objectAlias": "Reports",
                "description": "d",
                "moduleID": module.unique_id,
            })))
            .unwrap();

        let again = svc
            .create_permission(&attrs(json!({"action": "read", "objectValue": "report"})))
            .unwrap();
        assert_eq!(again.unique_id, p0.unique_id);
        assert_eq!(again.object_alias.as_deref(), Some("Reports"));

        let stored = svc.get_permission(&p0.unique_id).unwrap();
        assert_eq!(stored.object_alias.as_deref(), Some("Reports"));
        assert_eq!(stored.description.as_deref(), Some("d"));
        assert_eq!(stored.module_id.as_deref(), Some(module.unique_id.as_str()));

        // The alias stays claimed.
        assert!(matches!(
            svc.check_alias_available("Reports", "other"),
            Err(RbacError::AliasTaken(_))
        ));

        // Re-creating the module without a type keeps it a module.
        let module_again = svc
            .create_permission(&attrs(json!({"action": "*", "objectValue": "reporting"})))
            .unwrap();
        assert!(module_again.is_module());
        assert_eq!(svc.list_module_permissions(&module.unique_id).unwrap().len(), 1);
    }

    #[test]
    fn test_alias_check() {
        let svc = test_service();
        let read = svc
            .create_permission(&attrs(json!({
                "action": "read", "objectValue": "report", "objectAlias": "Reports",
            })))
            .unwrap();

        // The holder itself may keep its alias.
        svc.check_alias_available("Reports", &read.unique_id).unwrap();
        svc.check_alias_available("Ledger", "anyone").unwrap();
        svc.check_alias_available("", "anyone").unwrap();

        let err = svc
            .check_alias_available("Reports", "someone-else")
            .unwrap_err();
        assert!(matches!(err, RbacError::AliasTaken(_)));

        let err = svc
            .create_permission(&attrs(json!({
                "action": "write", "objectValue": "report", "objectAlias": "Reports",
            })))
            .unwrap_err();
        assert!(matches!(err, RbacError::AliasTaken(_)));
    }

    #[test]
    fn test_empty_alias_never_conflicts() {
        let svc = test_service();
        for action in ["read", "write", "delete"] {
            svc.create_permission(&attrs(json!({
                "action": action, "objectValue": "report", "objectAlias": "",
            })))
            .unwrap();
        }
        assert_eq!(svc.list_permissions(&Conditions::new()).unwrap().len(), 3);
    }

    #[test]
    fn test_unique_index_backs_alias_check() {
        let svc = test_service();
        svc.create_permission(&attrs(json!({
            "action": "read", "objectValue": "report", "objectAlias": "Reports",
        })))
        .unwrap();

        // A writer that skipped the check still hits the index.
        let mut racer = Permission::new("write", "report").unwrap();
        racer.object_alias = Some("Reports".into());
        let mut indexes = permission_indexes(&racer);
        indexes.push(("created_at", Value::Text(racer.created_at.clone())));
        let err = svc
            .insert_record(&svc.permissions_table, &racer.unique_id, &racer, &indexes)
            .map_err(alias_conflict)
            .unwrap_err();
        assert!(matches!(err, RbacError::AliasTaken(_)), "got {:?}", err);
    }

    #[test]
    fn test_module_membership() {
        let svc = test_service();
        let module = svc
            .create_permission(&attrs(json!({
                "action": "*", "objectValue": "reporting", "type": 2,
            })))
            .unwrap();

        for action in ["read", "export"] {
            svc.create_permission(&attrs(json!({
                "action": action, "objectValue": "report", "moduleID": module.unique_id,
            })))
            .unwrap();
        }
        svc.create_permission(&attrs(json!({"action": "read", "objectValue": "ledger"})))
            .unwrap();

        let members = svc.list_module_permissions(&module.unique_id).unwrap();
        let actions: Vec<_> = members.iter().map(|p| p.action.as_str()).collect();
        assert_eq!(actions, vec!["read", "export"]);

        let modules = svc
            .list_permissions(&Conditions::new().eq("type", PermissionKind::Module.as_i64()))
            .unwrap();
        assert_eq!(modules.len(), 1);
    }

    #[test]
    fn test_module_reference_validated() {
        let svc = test_service();
        let leaf = svc
            .create_permission(&attrs(json!({"action": "read", "objectValue": "ledger"})))
            .unwrap();

        let missing = svc.create_permission(&attrs(json!({
            "action": "read", "objectValue": "report", "moduleID": "nope",
        })));
        assert!(matches!(missing, Err(RbacError::Validation(_))));

        let not_module = svc.create_permission(&attrs(json!({
            "action": "read", "objectValue": "report", "moduleID": leaf.unique_id,
        })));
        assert!(matches!(not_module, Err(RbacError::Validation(_))));

        let mut own = Permission::new("*", "reporting").unwrap();
        own.kind = PermissionKind::Module;
        own.module_id = Some(own.unique_id.clone());
        assert!(matches!(svc.save_permission(own), Err(RbacError::Validation(_))));
    }

    #[test]
    fn test_delete_rules() {
        let svc = test_service();
        let module = svc
            .create_permission(&attrs(json!({
                "action": "*", "objectValue": "reporting", "type": 2,
            })))
            .unwrap();
        let member = svc
            .create_permission(&attrs(json!({
                "action": "read", "objectValue": "report", "moduleID": module.unique_id,
            })))
            .unwrap();

        let err = svc.delete_permission(&module.unique_id).unwrap_err();
        assert!(matches!(err, RbacError::Conflict(_)));

        svc.delete_permission(&member.unique_id).unwrap();
        svc.delete_permission(&module.unique_id).unwrap();
        assert!(matches!(
            svc.get_permission(&module.unique_id),
            Err(RbacError::NotFound(_))
        ));
        assert!(matches!(
            svc.delete_permission(&module.unique_id),
            Err(RbacError::NotFound(_))
        ));
    }

    #[test]
    fn test_tampered_identity_rejected() {
        let svc = test_service();
        let mut p = Permission::new("read", "report").unwrap();
        p.action = "write".into();
        assert!(matches!(
            svc.save_permission(p),
            Err(RbacError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_alias_check_propagates_storage_failure() {
        let svc = broken_service();
        assert!(matches!(
            svc.check_alias_available("Reports", "own"),
            Err(RbacError::Storage(_))
        ));
        // Nothing to look up, so nothing to fail.
        svc.check_alias_available("", "own").unwrap();
    }
}
