use std::collections::HashSet;

use rbac_core::{Attributes, now_rfc3339};
use rbac_sql::{Statement, Value};
use tracing::{debug, info};

use crate::error::RbacError;
use crate::model::{
    ROLE_ADMIN_NAME, ROLE_EMPLOYEE_NAME, ROLE_SUPER_ADMIN_NAME, Role, RoleType, role_unique_id,
};
use crate::service::{Conditions, RbacService, ROLE_COLUMNS};

impl RbacService {
    /// Build a role from raw attributes and persist it.
    pub fn create_role(&self, attrs: &Attributes) -> Result<Role, RbacError> {
        self.save_role(Role::from_attributes(attrs)?)
    }

    /// Persist a constructed role.
    ///
    /// Same (parent, name) = same role: if the identity already exists the
    /// stored record is returned. A NORMAL role saved again as SYSTEM is
    /// promoted; a SYSTEM role keeps its type.
    pub fn save_role(&self, role: Role) -> Result<Role, RbacError> {
        if role.name.is_empty() {
            return Err(RbacError::InvalidIdentity("role name is required".into()));
        }
        if role.role_type == RoleType::All {
            return Err(RbacError::Validation(
                "role type ALL is a filter value and cannot be stored".into(),
            ));
        }
        if role.unique_id != role.composed_unique_id() {
            return Err(RbacError::InvalidIdentity(format!(
                "role id {} does not match its parent and name",
                role.unique_id
            )));
        }

        if let Some(ref parent_id) = role.parent_id {
            if *parent_id == role.unique_id {
                return Err(RbacError::CycleDetected(format!(
                    "role {} cannot be its own parent",
                    role.unique_id
                )));
            }
            if self.find_record::<Role>(&self.roles_table, parent_id)?.is_none() {
                return Err(RbacError::Validation(format!(
                    "parent role '{}' does not exist",
                    parent_id
                )));
            }
        }

        if let Some(mut existing) = self.find_record::<Role>(&self.roles_table, &role.unique_id)? {
            if existing.name != role.name || existing.parent_id != role.parent_id {
                return Err(RbacError::Conflict(format!(
                    "role id {} already belongs to '{}'",
                    role.unique_id, existing.name
                )));
            }
            // SYSTEM is sticky: a re-create may promote but never demote.
            if existing.role_type == RoleType::Normal && role.role_type == RoleType::System {
                existing.role_type = role.role_type;
                existing.updated_at = now_rfc3339();
                self.update_record(
                    &self.roles_table,
                    &existing.unique_id,
                    &existing,
                    &[
                        ("type", Value::Integer(existing.role_type.as_i64())),
                        ("updated_at", Value::Text(existing.updated_at.clone())),
                    ],
                )?;
                debug!("role {} type set to {}", existing.unique_id, existing.role_type);
            }
            return Ok(existing);
        }

        self.insert_role(&role)?;
        info!("created role '{}' ({})", role.name, role.unique_id);
        Ok(role)
    }

    pub(crate) fn role_insert_statement(&self, role: &Role) -> Result<Statement, RbacError> {
        self.insert_statement(
            &self.roles_table,
            &role.unique_id,
            role,
            &[
                ("name", Value::Text(role.name.clone())),
                ("parent_id", Value::from(role.parent_id.clone())),
                ("type", Value::Integer(role.role_type.as_i64())),
                ("created_at", Value::Text(role.created_at.clone())),
                ("updated_at", Value::Text(role.updated_at.clone())),
            ],
        )
    }

    /// Write a role row as-is, without any validation.
    pub(crate) fn insert_role(&self, role: &Role) -> Result<(), RbacError> {
        let stmt = self.role_insert_statement(role)?;
        self.sql.exec(&stmt.sql, &stmt.params)?;
        Ok(())
    }

    /// Get a role by id.
    pub fn get_role(&self, id: &str) -> Result<Role, RbacError> {
        self.get_record(&self.roles_table, id)
    }

    /// First role matching `conditions`, or None.
    pub fn first_role(&self, conditions: &Conditions) -> Result<Option<Role>, RbacError> {
        self.first_record(&self.roles_table, ROLE_COLUMNS, conditions)
    }

    /// Whether a role with `role.name` is stored. With `exclude_self`, the
    /// role's own record does not count, so an update can check "everyone else".
    pub fn role_exists(&self, role: &Role, exclude_self: bool) -> Result<bool, RbacError> {
        let mut conditions = Conditions::new().eq("name", role.name.as_str());
        if exclude_self {
            conditions = conditions.ne("id", role.unique_id.as_str());
        }
        Ok(self.first_role(&conditions)?.is_some())
    }

    /// Delete a role.
    ///
    /// SYSTEM roles cannot be deleted. A role that still has children is
    /// rejected rather than cascaded or orphaned.
    pub fn delete_role(&self, id: &str) -> Result<(), RbacError> {
        let role = self.get_role(id)?;
        if role.is_system() {
            return Err(RbacError::Validation(format!(
                "system role '{}' cannot be deleted",
                role.name
            )));
        }

        let children = self.count_records(
            &self.roles_table,
            ROLE_COLUMNS,
            &Conditions::new().eq("parent_id", id),
        )?;
        if children > 0 {
            return Err(RbacError::Conflict(format!(
                "role '{}' still has {} child role(s)",
                role.name, children
            )));
        }

        self.delete_record(&self.roles_table, id)?;
        info!("deleted role '{}' ({})", role.name, id);
        Ok(())
    }

    /// Rename and/or reparent a role.
    ///
    /// Identity follows (parent, name), so this re-derives the id of the role
    /// and of every descendant, then swaps old rows for new ones in a single
    /// batch. Returns the role under its new identity.
    pub fn relocate_role(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
        new_name: &str,
    ) -> Result<Role, RbacError> {
        if new_name.is_empty() {
            return Err(RbacError::InvalidIdentity("role name is required".into()));
        }
        let role = self.get_role(id)?;
        let new_parent_id = new_parent_id.filter(|p| !p.is_empty());

        if let Some(parent_id) = new_parent_id {
            if self.find_record::<Role>(&self.roles_table, parent_id)?.is_none() {
                return Err(RbacError::Validation(format!(
                    "parent role '{}' does not exist",
                    parent_id
                )));
            }
            self.check_not_descendant(id, parent_id)?;
        }

        let new_id = role_unique_id(new_parent_id, new_name);
        if new_id == role.unique_id {
            return Ok(role);
        }
        if self.find_record::<Role>(&self.roles_table, &new_id)?.is_some() {
            return Err(RbacError::NameTaken(format!(
                "role '{}' already exists under the target parent",
                new_name
            )));
        }

        let subtree = self.resolve_tree(&Conditions::new(), RoleType::All, Some(id), true)?;
        let now = now_rfc3339();

        let moved = Role {
            unique_id: new_id,
            name: new_name.to_string(),
            parent_id: new_parent_id.map(str::to_string),
            role_type: role.role_type,
            children: Vec::new(),
            created_at: role.created_at.clone(),
            updated_at: now.clone(),
        };

        let mut statements = vec![
            self.delete_statement(&self.roles_table, &role.unique_id),
            self.role_insert_statement(&moved)?,
        ];
        self.rebase_children(&subtree, &moved.unique_id, &now, &mut statements)?;
        self.sql.exec_batch(&statements)?;

        info!(
            "relocated role '{}' ({}) -> '{}' ({}), {} descendant(s) re-keyed",
            role.name,
            role.unique_id,
            moved.name,
            moved.unique_id,
            subtree.iter().map(Role::subtree_len).sum::<usize>()
        );
        Ok(moved)
    }

    fn rebase_children(
        &self,
        children: &[Role],
        new_parent_id: &str,
        now: &str,
        statements: &mut Vec<Statement>,
    ) -> Result<(), RbacError> {
        for child in children {
            let rebased = Role {
                unique_id: role_unique_id(Some(new_parent_id), &child.name),
                name: child.name.clone(),
                parent_id: Some(new_parent_id.to_string()),
                role_type: child.role_type,
                children: Vec::new(),
                created_at: child.created_at.clone(),
                updated_at: now.to_string(),
            };
            statements.push(self.delete_statement(&self.roles_table, &child.unique_id));
            statements.push(self.role_insert_statement(&rebased)?);
            self.rebase_children(&child.children, &rebased.unique_id, now, statements)?;
        }
        Ok(())
    }

    /// Fail if `candidate` is `id` itself or sits below it, i.e. if making
    /// `candidate` the parent of `id` would close a loop. Walks up the parent
    /// chain from `candidate`.
    fn check_not_descendant(&self, id: &str, candidate: &str) -> Result<(), RbacError> {
        let mut visited = HashSet::new();
        let mut current = Some(candidate.to_string());

        while let Some(cur) = current {
            if cur == id {
                return Err(RbacError::CycleDetected(format!(
                    "role {} cannot be placed under itself or its descendant {}",
                    id, candidate
                )));
            }
            if !visited.insert(cur.clone()) {
                return Err(RbacError::CycleDetected(format!(
                    "parent chain loops through role {}",
                    cur
                )));
            }
            if visited.len() > self.config.max_tree_depth {
                return Err(RbacError::TreeTooDeep(self.config.max_tree_depth));
            }
            current = self
                .find_record::<Role>(&self.roles_table, &cur)?
                .and_then(|r| r.parent_id);
        }

        Ok(())
    }

    /// Ensure the three SYSTEM seed roles (super-admin, admin, employee)
    /// exist at root level.
    pub fn seed_roles(&self) -> Result<Vec<Role>, RbacError> {
        let mut seeded = Vec::new();
        for name in [ROLE_SUPER_ADMIN_NAME, ROLE_ADMIN_NAME, ROLE_EMPLOYEE_NAME] {
            seeded.push(self.save_role(Role::new(None, name, RoleType::System)?)?);
        }
        info!("seed roles ensured ({})", seeded.len());
        Ok(seeded)
    }
}
