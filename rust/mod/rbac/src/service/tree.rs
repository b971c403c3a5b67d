use std::collections::HashMap;

use rbac_sql::Value;
use tracing::debug;

use crate::error::RbacError;
use crate::model::{Role, RoleType};
use crate::service::{Conditions, RbacService, ROLE_COLUMNS};

impl RbacService {
    /// Reconstruct a filtered view of the role tree.
    ///
    /// - `conditions` apply at every level. A `parent_id` entry in them acts
    ///   like `parent_id` below, for the top level only.
    /// - `role_type` other than `All` adds a type filter at every level.
    /// - `parent_id` restricts the top level to that parent's children;
    ///   `Some("")` means root roles.
    /// - With `recurse`, every returned role gets its matching descendants
    ///   attached as `children`.
    ///
    /// Recursive resolution reads all candidate rows once and groups them by
    /// parent in memory. Nodes are returned in storage (insertion) order. A
    /// loop in the stored parent links fails with `CycleDetected`; a chain
    /// deeper than `max_tree_depth` fails with `TreeTooDeep`. No partial tree
    /// is ever returned.
    pub fn resolve_tree(
        &self,
        conditions: &Conditions,
        role_type: RoleType,
        parent_id: Option<&str>,
        recurse: bool,
    ) -> Result<Vec<Role>, RbacError> {
        let mut base = conditions.clone();
        let filter_parent = base.take("parent_id");
        if role_type != RoleType::All {
            base.set("type", role_type.as_i64());
        }

        let top_parent = match parent_id {
            Some("") => Some(Value::Null),
            Some(p) => Some(Value::Text(p.to_string())),
            None => filter_parent,
        };

        if !recurse {
            let mut level = base;
            if let Some(p) = top_parent {
                level.set("parent_id", p);
            }
            return self.list_records(&self.roles_table, ROLE_COLUMNS, &level);
        }

        let candidates: Vec<Role> = self.list_records(&self.roles_table, ROLE_COLUMNS, &base)?;

        let mut by_parent: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut roots = Vec::new();
        for (idx, role) in candidates.iter().enumerate() {
            match role.parent_id.as_deref() {
                Some(pid) => by_parent.entry(pid).or_default().push(idx),
                None => roots.push(idx),
            }
        }

        let top: Vec<usize> = match &top_parent {
            None => (0..candidates.len()).collect(),
            Some(Value::Null) => roots,
            Some(Value::Text(pid)) => by_parent.get(pid.as_str()).cloned().unwrap_or_default(),
            Some(other) => {
                return Err(RbacError::Validation(format!(
                    "parent_id filter must be text or null, got {:?}",
                    other
                )));
            }
        };

        let assembler = TreeAssembler {
            candidates: &candidates,
            by_parent: &by_parent,
            max_depth: self.config.max_tree_depth,
        };

        let mut path = Vec::new();
        let mut tree = Vec::with_capacity(top.len());
        for idx in top {
            tree.push(assembler.build(idx, 1, &mut path)?);
        }

        debug!(
            "resolved role tree: {} top-level, {} nodes",
            tree.len(),
            tree.iter().map(Role::subtree_len).sum::<usize>()
        );
        Ok(tree)
    }
}

/// In-memory parent → children index over one bulk read.
struct TreeAssembler<'a> {
    candidates: &'a [Role],
    by_parent: &'a HashMap<&'a str, Vec<usize>>,
    max_depth: usize,
}

impl TreeAssembler<'_> {
    /// Build the subtree rooted at `idx`. `path` holds the ids from the top
    /// level down to the current node's parent.
    fn build(&self, idx: usize, depth: usize, path: &mut Vec<String>) -> Result<Role, RbacError> {
        let mut node = self.candidates[idx].clone();

        if path.contains(&node.unique_id) {
            path.push(node.unique_id.clone());
            return Err(RbacError::CycleDetected(format!(
                "role parent links loop: {}",
                path.join(" -> ")
            )));
        }
        if depth > self.max_depth {
            return Err(RbacError::TreeTooDeep(self.max_depth));
        }

        path.push(node.unique_id.clone());
        if let Some(children) = self.by_parent.get(node.unique_id.as_str()) {
            for &child in children {
                node.children.push(self.build(child, depth + 1, path)?);
            }
        }
        path.pop();

        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::service::RbacConfig;
    use crate::service::tests::{broken_service, test_service, test_service_with};

    fn role(svc: &RbacService, parent: Option<&str>, name: &str, role_type: RoleType) -> Role {
        svc.save_role(Role::new(parent, name, role_type).unwrap())
            .unwrap()
    }

    fn flatten(nodes: &[Role], out: &mut Vec<String>) {
        for n in nodes {
            out.push(n.unique_id.clone());
            flatten(&n.children, out);
        }
    }

    /// root ─┬─ ops ─── oncall
    ///       └─ dev (SYSTEM)
    /// other
    fn fixture(svc: &RbacService) -> (Role, Role, Role, Role, Role) {
        let root = role(svc, None, "root", RoleType::System);
        let ops = role(svc, Some(&root.unique_id), "ops", RoleType::Normal);
        let dev = role(svc, Some(&root.unique_id), "dev", RoleType::System);
        let oncall = role(svc, Some(&ops.unique_id), "oncall", RoleType::Normal);
        let other = role(svc, None, "other", RoleType::Normal);
        (root, ops, dev, oncall, other)
    }

    #[test]
    fn test_flat_listing() {
        let svc = test_service();
        let (root, ops, dev, oncall, other) = fixture(&svc);

        let all = svc
            .resolve_tree(&Conditions::new(), RoleType::All, None, false)
            .unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.unique_id.clone()).collect();
        assert_eq!(
            ids,
            vec![
                root.unique_id.clone(),
                ops.unique_id.clone(),
                dev.unique_id.clone(),
                oncall.unique_id.clone(),
                other.unique_id.clone()
            ]
        );
        assert!(all.iter().all(|r| r.children.is_empty()));

        let roots = svc
            .resolve_tree(&Conditions::new(), RoleType::All, Some(""), false)
            .unwrap();
        assert_eq!(roots.len(), 2);

        let system = svc
            .resolve_tree(&Conditions::new(), RoleType::System, None, false)
            .unwrap();
        assert_eq!(system.len(), 2);
        assert!(system.iter().all(|r| r.role_type == RoleType::System));
    }

    #[test]
    fn test_recursive_covers_flat_plus_descendants() {
        let svc = test_service();
        fixture(&svc);

        let flat = svc
            .resolve_tree(&Conditions::new(), RoleType::All, None, false)
            .unwrap();
        let nested = svc
            .resolve_tree(&Conditions::new(), RoleType::All, None, true)
            .unwrap();
        assert_eq!(nested.len(), flat.len());

        let mut ids = Vec::new();
        flatten(&nested, &mut ids);
        let nested_set: HashSet<_> = ids.into_iter().collect();
        let flat_set: HashSet<_> = flat.into_iter().map(|r| r.unique_id).collect();
        assert_eq!(nested_set, flat_set);
    }

    #[test]
    fn test_subtree_by_parent() {
        let svc = test_service();
        let (root, ops, dev, oncall, _) = fixture(&svc);

        let tree = svc
            .resolve_tree(&Conditions::new(), RoleType::All, Some(&root.unique_id), true)
            .unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].unique_id, ops.unique_id);
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].unique_id, oncall.unique_id);
        assert_eq!(tree[1].unique_id, dev.unique_id);
        assert!(tree[1].children.is_empty());

        let from_roots = svc
            .resolve_tree(&Conditions::new(), RoleType::All, Some(""), true)
            .unwrap();
        assert_eq!(from_roots.len(), 2);
        assert_eq!(from_roots[0].subtree_len(), 4);
        assert_eq!(from_roots[1].subtree_len(), 1);

        let leaf = svc
            .resolve_tree(&Conditions::new(), RoleType::All, Some(&oncall.unique_id), true)
            .unwrap();
        assert!(leaf.is_empty());
    }

    #[test]
    fn test_type_filter_applies_at_every_level() {
        let svc = test_service();
        let (root, _, dev, _, _) = fixture(&svc);

        let tree = svc
            .resolve_tree(&Conditions::new(), RoleType::System, Some(""), true)
            .unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].unique_id, root.unique_id);
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].unique_id, dev.unique_id);
    }

    #[test]
    fn test_parent_in_conditions_scopes_top_level() {
        let svc = test_service();
        let (root, ops, _, oncall, _) = fixture(&svc);

        let conditions = Conditions::new().eq("parent_id", root.unique_id.as_str());
        let tree = svc
            .resolve_tree(&conditions, RoleType::Normal, None, true)
            .unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].unique_id, ops.unique_id);
        assert_eq!(tree[0].children[0].unique_id, oncall.unique_id);

        let flat = svc
            .resolve_tree(&conditions, RoleType::All, None, false)
            .unwrap();
        assert_eq!(flat.len(), 2);
    }

    #[test]
    fn test_unknown_filter_column_fails() {
        let svc = test_service();
        let result = svc.resolve_tree(
            &Conditions::new().eq("data", "x"),
            RoleType::All,
            None,
            true,
        );
        assert!(matches!(result, Err(RbacError::Validation(_))));
    }

    #[test]
    fn test_two_node_cycle_detected() {
        let svc = test_service();
        let mut a = Role::new(None, "a", RoleType::Normal).unwrap();
        let mut b = Role::new(None, "b", RoleType::Normal).unwrap();
        a.parent_id = Some(b.unique_id.clone());
        b.parent_id = Some(a.unique_id.clone());
        svc.insert_role(&a).unwrap();
        svc.insert_role(&b).unwrap();

        let err = svc
            .resolve_tree(&Conditions::new(), RoleType::All, None, true)
            .unwrap_err();
        assert!(matches!(err, RbacError::CycleDetected(_)), "got {:?}", err);

        let err = svc
            .resolve_tree(&Conditions::new(), RoleType::All, Some(&a.unique_id), true)
            .unwrap_err();
        assert!(matches!(err, RbacError::CycleDetected(_)));

        // Flat reads never recurse and stay available.
        let flat = svc
            .resolve_tree(&Conditions::new(), RoleType::All, Some(&a.unique_id), false)
            .unwrap();
        assert_eq!(flat.len(), 1);
    }

    #[test]
    fn test_self_parent_detected() {
        let svc = test_service();
        let mut a = Role::new(None, "a", RoleType::Normal).unwrap();
        a.parent_id = Some(a.unique_id.clone());
        svc.insert_role(&a).unwrap();

        let err = svc
            .resolve_tree(&Conditions::new(), RoleType::All, None, true)
            .unwrap_err();
        assert!(matches!(err, RbacError::CycleDetected(_)));
    }

    #[test]
    fn test_depth_guard() {
        let svc = test_service_with(RbacConfig {
            max_tree_depth: 3,
            ..Default::default()
        });

        let mut parent: Option<String> = None;
        for i in 0..5 {
            let r = role(&svc, parent.as_deref(), &format!("level-{}", i), RoleType::Normal);
            parent = Some(r.unique_id);
        }

        let err = svc
            .resolve_tree(&Conditions::new(), RoleType::All, Some(""), true)
            .unwrap_err();
        assert!(matches!(err, RbacError::TreeTooDeep(3)));

        // Three levels fit.
        let level_1 = role_id_chain(2);
        let tree = svc
            .resolve_tree(&Conditions::new(), RoleType::All, Some(&level_1), true)
            .unwrap();
        assert_eq!(tree[0].subtree_len(), 3);
    }

    fn role_id_chain(len: usize) -> String {
        let mut parent: Option<String> = None;
        for i in 0..len {
            parent = Some(crate::model::role_unique_id(parent.as_deref(), &format!("level-{}", i)));
        }
        parent.unwrap_or_default()
    }

    #[test]
    fn test_storage_failure_propagates() {
        let svc = broken_service();
        for recurse in [false, true] {
            let result = svc.resolve_tree(&Conditions::new(), RoleType::All, Some(""), recurse);
            assert!(matches!(result, Err(RbacError::Storage(_))), "recurse={}", recurse);
        }
    }
}
