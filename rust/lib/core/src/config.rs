use std::path::PathBuf;

/// Default table-name prefix for authorization tables.
pub const DEFAULT_TABLE_PREFIX: &str = "ac_";

/// Default bound on role-tree recursion.
pub const DEFAULT_MAX_TREE_DEPTH: usize = 64;

/// Largest accepted `max_tree_depth`. Tree resolution recurses once per level.
pub const MAX_TREE_DEPTH_LIMIT: usize = 1024;

/// Common CLI configuration shared by all services.
///
/// Each binary fills these from its command-line flags, then passes them to
/// storage layer and module initialization. Nothing here is process-global:
/// table names in particular are handed to the module at construction.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding the service's database files.
    pub data_dir: Option<PathBuf>,

    /// Path to the SQLite database file.
    /// Defaults to `{data_dir}/rbac.sqlite` if not specified.
    pub sqlite_path: Option<PathBuf>,

    /// Prefix prepended to every table name (e.g. `ac_` → `ac_roles`).
    pub table_prefix: String,

    /// Maximum depth the role tree resolver descends before failing.
    pub max_tree_depth: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sqlite_path: None,
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
        }
    }
}

impl ServiceConfig {
    /// Resolve the SQLite database path, falling back to `{data_dir}/rbac.sqlite`.
    pub fn resolve_sqlite_path(&self) -> PathBuf {
        self.sqlite_path
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("rbac.sqlite"))
    }

    fn resolve_data_subpath(&self, name: &str) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(|d| d.join(name))
            .unwrap_or_else(|| PathBuf::from(name))
    }
}
