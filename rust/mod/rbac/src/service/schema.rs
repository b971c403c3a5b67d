use rbac_sql::SQLStore;

use crate::error::RbacError;

/// Initialize the SQLite schema for roles and permissions.
///
/// `object_alias` carries a UNIQUE index: it is the authoritative guard
/// behind the advisory alias check (NULL aliases never collide).
pub fn init_schema(
    sql: &dyn SQLStore,
    roles_table: &str,
    permissions_table: &str,
) -> Result<(), RbacError> {
    let statements = [
        // Roles: self-referential tree via parent_id
        format!(
            "CREATE TABLE IF NOT EXISTS {roles} (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                parent_id TEXT,
                type INTEGER NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            roles = roles_table
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{roles}_parent ON {roles}(parent_id)", roles = roles_table),
        format!("CREATE INDEX IF NOT EXISTS idx_{roles}_name ON {roles}(name)", roles = roles_table),

        // Permissions: (action, object) grants, optionally grouped by module
        format!(
            "CREATE TABLE IF NOT EXISTS {perms} (
                id TEXT PRIMARY KEY,
                object_alias TEXT,
                object_value TEXT NOT NULL,
                action TEXT NOT NULL,
                module_id TEXT,
                type INTEGER NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            perms = permissions_table
        ),
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_{perms}_alias ON {perms}(object_alias)",
            perms = permissions_table
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{perms}_module ON {perms}(module_id)",
            perms = permissions_table
        ),
    ];

    for stmt in &statements {
        sql.exec(stmt, &[])?;
    }

    Ok(())
}
