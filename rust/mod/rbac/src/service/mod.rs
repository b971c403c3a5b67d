pub mod permission;
pub mod role;
pub mod schema;
pub mod tree;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use rbac_core::ServiceConfig;
use rbac_core::config::{DEFAULT_MAX_TREE_DEPTH, DEFAULT_TABLE_PREFIX, MAX_TREE_DEPTH_LIMIT};
use rbac_sql::{SQLStore, Statement, Value};

use crate::error::RbacError;

/// Filterable columns of the roles table.
pub(crate) const ROLE_COLUMNS: &[&str] = &["id", "name", "parent_id", "type"];

/// Filterable columns of the permissions table.
pub(crate) const PERMISSION_COLUMNS: &[&str] =
    &["id", "object_alias", "object_value", "action", "module_id", "type"];

/// Configuration for the RBAC service.
///
/// Table names are derived once from `table_prefix` when the service is
/// built and never change afterwards.
#[derive(Debug, Clone)]
pub struct RbacConfig {
    /// Prefix for table names (default: `ac_`). Letters, digits and `_` only.
    pub table_prefix: String,
    /// Deepest level the tree resolver descends to (default: 64, at most 1024).
    pub max_tree_depth: usize,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
        }
    }
}

impl From<&ServiceConfig> for RbacConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            table_prefix: config.table_prefix.clone(),
            max_tree_depth: config.max_tree_depth,
        }
    }
}

impl RbacConfig {
    pub fn roles_table(&self) -> String {
        format!("{}roles", self.table_prefix)
    }

    pub fn permissions_table(&self) -> String {
        format!("{}rbac_permissions", self.table_prefix)
    }

    fn validate(&self) -> Result<(), RbacError> {
        if !self
            .table_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(RbacError::Validation(format!(
                "table prefix '{}' may only contain letters, digits and '_'",
                self.table_prefix
            )));
        }
        if self.max_tree_depth == 0 || self.max_tree_depth > MAX_TREE_DEPTH_LIMIT {
            return Err(RbacError::Validation(format!(
                "max tree depth must be between 1 and {}, got {}",
                MAX_TREE_DEPTH_LIMIT, self.max_tree_depth
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
}

/// Equality filters over a table's indexed columns.
///
/// `Value::Null` compares with `IS NULL` / `IS NOT NULL`.
///
/// ```ignore
/// let roots = Conditions::new().eq("parent_id", Value::Null);
/// let others = Conditions::new().eq("name", "ops").ne("id", own_id);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Conditions {
    clauses: Vec<(String, Op, Value)>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `column = value`.
    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.clauses.push((column.to_string(), Op::Eq, value.into()));
        self
    }

    /// Add `column != value`.
    pub fn ne(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.clauses.push((column.to_string(), Op::Ne, value.into()));
        self
    }

    /// Replace every equality filter on `column` with `column = value`.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.clauses.retain(|(c, op, _)| !(c == column && *op == Op::Eq));
        self.clauses.push((column.to_string(), Op::Eq, value.into()));
    }

    /// Remove equality filters on `column`, returning the last value.
    pub fn take(&mut self, column: &str) -> Option<Value> {
        let mut taken = None;
        self.clauses.retain(|(c, op, v)| {
            if c == column && *op == Op::Eq {
                taken = Some(v.clone());
                false
            } else {
                true
            }
        });
        taken
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Render a ` WHERE ...` clause (empty when there are no filters).
    /// Column names are checked against `allowed` since they are interpolated.
    pub(crate) fn to_where(&self, allowed: &[&str]) -> Result<(String, Vec<Value>), RbacError> {
        let mut where_clauses = Vec::new();
        let mut params = Vec::new();

        for (col, op, val) in &self.clauses {
            if !allowed.contains(&col.as_str()) {
                return Err(RbacError::Validation(format!("cannot filter on column '{}'", col)));
            }
            match (op, val) {
                (Op::Eq, Value::Null) => where_clauses.push(format!("{} IS NULL", col)),
                (Op::Ne, Value::Null) => where_clauses.push(format!("{} IS NOT NULL", col)),
                (op, val) => {
                    params.push(val.clone());
                    let sym = if *op == Op::Eq { "=" } else { "!=" };
                    where_clauses.push(format!("{} {} ?{}", col, sym, params.len()));
                }
            }
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", where_clauses.join(" AND "))
        };
        Ok((where_sql, params))
    }
}

/// The RBAC service. Holds the storage backend and configuration.
pub struct RbacService {
    pub(crate) sql: Arc<dyn SQLStore>,
    pub(crate) config: RbacConfig,
    pub(crate) roles_table: String,
    pub(crate) permissions_table: String,
}

impl RbacService {
    /// Create a new RbacService, initializing the DB schema.
    pub fn new(sql: Arc<dyn SQLStore>, config: RbacConfig) -> Result<Arc<Self>, RbacError> {
        config.validate()?;
        let roles_table = config.roles_table();
        let permissions_table = config.permissions_table();
        schema::init_schema(sql.as_ref(), &roles_table, &permissions_table)?;
        debug!("RbacService: tables {} / {}", roles_table, permissions_table);

        Ok(Arc::new(Self {
            sql,
            config,
            roles_table,
            permissions_table,
        }))
    }

    pub fn config(&self) -> &RbacConfig {
        &self.config
    }

    // ── Generic record helpers ──
    //
    // Every table stores the full record as JSON in `data`, plus the
    // filterable columns alongside it.

    /// Build the INSERT for a record without executing it.
    pub(crate) fn insert_statement<T: Serialize>(
        &self,
        table: &str,
        id: &str,
        record: &T,
        indexes: &[(&str, Value)],
    ) -> Result<Statement, RbacError> {
        let json = serde_json::to_string(record)
            .map_err(|e| RbacError::Internal(e.to_string()))?;

        let mut cols = vec!["id", "data"];
        let mut placeholders = vec!["?1".to_string(), "?2".to_string()];
        let mut params = vec![Value::Text(id.to_string()), Value::Text(json)];

        for (i, (col, val)) in indexes.iter().enumerate() {
            cols.push(col);
            placeholders.push(format!("?{}", i + 3));
            params.push(val.clone());
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            cols.join(", "),
            placeholders.join(", "),
        );
        Ok(Statement::new(sql, params))
    }

    pub(crate) fn delete_statement(&self, table: &str, id: &str) -> Statement {
        Statement::new(
            format!("DELETE FROM {} WHERE id = ?1", table),
            vec![Value::Text(id.to_string())],
        )
    }

    pub(crate) fn insert_record<T: Serialize>(
        &self,
        table: &str,
        id: &str,
        record: &T,
        indexes: &[(&str, Value)],
    ) -> Result<(), RbacError> {
        let stmt = self.insert_statement(table, id, record, indexes)?;
        self.sql.exec(&stmt.sql, &stmt.params)?;
        Ok(())
    }

    /// Get a record by id; `Ok(None)` when there is no such row.
    pub(crate) fn find_record<T: DeserializeOwned>(
        &self,
        table: &str,
        id: &str,
    ) -> Result<Option<T>, RbacError> {
        let sql = format!("SELECT data FROM {} WHERE id = ?1", table);
        let rows = self.sql.query(&sql, &[Value::Text(id.to_string())])?;
        rows.first().map(decode_row).transpose()
    }

    /// Get a record by id, failing with `NotFound`.
    pub(crate) fn get_record<T: DeserializeOwned>(
        &self,
        table: &str,
        id: &str,
    ) -> Result<T, RbacError> {
        self.find_record(table, id)?
            .ok_or_else(|| RbacError::NotFound(format!("{}/{}", table, id)))
    }

    /// Update a record's JSON data and indexed columns.
    pub(crate) fn update_record<T: Serialize>(
        &self,
        table: &str,
        id: &str,
        record: &T,
        indexes: &[(&str, Value)],
    ) -> Result<(), RbacError> {
        let json = serde_json::to_string(record)
            .map_err(|e| RbacError::Internal(e.to_string()))?;

        let mut sets = vec!["data = ?1".to_string()];
        let mut params: Vec<Value> = vec![Value::Text(json)];

        for (i, (col, val)) in indexes.iter().enumerate() {
            sets.push(format!("{} = ?{}", col, i + 2));
            params.push(val.clone());
        }

        let id_idx = params.len() + 1;
        params.push(Value::Text(id.to_string()));

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            table,
            sets.join(", "),
            id_idx,
        );

        let affected = self.sql.exec(&sql, &params)?;
        if affected == 0 {
            return Err(RbacError::NotFound(format!("{}/{}", table, id)));
        }
        Ok(())
    }

    /// Delete a record by id.
    pub(crate) fn delete_record(&self, table: &str, id: &str) -> Result<(), RbacError> {
        let stmt = self.delete_statement(table, id);
        let affected = self.sql.exec(&stmt.sql, &stmt.params)?;
        if affected == 0 {
            return Err(RbacError::NotFound(format!("{}/{}", table, id)));
        }
        Ok(())
    }

    /// All records matching `conditions`, in insertion order.
    pub(crate) fn list_records<T: DeserializeOwned>(
        &self,
        table: &str,
        allowed: &[&str],
        conditions: &Conditions,
    ) -> Result<Vec<T>, RbacError> {
        let (where_sql, params) = conditions.to_where(allowed)?;
        let sql = format!("SELECT data FROM {}{} ORDER BY rowid", table, where_sql);
        let rows = self.sql.query(&sql, &params)?;
        rows.iter().map(decode_row).collect()
    }

    /// First record matching `conditions`; `Ok(None)` when nothing matches.
    pub(crate) fn first_record<T: DeserializeOwned>(
        &self,
        table: &str,
        allowed: &[&str],
        conditions: &Conditions,
    ) -> Result<Option<T>, RbacError> {
        let (where_sql, params) = conditions.to_where(allowed)?;
        let sql = format!("SELECT data FROM {}{} ORDER BY rowid LIMIT 1", table, where_sql);
        let rows = self.sql.query(&sql, &params)?;
        rows.first().map(decode_row).transpose()
    }

    pub(crate) fn count_records(
        &self,
        table: &str,
        allowed: &[&str],
        conditions: &Conditions,
    ) -> Result<usize, RbacError> {
        let (where_sql, params) = conditions.to_where(allowed)?;
        let sql = format!("SELECT COUNT(*) AS cnt FROM {}{}", table, where_sql);
        let rows = self.sql.query(&sql, &params)?;
        Ok(rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0) as usize)
    }
}

fn decode_row<T: DeserializeOwned>(row: &rbac_sql::Row) -> Result<T, RbacError> {
    let data = row
        .get_str("data")
        .ok_or_else(|| RbacError::Internal("missing data column".into()))?;
    serde_json::from_str(data).map_err(|e| RbacError::Internal(e.to_string()))
}
