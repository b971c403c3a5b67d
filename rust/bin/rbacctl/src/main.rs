//! `rbacctl`: admin CLI for the RBAC store.
//!
//! Seeds the system roles, creates roles and permissions, and prints role
//! trees. Output is JSON on stdout; failures print a JSON error with a stable
//! code on stderr.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use rbac::{RbacConfig, RbacService};
use rbac_core::{ServiceConfig, ServiceError};
use rbac_sql::SqliteStore;

/// RBAC admin CLI.
#[derive(Parser, Debug)]
#[command(name = "rbacctl", about = "RBAC role and permission admin")]
struct Cli {
    /// Data directory (the database lives at `{data_dir}/rbac.sqlite`).
    #[arg(long = "data-dir", global = true)]
    data_dir: Option<PathBuf>,

    /// Explicit SQLite database path.
    #[arg(long = "sqlite", global = true)]
    sqlite: Option<PathBuf>,

    /// Table name prefix.
    #[arg(long = "table-prefix", global = true)]
    table_prefix: Option<String>,

    /// Deepest level the tree resolver descends to.
    #[arg(long = "max-tree-depth", global = true)]
    max_tree_depth: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ensure the SYSTEM seed roles exist.
    Seed,

    /// Role management.
    Role {
        #[command(subcommand)]
        action: RoleAction,
    },

    /// Permission management.
    Perm {
        #[command(subcommand)]
        action: PermAction,
    },
}

#[derive(Subcommand, Debug)]
enum RoleAction {
    /// Create a role (idempotent).
    Add {
        name: String,
        /// Parent role id (omit for a root role).
        #[arg(long)]
        parent: Option<String>,
        /// SYSTEM, NORMAL or a numeric code.
        #[arg(long = "type", default_value = "NORMAL")]
        role_type: String,
    },
    /// Create a role from a JSON attribute bag (`name`, `parentID`, `type`).
    Create {
        #[arg(long = "json")]
        json_body: String,
    },
    /// Get a role by id.
    Get { id: String },
    /// Print the role tree.
    Tree {
        /// Start below this role ("" for roots, omit for every role).
        #[arg(long)]
        parent: Option<String>,
        /// ALL, SYSTEM or NORMAL.
        #[arg(long = "type", default_value = "ALL")]
        role_type: String,
        /// Only list one level.
        #[arg(long)]
        flat: bool,
    },
    /// Check whether any other role uses a name.
    Exists {
        name: String,
        /// Parent role id used to compute the role's own identity.
        #[arg(long)]
        parent: Option<String>,
        #[arg(long = "exclude-self")]
        exclude_self: bool,
    },
    /// Rename and/or move a role; re-keys its subtree.
    Relocate {
        id: String,
        #[arg(long)]
        name: String,
        /// New parent id (omit to move to root).
        #[arg(long)]
        parent: Option<String>,
    },
    /// Delete a role without children.
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum PermAction {
    /// Create a permission (idempotent).
    Add {
        action: String,
        object: String,
        #[arg(long)]
        alias: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Id of the module permission this one belongs to.
        #[arg(long)]
        module: Option<String>,
        /// Create a module permission instead of a leaf grant.
        #[arg(long = "as-module")]
        as_module: bool,
    },
    /// Create a permission from a JSON attribute bag (`action`,
    /// `objectValue`, `objectAlias`, `description`, `moduleID`, `type`).
    Create {
        #[arg(long = "json")]
        json_body: String,
    },
    /// Get a permission by id.
    Get { id: String },
    /// Check whether an alias is free for a permission.
    CheckAlias {
        alias: String,
        /// Id of the permission that wants the alias.
        #[arg(long = "own-id", default_value = "")]
        own_id: String,
    },
    /// List the members of a module.
    Module { id: String },
    /// Delete a permission.
    Delete { id: String },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = service_config(&cli);

    let sqlite_path = config.resolve_sqlite_path();
    if let Some(dir) = sqlite_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    info!("Opening {}", sqlite_path.display());
    let sql = Arc::new(
        SqliteStore::open(&sqlite_path)
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );
    let svc = RbacService::new(sql, RbacConfig::from(&config))
        .map_err(|e| anyhow::anyhow!("failed to initialize RBAC store: {}", e))?;

    let result = match cli.command {
        Commands::Seed => commands::role::seed(&svc),
        Commands::Role { action } => match action {
            RoleAction::Add {
                name,
                parent,
                role_type,
            } => commands::role::add(&svc, &name, parent.as_deref(), &role_type),
            RoleAction::Create { json_body } => commands::role::create(&svc, &json_body),
            RoleAction::Get { id } => commands::role::get(&svc, &id),
            RoleAction::Tree {
                parent,
                role_type,
                flat,
            } => commands::role::tree(&svc, parent.as_deref(), &role_type, !flat),
            RoleAction::Exists {
                name,
                parent,
                exclude_self,
            } => commands::role::exists(&svc, &name, parent.as_deref(), exclude_self),
            RoleAction::Relocate { id, name, parent } => {
                commands::role::relocate(&svc, &id, parent.as_deref(), &name)
            }
            RoleAction::Delete { id } => commands::role::delete(&svc, &id),
        },
        Commands::Perm { action } => match action {
            PermAction::Add {
                action,
                object,
                alias,
                description,
                module,
                as_module,
            } => commands::permission::add(
                &svc,
                commands::permission::NewPermission {
                    action,
                    object,
                    alias,
                    description,
                    module,
                    as_module,
                },
            ),
            PermAction::Create { json_body } => commands::permission::create(&svc, &json_body),
            PermAction::Get { id } => commands::permission::get(&svc, &id),
            PermAction::CheckAlias { alias, own_id } => {
                commands::permission::check_alias(&svc, &alias, &own_id)
            }
            PermAction::Module { id } => commands::permission::module(&svc, &id),
            PermAction::Delete { id } => commands::permission::delete(&svc, &id),
        },
    };

    match result {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            let err = ServiceError::from(e);
            eprintln!("{}", err.to_json());
            std::process::exit(1);
        }
    }
}

/// Flags override the defaults of `ServiceConfig`.
fn service_config(cli: &Cli) -> ServiceConfig {
    let mut config = ServiceConfig {
        data_dir: cli.data_dir.clone(),
        sqlite_path: cli.sqlite.clone(),
        ..Default::default()
    };
    if let Some(ref prefix) = cli.table_prefix {
        config.table_prefix = prefix.clone();
    }
    if let Some(depth) = cli.max_tree_depth {
        config.max_tree_depth = depth;
    }
    config
}
