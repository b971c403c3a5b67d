//! RBAC module: content-addressed roles and permissions.
//!
//! # Resources
//!
//! - **Role**: node in a role tree, identified by `hash(parent_id + "-" + name)`
//! - **Permission**: (action, object) grant, identified by `hash(action + "-" + object)`,
//!   optionally grouped under a module permission and labelled with a unique alias
//!
//! Records describing the same logical entity derive the same id, so creating
//! them twice collapses to one row.
//!
//! # Usage
//!
//! ```ignore
//! use rbac::{RbacService, RbacConfig, Role, RoleType, Conditions};
//!
//! let svc = RbacService::new(sql, RbacConfig::default())?;
//! let root = svc.save_role(Role::new(None, "ops", RoleType::Normal)?)?;
//! let tree = svc.resolve_tree(&Conditions::new(), RoleType::All, Some(""), true)?;
//! ```

pub mod error;
pub mod model;
pub mod service;

pub use error::RbacError;
pub use model::*;
pub use service::{Conditions, RbacConfig, RbacService};
