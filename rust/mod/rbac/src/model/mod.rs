mod identity;
mod permission;
mod role;

pub use identity::*;
pub use permission::*;
pub use role::*;
