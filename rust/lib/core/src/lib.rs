pub mod attrs;
pub mod config;
pub mod digest;
pub mod error;
pub mod types;

pub use attrs::Attributes;
pub use config::ServiceConfig;
pub use digest::hash_string;
pub use error::ServiceError;
pub use types::now_rfc3339;
