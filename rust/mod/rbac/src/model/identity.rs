use rbac_core::hash_string;

/// Literal joining the segments of a composed key.
pub const KEY_SEPARATOR: &str = "-";

/// Derive a content-addressed identifier from ordered key segments.
///
/// The segments are joined with [`KEY_SEPARATOR`] and hashed. Empty segments
/// are valid: a root role's key starts with an empty parent segment.
pub fn derive_id(parts: &[&str]) -> String {
    hash_string(&parts.join(KEY_SEPARATOR))
}
