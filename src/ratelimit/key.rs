//! Window key generation.

use std::fmt;

use super::window::WindowKind;

/// Operation type used when a caller does not name one.
pub const DEFAULT_OPERATION_TYPE: &str = "general";

/// Prefix shared by every key this crate writes.
pub const KEY_PREFIX: &str = "sliding_window";

/// A key that addresses one window's stored events.
///
/// The rendered form is a stable contract for ops tooling:
/// `sliding_window:{kind}:ai:{operation_type}:{user_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    /// The window this key belongs to
    pub kind: WindowKind,
    /// Namespace separating independent AI features
    pub operation_type: String,
    /// Opaque user identifier
    pub user_id: String,
}

impl WindowKey {
    /// Create a new window key.
    pub fn new(kind: WindowKind, operation_type: &str, user_id: &str) -> Self {
        Self {
            kind,
            operation_type: operation_type.to_string(),
            user_id: user_id.to_string(),
        }
    }

    /// Convert the key to its store representation.
    pub fn to_store_key(&self) -> String {
        format!(
            "{}:{}:ai:{}:{}",
            KEY_PREFIX, self.kind, self.operation_type, self.user_id
        )
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_store_key())
    }
}
