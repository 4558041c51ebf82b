//! Injectable policies for key canonicalization and scope id minting.

use std::sync::Arc;
use uuid::Uuid;

use crate::ScopeContext;

/// Turns a key tuple into the canonical registry key.
pub type KeyFormatter = Arc<dyn Fn(&[&str]) -> String + Send + Sync>;

/// Mints the id of a new scope.
pub type IdGenerator = Arc<dyn Fn(&ScopeContext) -> String + Send + Sync>;

/// Joins the key components with `/`.
pub fn default_key_formatter() -> KeyFormatter {
    Arc::new(|keys: &[&str]| keys.join("/"))
}

/// Random UUID v4 per scope.
pub fn default_id_generator() -> IdGenerator {
    Arc::new(|_ctx: &ScopeContext| Uuid::new_v4().to_string())
}
