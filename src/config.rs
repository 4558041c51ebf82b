//! Manager configuration.

use std::fmt;
use std::sync::Arc;

use crate::policy::{default_id_generator, default_key_formatter, IdGenerator, KeyFormatter};
use crate::{ScopeContext, TxOptions};

/// Configuration for a [`Manager`](crate::Manager).
#[derive(Clone)]
pub struct Config {
    /// Whether a scope opened inside another scope reuses the outer one's handles.
    pub nested: bool,

    /// Canonicalizes key tuples into registry keys.
    pub key_formatter: KeyFormatter,

    /// Mints scope ids.
    pub id_generator: IdGenerator,

    /// Options used when `run_scoped` is called without any.
    pub default_options: Vec<TxOptions>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nested: false,
            key_formatter: default_key_formatter(),
            id_generator: default_id_generator(),
            default_options: Vec::new(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("nested", &self.nested)
            .field("default_options", &self.default_options)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether nested scopes reuse their parent's handles.
    #[must_use]
    pub fn nested(mut self, value: bool) -> Self {
        self.nested = value;
        self
    }

    /// Sets the key formatter.
    #[must_use]
    pub fn key_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&[&str]) -> String + Send + Sync + 'static,
    {
        self.key_formatter = Arc::new(formatter);
        self
    }

    /// Sets the scope id generator.
    #[must_use]
    pub fn id_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&ScopeContext) -> String + Send + Sync + 'static,
    {
        self.id_generator = Arc::new(generator);
        self
    }

    /// Sets the options used when a call passes none.
    #[must_use]
    pub fn default_options(mut self, options: Vec<TxOptions>) -> Self {
        self.default_options = options;
        self
    }
}
