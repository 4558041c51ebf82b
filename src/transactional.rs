use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

use crate::{BoxError, ScopeContext};

/// Isolation level requested for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Backend-agnostic options handed to [`TransactionalResource::begin`].
///
/// Backends are free to ignore options they cannot honour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation: Option<IsolationLevel>,
    pub read_only: bool,
}

impl TxOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

/// Upcast to `Any` so handles can be resolved to their concrete backend type.
pub trait AsAny: Send + Sync {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// An active transaction against one backing resource.
///
/// The unit of work drives each handle to exactly one of `commit` or
/// `rollback`.
#[async_trait]
pub trait Transaction: AsAny {
    async fn commit(&self) -> Result<(), BoxError>;

    async fn rollback(&self) -> Result<(), BoxError>;
}

/// A resource that has not started a transaction yet.
///
/// Produced by a [`ResourceFactory`]; must not touch the backend until
/// `begin` is called.
#[async_trait]
pub trait TransactionalResource: Send + Sync {
    async fn begin(
        &self,
        ctx: &ScopeContext,
        options: &[TxOptions],
    ) -> Result<Arc<dyn Transaction>, BoxError>;
}

/// Produces a not-yet-started resource for a scope and key tuple.
pub type ResourceFactory = Arc<
    dyn Fn(&ScopeContext, &[&str]) -> Result<Box<dyn TransactionalResource>, BoxError>
        + Send
        + Sync,
>;
