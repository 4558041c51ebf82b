use async_trait::async_trait;

use crate::BoxError;

/// Trait for components that need to be notified of scope completion.
///
/// Components implementing this trait can be registered with a [`UnitOfWork`]
/// to receive callbacks once every handle of the scope has been committed or
/// rolled back. This allows repositories and other components to perform
/// cleanup operations, update caches, or handle other post-transaction tasks.
///
/// [`UnitOfWork`]: crate::UnitOfWork
#[async_trait]
pub trait TransactionAware: Send + Sync {
    /// Called after every handle of the scope committed.
    ///
    /// Implementations should use this to finalize any pending operations,
    /// such as updating caches or flushing buffers.
    async fn on_commit(&self) -> Result<(), BoxError>;

    /// Called after the scope rolled back.
    ///
    /// Implementations should use this to revert any in-memory state changes
    /// that were made during the scope.
    async fn on_rollback(&self) -> Result<(), BoxError>;
}
