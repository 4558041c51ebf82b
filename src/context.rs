//! Scope context propagation.
//!
//! A [`ScopeContext`] is an immutable, chainable set of values that is passed
//! explicitly through a call graph. The manager binds the current
//! [`UnitOfWork`] into it; code running inside a scope resolves its keyed
//! transactions from the context it was handed.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::{Transaction, UnitOfWork, UowError, UowResult};

struct Node {
    type_id: TypeId,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Node>>,
}

/// Immutable value chain carried through a scoped call.
///
/// Deriving a context never mutates its parent; lookups walk from the most
/// recently added value towards the root, so a newer value of the same type
/// shadows an older one.
#[derive(Clone, Default)]
pub struct ScopeContext {
    head: Option<Arc<Node>>,
}

impl ScopeContext {
    /// An empty root context.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a context carrying `value`, keyed by its type.
    #[must_use]
    pub fn with_value<T: Any + Send + Sync>(&self, value: T) -> Self {
        Self {
            head: Some(Arc::new(Node {
                type_id: TypeId::of::<T>(),
                value: Arc::new(value),
                parent: self.head.clone(),
            })),
        }
    }

    /// The nearest value of type `T`, if any.
    pub fn value<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let mut node = self.head.as_ref();
        while let Some(current) = node {
            if current.type_id == TypeId::of::<T>() {
                return current.value.clone().downcast::<T>().ok();
            }
            node = current.parent.as_ref();
        }
        None
    }
}

impl fmt::Debug for ScopeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut depth = 0;
        let mut node = self.head.as_ref();
        while let Some(current) = node {
            depth += 1;
            node = current.parent.as_ref();
        }
        f.debug_struct("ScopeContext").field("values", &depth).finish()
    }
}

struct CurrentUnitOfWork(Arc<UnitOfWork>);

/// Derives a context whose current unit of work is `uow`.
pub fn bind(ctx: &ScopeContext, uow: Arc<UnitOfWork>) -> ScopeContext {
    ctx.with_value(CurrentUnitOfWork(uow))
}

/// The unit of work bound to `ctx`, if any.
pub fn current(ctx: &ScopeContext) -> Option<Arc<UnitOfWork>> {
    ctx.value::<CurrentUnitOfWork>().map(|bound| bound.0.clone())
}

/// Fetches (opening on first use) the handle for `keys` in the current scope.
pub async fn resolve(ctx: &ScopeContext, keys: &[&str]) -> UowResult<Arc<dyn Transaction>> {
    let uow = current(ctx).ok_or(UowError::NotFound)?;
    uow.acquire(ctx, keys).await
}

/// Like [`resolve`], downcasting the handle to the backend's concrete type.
pub async fn resolve_as<T>(ctx: &ScopeContext, keys: &[&str]) -> UowResult<Arc<T>>
where
    T: Transaction + 'static,
{
    let uow = current(ctx).ok_or(UowError::NotFound)?;
    uow.acquire_as::<T>(ctx, keys).await
}
