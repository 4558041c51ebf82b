use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::policy::KeyFormatter;
use crate::{
    ResourceFactory, RollbackError, ScopeContext, Transaction, TransactionAware, TxOptions,
    UowError, UowResult,
};

/// Lifecycle state of a handle held by a [`UnitOfWork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Active,
    Committed,
    RolledBack,
}

struct Entry {
    key: String,
    tx: Arc<dyn Transaction>,
    state: HandleState,
}

/// Keyed handles in creation order. Entries are only ever appended, and
/// only until the scope starts committing or rolling back.
#[derive(Default)]
struct Registry {
    index: HashMap<String, usize>,
    entries: Vec<Entry>,
    completed: bool,
}

impl Registry {
    fn get(&self, key: &str) -> Option<Arc<dyn Transaction>> {
        self.index.get(key).map(|&i| self.entries[i].tx.clone())
    }

    fn insert(&mut self, key: String, tx: Arc<dyn Transaction>) {
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push(Entry {
            key,
            tx,
            state: HandleState::Active,
        });
    }
}

/// Where a unit of work gets its handles from.
enum Origin {
    Factory(ResourceFactory),
    Parent(Arc<UnitOfWork>),
}

/// Per-scope registry of keyed transactions.
///
/// Handles are opened lazily on first [`acquire`](Self::acquire) of a key and
/// live until the scope commits or rolls back. A nested unit of work owns no
/// factory; it satisfies lookups through the top-level unit of work of its
/// chain, and the handle belongs to that one.
pub struct UnitOfWork {
    id: String,
    origin: Origin,
    key_formatter: KeyFormatter,
    options: Vec<TxOptions>,
    registry: Mutex<Registry>,
    observers: RwLock<Vec<Arc<dyn TransactionAware>>>,
}

impl UnitOfWork {
    /// Create a top-level unit of work that opens handles through `factory`.
    pub fn new(
        id: impl Into<String>,
        factory: ResourceFactory,
        key_formatter: KeyFormatter,
        options: Vec<TxOptions>,
    ) -> Self {
        Self::build(id.into(), Origin::Factory(factory), key_formatter, options)
    }

    /// Create a unit of work nested under `parent`, reusing its handles.
    pub fn child(
        id: impl Into<String>,
        parent: Arc<UnitOfWork>,
        key_formatter: KeyFormatter,
        options: Vec<TxOptions>,
    ) -> Self {
        Self::build(id.into(), Origin::Parent(parent), key_formatter, options)
    }

    fn build(
        id: String,
        origin: Origin,
        key_formatter: KeyFormatter,
        options: Vec<TxOptions>,
    ) -> Self {
        Self {
            id,
            origin,
            key_formatter,
            options,
            registry: Mutex::new(Registry::default()),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Scope id minted when the unit of work was created.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The enclosing unit of work of a nested scope.
    pub fn parent(&self) -> Option<&Arc<UnitOfWork>> {
        match &self.origin {
            Origin::Parent(parent) => Some(parent),
            Origin::Factory(_) => None,
        }
    }

    /// Whether this unit of work borrows its handles from a parent.
    pub fn is_nested(&self) -> bool {
        self.parent().is_some()
    }

    /// Options handed to `begin`; a nested scope's options are never applied.
    pub fn options(&self) -> &[TxOptions] {
        &self.options
    }

    /// The top of the chain: the unit of work that opens and owns handles.
    fn owner(&self) -> (&UnitOfWork, &ResourceFactory) {
        let mut uow = self;
        loop {
            match &uow.origin {
                Origin::Factory(factory) => return (uow, factory),
                Origin::Parent(parent) => uow = &**parent,
            }
        }
    }

    /// Fetch the handle for `keys`, opening it on first use.
    ///
    /// Concurrent callers are serialized so a key is opened at most once per
    /// scope. A failed open stores nothing, so the next call retries. Once the
    /// scope (or the scope owning its handles) has completed, every call fails
    /// with [`UowError::ScopeCompleted`].
    pub async fn acquire(
        &self,
        ctx: &ScopeContext,
        keys: &[&str],
    ) -> UowResult<Arc<dyn Transaction>> {
        let (owner, factory) = self.owner();
        if !std::ptr::eq(owner, self) && self.registry.lock().await.completed {
            return Err(UowError::ScopeCompleted {
                id: self.id.clone(),
            });
        }
        owner.acquire_owned(factory, ctx, keys).await
    }

    /// Like [`acquire`](Self::acquire), downcasting to the backend's handle type.
    pub async fn acquire_as<T>(&self, ctx: &ScopeContext, keys: &[&str]) -> UowResult<Arc<T>>
    where
        T: Transaction + 'static,
    {
        let tx = self.acquire(ctx, keys).await?;
        tx.as_any_arc()
            .downcast::<T>()
            .map_err(|_| UowError::HandleType {
                key: (self.key_formatter)(keys),
            })
    }

    async fn acquire_owned(
        &self,
        factory: &ResourceFactory,
        ctx: &ScopeContext,
        keys: &[&str],
    ) -> UowResult<Arc<dyn Transaction>> {
        let key = (self.key_formatter)(keys);
        let mut registry = self.registry.lock().await;
        if registry.completed {
            return Err(UowError::ScopeCompleted {
                id: self.id.clone(),
            });
        }
        if let Some(tx) = registry.get(&key) {
            return Ok(tx);
        }

        let resource = factory(ctx, keys).map_err(|source| UowError::ResourceOpen {
            key: key.clone(),
            source,
        })?;
        let tx = resource
            .begin(ctx, &self.options)
            .await
            .map_err(|source| UowError::ResourceOpen {
                key: key.clone(),
                source,
            })?;

        debug!(scope = %self.id, key = %key, "opened transaction");
        registry.insert(key, tx.clone());
        Ok(tx)
    }

    /// Register a component to be notified once the owning scope completes.
    pub fn register_transaction_aware(&self, observer: Arc<dyn TransactionAware>) {
        self.owner().0.observers.write().push(observer);
    }

    /// Commit every active handle in creation order.
    ///
    /// Stops at the first failure; handles before it stay committed and
    /// handles after it stay active.
    pub async fn commit_all(&self) -> UowResult<()> {
        let mut registry = self.registry.lock().await;
        registry.completed = true;
        for entry in registry
            .entries
            .iter_mut()
            .filter(|entry| entry.state == HandleState::Active)
        {
            if let Err(source) = entry.tx.commit().await {
                warn!(scope = %self.id, key = %entry.key, error = %source, "commit failed");
                return Err(UowError::Commit {
                    key: entry.key.clone(),
                    source,
                });
            }
            entry.state = HandleState::Committed;
            debug!(scope = %self.id, key = %entry.key, "committed transaction");
        }
        drop(registry);

        let observers = self.observers.read().clone();
        for observer in observers.iter() {
            observer
                .on_commit()
                .await
                .map_err(|source| UowError::Observer { source })?;
        }
        Ok(())
    }

    /// Roll back every active handle in creation order, whatever fails.
    ///
    /// All failures, including observer failures, are collected into one
    /// [`RollbackError`].
    pub async fn rollback_all(&self) -> Result<(), RollbackError> {
        let mut failures = RollbackError::default();
        let mut registry = self.registry.lock().await;
        registry.completed = true;
        for entry in registry
            .entries
            .iter_mut()
            .filter(|entry| entry.state == HandleState::Active)
        {
            match entry.tx.rollback().await {
                Ok(()) => {
                    entry.state = HandleState::RolledBack;
                    debug!(scope = %self.id, key = %entry.key, "rolled back transaction");
                }
                Err(source) => {
                    warn!(scope = %self.id, key = %entry.key, error = %source, "rollback failed");
                    failures.push(entry.key.clone(), source);
                }
            }
        }
        drop(registry);

        let observers = self.observers.read().clone();
        for observer in observers.iter() {
            if let Err(source) = observer.on_rollback().await {
                failures.push("observer", source);
            }
        }
        failures.into_result()
    }

    /// Keys held by this unit of work and their state, in creation order.
    pub async fn states(&self) -> Vec<(String, HandleState)> {
        let registry = self.registry.lock().await;
        registry
            .entries
            .iter()
            .map(|entry| (entry.key.clone(), entry.state))
            .collect()
    }

    /// Number of handles held by this unit of work.
    pub async fn len(&self) -> usize {
        self.registry.lock().await.entries.len()
    }

    /// Whether this unit of work holds no handles.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
