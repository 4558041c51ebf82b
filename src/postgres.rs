//! PostgreSQL backend built on sqlx.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{
    BoxError, Config, Manager, ScopeContext, Transaction, TransactionalResource, TxOptions,
};

/// PgTransaction wraps a database transaction for use by repositories.
///
/// Clones share the same underlying transaction, so every repository that
/// resolves the same key inside a scope writes through one transaction.
#[derive(Clone, Debug)]
pub struct PgTransaction {
    pub tx: Arc<Mutex<Option<sqlx::Transaction<'static, Postgres>>>>,
}

impl PgTransaction {
    /// Creates a new PgTransaction from a PostgreSQL transaction.
    pub fn new(tx: sqlx::Transaction<'static, Postgres>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Takes ownership of the transaction, leaving None in its place.
    /// This should only be called when committing or rolling back.
    async fn take_transaction(&self) -> Result<sqlx::Transaction<'static, Postgres>, sqlx::Error> {
        self.tx.lock().await.take().ok_or(sqlx::Error::PoolClosed)
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(&self) -> Result<(), BoxError> {
        let tx = self.take_transaction().await?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), BoxError> {
        let tx = self.take_transaction().await?;
        tx.rollback().await?;
        Ok(())
    }
}

/// A pool from which a transaction is begun on first use of a key.
#[derive(Clone, Debug)]
pub struct PgResource {
    pool: PgPool,
}

impl PgResource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionalResource for PgResource {
    async fn begin(
        &self,
        _ctx: &ScopeContext,
        options: &[TxOptions],
    ) -> Result<Arc<dyn Transaction>, BoxError> {
        let mut tx = self.pool.begin().await?;
        if let Some(statement) = set_transaction_statement(options) {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }
        Ok(Arc::new(PgTransaction::new(tx)))
    }
}

/// `SET TRANSACTION` for the first options entry, if it asks for anything.
fn set_transaction_statement(options: &[TxOptions]) -> Option<String> {
    let options = options.first()?;
    let mut modes = Vec::new();
    if let Some(level) = options.isolation {
        modes.push(format!("ISOLATION LEVEL {}", level.as_sql()));
    }
    if options.read_only {
        modes.push("READ ONLY".to_string());
    }
    if modes.is_empty() {
        None
    } else {
        Some(format!("SET TRANSACTION {}", modes.join(", ")))
    }
}

/// Routes keys to connection pools.
///
/// The first key component selects a tenant pool; keys naming no registered
/// tenant use the default pool.
#[derive(Clone, Debug)]
pub struct PgResourceFactory {
    default: PgPool,
    tenants: HashMap<String, PgPool>,
}

impl PgResourceFactory {
    pub fn new(default: PgPool) -> Self {
        Self {
            default,
            tenants: HashMap::new(),
        }
    }

    #[must_use]
    pub fn tenant(mut self, name: impl Into<String>, pool: PgPool) -> Self {
        self.tenants.insert(name.into(), pool);
        self
    }

    pub fn create(
        &self,
        _ctx: &ScopeContext,
        keys: &[&str],
    ) -> Result<Box<dyn TransactionalResource>, BoxError> {
        let pool = keys
            .first()
            .and_then(|tenant| self.tenants.get(*tenant))
            .unwrap_or(&self.default);
        Ok(Box::new(PgResource::new(pool.clone())))
    }

    /// Build a manager that opens its transactions through this factory.
    pub fn into_manager(self, config: Config) -> Manager {
        Manager::with_config(move |ctx, keys| self.create(ctx, keys), config)
    }
}
