use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use scoped_unit_of_work::{
    BoxError, ScopeContext, Transaction, TransactionalResource, TxOptions,
};

/// Key/value store whose writes become visible only on commit.
#[derive(Default)]
pub struct KvStore {
    committed: RwLock<HashMap<String, String>>,
}

impl KvStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Read outside of any transaction.
    pub fn get(&self, key: &str) -> Option<String> {
        self.committed.read().get(key).cloned()
    }

    pub fn resource(self: &Arc<Self>) -> Result<Box<dyn TransactionalResource>, BoxError> {
        Ok(Box::new(KvResource {
            store: self.clone(),
        }))
    }
}

struct KvResource {
    store: Arc<KvStore>,
}

#[async_trait]
impl TransactionalResource for KvResource {
    async fn begin(
        &self,
        _ctx: &ScopeContext,
        _options: &[TxOptions],
    ) -> Result<Arc<dyn Transaction>, BoxError> {
        Ok(Arc::new(KvTransaction {
            store: self.store.clone(),
            pending: RwLock::new(HashMap::new()),
        }))
    }
}

pub struct KvTransaction {
    store: Arc<KvStore>,
    pending: RwLock<HashMap<String, String>>,
}

impl KvTransaction {
    pub fn insert(&self, key: &str, value: &str) {
        self.pending.write().insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl Transaction for KvTransaction {
    async fn commit(&self) -> Result<(), BoxError> {
        let pending = std::mem::take(&mut *self.pending.write());
        self.store.committed.write().extend(pending);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), BoxError> {
        self.pending.write().clear();
        Ok(())
    }
}
