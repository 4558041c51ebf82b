use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scoped_unit_of_work::{
    BoxError, Config, Manager, ResourceFactory, ScopeContext, Transaction, TransactionAware,
    TransactionalResource, TxOptions,
};

/// In-memory backend that records every lifecycle call.
#[derive(Default)]
pub struct MockBackend {
    factory_calls: AtomicUsize,
    events: Mutex<Vec<String>>,
    options_seen: Mutex<Vec<Vec<TxOptions>>>,
    fail_begin: Mutex<HashSet<String>>,
    fail_commit: Mutex<HashSet<String>>,
    fail_rollback: Mutex<HashSet<String>>,
    begin_delay: Mutex<Option<Duration>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn manager(self: &Arc<Self>, config: Config) -> Manager {
        Manager::from_factory(self.factory(), config)
    }

    pub fn factory(self: &Arc<Self>) -> ResourceFactory {
        let backend = self.clone();
        Arc::new(move |_ctx: &ScopeContext, keys: &[&str]| backend.create(keys))
    }

    pub fn create(
        self: &Arc<Self>,
        keys: &[&str],
    ) -> Result<Box<dyn TransactionalResource>, BoxError> {
        self.factory_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockResource {
            backend: self.clone(),
            key: keys.join("/"),
        }))
    }

    pub fn factory_calls(&self) -> usize {
        self.factory_calls.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| e.as_str() == event).count()
    }

    pub fn options_seen(&self) -> Vec<Vec<TxOptions>> {
        self.options_seen.lock().clone()
    }

    pub fn fail_begin(&self, key: &str, fail: bool) {
        toggle(&self.fail_begin, key, fail);
    }

    pub fn fail_commit(&self, key: &str) {
        toggle(&self.fail_commit, key, true);
    }

    pub fn fail_rollback(&self, key: &str) {
        toggle(&self.fail_rollback, key, true);
    }

    pub fn delay_begin(&self, delay: Duration) {
        *self.begin_delay.lock() = Some(delay);
    }

    fn record(&self, event: String) {
        self.events.lock().push(event);
    }
}

fn toggle(set: &Mutex<HashSet<String>>, key: &str, on: bool) {
    let mut set = set.lock();
    if on {
        set.insert(key.to_string());
    } else {
        set.remove(key);
    }
}

struct MockResource {
    backend: Arc<MockBackend>,
    key: String,
}

#[async_trait]
impl TransactionalResource for MockResource {
    async fn begin(
        &self,
        _ctx: &ScopeContext,
        options: &[TxOptions],
    ) -> Result<Arc<dyn Transaction>, BoxError> {
        let delay = *self.backend.begin_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.backend.record(format!("begin:{}", self.key));
        self.backend.options_seen.lock().push(options.to_vec());
        if self.backend.fail_begin.lock().contains(&self.key) {
            return Err(format!("cannot begin {}", self.key).into());
        }
        Ok(Arc::new(MockTransaction {
            backend: self.backend.clone(),
            key: self.key.clone(),
        }))
    }
}

pub struct MockTransaction {
    backend: Arc<MockBackend>,
    pub key: String,
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn commit(&self) -> Result<(), BoxError> {
        self.backend.record(format!("commit:{}", self.key));
        if self.backend.fail_commit.lock().contains(&self.key) {
            return Err(format!("commit refused for {}", self.key).into());
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<(), BoxError> {
        self.backend.record(format!("rollback:{}", self.key));
        if self.backend.fail_rollback.lock().contains(&self.key) {
            return Err(format!("rollback refused for {}", self.key).into());
        }
        Ok(())
    }
}

/// Observer that counts its notifications and can refuse rollbacks.
#[derive(Default)]
pub struct CountingObserver {
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub refuse_rollback: bool,
}

#[async_trait]
impl TransactionAware for CountingObserver {
    async fn on_commit(&self) -> Result<(), BoxError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_rollback(&self) -> Result<(), BoxError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.refuse_rollback {
            return Err("observer refused rollback".into());
        }
        Ok(())
    }
}

/// Compares two handles by address.
pub fn same_handle(a: &Arc<dyn Transaction>, b: &Arc<dyn Transaction>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
