//! Scope entry point.
//!
//! ```text
//! Running ──fn Ok──────▶ Committing ──▶ Done
//!    │
//!    ├──fn Err─────────▶ RollingBack ─▶ Done (function error + rollback outcome)
//!    └──fn panics──────▶ RollingBack ─▶ panic resumed
//! ```

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context;
use crate::{
    BoxError, Config, ResourceFactory, ScopeContext, TransactionalResource, TxOptions, UnitOfWork,
    UowError, UowResult,
};

/// Opens scopes and drives their commit or rollback.
pub struct Manager {
    factory: ResourceFactory,
    config: Config,
}

impl Manager {
    /// Create a manager with the default [`Config`].
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&ScopeContext, &[&str]) -> Result<Box<dyn TransactionalResource>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        Self::with_config(factory, Config::default())
    }

    /// Create a manager opening resources through `factory` under `config`.
    pub fn with_config<F>(factory: F, config: Config) -> Self
    where
        F: Fn(&ScopeContext, &[&str]) -> Result<Box<dyn TransactionalResource>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        Self::from_factory(Arc::new(factory), config)
    }

    /// Create a manager from an already shared [`ResourceFactory`].
    pub fn from_factory(factory: ResourceFactory, config: Config) -> Self {
        Self { factory, config }
    }

    /// The configuration scopes are opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `f` inside a new scope.
    ///
    /// `f` receives a context with the new unit of work bound; handles it
    /// resolves are committed when it returns `Ok` and rolled back when it
    /// returns `Err` or panics. A panic is resumed after the rollback.
    ///
    /// With nesting enabled and a scope already bound to `ctx`, the new scope
    /// reuses the outer scope's handles instead of opening its own. Handles
    /// are begun by the outermost scope, so `options` given to a nested scope
    /// are not applied.
    pub async fn run_scoped<T, E, F, Fut>(
        &self,
        ctx: &ScopeContext,
        f: F,
        options: &[TxOptions],
    ) -> UowResult<T>
    where
        F: FnOnce(ScopeContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        let parent = if self.config.nested {
            context::current(ctx)
        } else {
            None
        };
        let explicit = !options.is_empty();
        let options = if explicit {
            options.to_vec()
        } else {
            self.config.default_options.clone()
        };
        let id = (self.config.id_generator)(ctx);
        let formatter = self.config.key_formatter.clone();
        let uow = Arc::new(match parent {
            // first level uses the factory, nested levels borrow from their parent
            Some(parent) => {
                if explicit {
                    warn!(
                        scope = %id,
                        parent = %parent.id(),
                        "options passed to a nested scope are ignored"
                    );
                }
                UnitOfWork::child(id, parent, formatter, options)
            }
            None => UnitOfWork::new(id, self.factory.clone(), formatter, options),
        });
        debug!(scope = %uow.id(), nested = uow.is_nested(), "scope started");

        let scoped = context::bind(ctx, uow.clone());
        let fut = match panic::catch_unwind(AssertUnwindSafe(|| f(scoped))) {
            Ok(fut) => fut,
            Err(payload) => return unwind(&uow, payload).await,
        };

        match AssertUnwindSafe(fut).catch_unwind().await {
            Err(payload) => unwind(&uow, payload).await,
            Ok(Err(err)) => {
                let source: BoxError = err.into();
                debug!(scope = %uow.id(), error = %source, "scope failed, rolling back");
                let rollback = uow.rollback_all().await.err();
                Err(UowError::Function { source, rollback })
            }
            Ok(Ok(value)) => {
                uow.commit_all().await?;
                debug!(scope = %uow.id(), "scope committed");
                Ok(value)
            }
        }
    }
}

/// Roll the scope back, then resume the caller's panic unchanged.
async fn unwind<T>(uow: &UnitOfWork, payload: Box<dyn Any + Send>) -> T {
    warn!(scope = %uow.id(), "panic in scope, rolling back");
    if let Err(err) = uow.rollback_all().await {
        warn!(scope = %uow.id(), error = %err, "rollback after panic failed");
    }
    panic::resume_unwind(payload)
}
