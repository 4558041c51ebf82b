//! Scoped Unit of Work
//!
//! This crate coordinates several independent transactional resources inside
//! one logical scope. Handles are opened lazily per key, shared by everything
//! running in the scope, and committed or rolled back together when the
//! scope ends.

pub mod config;
pub mod context;
pub mod error;
pub mod manager;
pub mod policy;
pub mod postgres;
pub mod transaction_aware;
pub mod transactional;
pub mod unit_of_work;

pub use config::Config;
pub use context::ScopeContext;
pub use error::{BoxError, RollbackError, RollbackFailure, UowError, UowResult};
pub use manager::Manager;
pub use policy::{IdGenerator, KeyFormatter};
pub use postgres::{PgResource, PgResourceFactory, PgTransaction};
pub use transaction_aware::TransactionAware;
pub use transactional::{
    IsolationLevel, ResourceFactory, Transaction, TransactionalResource, TxOptions,
};
pub use unit_of_work::{HandleState, UnitOfWork};
