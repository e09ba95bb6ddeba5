//! # Transaction Coordinator
//!
//! Every chunk is wrapped in exactly one begin / commit-or-rollback cycle on
//! a [`TransactionManager`]. Each step and each partition obtains its own
//! manager from the [`TransactionProvider`], so scopes never overlap.
//!
//! When no transactional resource is configured the kernel uses
//! [`NoOpTransactionManager`], which only tracks status.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Logical state of a transaction scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    NoTransaction,
    Active,
    MarkedRollback,
    Committed,
    RolledBack,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoTransaction => "no_transaction",
            Self::Active => "active",
            Self::MarkedRollback => "marked_rollback",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Transaction already active")]
    AlreadyActive,

    #[error("No active transaction (status {0})")]
    NotActive(TransactionStatus),

    #[error("Transaction was marked rollback-only and has been rolled back")]
    RollbackOnly,

    #[error("Transaction resource failure: {0}")]
    Resource(String),
}

pub type TransactionResult<T> = Result<T, TransactionError>;

/// Identifies who owns a transaction scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionScope {
    pub job_execution_id: i64,
    pub step_name: String,
    pub partition: Option<u32>,
}

/// Adapter over whatever transaction facility is available
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self) -> TransactionResult<()>;

    /// Commit the active transaction. A transaction marked rollback-only is
    /// rolled back instead and reported as [`TransactionError::RollbackOnly`].
    async fn commit(&self) -> TransactionResult<()>;

    async fn rollback(&self) -> TransactionResult<()>;

    fn set_rollback_only(&self) -> TransactionResult<()>;

    fn status(&self) -> TransactionStatus;

    fn set_transaction_timeout(&self, timeout: Duration);
}

/// Hands out one independent manager per step or partition scope
pub trait TransactionProvider: Send + Sync {
    fn manager_for(&self, scope: &TransactionScope) -> Arc<dyn TransactionManager>;
}

#[derive(Debug)]
struct NoOpState {
    status: TransactionStatus,
    timeout: Option<Duration>,
}

/// Logical-only transaction manager
#[derive(Debug)]
pub struct NoOpTransactionManager {
    state: Mutex<NoOpState>,
}

impl Default for NoOpTransactionManager {
    fn default() -> Self {
        Self {
            state: Mutex::new(NoOpState {
                status: TransactionStatus::NoTransaction,
                timeout: None,
            }),
        }
    }
}

impl NoOpTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout applied by the most recent `set_transaction_timeout`
    pub fn timeout(&self) -> Option<Duration> {
        self.state.lock().timeout
    }
}

#[async_trait]
impl TransactionManager for NoOpTransactionManager {
    async fn begin(&self) -> TransactionResult<()> {
        let mut state = self.state.lock();
        if matches!(
            state.status,
            TransactionStatus::Active | TransactionStatus::MarkedRollback
        ) {
            return Err(TransactionError::AlreadyActive);
        }
        state.status = TransactionStatus::Active;
        Ok(())
    }

    async fn commit(&self) -> TransactionResult<()> {
        let mut state = self.state.lock();
        match state.status {
            TransactionStatus::Active => {
                state.status = TransactionStatus::Committed;
                Ok(())
            }
            TransactionStatus::MarkedRollback => {
                state.status = TransactionStatus::RolledBack;
                Err(TransactionError::RollbackOnly)
            }
            other => Err(TransactionError::NotActive(other)),
        }
    }

    async fn rollback(&self) -> TransactionResult<()> {
        let mut state = self.state.lock();
        match state.status {
            TransactionStatus::Active | TransactionStatus::MarkedRollback => {
                state.status = TransactionStatus::RolledBack;
                Ok(())
            }
            other => Err(TransactionError::NotActive(other)),
        }
    }

    fn set_rollback_only(&self) -> TransactionResult<()> {
        let mut state = self.state.lock();
        match state.status {
            TransactionStatus::Active | TransactionStatus::MarkedRollback => {
                state.status = TransactionStatus::MarkedRollback;
                Ok(())
            }
            other => Err(TransactionError::NotActive(other)),
        }
    }

    fn status(&self) -> TransactionStatus {
        self.state.lock().status
    }

    fn set_transaction_timeout(&self, timeout: Duration) {
        self.state.lock().timeout = Some(timeout);
    }
}

/// Provider used when no transactional resource is configured
#[derive(Debug, Default, Clone)]
pub struct NoOpTransactionProvider;

impl TransactionProvider for NoOpTransactionProvider {
    fn manager_for(&self, _scope: &TransactionScope) -> Arc<dyn TransactionManager> {
        Arc::new(NoOpTransactionManager::new())
    }
}
