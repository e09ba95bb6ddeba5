//! Transaction provider that fails commits or rollbacks on demand

use async_trait::async_trait;
use batch_kernel::transaction::{
    NoOpTransactionManager, TransactionError, TransactionManager, TransactionProvider,
    TransactionResult, TransactionScope, TransactionStatus,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Hands out managers sharing one commit counter
///
/// `fail_commit` makes that commit (1-based, counted across every scope)
/// fail; `fail_rollback` makes every rollback fail.
#[derive(Debug, Default)]
pub struct FaultyTransactions {
    commits: Arc<AtomicU32>,
    fail_commit: Option<u32>,
    fail_rollback: bool,
}

impl FaultyTransactions {
    pub fn failing_commit(commit: u32) -> Self {
        Self {
            fail_commit: Some(commit),
            ..Self::default()
        }
    }

    pub fn failing_rollback() -> Self {
        Self {
            fail_rollback: true,
            ..Self::default()
        }
    }

    pub fn commits(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }
}

impl TransactionProvider for FaultyTransactions {
    fn manager_for(&self, _scope: &TransactionScope) -> Arc<dyn TransactionManager> {
        Arc::new(FaultyManager {
            inner: NoOpTransactionManager::new(),
            commits: self.commits.clone(),
            fail_commit: self.fail_commit,
            fail_rollback: self.fail_rollback,
        })
    }
}

struct FaultyManager {
    inner: NoOpTransactionManager,
    commits: Arc<AtomicU32>,
    fail_commit: Option<u32>,
    fail_rollback: bool,
}

#[async_trait]
impl TransactionManager for FaultyManager {
    async fn begin(&self) -> TransactionResult<()> {
        self.inner.begin().await
    }

    async fn commit(&self) -> TransactionResult<()> {
        let commit = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_commit == Some(commit) {
            self.inner.rollback().await?;
            return Err(TransactionError::Resource("disk full".to_string()));
        }
        self.inner.commit().await
    }

    async fn rollback(&self) -> TransactionResult<()> {
        if self.fail_rollback {
            return Err(TransactionError::Resource("connection lost".to_string()));
        }
        self.inner.rollback().await
    }

    fn set_rollback_only(&self) -> TransactionResult<()> {
        self.inner.set_rollback_only()
    }

    fn status(&self) -> TransactionStatus {
        self.inner.status()
    }

    fn set_transaction_timeout(&self, timeout: Duration) {
        self.inner.set_transaction_timeout(timeout);
    }
}
