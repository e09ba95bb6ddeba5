use crate::config::{ConfigManager, KernelConfig};
use crate::error::Result;
use crate::events::EventPublisher;
use crate::persistence::{InMemoryJobRepository, JobRepository};
use crate::registry::{
    ArtifactResolver, InMemoryArtifactRegistry, JobDefinitionRegistry, JobDefinitionSource,
};
use crate::transaction::{NoOpTransactionProvider, TransactionProvider};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Shared kernel dependencies and configuration
///
/// Constructed once and passed explicitly to the operator and every
/// controller it spawns:
/// - Kernel configuration
/// - Persistence gateway
/// - Artifact resolver and job definition source
/// - Transaction provider
/// - Event publisher
pub struct KernelContext {
    /// Kernel instance ID
    pub kernel_id: Uuid,

    pub config: KernelConfig,

    pub repository: Arc<dyn JobRepository>,

    pub artifacts: Arc<dyn ArtifactResolver>,

    pub job_definitions: Arc<dyn JobDefinitionSource>,

    pub transactions: Arc<dyn TransactionProvider>,

    pub event_publisher: EventPublisher,
}

impl std::fmt::Debug for KernelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelContext")
            .field("kernel_id", &self.kernel_id)
            .field("config", &self.config)
            .field("repository", &"Arc<dyn JobRepository>")
            .field("artifacts", &"Arc<dyn ArtifactResolver>")
            .field("job_definitions", &"Arc<dyn JobDefinitionSource>")
            .field("transactions", &"Arc<dyn TransactionProvider>")
            .field("event_subscribers", &self.event_publisher.subscriber_count())
            .finish()
    }
}

impl KernelContext {
    pub fn builder() -> KernelContextBuilder {
        KernelContextBuilder::default()
    }
}

/// Builder with in-memory defaults for every collaborator
#[derive(Default)]
pub struct KernelContextBuilder {
    config: Option<KernelConfig>,
    repository: Option<Arc<dyn JobRepository>>,
    artifacts: Option<Arc<dyn ArtifactResolver>>,
    job_definitions: Option<Arc<dyn JobDefinitionSource>>,
    transactions: Option<Arc<dyn TransactionProvider>>,
    event_publisher: Option<EventPublisher>,
}

impl KernelContextBuilder {
    pub fn config(mut self, config: KernelConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn config_manager(self, manager: &ConfigManager) -> Self {
        self.config(manager.config().clone())
    }

    pub fn repository(mut self, repository: Arc<dyn JobRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn artifacts(mut self, artifacts: Arc<dyn ArtifactResolver>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn job_definitions(mut self, job_definitions: Arc<dyn JobDefinitionSource>) -> Self {
        self.job_definitions = Some(job_definitions);
        self
    }

    pub fn transactions(mut self, transactions: Arc<dyn TransactionProvider>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    pub fn event_publisher(mut self, event_publisher: EventPublisher) -> Self {
        self.event_publisher = Some(event_publisher);
        self
    }

    pub fn build(self) -> Result<KernelContext> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let event_publisher = self
            .event_publisher
            .unwrap_or_else(|| EventPublisher::new(config.events.channel_capacity));

        let context = KernelContext {
            kernel_id: Uuid::new_v4(),
            repository: self
                .repository
                .unwrap_or_else(|| Arc::new(InMemoryJobRepository::new())),
            artifacts: self
                .artifacts
                .unwrap_or_else(|| Arc::new(InMemoryArtifactRegistry::new())),
            job_definitions: self
                .job_definitions
                .unwrap_or_else(|| Arc::new(JobDefinitionRegistry::new())),
            transactions: self
                .transactions
                .unwrap_or_else(|| Arc::new(NoOpTransactionProvider)),
            event_publisher,
            config,
        };

        info!(
            kernel_id = %context.kernel_id,
            max_partition_threads = context.config.max_partition_threads,
            "🔧 Initialized KernelContext"
        );

        Ok(context)
    }
}
