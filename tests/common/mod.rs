//! Shared fixtures for kernel integration tests: a harness wiring the
//! in-memory collaborators together, plus small artifacts whose behavior is
//! driven by their properties.

#![allow(dead_code)] // Not every test binary uses every fixture

pub mod artifacts;
pub mod transactions;

use artifacts::Recorder;
use batch_kernel::job::JobDefinition;
use batch_kernel::transaction::TransactionProvider;
use batch_kernel::{
    InMemoryArtifactRegistry, InMemoryJobRepository, JobDefinitionRegistry, JobExecution,
    JobOperator, JobParameters, KernelConfig, KernelContext, StepExecution,
};
use std::sync::Arc;
use std::time::Duration;

const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Harness {
    pub operator: JobOperator,
    pub artifacts: Arc<InMemoryArtifactRegistry>,
    pub jobs: Arc<JobDefinitionRegistry>,
    pub repository: Arc<InMemoryJobRepository>,
    pub recorder: Arc<Recorder>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_transactions(transactions: Arc<dyn TransactionProvider>) -> Self {
        Self::build(KernelConfig::default(), Some(transactions))
    }

    fn build(mut config: KernelConfig, transactions: Option<Arc<dyn TransactionProvider>>) -> Self {
        config.wait.poll_interval_ms = 10;

        let recorder = Arc::new(Recorder::default());
        let registry = Arc::new(InMemoryArtifactRegistry::new());
        artifacts::register_all(&registry, recorder.clone());
        let jobs = Arc::new(JobDefinitionRegistry::new());
        let repository = Arc::new(InMemoryJobRepository::new());

        let mut builder = KernelContext::builder()
            .config(config)
            .artifacts(registry.clone())
            .job_definitions(jobs.clone())
            .repository(repository.clone());
        if let Some(transactions) = transactions {
            builder = builder.transactions(transactions);
        }
        let context = builder.build().expect("kernel context should build");

        Self {
            operator: JobOperator::new(Arc::new(context)),
            artifacts: registry,
            jobs,
            repository,
            recorder,
        }
    }

    pub fn register(&self, job: JobDefinition) -> &Self {
        self.jobs.register(job);
        self
    }

    /// Start `job_name` and wait for it to finish
    pub async fn run(&self, job_name: &str, parameters: JobParameters) -> JobExecution {
        let execution_id = self
            .operator
            .start(job_name, parameters)
            .await
            .expect("job should start");
        self.wait(execution_id).await
    }

    pub async fn restart(&self, execution_id: i64, parameters: JobParameters) -> JobExecution {
        let restarted = self
            .operator
            .restart(execution_id, parameters)
            .await
            .expect("job should restart");
        self.wait(restarted).await
    }

    pub async fn wait(&self, execution_id: i64) -> JobExecution {
        self.operator
            .wait_for_timeout(execution_id, WAIT_TIMEOUT)
            .await
            .expect("wait should succeed")
            .expect("job should finish in time")
    }

    pub async fn steps(&self, execution_id: i64) -> Vec<StepExecution> {
        self.operator
            .step_executions(execution_id)
            .await
            .expect("step executions should be queryable")
    }

    pub async fn step(&self, execution_id: i64, step_name: &str) -> StepExecution {
        self.steps(execution_id)
            .await
            .into_iter()
            .find(|step| step.step_name == step_name)
            .unwrap_or_else(|| panic!("step {step_name} should have run"))
    }
}

pub fn params(pairs: &[(&str, &str)]) -> JobParameters {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn init_logging() {
    batch_kernel::logging::init_structured_logging();
}
