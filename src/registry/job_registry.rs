use crate::job::JobDefinition;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Supplies job definitions by job name
pub trait JobDefinitionSource: Send + Sync {
    fn job_definition(&self, job_name: &str) -> Option<Arc<JobDefinition>>;

    fn job_names(&self) -> Vec<String>;
}

/// Thread-safe in-memory job definition store
#[derive(Debug, Default)]
pub struct JobDefinitionRegistry {
    definitions: DashMap<String, Arc<JobDefinition>>,
}

impl JobDefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a definition under its id
    pub fn register(&self, definition: JobDefinition) {
        debug!(job_name = %definition.id, "📚 REGISTRY: Registered job definition");
        self.definitions
            .insert(definition.id.clone(), Arc::new(definition));
    }

    pub fn unregister(&self, job_name: &str) -> bool {
        self.definitions.remove(job_name).is_some()
    }
}

impl JobDefinitionSource for JobDefinitionRegistry {
    fn job_definition(&self, job_name: &str) -> Option<Arc<JobDefinition>> {
        self.definitions.get(job_name).map(|d| Arc::clone(d.value()))
    }

    fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
