//! # Artifact Registry
//!
//! Resolves artifact references to instances. Each resolution calls the
//! registered factory with the reference's resolved properties, so every
//! step execution and every partition gets its own instance.

use crate::artifacts::{
    ArtifactError, Batchlet, CheckpointAlgorithm, Decider, ItemProcessor, ItemReader, ItemWriter,
    Listener, PartitionAnalyzer, PartitionCollector, PartitionMapper, PartitionReducer,
};
use crate::constants::error_kinds;
use crate::job::ArtifactRef;
use crate::models::Properties;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Resolves named artifact references to capability instances
pub trait ArtifactResolver: Send + Sync {
    /// True if `name` can be resolved to some capability
    fn contains(&self, name: &str) -> bool;

    fn item_reader(&self, artifact: &ArtifactRef) -> Result<Box<dyn ItemReader>, ArtifactError>;

    fn item_processor(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Box<dyn ItemProcessor>, ArtifactError>;

    fn item_writer(&self, artifact: &ArtifactRef) -> Result<Box<dyn ItemWriter>, ArtifactError>;

    fn batchlet(&self, artifact: &ArtifactRef) -> Result<Arc<dyn Batchlet>, ArtifactError>;

    fn checkpoint_algorithm(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Box<dyn CheckpointAlgorithm>, ArtifactError>;

    fn decider(&self, artifact: &ArtifactRef) -> Result<Arc<dyn Decider>, ArtifactError>;

    fn partition_mapper(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Arc<dyn PartitionMapper>, ArtifactError>;

    fn partition_reducer(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Arc<dyn PartitionReducer>, ArtifactError>;

    fn partition_collector(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Arc<dyn PartitionCollector>, ArtifactError>;

    fn partition_analyzer(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Arc<dyn PartitionAnalyzer>, ArtifactError>;

    fn listener(&self, artifact: &ArtifactRef) -> Result<Listener, ArtifactError>;
}

type Factory<T> = Arc<dyn Fn(&Properties) -> T + Send + Sync>;

#[derive(Clone)]
enum ArtifactFactory {
    Reader(Factory<Box<dyn ItemReader>>),
    Processor(Factory<Box<dyn ItemProcessor>>),
    Writer(Factory<Box<dyn ItemWriter>>),
    Batchlet(Factory<Arc<dyn Batchlet>>),
    CheckpointAlgorithm(Factory<Box<dyn CheckpointAlgorithm>>),
    Decider(Factory<Arc<dyn Decider>>),
    Mapper(Factory<Arc<dyn PartitionMapper>>),
    Reducer(Factory<Arc<dyn PartitionReducer>>),
    Collector(Factory<Arc<dyn PartitionCollector>>),
    Analyzer(Factory<Arc<dyn PartitionAnalyzer>>),
    Listener(Factory<Listener>),
}

impl ArtifactFactory {
    fn capability(&self) -> &'static str {
        match self {
            Self::Reader(_) => "item reader",
            Self::Processor(_) => "item processor",
            Self::Writer(_) => "item writer",
            Self::Batchlet(_) => "batchlet",
            Self::CheckpointAlgorithm(_) => "checkpoint algorithm",
            Self::Decider(_) => "decider",
            Self::Mapper(_) => "partition mapper",
            Self::Reducer(_) => "partition reducer",
            Self::Collector(_) => "partition collector",
            Self::Analyzer(_) => "partition analyzer",
            Self::Listener(_) => "listener",
        }
    }
}

/// Name-keyed factory registry
#[derive(Default)]
pub struct InMemoryArtifactRegistry {
    factories: DashMap<String, ArtifactFactory>,
}

impl std::fmt::Debug for InMemoryArtifactRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryArtifactRegistry")
            .field("artifacts", &self.factories.len())
            .finish()
    }
}

impl InMemoryArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, name: &str, factory: ArtifactFactory) {
        debug!(
            artifact = %name,
            capability = factory.capability(),
            "📚 REGISTRY: Registered artifact"
        );
        self.factories.insert(name.to_string(), factory);
    }

    pub fn register_reader<F>(&self, name: &str, factory: F)
    where
        F: Fn(&Properties) -> Box<dyn ItemReader> + Send + Sync + 'static,
    {
        self.insert(name, ArtifactFactory::Reader(Arc::new(factory)));
    }

    pub fn register_processor<F>(&self, name: &str, factory: F)
    where
        F: Fn(&Properties) -> Box<dyn ItemProcessor> + Send + Sync + 'static,
    {
        self.insert(name, ArtifactFactory::Processor(Arc::new(factory)));
    }

    pub fn register_writer<F>(&self, name: &str, factory: F)
    where
        F: Fn(&Properties) -> Box<dyn ItemWriter> + Send + Sync + 'static,
    {
        self.insert(name, ArtifactFactory::Writer(Arc::new(factory)));
    }

    pub fn register_batchlet<F>(&self, name: &str, factory: F)
    where
        F: Fn(&Properties) -> Arc<dyn Batchlet> + Send + Sync + 'static,
    {
        self.insert(name, ArtifactFactory::Batchlet(Arc::new(factory)));
    }

    pub fn register_checkpoint_algorithm<F>(&self, name: &str, factory: F)
    where
        F: Fn(&Properties) -> Box<dyn CheckpointAlgorithm> + Send + Sync + 'static,
    {
        self.insert(name, ArtifactFactory::CheckpointAlgorithm(Arc::new(factory)));
    }

    pub fn register_decider<F>(&self, name: &str, factory: F)
    where
        F: Fn(&Properties) -> Arc<dyn Decider> + Send + Sync + 'static,
    {
        self.insert(name, ArtifactFactory::Decider(Arc::new(factory)));
    }

    pub fn register_partition_mapper<F>(&self, name: &str, factory: F)
    where
        F: Fn(&Properties) -> Arc<dyn PartitionMapper> + Send + Sync + 'static,
    {
        self.insert(name, ArtifactFactory::Mapper(Arc::new(factory)));
    }

    pub fn register_partition_reducer<F>(&self, name: &str, factory: F)
    where
        F: Fn(&Properties) -> Arc<dyn PartitionReducer> + Send + Sync + 'static,
    {
        self.insert(name, ArtifactFactory::Reducer(Arc::new(factory)));
    }

    pub fn register_partition_collector<F>(&self, name: &str, factory: F)
    where
        F: Fn(&Properties) -> Arc<dyn PartitionCollector> + Send + Sync + 'static,
    {
        self.insert(name, ArtifactFactory::Collector(Arc::new(factory)));
    }

    pub fn register_partition_analyzer<F>(&self, name: &str, factory: F)
    where
        F: Fn(&Properties) -> Arc<dyn PartitionAnalyzer> + Send + Sync + 'static,
    {
        self.insert(name, ArtifactFactory::Analyzer(Arc::new(factory)));
    }

    pub fn register_listener<F>(&self, name: &str, factory: F)
    where
        F: Fn(&Properties) -> Listener + Send + Sync + 'static,
    {
        self.insert(name, ArtifactFactory::Listener(Arc::new(factory)));
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Clone the factory out so user code never runs under a map shard lock
    fn factory(&self, artifact: &ArtifactRef) -> Result<ArtifactFactory, ArtifactError> {
        self.factories
            .get(&artifact.name)
            .map(|f| f.value().clone())
            .ok_or_else(|| {
                ArtifactError::new(
                    error_kinds::ARTIFACT_NOT_FOUND,
                    format!("no artifact registered under '{}'", artifact.name),
                )
            })
    }

    fn mismatch(artifact: &ArtifactRef, expected: &str, found: &ArtifactFactory) -> ArtifactError {
        ArtifactError::new(
            error_kinds::ARTIFACT_TYPE_MISMATCH,
            format!(
                "artifact '{}' is a {}, not a {expected}",
                artifact.name,
                found.capability()
            ),
        )
    }
}

impl ArtifactResolver for InMemoryArtifactRegistry {
    fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    fn item_reader(&self, artifact: &ArtifactRef) -> Result<Box<dyn ItemReader>, ArtifactError> {
        match self.factory(artifact)? {
            ArtifactFactory::Reader(f) => Ok(f(&artifact.properties)),
            other => Err(Self::mismatch(artifact, "item reader", &other)),
        }
    }

    fn item_processor(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Box<dyn ItemProcessor>, ArtifactError> {
        match self.factory(artifact)? {
            ArtifactFactory::Processor(f) => Ok(f(&artifact.properties)),
            other => Err(Self::mismatch(artifact, "item processor", &other)),
        }
    }

    fn item_writer(&self, artifact: &ArtifactRef) -> Result<Box<dyn ItemWriter>, ArtifactError> {
        match self.factory(artifact)? {
            ArtifactFactory::Writer(f) => Ok(f(&artifact.properties)),
            other => Err(Self::mismatch(artifact, "item writer", &other)),
        }
    }

    fn batchlet(&self, artifact: &ArtifactRef) -> Result<Arc<dyn Batchlet>, ArtifactError> {
        match self.factory(artifact)? {
            ArtifactFactory::Batchlet(f) => Ok(f(&artifact.properties)),
            other => Err(Self::mismatch(artifact, "batchlet", &other)),
        }
    }

    fn checkpoint_algorithm(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Box<dyn CheckpointAlgorithm>, ArtifactError> {
        match self.factory(artifact)? {
            ArtifactFactory::CheckpointAlgorithm(f) => Ok(f(&artifact.properties)),
            other => Err(Self::mismatch(artifact, "checkpoint algorithm", &other)),
        }
    }

    fn decider(&self, artifact: &ArtifactRef) -> Result<Arc<dyn Decider>, ArtifactError> {
        match self.factory(artifact)? {
            ArtifactFactory::Decider(f) => Ok(f(&artifact.properties)),
            other => Err(Self::mismatch(artifact, "decider", &other)),
        }
    }

    fn partition_mapper(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Arc<dyn PartitionMapper>, ArtifactError> {
        match self.factory(artifact)? {
            ArtifactFactory::Mapper(f) => Ok(f(&artifact.properties)),
            other => Err(Self::mismatch(artifact, "partition mapper", &other)),
        }
    }

    fn partition_reducer(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Arc<dyn PartitionReducer>, ArtifactError> {
        match self.factory(artifact)? {
            ArtifactFactory::Reducer(f) => Ok(f(&artifact.properties)),
            other => Err(Self::mismatch(artifact, "partition reducer", &other)),
        }
    }

    fn partition_collector(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Arc<dyn PartitionCollector>, ArtifactError> {
        match self.factory(artifact)? {
            ArtifactFactory::Collector(f) => Ok(f(&artifact.properties)),
            other => Err(Self::mismatch(artifact, "partition collector", &other)),
        }
    }

    fn partition_analyzer(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Arc<dyn PartitionAnalyzer>, ArtifactError> {
        match self.factory(artifact)? {
            ArtifactFactory::Analyzer(f) => Ok(f(&artifact.properties)),
            other => Err(Self::mismatch(artifact, "partition analyzer", &other)),
        }
    }

    fn listener(&self, artifact: &ArtifactRef) -> Result<Listener, ArtifactError> {
        match self.factory(artifact)? {
            ArtifactFactory::Listener(f) => Ok(f(&artifact.properties)),
            other => Err(Self::mismatch(artifact, "listener", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::StepContext;
    use async_trait::async_trait;

    struct Echo(Option<String>);

    #[async_trait]
    impl Batchlet for Echo {
        async fn process(&self, _context: &mut StepContext) -> Result<Option<String>, ArtifactError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_resolution_and_errors() {
        let registry = InMemoryArtifactRegistry::new();
        registry.register_batchlet("echo", |props| {
            Arc::new(Echo(props.get("status").cloned())) as Arc<dyn Batchlet>
        });

        assert!(registry.contains("echo"));
        assert_eq!(registry.len(), 1);
        assert!(registry
            .batchlet(&ArtifactRef::new("echo").with_property("status", "DONE"))
            .is_ok());

        let missing = registry.batchlet(&ArtifactRef::new("nope")).err().unwrap();
        assert_eq!(missing.kind, error_kinds::ARTIFACT_NOT_FOUND);

        let wrong = registry.decider(&ArtifactRef::new("echo")).err().unwrap();
        assert_eq!(wrong.kind, error_kinds::ARTIFACT_TYPE_MISMATCH);
        assert!(wrong.message.contains("batchlet"));
    }
}
