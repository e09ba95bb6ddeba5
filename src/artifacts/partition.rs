use super::context::StepContext;
use super::errors::ArtifactError;
use crate::models::PartitionPlan;
use crate::state_machine::BatchStatus;
use async_trait::async_trait;
use serde_json::Value;

/// Builds the partition plan at runtime
#[async_trait]
pub trait PartitionMapper: Send + Sync {
    async fn map_partitions(&self) -> Result<PartitionPlan, ArtifactError>;
}

/// Hooks around the whole partitioned step, run on the coordinating task
#[async_trait]
pub trait PartitionReducer: Send + Sync {
    async fn begin_partitioned_step(&self) -> Result<(), ArtifactError> {
        Ok(())
    }

    async fn before_partitioned_step_completion(&self) -> Result<(), ArtifactError> {
        Ok(())
    }

    async fn rollback_partitioned_step(&self) -> Result<(), ArtifactError> {
        Ok(())
    }

    async fn after_partitioned_step_completion(
        &self,
        status: BatchStatus,
    ) -> Result<(), ArtifactError> {
        let _ = status;
        Ok(())
    }
}

/// Runs inside each partition after every chunk and when the partition ends
#[async_trait]
pub trait PartitionCollector: Send + Sync {
    async fn collect_partition_data(
        &self,
        context: &StepContext,
    ) -> Result<Option<Value>, ArtifactError>;
}

/// Consumes collector payloads and partition outcomes on the coordinating
/// task, in the order partitions emitted them
#[async_trait]
pub trait PartitionAnalyzer: Send + Sync {
    async fn analyze_collector_data(&self, data: Value) -> Result<(), ArtifactError> {
        let _ = data;
        Ok(())
    }

    async fn analyze_status(
        &self,
        batch_status: BatchStatus,
        exit_status: &str,
    ) -> Result<(), ArtifactError> {
        let _ = (batch_status, exit_status);
        Ok(())
    }
}
