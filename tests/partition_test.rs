//! Partitioned chunk steps: fan-out, aggregation of partition results,
//! collector/analyzer/reducer hooks and restart of failed partitions.

mod common;

use batch_kernel::job::{
    ArtifactRef, ChunkDefinition, JobDefinition, PartitionDefinition, StepDefinition,
};
use batch_kernel::models::{JobParameters, PartitionPlan, Properties, StepExecution};
use batch_kernel::persistence::JobRepository;
use batch_kernel::{BatchStatus, KernelConfig};
use common::{params, Harness};

fn ranges(bounds: &[(u64, u64)]) -> PartitionPlan {
    let mut plan = PartitionPlan::new(bounds.len() as u32);
    plan.partition_properties = bounds
        .iter()
        .map(|(start, end)| {
            Properties::from([
                ("start".to_string(), start.to_string()),
                ("end".to_string(), end.to_string()),
            ])
        })
        .collect();
    plan
}

fn statuses_by_partition(partitions: &[StepExecution]) -> Vec<(Option<u32>, BatchStatus)> {
    let mut statuses: Vec<_> = partitions
        .iter()
        .map(|p| (p.partition, p.batch_status))
        .collect();
    statuses.sort_by_key(|(partition, _)| *partition);
    statuses
}

fn partitioned_job(job_name: &str, sink: &str, partition: PartitionDefinition) -> JobDefinition {
    let chunk = ChunkDefinition::new(
        ArtifactRef::new("numberReader")
            .with_property("start", "#{partitionPlan['start']}")
            .with_property("end", "#{partitionPlan['end']}")
            .with_property("failAt", "#{jobParameters['failAt']}"),
        ArtifactRef::new("recordingWriter").with_property("sink", sink),
    )
    .with_item_count(2);

    JobDefinition::new(job_name)
        .with_element(StepDefinition::chunk("spread", chunk).with_partition(partition))
}

fn observed(plan: PartitionPlan) -> PartitionDefinition {
    PartitionDefinition {
        collector: Some(ArtifactRef::new("progressCollector")),
        analyzer: Some(ArtifactRef::new("recordingAnalyzer")),
        reducer: Some(ArtifactRef::new("recordingReducer")),
        ..PartitionDefinition::with_plan(plan)
    }
}

#[tokio::test]
async fn test_all_partitions_complete() {
    let harness = Harness::new();
    harness.register(partitioned_job(
        "three-way",
        "three-way",
        observed(ranges(&[(0, 4), (4, 8), (8, 12)])),
    ));

    let execution = harness.run("three-way", JobParameters::new()).await;
    assert_eq!(execution.batch_status, BatchStatus::Completed);

    let steps = harness.steps(execution.execution_id).await;
    assert_eq!(steps.len(), 1, "partitions are not top-level steps");
    let step = &steps[0];
    assert_eq!(step.batch_status, BatchStatus::Completed);
    assert_eq!(step.metrics.read_count, 12);
    assert_eq!(step.metrics.write_count, 12);
    assert_eq!(step.metrics.commit_count, 6);

    let partitions = harness
        .repository
        .partition_step_executions(execution.execution_id, "spread")
        .await
        .unwrap();
    assert_eq!(partitions.len(), 3);
    assert!(partitions
        .iter()
        .all(|p| p.batch_status == BatchStatus::Completed));

    let mut written = harness.recorder.written_numbers("three-way");
    written.sort_unstable();
    assert_eq!(written, (0..12).collect::<Vec<_>>());

    let statuses = harness.recorder.statuses();
    assert_eq!(statuses.len(), 3);
    assert!(statuses
        .iter()
        .all(|(status, exit)| *status == BatchStatus::Completed && exit == "COMPLETED"));
    assert!(!harness.recorder.collected().is_empty());

    assert_eq!(
        harness.recorder.log(),
        vec![
            "reducer:begin",
            "reducer:before_completion",
            "reducer:after:COMPLETED",
        ]
    );
}

#[tokio::test]
async fn test_failed_partition_fails_step_and_restart_finishes_it() {
    let harness = Harness::new();
    harness.register(partitioned_job(
        "one-bad",
        "one-bad",
        observed(ranges(&[(0, 4), (4, 8), (8, 12)])),
    ));

    let failed = harness.run("one-bad", params(&[("failAt", "6")])).await;
    assert_eq!(failed.batch_status, BatchStatus::Failed);

    let step = harness.step(failed.execution_id, "spread").await;
    assert_eq!(step.batch_status, BatchStatus::Failed);
    assert!(step.failure_cause.is_some());

    let log = harness.recorder.log();
    assert!(log.contains(&"reducer:rollback".to_string()));
    assert!(log.contains(&"reducer:after:FAILED".to_string()));
    assert!(harness
        .recorder
        .statuses()
        .iter()
        .any(|(status, _)| *status == BatchStatus::Failed));

    let restarted = harness
        .restart(failed.execution_id, JobParameters::new())
        .await;
    assert_eq!(restarted.batch_status, BatchStatus::Completed);

    let rerun = harness
        .repository
        .partition_step_executions(restarted.execution_id, "spread")
        .await
        .unwrap();
    assert!(rerun.iter().any(|p| p.partition == Some(1)));

    let mut written = harness.recorder.written_numbers("one-bad");
    written.sort_unstable();
    assert_eq!(written, (0..12).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_mapper_plan_with_single_worker() {
    let config = KernelConfig {
        max_partition_threads: 1,
        ..KernelConfig::default()
    };
    let harness = Harness::with_config(config);
    harness.register(partitioned_job(
        "mapped",
        "mapped",
        PartitionDefinition::with_mapper(
            ArtifactRef::new("rangeMapper")
                .with_property("partitions", "4")
                .with_property("size", "3"),
        ),
    ));

    let execution = harness.run("mapped", JobParameters::new()).await;
    assert_eq!(execution.batch_status, BatchStatus::Completed);

    let step = harness.step(execution.execution_id, "spread").await;
    assert_eq!(step.metrics.read_count, 12);

    let mut written = harness.recorder.written_numbers("mapped");
    written.sort_unstable();
    assert_eq!(written, (0..12).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_zero_partitions_from_mapper_fails_step() {
    let harness = Harness::new();
    harness.register(partitioned_job(
        "empty-plan",
        "empty-plan",
        PartitionDefinition::with_mapper(
            ArtifactRef::new("rangeMapper").with_property("partitions", "0"),
        ),
    ));

    let execution = harness.run("empty-plan", JobParameters::new()).await;
    assert_eq!(execution.batch_status, BatchStatus::Failed);
    let step = harness.step(execution.execution_id, "spread").await;
    assert!(step
        .failure_cause
        .as_deref()
        .is_some_and(|cause| cause.contains("zero partitions")));
}

#[tokio::test]
async fn test_failed_partition_stops_running_siblings() {
    let harness = Harness::new();

    let mut plan = ranges(&[(0, 100), (100, 104), (200, 300)]);
    plan.partition_properties[0].insert("delay".to_string(), "5".to_string());
    plan.partition_properties[1].insert("failAt".to_string(), "100".to_string());
    plan.partition_properties[2].insert("delay".to_string(), "5".to_string());

    let chunk = ChunkDefinition::new(
        ArtifactRef::new("numberReader")
            .with_property("start", "#{partitionPlan['start']}")
            .with_property("end", "#{partitionPlan['end']}")
            .with_property("failAt", "#{partitionPlan['failAt']}")
            .with_property("delayMs", "#{partitionPlan['delay']}"),
        ArtifactRef::new("recordingWriter").with_property("sink", "siblings"),
    )
    .with_item_count(2);
    harness.register(JobDefinition::new("siblings").with_element(
        StepDefinition::chunk("spread", chunk).with_partition(PartitionDefinition::with_plan(plan)),
    ));

    let execution = harness.run("siblings", JobParameters::new()).await;
    assert_eq!(execution.batch_status, BatchStatus::Failed);

    let step = harness.step(execution.execution_id, "spread").await;
    assert_eq!(step.batch_status, BatchStatus::Failed);
    assert!(step.metrics.read_count < 200, "siblings ran to the end");

    let partitions = harness
        .repository
        .partition_step_executions(execution.execution_id, "spread")
        .await
        .unwrap();
    assert_eq!(
        statuses_by_partition(&partitions),
        vec![
            (Some(0), BatchStatus::Stopped),
            (Some(1), BatchStatus::Failed),
            (Some(2), BatchStatus::Stopped),
        ]
    );
}

#[tokio::test]
async fn test_partitions_override_reruns_every_partition_from_scratch() {
    let harness = Harness::new();
    let mut plan = ranges(&[(0, 4), (4, 8), (8, 12)]);
    plan.partitions_override = true;
    harness.register(partitioned_job(
        "override",
        "override",
        PartitionDefinition::with_plan(plan),
    ));

    let failed = harness.run("override", params(&[("failAt", "6")])).await;
    assert_eq!(failed.batch_status, BatchStatus::Failed);
    let written_before = harness.recorder.written_numbers("override").len();

    let restarted = harness
        .restart(failed.execution_id, JobParameters::new())
        .await;
    assert_eq!(restarted.batch_status, BatchStatus::Completed);

    let rerun = harness
        .repository
        .partition_step_executions(restarted.execution_id, "spread")
        .await
        .unwrap();
    assert_eq!(
        statuses_by_partition(&rerun),
        vec![
            (Some(0), BatchStatus::Completed),
            (Some(1), BatchStatus::Completed),
            (Some(2), BatchStatus::Completed),
        ]
    );

    let step = harness.step(restarted.execution_id, "spread").await;
    assert_eq!(step.metrics.read_count, 12);

    let written = harness.recorder.written_numbers("override");
    assert_eq!(written.len(), written_before + 12);
    let mut rewritten = written[written_before..].to_vec();
    rewritten.sort_unstable();
    assert_eq!(rewritten, (0..12).collect::<Vec<_>>());
}
