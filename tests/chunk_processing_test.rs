//! Chunk step behavior end to end: commit boundaries, skip and retry
//! policies, checkpointed restart and cooperative stop.

mod common;

use batch_kernel::job::{ArtifactRef, ChunkDefinition, JobDefinition, StepDefinition};
use batch_kernel::models::JobParameters;
use batch_kernel::{BatchStatus, ExceptionClassFilter};
use common::transactions::FaultyTransactions;
use common::{params, Harness};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn reader(end: u64) -> ArtifactRef {
    ArtifactRef::new("numberReader").with_property("end", end.to_string())
}

fn writer(sink: &str) -> ArtifactRef {
    ArtifactRef::new("recordingWriter").with_property("sink", sink)
}

fn chunk_job(job_name: &str, chunk: ChunkDefinition) -> JobDefinition {
    JobDefinition::new(job_name).with_element(StepDefinition::chunk("load", chunk))
}

#[tokio::test]
async fn test_two_items_one_per_chunk() {
    common::init_logging();
    let harness = Harness::new();
    harness.register(chunk_job(
        "two-items",
        ChunkDefinition::new(reader(2), writer("two")).with_item_count(1),
    ));

    let execution = harness.run("two-items", JobParameters::new()).await;
    assert_eq!(execution.batch_status, BatchStatus::Completed);
    assert_eq!(execution.effective_exit_status(), "COMPLETED");

    let step = harness.step(execution.execution_id, "load").await;
    assert_eq!(step.batch_status, BatchStatus::Completed);
    assert_eq!(step.metrics.commit_count, 2);
    assert_eq!(step.metrics.read_count, 2);
    assert_eq!(step.metrics.write_count, 2);
    assert_eq!(step.metrics.rollback_count, 0);
    assert_eq!(harness.recorder.chunk_sizes("two"), vec![1, 1]);
}

#[tokio::test]
async fn test_partial_last_chunk() {
    let harness = Harness::new();
    harness.register(chunk_job(
        "partial",
        ChunkDefinition::new(reader(10), writer("partial")).with_item_count(3),
    ));

    let execution = harness.run("partial", JobParameters::new()).await;
    let step = harness.step(execution.execution_id, "load").await;

    assert_eq!(step.metrics.commit_count, 4);
    assert_eq!(harness.recorder.chunk_sizes("partial"), vec![3, 3, 3, 1]);
    assert_eq!(
        harness.recorder.written_numbers("partial"),
        (0..10).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_filtered_items_are_counted_not_written() {
    let harness = Harness::new();
    harness.register(chunk_job(
        "filtering",
        ChunkDefinition::new(reader(10), writer("filtered"))
            .with_processor(
                ArtifactRef::new("numberProcessor").with_property("filterItems", "1,3"),
            )
            .with_item_count(5),
    ));

    let execution = harness.run("filtering", JobParameters::new()).await;
    let step = harness.step(execution.execution_id, "load").await;

    assert_eq!(step.batch_status, BatchStatus::Completed);
    assert_eq!(step.metrics.read_count, 10);
    assert_eq!(step.metrics.filter_count, 2);
    assert_eq!(step.metrics.write_count, 8);
    assert_eq!(
        harness.recorder.written_numbers("filtered"),
        vec![0, 2, 4, 5, 6, 7, 8, 9]
    );
}

fn skipping_job(job_name: &str, skip_limit: u32) -> JobDefinition {
    chunk_job(
        job_name,
        ChunkDefinition::new(reader(10), writer(job_name))
            .with_processor(ArtifactRef::new("numberProcessor").with_property("badItems", "2,5"))
            .with_item_count(4)
            .with_skip(Some(skip_limit), ExceptionClassFilter::including(["bad"])),
    )
}

#[tokio::test]
async fn test_skips_within_limit_complete() {
    let harness = Harness::new();
    harness.register(skipping_job("skip-ok", 2));

    let execution = harness.run("skip-ok", JobParameters::new()).await;
    let step = harness.step(execution.execution_id, "load").await;

    assert_eq!(execution.batch_status, BatchStatus::Completed);
    assert_eq!(step.metrics.process_skip_count, 2);
    assert_eq!(step.metrics.write_count, 8);
    assert_eq!(
        harness.recorder.written_numbers("skip-ok"),
        vec![0, 1, 3, 4, 6, 7, 8, 9]
    );
}

#[tokio::test]
async fn test_skip_past_limit_fails() {
    let harness = Harness::new();
    harness.register(skipping_job("skip-exceeded", 1));

    let execution = harness.run("skip-exceeded", JobParameters::new()).await;
    let step = harness.step(execution.execution_id, "load").await;

    assert_eq!(execution.batch_status, BatchStatus::Failed);
    assert_eq!(step.batch_status, BatchStatus::Failed);
    assert_eq!(step.metrics.process_skip_count, 1);
    let cause = step.failure_cause.expect("failure cause should be kept");
    assert!(cause.contains("bad.record"), "unexpected cause: {cause}");
}

#[tokio::test]
async fn test_read_skips() {
    let harness = Harness::new();
    harness.register(chunk_job(
        "read-skips",
        ChunkDefinition::new(
            reader(6).with_property("badReads", "1,4"),
            writer("read-skips"),
        )
        .with_item_count(10)
        .with_skip(None, ExceptionClassFilter::including(["bad"])),
    ));

    let execution = harness.run("read-skips", JobParameters::new()).await;
    let step = harness.step(execution.execution_id, "load").await;

    assert_eq!(execution.batch_status, BatchStatus::Completed);
    assert_eq!(step.metrics.read_skip_count, 2);
    assert_eq!(step.metrics.read_count, 4);
    assert_eq!(harness.recorder.written_numbers("read-skips"), vec![0, 2, 3, 5]);
}

#[tokio::test]
async fn test_retry_without_rollback_stays_in_chunk() {
    let harness = Harness::new();
    harness.register(chunk_job(
        "retry-in-place",
        ChunkDefinition::new(reader(10), writer("retry-in-place"))
            .with_processor(
                ArtifactRef::new("numberProcessor")
                    .with_property("flakyItems", "4")
                    .with_property("flakyAttempts", "2"),
            )
            .with_item_count(3)
            .with_retry(Some(3), ExceptionClassFilter::including(["transient"]))
            .with_no_rollback(ExceptionClassFilter::including(["transient"])),
    ));

    let execution = harness.run("retry-in-place", JobParameters::new()).await;
    let step = harness.step(execution.execution_id, "load").await;

    assert_eq!(execution.batch_status, BatchStatus::Completed);
    assert_eq!(step.metrics.rollback_count, 0);
    assert_eq!(step.metrics.commit_count, 4);
    assert_eq!(
        harness.recorder.written_numbers("retry-in-place"),
        (0..10).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_retry_with_rollback_replays_chunk_one_item_at_a_time() {
    let harness = Harness::new();
    harness.register(chunk_job(
        "retry-rollback",
        ChunkDefinition::new(reader(10), writer("retry-rollback"))
            .with_processor(ArtifactRef::new("numberProcessor").with_property("flakyItems", "4"))
            .with_item_count(3)
            .with_retry(Some(2), ExceptionClassFilter::including(["transient"])),
    ));

    let execution = harness.run("retry-rollback", JobParameters::new()).await;
    let step = harness.step(execution.execution_id, "load").await;

    assert_eq!(execution.batch_status, BatchStatus::Completed);
    assert_eq!(step.metrics.rollback_count, 1);
    assert_eq!(step.metrics.read_count, 10);
    // [0,1,2] [3] [4] [5,6,7] [8,9]
    assert_eq!(step.metrics.commit_count, 5);
    assert_eq!(
        harness.recorder.chunk_sizes("retry-rollback"),
        vec![3, 1, 1, 3, 2]
    );
    assert_eq!(
        harness.recorder.written_numbers("retry-rollback"),
        (0..10).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_retry_limit_exhausted_fails() {
    let harness = Harness::new();
    harness.register(chunk_job(
        "retry-exhausted",
        ChunkDefinition::new(reader(10), writer("retry-exhausted"))
            .with_processor(
                ArtifactRef::new("numberProcessor")
                    .with_property("flakyItems", "1")
                    .with_property("flakyAttempts", "5"),
            )
            .with_item_count(3)
            .with_retry(Some(2), ExceptionClassFilter::including(["transient"]))
            .with_no_rollback(ExceptionClassFilter::including(["transient"])),
    ));

    let execution = harness.run("retry-exhausted", JobParameters::new()).await;
    assert_eq!(execution.batch_status, BatchStatus::Failed);
    assert!(harness.recorder.written("retry-exhausted").is_empty());
}

#[tokio::test]
async fn test_retry_exhausted_fails_even_when_skippable() {
    let harness = Harness::new();
    harness.register(chunk_job(
        "retry-then-skip",
        ChunkDefinition::new(reader(10), writer("retry-then-skip"))
            .with_processor(
                ArtifactRef::new("numberProcessor")
                    .with_property("flakyItems", "4")
                    .with_property("flakyAttempts", "5"),
            )
            .with_item_count(3)
            .with_retry(Some(1), ExceptionClassFilter::including(["transient"]))
            .with_skip(Some(5), ExceptionClassFilter::including(["transient"]))
            .with_no_rollback(ExceptionClassFilter::including(["transient"])),
    ));

    let execution = harness.run("retry-then-skip", JobParameters::new()).await;
    assert_eq!(execution.batch_status, BatchStatus::Failed);

    let step = harness.step(execution.execution_id, "load").await;
    assert_eq!(step.batch_status, BatchStatus::Failed);
    assert_eq!(step.metrics.process_skip_count, 0);
    assert!(step
        .failure_cause
        .as_deref()
        .is_some_and(|cause| cause.contains("transient")));
    assert_eq!(harness.recorder.written_numbers("retry-then-skip"), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_write_skip_isolates_offending_item() {
    let harness = Harness::new();
    harness.register(chunk_job(
        "write-skip",
        ChunkDefinition::new(
            reader(10),
            writer("write-skip").with_property("badItems", "4"),
        )
        .with_item_count(3)
        .with_skip(Some(5), ExceptionClassFilter::including(["bad"])),
    ));

    let execution = harness.run("write-skip", JobParameters::new()).await;
    let step = harness.step(execution.execution_id, "load").await;

    assert_eq!(execution.batch_status, BatchStatus::Completed);
    assert_eq!(step.metrics.write_skip_count, 1);
    assert_eq!(
        harness.recorder.written_numbers("write-skip"),
        vec![0, 1, 2, 3, 5, 6, 7, 8, 9]
    );
}

#[tokio::test]
async fn test_custom_checkpoint_hooks_wrap_replayed_chunks() {
    let harness = Harness::new();
    harness.register(chunk_job(
        "custom-checkpoint",
        ChunkDefinition::new(
            reader(6),
            writer("custom-checkpoint").with_property("badItems", "3"),
        )
        .with_custom_checkpoint(ArtifactRef::new("countingCheckpoint").with_property("every", "2"))
        .with_skip(Some(5), ExceptionClassFilter::including(["bad"])),
    ));

    let execution = harness.run("custom-checkpoint", JobParameters::new()).await;
    assert_eq!(execution.batch_status, BatchStatus::Completed);

    let step = harness.step(execution.execution_id, "load").await;
    // [0,1] then [2,3] rolls back and replays as [2] and [3], then [4,5]
    assert_eq!(step.metrics.commit_count, 4);
    assert_eq!(step.metrics.write_skip_count, 1);
    assert_eq!(harness.recorder.chunk_sizes("custom-checkpoint"), vec![2, 1, 2]);
    assert_eq!(
        harness.recorder.written_numbers("custom-checkpoint"),
        vec![0, 1, 2, 4, 5]
    );

    let log = harness.recorder.log();
    let begins = log.iter().filter(|entry| *entry == "checkpoint:begin").count();
    let ends = log.iter().filter(|entry| *entry == "checkpoint:end").count();
    // Every chunk begins, including the final empty one; only the rolled
    // back chunk has no matching end
    assert_eq!(begins, 6);
    assert_eq!(ends, 5);
}

#[tokio::test]
async fn test_commit_failure_fails_step_and_keeps_last_checkpoint() {
    let transactions = Arc::new(FaultyTransactions::failing_commit(2));
    let harness = Harness::with_transactions(transactions.clone());
    harness.register(chunk_job(
        "commit-fails",
        ChunkDefinition::new(reader(10), writer("commit-fails")).with_item_count(3),
    ));

    let failed = harness.run("commit-fails", JobParameters::new()).await;
    assert_eq!(failed.batch_status, BatchStatus::Failed);

    let step = harness.step(failed.execution_id, "load").await;
    assert_eq!(step.batch_status, BatchStatus::Failed);
    assert_eq!(step.metrics.commit_count, 1);
    assert!(step
        .failure_cause
        .as_deref()
        .is_some_and(|cause| cause.contains("disk full")));
    assert_eq!(transactions.commits(), 2);

    let restarted = harness
        .restart(failed.execution_id, JobParameters::new())
        .await;
    assert_eq!(restarted.batch_status, BatchStatus::Completed);
    let resumed = harness.step(restarted.execution_id, "load").await;
    assert_eq!(resumed.metrics.read_count, 7);
}

#[tokio::test]
async fn test_failed_rollback_lands_on_failure_cause() {
    let harness = Harness::with_transactions(Arc::new(FaultyTransactions::failing_rollback()));
    harness.register(chunk_job(
        "rollback-fails",
        ChunkDefinition::new(
            reader(10).with_property("failAt", "5"),
            writer("rollback-fails"),
        )
        .with_item_count(2),
    ));

    let execution = harness.run("rollback-fails", JobParameters::new()).await;
    assert_eq!(execution.batch_status, BatchStatus::Failed);

    let step = harness.step(execution.execution_id, "load").await;
    let cause = step.failure_cause.unwrap_or_default();
    assert!(cause.contains("cannot read 5"), "cause was {cause}");
    assert!(cause.contains("rollback failed"), "cause was {cause}");
    assert!(cause.contains("connection lost"), "cause was {cause}");
}

#[tokio::test]
async fn test_restart_resumes_after_last_checkpoint() {
    let harness = Harness::new();
    harness.register(chunk_job(
        "resumable",
        ChunkDefinition::new(
            reader(10).with_property("failAt", "#{jobParameters['failAt']}"),
            writer("resumable"),
        )
        .with_item_count(2),
    ));

    let failed = harness
        .run("resumable", params(&[("failAt", "5")]))
        .await;
    assert_eq!(failed.batch_status, BatchStatus::Failed);
    assert_eq!(harness.recorder.written_numbers("resumable"), vec![0, 1, 2, 3]);

    let first_step = harness.step(failed.execution_id, "load").await;
    assert_eq!(first_step.metrics.commit_count, 2);
    assert_eq!(first_step.metrics.rollback_count, 1);

    let restarted = harness
        .restart(failed.execution_id, JobParameters::new())
        .await;
    assert_eq!(restarted.batch_status, BatchStatus::Completed);
    assert_eq!(restarted.instance_id, failed.instance_id);

    let resumed_step = harness.step(restarted.execution_id, "load").await;
    assert_eq!(resumed_step.metrics.read_count, 6);
    assert_eq!(
        harness.recorder.written_numbers("resumable"),
        (0..10).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_stop_mid_chunk_ends_stopped_and_restart_finishes() {
    let harness = Harness::new();
    harness.register(chunk_job(
        "slow",
        ChunkDefinition::new(
            reader(60).with_property("delayMs", "5"),
            writer("slow"),
        )
        .with_item_count(25),
    ));

    let execution_id = harness
        .operator
        .start("slow", JobParameters::new())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    harness.operator.stop(execution_id).await.unwrap();

    let stopped = harness.wait(execution_id).await;
    assert_eq!(stopped.batch_status, BatchStatus::Stopped);
    let steps = harness.steps(execution_id).await;
    assert!(steps
        .iter()
        .all(|step| step.batch_status == BatchStatus::Stopped));

    let restarted = harness.restart(execution_id, JobParameters::new()).await;
    assert_eq!(restarted.batch_status, BatchStatus::Completed);

    let mut written = harness.recorder.written_numbers("slow");
    written.sort_unstable();
    assert_eq!(written, (0..60).collect::<Vec<_>>());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_commit_count_matches_chunking(items in 0u64..40, item_count in 1u32..8) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (commits, sizes) = runtime.block_on(async {
            let harness = Harness::new();
            harness.register(chunk_job(
                "prop",
                ChunkDefinition::new(reader(items), writer("prop")).with_item_count(item_count),
            ));
            let execution = harness.run("prop", JobParameters::new()).await;
            let step = harness.step(execution.execution_id, "load").await;
            (step.metrics.commit_count, harness.recorder.chunk_sizes("prop"))
        });

        let k = u64::from(item_count);
        prop_assert_eq!(commits, items.div_ceil(k));
        prop_assert_eq!(sizes.iter().sum::<usize>() as u64, items);
        if let Some(last) = sizes.last() {
            let expected = if items % k == 0 { k } else { items % k };
            prop_assert_eq!(*last as u64, expected);
        }
    }
}
