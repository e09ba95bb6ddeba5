//! Property-driven test artifacts
//!
//! Every artifact reads its knobs from the resolved properties it is built
//! with, so jobs can steer them through `#{jobParameters['...']}` and
//! `#{partitionPlan['...']}` references. Observations land in a shared
//! [`Recorder`].

use async_trait::async_trait;
use batch_kernel::artifacts::{
    ArtifactError, Batchlet, CheckpointAlgorithm, Decider, ItemProcessor, ItemReader, ItemWriter, JobContext,
    JobListener, Listener, PartitionAnalyzer, PartitionCollector, PartitionMapper,
    PartitionReducer, StepContext, StepListener,
};
use batch_kernel::models::{PartitionPlan, Properties, StepExecution};
use batch_kernel::{BatchStatus, InMemoryArtifactRegistry};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// What the artifacts of one harness observed
#[derive(Debug, Default)]
pub struct Recorder {
    written: Mutex<HashMap<String, Vec<Value>>>,
    chunks: Mutex<HashMap<String, Vec<usize>>>,
    log: Mutex<Vec<String>>,
    collected: Mutex<Vec<Value>>,
    statuses: Mutex<Vec<(BatchStatus, String)>>,
}

impl Recorder {
    pub fn written(&self, sink: &str) -> Vec<Value> {
        self.written.lock().get(sink).cloned().unwrap_or_default()
    }

    pub fn written_numbers(&self, sink: &str) -> Vec<u64> {
        self.written(sink)
            .iter()
            .filter_map(Value::as_u64)
            .collect()
    }

    /// Sizes of every successful write to `sink`, in order
    pub fn chunk_sizes(&self, sink: &str) -> Vec<usize> {
        self.chunks.lock().get(sink).cloned().unwrap_or_default()
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn collected(&self) -> Vec<Value> {
        self.collected.lock().clone()
    }

    pub fn statuses(&self) -> Vec<(BatchStatus, String)> {
        self.statuses.lock().clone()
    }

    fn note(&self, entry: impl Into<String>) {
        self.log.lock().push(entry.into());
    }
}

fn number(properties: &Properties, key: &str) -> Option<u64> {
    properties.get(key).and_then(|value| value.trim().parse().ok())
}

fn number_set(properties: &Properties, key: &str) -> HashSet<u64> {
    properties
        .get(key)
        .map(|value| {
            value
                .split(',')
                .filter_map(|n| n.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

fn text(properties: &Properties, key: &str) -> Option<String> {
    properties
        .get(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Emits the numbers `start..end`; its checkpoint is the next number to read
///
/// - `failAt`: reading this number fails with kind `io.corrupt`
/// - `badReads`: reading these numbers fails with kind `bad.read` and moves on
/// - `delayMs`: pause before every read
pub struct NumberReader {
    start: u64,
    end: u64,
    position: u64,
    fail_at: Option<u64>,
    bad_reads: HashSet<u64>,
    delay: Option<Duration>,
}

impl NumberReader {
    pub fn from_properties(properties: &Properties) -> Self {
        let start = number(properties, "start").unwrap_or(0);
        Self {
            start,
            end: number(properties, "end").unwrap_or(10),
            position: start,
            fail_at: number(properties, "failAt"),
            bad_reads: number_set(properties, "badReads"),
            delay: number(properties, "delayMs").map(Duration::from_millis),
        }
    }
}

#[async_trait]
impl ItemReader for NumberReader {
    async fn open(&mut self, checkpoint: Option<Value>) -> Result<(), ArtifactError> {
        self.position = checkpoint
            .as_ref()
            .and_then(Value::as_u64)
            .unwrap_or(self.start);
        Ok(())
    }

    async fn read_item(&mut self) -> Result<Option<Value>, ArtifactError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.position >= self.end {
            return Ok(None);
        }

        let current = self.position;
        if self.fail_at == Some(current) {
            return Err(ArtifactError::new("io.corrupt", format!("cannot read {current}")));
        }
        self.position += 1;
        if self.bad_reads.contains(&current) {
            return Err(ArtifactError::new("bad.read", format!("unparseable {current}")));
        }
        Ok(Some(json!(current)))
    }

    async fn checkpoint_info(&mut self) -> Result<Option<Value>, ArtifactError> {
        Ok(Some(json!(self.position)))
    }
}

/// Passes numbers through
///
/// - `badItems`: fail with kind `bad.record`
/// - `filterItems`: filtered out
/// - `flakyItems` / `flakyAttempts`: fail with kind `transient` for the first
///   `flakyAttempts` attempts at each listed item
pub struct NumberProcessor {
    bad: HashSet<u64>,
    filtered: HashSet<u64>,
    flaky: HashSet<u64>,
    flaky_attempts: u64,
    attempts: HashMap<u64, u64>,
}

impl NumberProcessor {
    pub fn from_properties(properties: &Properties) -> Self {
        Self {
            bad: number_set(properties, "badItems"),
            filtered: number_set(properties, "filterItems"),
            flaky: number_set(properties, "flakyItems"),
            flaky_attempts: number(properties, "flakyAttempts").unwrap_or(1),
            attempts: HashMap::new(),
        }
    }
}

#[async_trait]
impl ItemProcessor for NumberProcessor {
    async fn process_item(&mut self, item: Value) -> Result<Option<Value>, ArtifactError> {
        let n = item.as_u64().unwrap_or_default();
        if self.bad.contains(&n) {
            return Err(ArtifactError::new("bad.record", format!("rejected {n}")));
        }
        if self.flaky.contains(&n) {
            let attempts = self.attempts.entry(n).or_default();
            *attempts += 1;
            if *attempts <= self.flaky_attempts {
                return Err(ArtifactError::new("transient", format!("attempt {attempts} at {n}")));
            }
        }
        if self.filtered.contains(&n) {
            return Ok(None);
        }
        Ok(Some(item))
    }
}

/// Appends every written chunk to the recorder under `sink`
///
/// - `badItems`: a chunk containing one of these fails with kind `bad.write`
pub struct RecordingWriter {
    sink: String,
    bad: HashSet<u64>,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl ItemWriter for RecordingWriter {
    async fn open(&mut self, _checkpoint: Option<Value>) -> Result<(), ArtifactError> {
        Ok(())
    }

    async fn write_items(&mut self, items: &[Value]) -> Result<(), ArtifactError> {
        if let Some(bad) = items
            .iter()
            .filter_map(Value::as_u64)
            .find(|n| self.bad.contains(n))
        {
            return Err(ArtifactError::new("bad.write", format!("cannot write {bad}")));
        }
        self.recorder
            .written
            .lock()
            .entry(self.sink.clone())
            .or_default()
            .extend(items.iter().cloned());
        self.recorder
            .chunks
            .lock()
            .entry(self.sink.clone())
            .or_default()
            .push(items.len());
        Ok(())
    }
}

/// Returns its `exitStatus` property, or fails when `fail` is `true`
pub struct ExitBatchlet {
    exit_status: Option<String>,
    fail: bool,
    name: String,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl Batchlet for ExitBatchlet {
    async fn process(&self, context: &mut StepContext) -> Result<Option<String>, ArtifactError> {
        self.recorder
            .note(format!("batchlet:{}:{}", self.name, context.step_name));
        if self.fail {
            return Err(ArtifactError::new("batchlet", "asked to fail"));
        }
        Ok(self.exit_status.clone())
    }
}

/// Runs until `stop` is called
#[derive(Default)]
pub struct WaitForStopBatchlet {
    stopped: Notify,
}

#[async_trait]
impl Batchlet for WaitForStopBatchlet {
    async fn process(&self, _context: &mut StepContext) -> Result<Option<String>, ArtifactError> {
        self.stopped.notified().await;
        Ok(Some("INTERRUPTED".to_string()))
    }

    async fn stop(&self) -> Result<(), ArtifactError> {
        self.stopped.notify_one();
        Ok(())
    }
}

/// Answers with its `exitStatus` property
pub struct ExitDecider {
    exit_status: String,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl Decider for ExitDecider {
    async fn decide(&self, executions: &[StepExecution]) -> Result<String, ArtifactError> {
        let seen: Vec<&str> = executions.iter().map(|e| e.step_name.as_str()).collect();
        self.recorder.note(format!("decide:{}", seen.join(",")));
        Ok(self.exit_status.clone())
    }
}

/// Logs step and job boundaries as `before_step:<name>` and so on
pub struct BoundaryListener {
    recorder: Arc<Recorder>,
    fail_after_step: bool,
}

#[async_trait]
impl StepListener for BoundaryListener {
    async fn before_step(&self, context: &mut StepContext) -> Result<(), ArtifactError> {
        self.recorder
            .note(format!("before_step:{}", context.step_name));
        Ok(())
    }

    async fn after_step(&self, context: &mut StepContext) -> Result<(), ArtifactError> {
        self.recorder.note(format!("after_step:{}", context.step_name));
        if self.fail_after_step {
            return Err(ArtifactError::new("listener", "after_step refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl JobListener for BoundaryListener {
    async fn before_job(&self, context: &mut JobContext) -> Result<(), ArtifactError> {
        self.recorder.note(format!("before_job:{}", context.job_name));
        Ok(())
    }

    async fn after_job(&self, context: &mut JobContext) -> Result<(), ArtifactError> {
        self.recorder.note(format!(
            "after_job:{}:{}",
            context.job_name, context.batch_status
        ));
        Ok(())
    }
}

/// Reports the partition number and the items it has read so far
pub struct ProgressCollector;

#[async_trait]
impl PartitionCollector for ProgressCollector {
    async fn collect_partition_data(
        &self,
        context: &StepContext,
    ) -> Result<Option<Value>, ArtifactError> {
        Ok(Some(json!({
            "partition": context.partition,
            "read": context.metrics.read_count,
        })))
    }
}

pub struct RecordingAnalyzer {
    recorder: Arc<Recorder>,
}

#[async_trait]
impl PartitionAnalyzer for RecordingAnalyzer {
    async fn analyze_collector_data(&self, data: Value) -> Result<(), ArtifactError> {
        self.recorder.collected.lock().push(data);
        Ok(())
    }

    async fn analyze_status(
        &self,
        batch_status: BatchStatus,
        exit_status: &str,
    ) -> Result<(), ArtifactError> {
        self.recorder
            .statuses
            .lock()
            .push((batch_status, exit_status.to_string()));
        Ok(())
    }
}

pub struct RecordingReducer {
    recorder: Arc<Recorder>,
}

#[async_trait]
impl PartitionReducer for RecordingReducer {
    async fn begin_partitioned_step(&self) -> Result<(), ArtifactError> {
        self.recorder.note("reducer:begin");
        Ok(())
    }

    async fn before_partitioned_step_completion(&self) -> Result<(), ArtifactError> {
        self.recorder.note("reducer:before_completion");
        Ok(())
    }

    async fn rollback_partitioned_step(&self) -> Result<(), ArtifactError> {
        self.recorder.note("reducer:rollback");
        Ok(())
    }

    async fn after_partitioned_step_completion(
        &self,
        status: BatchStatus,
    ) -> Result<(), ArtifactError> {
        self.recorder.note(format!("reducer:after:{status}"));
        Ok(())
    }
}

/// Splits `0..partitions * size` into `partitions` ranges of `size`
pub struct RangeMapper {
    partitions: u32,
    size: u64,
}

#[async_trait]
impl PartitionMapper for RangeMapper {
    async fn map_partitions(&self) -> Result<PartitionPlan, ArtifactError> {
        let mut plan = PartitionPlan::new(self.partitions);
        plan.partition_properties = (0..u64::from(self.partitions))
            .map(|p| {
                Properties::from([
                    ("start".to_string(), (p * self.size).to_string()),
                    ("end".to_string(), ((p + 1) * self.size).to_string()),
                ])
            })
            .collect();
        Ok(plan)
    }
}

/// Commits after every `every` items, noting each begin/end hook
pub struct CountingCheckpoint {
    every: u64,
    seen: u64,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl CheckpointAlgorithm for CountingCheckpoint {
    async fn begin_checkpoint(&mut self) -> Result<(), ArtifactError> {
        self.seen = 0;
        self.recorder.note("checkpoint:begin");
        Ok(())
    }

    async fn is_ready_to_checkpoint(&mut self) -> Result<bool, ArtifactError> {
        self.seen += 1;
        Ok(self.seen >= self.every)
    }

    async fn end_checkpoint(&mut self) -> Result<(), ArtifactError> {
        self.recorder.note("checkpoint:end");
        Ok(())
    }
}

/// Register every fixture under its conventional name
pub fn register_all(registry: &InMemoryArtifactRegistry, recorder: Arc<Recorder>) {
    registry.register_reader("numberReader", |p| Box::new(NumberReader::from_properties(p)));
    registry.register_processor("numberProcessor", |p| {
        Box::new(NumberProcessor::from_properties(p))
    });

    let r = recorder.clone();
    registry.register_writer("recordingWriter", move |p| {
        Box::new(RecordingWriter {
            sink: text(p, "sink").unwrap_or_else(|| "default".to_string()),
            bad: number_set(p, "badItems"),
            recorder: r.clone(),
        })
    });

    let r = recorder.clone();
    registry.register_batchlet("exitBatchlet", move |p| {
        Arc::new(ExitBatchlet {
            exit_status: text(p, "exitStatus"),
            fail: text(p, "fail").is_some_and(|fail| fail == "true"),
            name: text(p, "name").unwrap_or_else(|| "exit".to_string()),
            recorder: r.clone(),
        })
    });
    registry.register_batchlet("waitForStopBatchlet", |_| {
        Arc::new(WaitForStopBatchlet::default())
    });

    let r = recorder.clone();
    registry.register_decider("exitDecider", move |p| {
        Arc::new(ExitDecider {
            exit_status: text(p, "exitStatus").unwrap_or_else(|| "COMPLETED".to_string()),
            recorder: r.clone(),
        })
    });

    let r = recorder.clone();
    registry.register_listener("stepBoundaries", move |p| {
        Listener::Step(Arc::new(BoundaryListener {
            recorder: r.clone(),
            fail_after_step: text(p, "failAfterStep").is_some_and(|fail| fail == "true"),
        }))
    });
    let r = recorder.clone();
    registry.register_listener("jobBoundaries", move |_| {
        Listener::Job(Arc::new(BoundaryListener {
            recorder: r.clone(),
            fail_after_step: false,
        }))
    });

    let r = recorder.clone();
    registry.register_checkpoint_algorithm("countingCheckpoint", move |p| {
        Box::new(CountingCheckpoint {
            every: number(p, "every").unwrap_or(2).max(1),
            seen: 0,
            recorder: r.clone(),
        })
    });

    registry.register_partition_mapper("rangeMapper", |p| {
        Arc::new(RangeMapper {
            partitions: number(p, "partitions").unwrap_or(2) as u32,
            size: number(p, "size").unwrap_or(5),
        })
    });
    registry.register_partition_collector("progressCollector", |_| Arc::new(ProgressCollector));
    let r = recorder.clone();
    registry.register_partition_analyzer("recordingAnalyzer", move |_| {
        Arc::new(RecordingAnalyzer {
            recorder: r.clone(),
        })
    });
    let r = recorder;
    registry.register_partition_reducer("recordingReducer", move |_| {
        Arc::new(RecordingReducer {
            recorder: r.clone(),
        })
    });
}
