//! # Job Definition Model
//!
//! In-memory form of a job descriptor: the job, its ordered execution
//! elements (steps, decisions, flows, splits), artifact references with their
//! property bags, partition plans and transition rules.
//!
//! The model is serde-deserializable so descriptors can be produced by any
//! front end; parsing XML or other formats is not the kernel's concern.

use crate::artifacts::ExceptionClassFilter;
use crate::models::{PartitionPlan, Properties};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Reference to a user artifact by registered name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub name: String,
    #[serde(default)]
    pub properties: Properties,
}

impl ArtifactRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: String,
    #[serde(default = "default_true")]
    pub restartable: bool,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub listeners: Vec<ArtifactRef>,
    pub elements: Vec<ExecutionElement>,
}

impl JobDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            restartable: true,
            properties: Properties::new(),
            listeners: Vec::new(),
            elements: Vec::new(),
        }
    }

    pub fn with_element(mut self, element: impl Into<ExecutionElement>) -> Self {
        self.elements.push(element.into());
        self
    }

    pub fn with_listener(mut self, listener: ArtifactRef) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn non_restartable(mut self) -> Self {
        self.restartable = false;
        self
    }

    /// Position of a top-level element
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.id() == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionElement {
    Step(StepDefinition),
    Decision(DecisionDefinition),
    Flow(FlowDefinition),
    Split(SplitDefinition),
}

impl ExecutionElement {
    pub fn id(&self) -> &str {
        match self {
            Self::Step(s) => &s.id,
            Self::Decision(d) => &d.id,
            Self::Flow(f) => &f.id,
            Self::Split(s) => &s.id,
        }
    }

    pub fn next(&self) -> Option<&str> {
        match self {
            Self::Step(s) => s.next.as_deref(),
            Self::Decision(_) => None,
            Self::Flow(f) => f.next.as_deref(),
            Self::Split(s) => s.next.as_deref(),
        }
    }

    pub fn transitions(&self) -> &[Transition] {
        match self {
            Self::Step(s) => &s.transitions,
            Self::Decision(d) => &d.transitions,
            Self::Flow(f) => &f.transitions,
            Self::Split(_) => &[],
        }
    }
}

impl From<StepDefinition> for ExecutionElement {
    fn from(step: StepDefinition) -> Self {
        Self::Step(step)
    }
}

impl From<DecisionDefinition> for ExecutionElement {
    fn from(decision: DecisionDefinition) -> Self {
        Self::Decision(decision)
    }
}

impl From<FlowDefinition> for ExecutionElement {
    fn from(flow: FlowDefinition) -> Self {
        Self::Flow(flow)
    }
}

impl From<SplitDefinition> for ExecutionElement {
    fn from(split: SplitDefinition) -> Self {
        Self::Split(split)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: String,
    #[serde(default)]
    pub next: Option<String>,
    /// Maximum number of starts across restarts; 0 is unlimited
    #[serde(default)]
    pub start_limit: u32,
    #[serde(default)]
    pub allow_start_if_complete: bool,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub listeners: Vec<ArtifactRef>,
    pub body: StepBody,
    #[serde(default)]
    pub partition: Option<PartitionDefinition>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl StepDefinition {
    pub fn batchlet(id: impl Into<String>, batchlet: ArtifactRef) -> Self {
        Self::with_body(id, StepBody::Batchlet(batchlet))
    }

    pub fn chunk(id: impl Into<String>, chunk: ChunkDefinition) -> Self {
        Self::with_body(id, StepBody::Chunk(chunk))
    }

    fn with_body(id: impl Into<String>, body: StepBody) -> Self {
        Self {
            id: id.into(),
            next: None,
            start_limit: 0,
            allow_start_if_complete: false,
            properties: Properties::new(),
            listeners: Vec::new(),
            body,
            partition: None,
            transitions: Vec::new(),
        }
    }

    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn with_listener(mut self, listener: ArtifactRef) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_partition(mut self, partition: PartitionDefinition) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_start_limit(mut self, start_limit: u32) -> Self {
        self.start_limit = start_limit;
        self
    }

    pub fn allowing_start_if_complete(mut self) -> Self {
        self.allow_start_if_complete = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepBody {
    Batchlet(ArtifactRef),
    Chunk(ChunkDefinition),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPolicy {
    #[default]
    Item,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDefinition {
    pub reader: ArtifactRef,
    #[serde(default)]
    pub processor: Option<ArtifactRef>,
    pub writer: ArtifactRef,
    #[serde(default)]
    pub checkpoint_policy: CheckpointPolicy,
    /// Items per chunk for the item policy; the configured default when unset
    #[serde(default)]
    pub item_count: Option<u32>,
    /// Seconds after which the item policy commits regardless of count
    #[serde(default)]
    pub time_limit: Option<u64>,
    #[serde(default)]
    pub checkpoint_algorithm: Option<ArtifactRef>,
    /// `None` is unlimited
    #[serde(default)]
    pub skip_limit: Option<u32>,
    /// `None` is unlimited
    #[serde(default)]
    pub retry_limit: Option<u32>,
    #[serde(default)]
    pub skippable: ExceptionClassFilter,
    #[serde(default)]
    pub retryable: ExceptionClassFilter,
    #[serde(default)]
    pub no_rollback: ExceptionClassFilter,
}

impl ChunkDefinition {
    pub fn new(reader: ArtifactRef, writer: ArtifactRef) -> Self {
        Self {
            reader,
            processor: None,
            writer,
            checkpoint_policy: CheckpointPolicy::Item,
            item_count: None,
            time_limit: None,
            checkpoint_algorithm: None,
            skip_limit: None,
            retry_limit: None,
            skippable: ExceptionClassFilter::default(),
            retryable: ExceptionClassFilter::default(),
            no_rollback: ExceptionClassFilter::default(),
        }
    }

    pub fn with_processor(mut self, processor: ArtifactRef) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn with_item_count(mut self, item_count: u32) -> Self {
        self.item_count = Some(item_count);
        self
    }

    pub fn with_custom_checkpoint(mut self, algorithm: ArtifactRef) -> Self {
        self.checkpoint_policy = CheckpointPolicy::Custom;
        self.checkpoint_algorithm = Some(algorithm);
        self
    }

    pub fn with_skip(mut self, limit: Option<u32>, skippable: ExceptionClassFilter) -> Self {
        self.skip_limit = limit;
        self.skippable = skippable;
        self
    }

    pub fn with_retry(mut self, limit: Option<u32>, retryable: ExceptionClassFilter) -> Self {
        self.retry_limit = limit;
        self.retryable = retryable;
        self
    }

    pub fn with_no_rollback(mut self, no_rollback: ExceptionClassFilter) -> Self {
        self.no_rollback = no_rollback;
        self
    }
}

/// Static plan or mapper, plus the optional partition companions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionDefinition {
    #[serde(default)]
    pub plan: Option<PartitionPlan>,
    #[serde(default)]
    pub mapper: Option<ArtifactRef>,
    #[serde(default)]
    pub reducer: Option<ArtifactRef>,
    #[serde(default)]
    pub collector: Option<ArtifactRef>,
    #[serde(default)]
    pub analyzer: Option<ArtifactRef>,
}

impl PartitionDefinition {
    pub fn with_plan(plan: PartitionPlan) -> Self {
        Self {
            plan: Some(plan),
            ..Self::default()
        }
    }

    pub fn with_mapper(mapper: ArtifactRef) -> Self {
        Self {
            mapper: Some(mapper),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionDefinition {
    pub id: String,
    pub decider: ArtifactRef,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl DecisionDefinition {
    pub fn new(id: impl Into<String>, decider: ArtifactRef) -> Self {
        Self {
            id: id.into(),
            decider,
            transitions: Vec::new(),
        }
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: String,
    #[serde(default)]
    pub next: Option<String>,
    pub elements: Vec<ExecutionElement>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl FlowDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            next: None,
            elements: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn with_element(mut self, element: impl Into<ExecutionElement>) -> Self {
        self.elements.push(element.into());
        self
    }

    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitDefinition {
    pub id: String,
    #[serde(default)]
    pub next: Option<String>,
    pub flows: Vec<FlowDefinition>,
}

impl SplitDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            next: None,
            flows: Vec::new(),
        }
    }

    pub fn with_flow(mut self, flow: FlowDefinition) -> Self {
        self.flows.push(flow);
        self
    }

    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }
}

/// Control-flow rule evaluated against an element's exit status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Next {
        on: String,
        to: String,
    },
    End {
        on: String,
        #[serde(default)]
        exit_status: Option<String>,
    },
    Fail {
        on: String,
        #[serde(default)]
        exit_status: Option<String>,
    },
    Stop {
        on: String,
        #[serde(default)]
        exit_status: Option<String>,
        /// Element the next attempt should resume at
        #[serde(default)]
        restart: Option<String>,
    },
}

impl Transition {
    pub fn next(on: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Next {
            on: on.into(),
            to: to.into(),
        }
    }

    pub fn end(on: impl Into<String>, exit_status: Option<&str>) -> Self {
        Self::End {
            on: on.into(),
            exit_status: exit_status.map(str::to_string),
        }
    }

    pub fn fail(on: impl Into<String>, exit_status: Option<&str>) -> Self {
        Self::Fail {
            on: on.into(),
            exit_status: exit_status.map(str::to_string),
        }
    }

    pub fn stop(on: impl Into<String>, exit_status: Option<&str>, restart: Option<&str>) -> Self {
        Self::Stop {
            on: on.into(),
            exit_status: exit_status.map(str::to_string),
            restart: restart.map(str::to_string),
        }
    }

    pub fn on(&self) -> &str {
        match self {
            Self::Next { on, .. }
            | Self::End { on, .. }
            | Self::Fail { on, .. }
            | Self::Stop { on, .. } => on,
        }
    }

    pub fn matches(&self, exit_status: &str) -> bool {
        wildcard_match(self.on(), exit_status)
    }
}

/// Glob match supporting `*` (any run) and `?` (any single character)
pub fn wildcard_match(pattern: &str, value: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();

    let (mut p, mut v) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while v < value.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == value[v]) {
            p += 1;
            v += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, v));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            v = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}
