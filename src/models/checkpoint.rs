use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifies one checkpoint chain: a step (or partition of a step) of one
/// job instance, shared by every restart attempt of that instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointKey {
    pub instance_id: i64,
    pub step_name: String,
    pub partition: Option<u32>,
}

impl CheckpointKey {
    pub fn new(instance_id: i64, step_name: impl Into<String>, partition: Option<u32>) -> Self {
        Self {
            instance_id,
            step_name: step_name.into(),
            partition,
        }
    }
}

/// Reader and writer cursors captured at a committed chunk boundary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub reader: Option<Value>,
    pub writer: Option<Value>,
}
