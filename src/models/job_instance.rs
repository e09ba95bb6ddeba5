use serde::{Deserialize, Serialize};

/// Identity of a named job across all of its run attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInstance {
    pub instance_id: i64,
    pub job_name: String,
}
