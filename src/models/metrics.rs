use serde::{Deserialize, Serialize};
use std::fmt;

/// Named counters tracked per step execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Read,
    Write,
    Commit,
    Rollback,
    ReadSkip,
    ProcessSkip,
    WriteSkip,
    Filter,
}

impl MetricType {
    pub const ALL: [MetricType; 8] = [
        MetricType::Read,
        MetricType::Write,
        MetricType::Commit,
        MetricType::Rollback,
        MetricType::ReadSkip,
        MetricType::ProcessSkip,
        MetricType::WriteSkip,
        MetricType::Filter,
    ];
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricType::Read => "read_count",
            MetricType::Write => "write_count",
            MetricType::Commit => "commit_count",
            MetricType::Rollback => "rollback_count",
            MetricType::ReadSkip => "read_skip_count",
            MetricType::ProcessSkip => "process_skip_count",
            MetricType::WriteSkip => "write_skip_count",
            MetricType::Filter => "filter_count",
        };
        f.write_str(name)
    }
}

/// Counters attached 1:1 to a step execution
///
/// Only ever incremented; partitioned steps report the sum of their
/// partitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMetrics {
    pub read_count: u64,
    pub write_count: u64,
    pub commit_count: u64,
    pub rollback_count: u64,
    pub read_skip_count: u64,
    pub process_skip_count: u64,
    pub write_skip_count: u64,
    pub filter_count: u64,
}

impl StepMetrics {
    pub fn increment(&mut self, metric: MetricType) {
        self.add(metric, 1);
    }

    pub fn add(&mut self, metric: MetricType, amount: u64) {
        *self.slot(metric) += amount;
    }

    pub fn get(&self, metric: MetricType) -> u64 {
        match metric {
            MetricType::Read => self.read_count,
            MetricType::Write => self.write_count,
            MetricType::Commit => self.commit_count,
            MetricType::Rollback => self.rollback_count,
            MetricType::ReadSkip => self.read_skip_count,
            MetricType::ProcessSkip => self.process_skip_count,
            MetricType::WriteSkip => self.write_skip_count,
            MetricType::Filter => self.filter_count,
        }
    }

    /// Total skips across all three phases
    pub fn skip_count(&self) -> u64 {
        self.read_skip_count + self.process_skip_count + self.write_skip_count
    }

    /// Fold another execution's counters into this one
    pub fn merge(&mut self, other: &StepMetrics) {
        for metric in MetricType::ALL {
            self.add(metric, other.get(metric));
        }
    }

    fn slot(&mut self, metric: MetricType) -> &mut u64 {
        match metric {
            MetricType::Read => &mut self.read_count,
            MetricType::Write => &mut self.write_count,
            MetricType::Commit => &mut self.commit_count,
            MetricType::Rollback => &mut self.rollback_count,
            MetricType::ReadSkip => &mut self.read_skip_count,
            MetricType::ProcessSkip => &mut self.process_skip_count,
            MetricType::WriteSkip => &mut self.write_skip_count,
            MetricType::Filter => &mut self.filter_count,
        }
    }
}
