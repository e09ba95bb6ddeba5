//! # Artifact Errors
//!
//! User artifacts report failures as an [`ArtifactError`] carrying a dotted
//! classification path (`io`, `io.timeout`, `validation.format`, ...). Skip,
//! retry and no-rollback policies select errors by matching that path against
//! an [`ExceptionClassFilter`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ArtifactError {
    pub kind: String,
    pub message: String,
}

impl ArtifactError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// True when this error's kind equals `kind` or is nested under it
    pub fn is_kind_of(&self, kind: &str) -> bool {
        kind_matches(kind, &self.kind)
    }
}

/// Returns true if `pattern` selects `kind`; `*` selects every kind
fn kind_matches(pattern: &str, kind: &str) -> bool {
    if pattern == "*" || pattern == kind {
        return true;
    }
    kind.strip_prefix(pattern)
        .is_some_and(|rest| rest.starts_with('.'))
}

fn specificity(pattern: &str) -> usize {
    if pattern == "*" {
        0
    } else {
        pattern.split('.').count()
    }
}

/// Include/exclude sets of error kinds
///
/// An error matches when its most specific matching include pattern is more
/// specific than its most specific matching exclude pattern. Exclusions win
/// ties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionClassFilter {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl ExceptionClassFilter {
    pub fn including<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: kinds.into_iter().map(Into::into).collect(),
            exclude: Vec::new(),
        }
    }

    pub fn excluding<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(kinds.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
    }

    pub fn matches(&self, error: &ArtifactError) -> bool {
        let best = |patterns: &[String]| {
            patterns
                .iter()
                .filter(|p| kind_matches(p, &error.kind))
                .map(|p| specificity(p))
                .max()
        };

        match (best(&self.include), best(&self.exclude)) {
            (Some(included), Some(excluded)) => included > excluded,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}
