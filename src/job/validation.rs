//! # Job Definition Validation
//!
//! Structural checks run by `start` before any record is created, so a
//! malformed definition fails fast with [`KernelError::Configuration`].

use super::model::{
    ArtifactRef, CheckpointPolicy, ExecutionElement, JobDefinition, StepBody, StepDefinition,
    Transition,
};
use crate::error::{KernelError, Result};
use crate::registry::ArtifactResolver;
use std::collections::HashSet;

/// Names built from substitution expressions are only known at runtime
fn is_dynamic(name: &str) -> bool {
    name.contains("#{")
}

struct Validator<'a> {
    resolver: &'a dyn ArtifactResolver,
    top_level_ids: HashSet<&'a str>,
    seen_ids: HashSet<&'a str>,
    errors: Vec<String>,
}

pub fn validate_job(job: &JobDefinition, resolver: &dyn ArtifactResolver) -> Result<()> {
    let mut validator = Validator {
        resolver,
        top_level_ids: job.elements.iter().map(ExecutionElement::id).collect(),
        seen_ids: HashSet::new(),
        errors: Vec::new(),
    };

    if job.id.trim().is_empty() {
        validator.errors.push("job id must not be empty".to_string());
    }
    for listener in &job.listeners {
        validator.check_artifact(&job.id, listener);
    }
    validator.check_sequence(&job.id, &job.elements);

    if validator.errors.is_empty() {
        Ok(())
    } else {
        Err(KernelError::Configuration(validator.errors.join("; ")))
    }
}

impl<'a> Validator<'a> {
    fn check_sequence(&mut self, owner: &str, elements: &'a [ExecutionElement]) {
        if elements.is_empty() {
            self.errors.push(format!("{owner} has no execution elements"));
            return;
        }

        let sibling_ids: HashSet<&str> = elements.iter().map(ExecutionElement::id).collect();

        for element in elements {
            let id = element.id();
            if !self.seen_ids.insert(id) {
                self.errors.push(format!("duplicate element id '{id}'"));
            }

            if let Some(next) = element.next() {
                if !sibling_ids.contains(next) {
                    self.errors
                        .push(format!("element '{id}' names unknown next element '{next}'"));
                }
            }

            for transition in element.transitions() {
                self.check_transition(id, transition, &sibling_ids);
            }

            match element {
                ExecutionElement::Step(step) => self.check_step(step),
                ExecutionElement::Decision(decision) => {
                    self.check_artifact(&decision.id, &decision.decider)
                }
                ExecutionElement::Flow(flow) => self.check_sequence(&flow.id, &flow.elements),
                ExecutionElement::Split(split) => {
                    if split.flows.is_empty() {
                        self.errors.push(format!("split '{}' has no flows", split.id));
                    }
                    for flow in &split.flows {
                        if !self.seen_ids.insert(&flow.id) {
                            self.errors.push(format!("duplicate element id '{}'", flow.id));
                        }
                        self.check_sequence(&flow.id, &flow.elements);
                    }
                }
            }
        }
    }

    fn check_transition(&mut self, id: &str, transition: &Transition, siblings: &HashSet<&str>) {
        match transition {
            Transition::Next { to, .. } if !siblings.contains(to.as_str()) => {
                self.errors
                    .push(format!("element '{id}' transitions to unknown element '{to}'"));
            }
            Transition::Stop {
                restart: Some(restart),
                ..
            } if !self.top_level_ids.contains(restart.as_str()) => {
                self.errors.push(format!(
                    "element '{id}' names restart position '{restart}', which is not a top-level element"
                ));
            }
            _ => {}
        }
    }

    fn check_step(&mut self, step: &StepDefinition) {
        for listener in &step.listeners {
            self.check_artifact(&step.id, listener);
        }

        match &step.body {
            StepBody::Batchlet(batchlet) => self.check_artifact(&step.id, batchlet),
            StepBody::Chunk(chunk) => {
                self.check_artifact(&step.id, &chunk.reader);
                self.check_artifact(&step.id, &chunk.writer);
                if let Some(processor) = &chunk.processor {
                    self.check_artifact(&step.id, processor);
                }
                if chunk.item_count == Some(0) {
                    self.errors
                        .push(format!("step '{}' declares an item count of 0", step.id));
                }
                match (&chunk.checkpoint_policy, &chunk.checkpoint_algorithm) {
                    (CheckpointPolicy::Custom, None) => self.errors.push(format!(
                        "step '{}' uses a custom checkpoint policy without an algorithm",
                        step.id
                    )),
                    (_, Some(algorithm)) => self.check_artifact(&step.id, algorithm),
                    _ => {}
                }
            }
        }

        if let Some(partition) = &step.partition {
            match (&partition.plan, &partition.mapper) {
                (None, None) => self.errors.push(format!(
                    "partitioned step '{}' has neither a plan nor a mapper",
                    step.id
                )),
                (Some(plan), None) if plan.partitions == 0 => self
                    .errors
                    .push(format!("partitioned step '{}' declares 0 partitions", step.id)),
                _ => {}
            }
            let companions = [
                &partition.mapper,
                &partition.reducer,
                &partition.collector,
                &partition.analyzer,
            ];
            for artifact in companions.into_iter().flatten() {
                self.check_artifact(&step.id, artifact);
            }
        }
    }

    fn check_artifact(&mut self, owner: &str, artifact: &ArtifactRef) {
        if artifact.name.trim().is_empty() {
            self.errors
                .push(format!("{owner} references an artifact with an empty name"));
        } else if !is_dynamic(&artifact.name) && !self.resolver.contains(&artifact.name) {
            self.errors.push(format!(
                "{owner} references unknown artifact '{}'",
                artifact.name
            ));
        }
    }
}
