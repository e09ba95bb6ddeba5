//! # Property Substitution
//!
//! Property values may reference runtime data with
//! `#{jobParameters['name']}`, `#{jobProperties['name']}` or
//! `#{partitionPlan['name']}`. A reference may be followed by `?:default;`,
//! used when the referenced value is missing. Unknown sources are left
//! untouched; missing values without a default become empty strings.

use super::model::ArtifactRef;
use crate::models::{JobParameters, Properties};

const OPEN: &str = "#{";

#[derive(Debug, Clone, Default)]
pub struct PropertyResolver {
    job_parameters: JobParameters,
    job_properties: Properties,
    partition_plan: Option<Properties>,
}

impl PropertyResolver {
    /// Resolver for job-level data; job properties may themselves reference
    /// job parameters
    pub fn new(job_parameters: JobParameters, raw_job_properties: &Properties) -> Self {
        let mut resolver = Self {
            job_parameters,
            job_properties: Properties::new(),
            partition_plan: None,
        };
        resolver.job_properties = resolver.resolve_all(raw_job_properties);
        resolver
    }

    /// Copy of this resolver that also sees one partition's plan properties
    pub fn for_partition(&self, partition_properties: Properties) -> Self {
        Self {
            partition_plan: Some(partition_properties),
            ..self.clone()
        }
    }

    pub fn job_properties(&self) -> &Properties {
        &self.job_properties
    }

    pub fn job_parameters(&self) -> &JobParameters {
        &self.job_parameters
    }

    pub fn resolve_all(&self, properties: &Properties) -> Properties {
        properties
            .iter()
            .map(|(k, v)| (k.clone(), self.resolve(v)))
            .collect()
    }

    /// Resolve an artifact reference: its name and its properties overlaid
    /// on the enclosing step's already-resolved properties
    pub fn resolve_ref(&self, artifact: &ArtifactRef, step_properties: &Properties) -> ArtifactRef {
        let mut properties = step_properties.clone();
        properties.extend(self.resolve_all(&artifact.properties));
        ArtifactRef {
            name: self.resolve(&artifact.name),
            properties,
        }
    }

    pub fn resolve(&self, value: &str) -> String {
        let mut output = String::with_capacity(value.len());
        let mut rest = value;

        while let Some(start) = rest.find(OPEN) {
            output.push_str(&rest[..start]);
            let candidate = &rest[start..];

            match self.substitute(candidate) {
                Some((replacement, consumed)) => {
                    output.push_str(&replacement);
                    rest = &candidate[consumed..];
                }
                None => {
                    output.push_str(OPEN);
                    rest = &candidate[OPEN.len()..];
                }
            }
        }

        output.push_str(rest);
        output
    }

    /// Parse one `#{source['key']}` expression (plus optional default) at the
    /// start of `input`; returns the replacement and the bytes consumed
    fn substitute(&self, input: &str) -> Option<(String, usize)> {
        let close = input.find('}')?;
        let expression = &input[OPEN.len()..close];

        let (source, remainder) = expression.split_once("['")?;
        let key = remainder.strip_suffix("']")?;

        let found = match source {
            "jobParameters" => self.job_parameters.get(key),
            "jobProperties" => self.job_properties.get(key),
            "partitionPlan" => self.partition_plan.as_ref().and_then(|p| p.get(key)),
            _ => return None,
        };

        let mut consumed = close + 1;
        let mut default = None;
        if let Some(after) = input[consumed..].strip_prefix("?:") {
            if let Some(end) = after.find(';') {
                default = Some(after[..end].to_string());
                consumed += 2 + end + 1;
            }
        }

        let value = found.cloned().or(default).unwrap_or_default();
        Some((value, consumed))
    }
}
