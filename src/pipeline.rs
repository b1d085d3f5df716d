use std::collections::{HashMap, HashSet};

use crate::api::RecruitingApi;
use crate::error::{PipelineError, Result};
use crate::models::{Application, Pipeline, PipelineStage, PipelineTransition};

/// Checks that stage keys are unique and every transition points at a
/// stage of the same pipeline.
pub fn validate(pipeline: &Pipeline) -> Result<()> {
    if pipeline.stages.is_empty() {
        return Err(PipelineError::InvalidPipeline(format!(
            "pipeline '{}' has no stages",
            pipeline.name
        )));
    }

    let mut keys = HashSet::new();
    for stage in &pipeline.stages {
        if stage.key.trim().is_empty() {
            return Err(PipelineError::InvalidPipeline(format!(
                "stage '{}' has an empty key",
                stage.name
            )));
        }
        if !keys.insert(stage.key.as_str()) {
            return Err(PipelineError::InvalidPipeline(format!(
                "duplicate stage key '{}'",
                stage.key
            )));
        }
    }

    for t in &pipeline.transitions {
        for key in [&t.from_stage_key, &t.to_stage_key] {
            if !keys.contains(key.as_str()) {
                return Err(PipelineError::InvalidPipeline(format!(
                    "transition {} -> {} references unknown stage '{}'",
                    t.from_stage_key, t.to_stage_key, key
                )));
            }
        }
    }

    Ok(())
}

/// Transitions leaving the application's current stage, in declaration
/// order. Empty means the stage is terminal.
pub fn available_transitions<'p>(
    pipeline: &'p Pipeline,
    application: &Application,
) -> Vec<&'p PipelineTransition> {
    pipeline
        .transitions
        .iter()
        .filter(|t| t.from_stage_key == application.current_stage_key)
        .collect()
}

pub fn current_stage<'p>(pipeline: &'p Pipeline, application: &Application) -> Result<&'p PipelineStage> {
    pipeline
        .stage(&application.current_stage_key)
        .ok_or_else(|| PipelineError::not_found("stage", &application.current_stage_key))
}

/// Pipelines keyed by job id. A job's pipeline is read-only from the
/// application-review side, so entries stay until explicitly invalidated.
pub struct PipelineLookup<'a> {
    api: &'a dyn RecruitingApi,
    cache: HashMap<String, Pipeline>,
}

impl<'a> PipelineLookup<'a> {
    pub fn new(api: &'a dyn RecruitingApi) -> Self {
        Self {
            api,
            cache: HashMap::new(),
        }
    }

    pub fn get(&mut self, job_id: &str) -> Result<&Pipeline> {
        if job_id.trim().is_empty() {
            return Err(PipelineError::not_found("job", job_id));
        }

        if !self.cache.contains_key(job_id) {
            let pipeline = self.api.get_pipeline_by_job_id(job_id)?;
            validate(&pipeline)?;
            tracing::debug!(job_id, pipeline_id = %pipeline.id, "pipeline loaded");
            self.cache.insert(job_id.to_string(), pipeline);
        }

        self.cache
            .get(job_id)
            .ok_or_else(|| PipelineError::not_found("pipeline for job", job_id))
    }

    pub fn invalidate(&mut self, job_id: &str) {
        self.cache.remove(job_id);
    }

    #[cfg(test)]
    pub fn is_cached(&self, job_id: &str) -> bool {
        self.cache.contains_key(job_id)
    }
}
