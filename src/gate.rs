//! Stage transition gate.
//!
//! An application in an offer-type stage can only move on once one of its
//! offers has been accepted. Moving to a rejection stage is always allowed.
//! The rejection exemption keys off the target stage's type, so pipelines
//! are free to name their rejection stage whatever they like.

use crate::api::{RecruitingApi, StageUpdate};
use crate::error::{PipelineError, Result};
use crate::models::{Application, Pipeline, PipelineStage, PipelineTransition, StageType};
use crate::pipeline;

pub const ACCEPTED_OFFER_REQUIRED: &str = "Cannot proceed without an accepted offer";

pub fn move_reason(to_stage: &PipelineStage) -> String {
    format!("Moved to {} stage", to_stage.name)
}

/// Validates `transition` for `application` without touching anything.
/// Returns the target stage when the move is allowed.
pub fn check<'p>(
    pipeline: &'p Pipeline,
    application: &Application,
    transition: &PipelineTransition,
) -> Result<&'p PipelineStage> {
    let invalid = || PipelineError::InvalidTransition {
        to_stage_key: transition.to_stage_key.clone(),
    };
    // Only declared moves out of the stage the application is in.
    if transition.from_stage_key != application.current_stage_key
        || !pipeline.transitions.iter().any(|t| t == transition)
    {
        return Err(invalid());
    }
    let to_stage = pipeline.stage(&transition.to_stage_key).ok_or_else(invalid)?;
    let current = pipeline::current_stage(pipeline, application)?;

    if current.stage_type == StageType::Offer
        && to_stage.stage_type != StageType::Rejected
        && !application.has_accepted_offer()
    {
        return Err(PipelineError::PreconditionFailed(ACCEPTED_OFFER_REQUIRED.to_string()));
    }

    Ok(to_stage)
}

pub struct TransitionGate<'a> {
    api: &'a dyn RecruitingApi,
}

impl<'a> TransitionGate<'a> {
    pub fn new(api: &'a dyn RecruitingApi) -> Self {
        Self { api }
    }

    /// Checks and persists the move, then returns the refetched application.
    /// On any error the application is left where it was.
    pub fn execute(
        &self,
        pipeline: &Pipeline,
        application: &Application,
        transition: &PipelineTransition,
    ) -> Result<Application> {
        let to_stage = match check(pipeline, application, transition) {
            Ok(stage) => stage,
            Err(e) => {
                tracing::info!(
                    application_id = %application.id,
                    from = %application.current_stage_key,
                    to = %transition.to_stage_key,
                    error = %e,
                    "transition blocked"
                );
                return Err(e);
            }
        };

        let update = StageUpdate {
            stage_key: to_stage.key.clone(),
            reason: move_reason(to_stage),
            notes: String::new(),
            expected_version: application.version,
        };
        self.api
            .update_application_stage_for_recruiter(&application.id, &update)?;

        tracing::info!(
            application_id = %application.id,
            from = %application.current_stage_key,
            to = %to_stage.key,
            "application moved"
        );

        self.api.get_application_by_id(&application.id)
    }
}
