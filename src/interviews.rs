use chrono::{DateTime, Utc};

use crate::api::{InterviewInput, RecruitingApi, RescheduleInput};
use crate::error::{PipelineError, Result};
use crate::models::{
    Application, Interview, InterviewFeedback, InterviewFormat, InterviewKind, PipelineStage,
    StageType,
};

/// New interviews are only scheduled while the application sits in an
/// interview-type stage.
pub fn can_schedule(stage: &PipelineStage) -> bool {
    stage.stage_type == StageType::Interview
}

/// Edit, reschedule, delete, cancel and feedback are only offered for
/// interviews that have not happened or been called off yet.
pub fn can_modify(interview: &Interview) -> bool {
    interview.status.is_active()
}

pub fn ensure_can_schedule(stage: &PipelineStage) -> Result<()> {
    if can_schedule(stage) {
        Ok(())
    } else {
        Err(PipelineError::NotPermitted(format!(
            "interviews can only be scheduled in an interview stage (current stage '{}' is {})",
            stage.name, stage.stage_type
        )))
    }
}

pub fn ensure_can_modify(interview: &Interview, action: &str) -> Result<()> {
    if can_modify(interview) {
        Ok(())
    } else {
        Err(PipelineError::NotPermitted(format!(
            "cannot {} interview '{}': it is {}",
            action,
            interview.id,
            interview.status.as_str()
        )))
    }
}

pub fn validate_feedback(feedback: &InterviewFeedback) -> Result<()> {
    if !(1..=5).contains(&feedback.rating) {
        return Err(PipelineError::NotPermitted(format!(
            "rating must be between 1 and 5, got {}",
            feedback.rating
        )));
    }
    Ok(())
}

/// Interview form contents as entered, before the type-dependent fields are
/// reconciled.
#[derive(Debug, Clone)]
pub struct InterviewDraft {
    pub scheduled_date: DateTime<Utc>,
    pub interviewer_name: String,
    pub interviewer_email: Option<String>,
    pub kind: InterviewKind,
    pub location: Option<String>,
    pub meeting_link: Option<String>,
    pub duration: u32,
}

impl InterviewDraft {
    /// Normalises the draft for saving. Applied on every create and edit so
    /// a type change never leaves the old location or link behind.
    pub fn into_input(self) -> Result<InterviewInput> {
        let interviewer_name = self.interviewer_name.trim().to_string();
        if interviewer_name.is_empty() {
            return Err(PipelineError::NotPermitted("interviewer name is required".into()));
        }
        if self.duration == 0 {
            return Err(PipelineError::NotPermitted("duration must be at least one minute".into()));
        }

        Ok(InterviewInput {
            scheduled_date: self.scheduled_date,
            interviewer_name,
            interviewer_email: self.interviewer_email.filter(|e| !e.trim().is_empty()),
            format: InterviewFormat::from_parts(self.kind, self.location, self.meeting_link),
            duration: self.duration,
        })
    }
}

fn find<'a>(application: &'a Application, interview_id: &str) -> Result<&'a Interview> {
    application
        .interview(interview_id)
        .ok_or_else(|| PipelineError::not_found("interview", interview_id))
}

/// Interview actions for one application. None of them move the
/// application between stages.
pub struct InterviewManager<'a> {
    api: &'a dyn RecruitingApi,
}

impl<'a> InterviewManager<'a> {
    pub fn new(api: &'a dyn RecruitingApi) -> Self {
        Self { api }
    }

    pub fn schedule(
        &self,
        current_stage: &PipelineStage,
        application: &Application,
        draft: InterviewDraft,
    ) -> Result<Interview> {
        ensure_can_schedule(current_stage)?;
        let input = draft.into_input()?;
        let interview = self.api.create_interview(&application.id, &input)?;
        tracing::info!(application_id = %application.id, interview_id = %interview.id, "interview scheduled");
        Ok(interview)
    }

    pub fn edit(
        &self,
        application: &Application,
        interview_id: &str,
        draft: InterviewDraft,
    ) -> Result<Interview> {
        ensure_can_modify(find(application, interview_id)?, "edit")?;
        let input = draft.into_input()?;
        self.api.update_interview(interview_id, &input)
    }

    pub fn reschedule(
        &self,
        application: &Application,
        interview_id: &str,
        scheduled_date: DateTime<Utc>,
        duration: Option<u32>,
    ) -> Result<Interview> {
        ensure_can_modify(find(application, interview_id)?, "reschedule")?;
        let input = RescheduleInput {
            scheduled_date,
            duration,
        };
        self.api.reschedule_interview(interview_id, &input)
    }

    pub fn delete(&self, application: &Application, interview_id: &str) -> Result<()> {
        ensure_can_modify(find(application, interview_id)?, "delete")?;
        self.api.delete_interview(interview_id)?;
        tracing::info!(application_id = %application.id, interview_id, "interview deleted");
        Ok(())
    }

    pub fn cancel(&self, application: &Application, interview_id: &str) -> Result<Interview> {
        ensure_can_modify(find(application, interview_id)?, "cancel")?;
        self.api.cancel_interview(interview_id)
    }

    /// Recording feedback completes the interview.
    pub fn add_feedback(
        &self,
        application: &Application,
        interview_id: &str,
        feedback: &InterviewFeedback,
    ) -> Result<Interview> {
        ensure_can_modify(find(application, interview_id)?, "add feedback to")?;
        validate_feedback(feedback)?;
        self.api.add_interview_feedback(interview_id, feedback)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn draft(kind: InterviewKind) -> InterviewDraft {
        InterviewDraft {
            scheduled_date: "2026-04-02T14:00:00Z".parse().unwrap(),
            interviewer_name: "Priya Natarajan".to_string(),
            interviewer_email: Some("priya@example.com".to_string()),
            kind,
            location: Some("HQ, room 3".to_string()),
            meeting_link: Some("https://meet.example/xyz".to_string()),
            duration: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::draft;
    use super::*;
    use crate::db::Database;
    use crate::models::{InterviewStatus, Recommendation};
    use crate::pipeline::fixtures::hiring_pipeline;

    struct Setup {
        db: Database,
        application_id: String,
    }

    impl Setup {
        fn at(stage_key: &str) -> Self {
            let db = Database::open_in_memory().unwrap();
            let pipeline = db.create_pipeline(&hiring_pipeline()).unwrap();
            let job = db.create_job("Platform Engineer", &pipeline.id).unwrap();
            let app = db.create_application(&job.id, "cand-7", Some(stage_key)).unwrap();
            Self {
                db,
                application_id: app.id,
            }
        }

        fn application(&self) -> Application {
            self.db.get_application_by_id(&self.application_id).unwrap()
        }

        fn stage(&self) -> PipelineStage {
            let pipeline = self.db.get_pipeline_by_job_id(&self.application().job_id).unwrap();
            pipeline.stage(&self.application().current_stage_key).unwrap().clone()
        }
    }

    fn feedback(rating: u8) -> InterviewFeedback {
        InterviewFeedback {
            rating,
            recommendation: Recommendation::Hire,
            strengths: vec!["system design".into()],
            weaknesses: vec![],
            comments: "Solid".into(),
        }
    }

    #[test]
    fn test_video_save_clears_location() {
        let input = draft(InterviewKind::Video).into_input().unwrap();
        assert_eq!(input.format.location(), None);
        assert_eq!(input.format.meeting_link(), Some("https://meet.example/xyz"));
    }

    #[test]
    fn test_in_person_save_clears_meeting_link() {
        let input = draft(InterviewKind::InPerson).into_input().unwrap();
        assert_eq!(input.format.meeting_link(), None);
        assert_eq!(input.format.location(), Some("HQ, room 3"));
    }

    #[test]
    fn test_draft_requires_interviewer() {
        let mut d = draft(InterviewKind::Phone);
        d.interviewer_name = "   ".into();
        assert!(matches!(d.into_input(), Err(PipelineError::NotPermitted(_))));
    }

    #[test]
    fn test_schedule_only_in_interview_stage() {
        let setup = Setup::at("sourcing");
        let manager = InterviewManager::new(&setup.db);
        let err = manager
            .schedule(&setup.stage(), &setup.application(), draft(InterviewKind::Phone))
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotPermitted(_)));
        assert!(setup.application().interviews.is_empty());
    }

    #[test]
    fn test_schedule_and_edit_keeps_fields_exclusive() {
        let setup = Setup::at("interview");
        let manager = InterviewManager::new(&setup.db);
        let created = manager
            .schedule(&setup.stage(), &setup.application(), draft(InterviewKind::InPerson))
            .unwrap();
        assert_eq!(created.format.location(), Some("HQ, room 3"));
        assert_eq!(created.status, InterviewStatus::Scheduled);

        // Switching to video on edit drops the stored location.
        let edited = manager
            .edit(&setup.application(), &created.id, draft(InterviewKind::Video))
            .unwrap();
        assert_eq!(edited.format.location(), None);
        assert_eq!(edited.format.meeting_link(), Some("https://meet.example/xyz"));

        let reloaded = setup.application();
        assert_eq!(reloaded.interviews.len(), 1);
        assert_eq!(reloaded.interviews[0].format.location(), None);
    }

    #[test]
    fn test_feedback_completes_and_locks_interview() {
        let setup = Setup::at("interview");
        let manager = InterviewManager::new(&setup.db);
        let created = manager
            .schedule(&setup.stage(), &setup.application(), draft(InterviewKind::Phone))
            .unwrap();

        let done = manager
            .add_feedback(&setup.application(), &created.id, &feedback(4))
            .unwrap();
        assert_eq!(done.status, InterviewStatus::Completed);
        assert_eq!(done.feedback.as_ref().map(|f| f.rating), Some(4));

        let app = setup.application();
        assert!(!can_modify(&app.interviews[0]));
        for result in [
            manager.edit(&app, &created.id, draft(InterviewKind::Phone)).map(|_| ()),
            manager.reschedule(&app, &created.id, "2026-04-09T14:00:00Z".parse().unwrap(), None).map(|_| ()),
            manager.delete(&app, &created.id),
            manager.add_feedback(&app, &created.id, &feedback(5)).map(|_| ()),
        ] {
            assert!(matches!(result, Err(PipelineError::NotPermitted(_))));
        }
    }

    #[test]
    fn test_feedback_rating_out_of_range() {
        let setup = Setup::at("interview");
        let manager = InterviewManager::new(&setup.db);
        let created = manager
            .schedule(&setup.stage(), &setup.application(), draft(InterviewKind::Phone))
            .unwrap();
        let err = manager
            .add_feedback(&setup.application(), &created.id, &feedback(0))
            .unwrap_err();
        assert!(err.to_string().contains("rating"));
        assert_eq!(setup.application().interviews[0].status, InterviewStatus::Scheduled);
    }

    #[test]
    fn test_reschedule_then_cancel() {
        let setup = Setup::at("interview");
        let manager = InterviewManager::new(&setup.db);
        let created = manager
            .schedule(&setup.stage(), &setup.application(), draft(InterviewKind::Video))
            .unwrap();

        let when: DateTime<Utc> = "2026-04-10T09:30:00Z".parse().unwrap();
        let moved = manager
            .reschedule(&setup.application(), &created.id, when, Some(45))
            .unwrap();
        assert_eq!(moved.status, InterviewStatus::Rescheduled);
        assert_eq!(moved.scheduled_date, when);
        assert_eq!(moved.duration, 45);

        let cancelled = manager.cancel(&setup.application(), &created.id).unwrap();
        assert_eq!(cancelled.status, InterviewStatus::Cancelled);
    }

    #[test]
    fn test_delete_active_interview() {
        let setup = Setup::at("interview");
        let manager = InterviewManager::new(&setup.db);
        let created = manager
            .schedule(&setup.stage(), &setup.application(), draft(InterviewKind::Phone))
            .unwrap();
        manager.delete(&setup.application(), &created.id).unwrap();
        assert!(setup.application().interviews.is_empty());
    }

    #[test]
    fn test_unknown_interview_is_not_found() {
        let setup = Setup::at("interview");
        let manager = InterviewManager::new(&setup.db);
        let err = manager.delete(&setup.application(), "999").unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { entity: "interview", .. }));
    }
}
