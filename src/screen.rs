//! View model behind the application-detail screen.
//!
//! Owns everything the screen needs between key presses: the loaded
//! aggregate, which transition is highlighted, which confirmation dialog is
//! open, and the notifications raised by actions. Actions never return
//! errors to the renderer; they become toasts.

use crate::api::RecruitingApi;
use crate::error::PipelineError;
use crate::gate::{self, TransitionGate};
use crate::interviews::{self, InterviewManager};
use crate::models::{Application, Interview, Offer, Pipeline, PipelineStage, PipelineTransition};
use crate::offers::{self, OfferManager};
use crate::pipeline::{self, PipelineLookup};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
    ConfirmTransition { to_stage_key: String },
    RespondToOffer { offer_id: String, accept: bool },
    CancelInterview { interview_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Ready,
    NotFound(String),
    Failed(String),
}

pub fn toast_for(err: &PipelineError) -> Toast {
    let severity = if err.is_validation() {
        Severity::Warning
    } else {
        Severity::Error
    };
    Toast {
        severity,
        message: err.to_string(),
    }
}

pub struct ApplicationScreen<'a> {
    api: &'a dyn RecruitingApi,
    lookup: PipelineLookup<'a>,
    application_id: String,
    pub state: LoadState,
    pub application: Option<Application>,
    pub pipeline: Option<Pipeline>,
    pub selected_transition: usize,
    pub dialog: Option<Dialog>,
    pub toasts: Vec<Toast>,
}

impl<'a> ApplicationScreen<'a> {
    pub fn new(api: &'a dyn RecruitingApi, application_id: &str) -> Self {
        Self {
            api,
            lookup: PipelineLookup::new(api),
            application_id: application_id.to_string(),
            state: LoadState::Loading,
            application: None,
            pipeline: None,
            selected_transition: 0,
            dialog: None,
            toasts: Vec::new(),
        }
    }

    pub fn load(&mut self) {
        self.state = LoadState::Loading;
        let application = match self.api.get_application_by_id(&self.application_id) {
            Ok(app) => app,
            Err(e) => return self.fail_load(e),
        };
        let pipeline = match self.lookup.get(&application.job_id) {
            Ok(p) => p.clone(),
            Err(e) => return self.fail_load(e),
        };
        self.application = Some(application);
        self.pipeline = Some(pipeline);
        self.state = LoadState::Ready;
        self.clamp_selection();
    }

    fn fail_load(&mut self, err: PipelineError) {
        self.state = match err {
            PipelineError::NotFound { .. } => LoadState::NotFound(err.to_string()),
            _ => LoadState::Failed(err.to_string()),
        };
    }

    /// Drops the cached pipeline and loads everything again.
    pub fn reload(&mut self) {
        if let Some(app) = &self.application {
            self.lookup.invalidate(&app.job_id);
        }
        self.load();
    }

    /// Re-reads the application. The pipeline stays cached.
    pub fn refresh(&mut self) {
        match self.api.get_application_by_id(&self.application_id) {
            Ok(app) => {
                self.application = Some(app);
                self.clamp_selection();
            }
            Err(e) => self.toasts.push(toast_for(&e)),
        }
    }

    pub fn current_stage(&self) -> Option<&PipelineStage> {
        let (pipeline, app) = (self.pipeline.as_ref()?, self.application.as_ref()?);
        pipeline::current_stage(pipeline, app).ok()
    }

    pub fn available_transitions(&self) -> Vec<&PipelineTransition> {
        match (&self.pipeline, &self.application) {
            (Some(pipeline), Some(app)) => pipeline::available_transitions(pipeline, app),
            _ => Vec::new(),
        }
    }

    pub fn stage_name<'s>(&'s self, key: &'s str) -> &'s str {
        self.pipeline
            .as_ref()
            .and_then(|p| p.stage(key))
            .map(|s| s.name.as_str())
            .unwrap_or(key)
    }

    pub fn offers_newest_first(&self) -> Vec<&Offer> {
        self.application
            .as_ref()
            .map(|app| offers::newest_first(&app.offers))
            .unwrap_or_default()
    }

    /// The offer the recruiter can answer right now, if any.
    pub fn respondable_offer(&self) -> Option<&Offer> {
        self.offers_newest_first()
            .into_iter()
            .enumerate()
            .find(|(idx, o)| offers::can_respond(o, *idx))
            .map(|(_, o)| o)
    }

    pub fn next_active_interview(&self) -> Option<&Interview> {
        self.application
            .as_ref()?
            .interviews
            .iter()
            .find(|i| interviews::can_modify(i))
    }

    pub fn select_next(&mut self) {
        let count = self.available_transitions().len();
        if count > 0 && self.selected_transition + 1 < count {
            self.selected_transition += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected_transition = self.selected_transition.saturating_sub(1);
    }

    fn clamp_selection(&mut self) {
        let count = self.available_transitions().len();
        if self.selected_transition >= count {
            self.selected_transition = count.saturating_sub(1);
        }
    }

    // --- Dialogs ---

    pub fn open_transition_dialog(&mut self) {
        let target = self
            .available_transitions()
            .get(self.selected_transition)
            .map(|t| t.to_stage_key.clone());
        if let Some(to_stage_key) = target {
            self.dialog = Some(Dialog::ConfirmTransition { to_stage_key });
        }
    }

    pub fn open_offer_dialog(&mut self, accept: bool) {
        match self.respondable_offer().map(|o| o.id.clone()) {
            Some(offer_id) => self.dialog = Some(Dialog::RespondToOffer { offer_id, accept }),
            None => self.toasts.push(Toast {
                severity: Severity::Warning,
                message: "No candidate offer is awaiting a response".to_string(),
            }),
        }
    }

    pub fn open_cancel_interview_dialog(&mut self) {
        match self.next_active_interview().map(|i| i.id.clone()) {
            Some(interview_id) => self.dialog = Some(Dialog::CancelInterview { interview_id }),
            None => self.toasts.push(Toast {
                severity: Severity::Warning,
                message: "No scheduled interview to cancel".to_string(),
            }),
        }
    }

    pub fn close_dialog(&mut self) {
        self.dialog = None;
    }

    /// Runs the action behind the open dialog and closes it.
    pub fn confirm(&mut self) {
        let Some(dialog) = self.dialog.take() else { return };
        let Some(app) = self.application.clone() else { return };

        match dialog {
            Dialog::ConfirmTransition { to_stage_key } => self.move_to(&app, &to_stage_key),
            Dialog::RespondToOffer { offer_id, accept } => {
                let manager = OfferManager::new(self.api);
                let result = if accept {
                    manager.accept(&app, &offer_id).map(|_| "Offer accepted")
                } else {
                    manager.reject(&app, &offer_id).map(|_| "Offer rejected")
                };
                self.finish(result.map(str::to_string));
            }
            Dialog::CancelInterview { interview_id } => {
                let result = InterviewManager::new(self.api)
                    .cancel(&app, &interview_id)
                    .map(|i| format!("Interview with {} cancelled", i.interviewer_name));
                self.finish(result);
            }
        }
    }

    fn move_to(&mut self, app: &Application, to_stage_key: &str) {
        let Some(pipeline) = self.pipeline.as_ref() else { return };
        let Some(transition) = pipeline
            .transitions
            .iter()
            .find(|t| t.from_stage_key == app.current_stage_key && t.to_stage_key == to_stage_key)
        else {
            self.toasts.push(toast_for(&PipelineError::InvalidTransition {
                to_stage_key: to_stage_key.to_string(),
            }));
            return;
        };

        match TransitionGate::new(self.api).execute(pipeline, app, transition) {
            Ok(updated) => {
                let message = pipeline
                    .stage(&updated.current_stage_key)
                    .map(gate::move_reason)
                    .unwrap_or_else(|| format!("Moved to {}", updated.current_stage_key));
                self.application = Some(updated);
                self.selected_transition = 0;
                self.clamp_selection();
                self.toasts.push(Toast {
                    severity: Severity::Success,
                    message,
                });
            }
            Err(e) => {
                self.toasts.push(toast_for(&e));
                // Precondition failures change nothing; anything else may be stale
                if !matches!(e, PipelineError::PreconditionFailed(_)) {
                    self.refresh();
                }
            }
        }
    }

    fn finish(&mut self, result: crate::error::Result<String>) {
        match result {
            Ok(message) => self.toasts.push(Toast {
                severity: Severity::Success,
                message,
            }),
            Err(e) => self.toasts.push(toast_for(&e)),
        }
        self.refresh();
    }

    pub fn last_toast(&self) -> Option<&Toast> {
        self.toasts.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::OfferInput;
    use crate::db::Database;
    use crate::interviews::fixtures::draft;
    use crate::models::{InterviewKind, InterviewStatus, OfferStatus};
    use crate::pipeline::fixtures::hiring_pipeline;

    fn seeded(stage: &str) -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let pipeline = db.create_pipeline(&hiring_pipeline()).unwrap();
        let job = db.create_job("QA Lead", &pipeline.id).unwrap();
        let app = db.create_application(&job.id, "cand-5", Some(stage)).unwrap();
        (db, app.id)
    }

    fn proposal(db: &Database, app_id: &str) -> String {
        let input = OfferInput {
            salary: 99_000.0,
            currency: "GBP".into(),
            start_date: None,
            notes: None,
        };
        db.create_candidate_offer(app_id, &input).unwrap().id
    }

    #[test]
    fn test_load_missing_application_is_not_found_state() {
        let db = Database::open_in_memory().unwrap();
        let mut screen = ApplicationScreen::new(&db, "77");
        screen.load();
        assert!(matches!(screen.state, LoadState::NotFound(_)));
        assert!(screen.available_transitions().is_empty());
    }

    #[test]
    fn test_blocked_transition_becomes_warning_toast() {
        let (db, app_id) = seeded("offer");
        proposal(&db, &app_id);
        let mut screen = ApplicationScreen::new(&db, &app_id);
        screen.load();
        assert_eq!(screen.state, LoadState::Ready);
        assert_eq!(screen.current_stage().map(|s| s.key.as_str()), Some("offer"));

        // offer -> hired is declared first
        screen.open_transition_dialog();
        assert_eq!(
            screen.dialog,
            Some(Dialog::ConfirmTransition {
                to_stage_key: "hired".into()
            })
        );
        screen.confirm();

        assert!(screen.dialog.is_none());
        let toast = screen.last_toast().unwrap();
        assert_eq!(toast.severity, Severity::Warning);
        assert_eq!(toast.message, gate::ACCEPTED_OFFER_REQUIRED);
        assert_eq!(screen.application.as_ref().unwrap().current_stage_key, "offer");
    }

    #[test]
    fn test_accept_offer_then_hire() {
        let (db, app_id) = seeded("offer");
        proposal(&db, &app_id);
        let mut screen = ApplicationScreen::new(&db, &app_id);
        screen.load();

        screen.open_offer_dialog(true);
        screen.confirm();
        assert_eq!(screen.last_toast().unwrap().message, "Offer accepted");
        assert_eq!(
            screen.application.as_ref().unwrap().offers[0].status,
            OfferStatus::Accepted
        );
        assert!(screen.respondable_offer().is_none());

        screen.open_transition_dialog();
        screen.confirm();
        assert_eq!(screen.last_toast().unwrap().severity, Severity::Success);
        assert_eq!(screen.last_toast().unwrap().message, "Moved to Hired stage");
        assert_eq!(screen.application.as_ref().unwrap().current_stage_key, "hired");
        assert!(screen.available_transitions().is_empty());
    }

    #[test]
    fn test_selection_moves_within_transitions() {
        let (db, app_id) = seeded("offer");
        let mut screen = ApplicationScreen::new(&db, &app_id);
        screen.load();
        screen.select_next();
        screen.select_next();
        assert_eq!(screen.selected_transition, 1);
        screen.open_transition_dialog();
        screen.confirm();
        assert_eq!(screen.application.as_ref().unwrap().current_stage_key, "rejected");
        assert_eq!(screen.selected_transition, 0);
    }

    #[test]
    fn test_offer_dialog_without_candidate_offer_warns() {
        let (db, app_id) = seeded("offer");
        let mut screen = ApplicationScreen::new(&db, &app_id);
        screen.load();
        screen.open_offer_dialog(false);
        assert!(screen.dialog.is_none());
        assert_eq!(screen.last_toast().unwrap().severity, Severity::Warning);
    }

    #[test]
    fn test_cancel_interview_dialog() {
        let (db, app_id) = seeded("interview");
        let app = db.get_application_by_id(&app_id).unwrap();
        let pipeline = db.get_pipeline_by_job_id(&app.job_id).unwrap();
        let stage = pipeline.stage("interview").unwrap();
        InterviewManager::new(&db)
            .schedule(stage, &app, draft(InterviewKind::Video))
            .unwrap();

        let mut screen = ApplicationScreen::new(&db, &app_id);
        screen.load();
        screen.open_cancel_interview_dialog();
        screen.confirm();
        let interview = &screen.application.as_ref().unwrap().interviews[0];
        assert_eq!(interview.status, InterviewStatus::Cancelled);
        assert!(screen.next_active_interview().is_none());
    }

    #[test]
    fn test_stale_screen_conflict_refreshes() {
        let (db, app_id) = seeded("interview");
        let mut screen = ApplicationScreen::new(&db, &app_id);
        screen.load();

        // Someone else moves the application first.
        let app = db.get_application_by_id(&app_id).unwrap();
        let pipeline = db.get_pipeline_by_job_id(&app.job_id).unwrap();
        TransitionGate::new(&db)
            .execute(&pipeline, &app, &pipeline.transitions[0])
            .unwrap();

        screen.open_transition_dialog();
        screen.confirm();
        let toast = screen.last_toast().unwrap();
        assert_eq!(toast.severity, Severity::Warning);
        assert!(toast.message.contains("reload"));
        assert_eq!(screen.application.as_ref().unwrap().current_stage_key, "offer");
    }

    #[test]
    fn test_reload_refetches_pipeline() {
        let (db, app_id) = seeded("interview");
        let mut screen = ApplicationScreen::new(&db, &app_id);
        screen.load();
        let job_id = screen.application.as_ref().unwrap().job_id.clone();
        assert!(screen.lookup.is_cached(&job_id));

        screen.reload();
        assert_eq!(screen.state, LoadState::Ready);
        assert!(screen.lookup.is_cached(&job_id));
        assert_eq!(screen.current_stage().unwrap().key, "interview");
    }
}
