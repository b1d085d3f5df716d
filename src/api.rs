use anyhow::{Context, Result as AnyResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{Backend, Config};
use crate::db::Database;
use crate::error::Result;
use crate::http::HttpApi;
use crate::models::{
    Application, Interview, InterviewFeedback, InterviewFormat, Offer, Pipeline,
};

// --- Collaborator trait ---

/// The recruiting backend. Every mutation is a point update; callers refetch
/// the application afterwards instead of patching their local copy.
pub trait RecruitingApi {
    fn get_pipeline_by_job_id(&self, job_id: &str) -> Result<Pipeline>;
    fn get_application_by_id(&self, application_id: &str) -> Result<Application>;
    fn update_application_stage_for_recruiter(
        &self,
        application_id: &str,
        update: &StageUpdate,
    ) -> Result<()>;

    fn create_interview(&self, application_id: &str, input: &InterviewInput) -> Result<Interview>;
    fn update_interview(&self, interview_id: &str, input: &InterviewInput) -> Result<Interview>;
    fn delete_interview(&self, interview_id: &str) -> Result<()>;
    fn add_interview_feedback(
        &self,
        interview_id: &str,
        feedback: &InterviewFeedback,
    ) -> Result<Interview>;
    fn reschedule_interview(&self, interview_id: &str, input: &RescheduleInput) -> Result<Interview>;
    fn cancel_interview(&self, interview_id: &str) -> Result<Interview>;

    fn create_offer(&self, application_id: &str, input: &OfferInput) -> Result<Offer>;
    fn update_offer(&self, offer_id: &str, input: &OfferInput) -> Result<Offer>;
    fn accept_offer(&self, offer_id: &str) -> Result<Offer>;
    fn reject_offer(&self, offer_id: &str) -> Result<Offer>;
    fn cancel_offer(&self, offer_id: &str) -> Result<Offer>;
    fn counter_offer(&self, offer_id: &str, input: &OfferInput) -> Result<Offer>;
}

// --- Mutation payloads ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageUpdate {
    pub stage_key: String,
    pub reason: String,
    pub notes: String,
    /// Version of the application the caller read.
    #[serde(rename = "version")]
    pub expected_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewInput {
    pub scheduled_date: DateTime<Utc>,
    pub interviewer_name: String,
    pub interviewer_email: Option<String>,
    #[serde(flatten)]
    pub format: InterviewFormat,
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleInput {
    pub scheduled_date: DateTime<Utc>,
    pub duration: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferInput {
    pub salary: f64,
    pub currency: String,
    pub start_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

pub fn create_api(config: &Config) -> AnyResult<Box<dyn RecruitingApi>> {
    match &config.backend {
        Backend::Remote {
            base_url,
            token,
            timeout,
        } => {
            let api = HttpApi::new(base_url, token.clone(), *timeout)?;
            Ok(Box::new(api))
        }
        Backend::Local { db_path } => {
            let db = Database::open(db_path)
                .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
            db.ensure_initialized()?;
            Ok(Box::new(db))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_update_wire_names() {
        let update = StageUpdate {
            stage_key: "hired".into(),
            reason: "Moved to Hired stage".into(),
            notes: String::new(),
            expected_version: 4,
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["stageKey"], "hired");
        assert_eq!(value["reason"], "Moved to Hired stage");
        assert_eq!(value["notes"], "");
        assert_eq!(value["version"], 4);
    }

    #[test]
    fn test_interview_input_flattens_format() {
        let input = InterviewInput {
            scheduled_date: "2026-05-01T10:00:00Z".parse().unwrap(),
            interviewer_name: "Sam Ortiz".into(),
            interviewer_email: None,
            format: InterviewFormat::Video {
                meeting_link: Some("https://meet.example/x".into()),
            },
            duration: 30,
        };
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["type"], "video");
        assert_eq!(value["meetingLink"], "https://meet.example/x");
        assert!(value.get("location").is_none());
    }
}
