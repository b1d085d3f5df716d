use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageType {
    Sourcing,
    Screening,
    Interview,
    Offer,
    Hired,
    Rejected,
}

impl StageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageType::Sourcing => "sourcing",
            StageType::Screening => "screening",
            StageType::Interview => "interview",
            StageType::Offer => "offer",
            StageType::Hired => "hired",
            StageType::Rejected => "rejected",
        }
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub stage_type: StageType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTransition {
    pub from_stage_key: String,
    pub to_stage_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub stages: Vec<PipelineStage>, // display order
    pub transitions: Vec<PipelineTransition>,
}

impl Pipeline {
    pub fn stage(&self, key: &str) -> Option<&PipelineStage> {
        self.stages.iter().find(|s| s.key == key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub title: String,
    pub pipeline_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub job_id: String,
    pub candidate_id: String,
    pub current_stage_key: String,
    pub status: String, // coarse label, independent of the stage
    pub applied_date: NaiveDate,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub interviews: Vec<Interview>,
    #[serde(default)]
    pub offers: Vec<Offer>,
    #[serde(default)]
    pub status_history: Vec<StatusChangeEntry>,
}

impl Application {
    pub fn interview(&self, id: &str) -> Option<&Interview> {
        self.interviews.iter().find(|i| i.id == id)
    }

    #[cfg(test)]
    pub fn offer(&self, id: &str) -> Option<&Offer> {
        self.offers.iter().find(|o| o.id == id)
    }

    pub fn has_accepted_offer(&self) -> bool {
        self.offers.iter().any(|o| o.status == OfferStatus::Accepted)
    }
}

// --- Interviews ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterviewKind {
    Video,
    Phone,
    InPerson,
}

impl InterviewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewKind::Video => "video",
            InterviewKind::Phone => "phone",
            InterviewKind::InPerson => "in-person",
        }
    }
}

impl FromStr for InterviewKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(InterviewKind::Video),
            "phone" => Ok(InterviewKind::Phone),
            "in-person" | "in_person" | "inperson" => Ok(InterviewKind::InPerson),
            other => Err(format!("unknown interview type '{}' (video, phone, in-person)", other)),
        }
    }
}

impl fmt::Display for InterviewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an interview happens. A video call never has a location and an
/// on-site interview never has a meeting link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InterviewFormat {
    Video {
        #[serde(rename = "meetingLink", default)]
        meeting_link: Option<String>,
    },
    Phone,
    InPerson {
        #[serde(default)]
        location: Option<String>,
    },
}

impl InterviewFormat {
    /// Builds the format from loosely-filled form fields, dropping whichever
    /// field does not apply to `kind`.
    pub fn from_parts(
        kind: InterviewKind,
        location: Option<String>,
        meeting_link: Option<String>,
    ) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        match kind {
            InterviewKind::Video => InterviewFormat::Video {
                meeting_link: non_empty(meeting_link),
            },
            InterviewKind::Phone => InterviewFormat::Phone,
            InterviewKind::InPerson => InterviewFormat::InPerson {
                location: non_empty(location),
            },
        }
    }

    pub fn kind(&self) -> InterviewKind {
        match self {
            InterviewFormat::Video { .. } => InterviewKind::Video,
            InterviewFormat::Phone => InterviewKind::Phone,
            InterviewFormat::InPerson { .. } => InterviewKind::InPerson,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            InterviewFormat::InPerson { location } => location.as_deref(),
            _ => None,
        }
    }

    pub fn meeting_link(&self) -> Option<&str> {
        match self {
            InterviewFormat::Video { meeting_link } => meeting_link.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterviewStatus {
    Scheduled,
    Rescheduled,
    Completed,
    Cancelled,
}

impl InterviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewStatus::Scheduled => "scheduled",
            InterviewStatus::Rescheduled => "rescheduled",
            InterviewStatus::Completed => "completed",
            InterviewStatus::Cancelled => "cancelled",
        }
    }

    /// Scheduled and rescheduled interviews can still be changed.
    pub fn is_active(&self) -> bool {
        matches!(self, InterviewStatus::Scheduled | InterviewStatus::Rescheduled)
    }
}

impl FromStr for InterviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(InterviewStatus::Scheduled),
            "rescheduled" => Ok(InterviewStatus::Rescheduled),
            "completed" => Ok(InterviewStatus::Completed),
            "cancelled" => Ok(InterviewStatus::Cancelled),
            other => Err(format!("unknown interview status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recommendation {
    StrongHire,
    Hire,
    NoHire,
    StrongNoHire,
}

impl FromStr for Recommendation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strong-hire" => Ok(Recommendation::StrongHire),
            "hire" => Ok(Recommendation::Hire),
            "no-hire" => Ok(Recommendation::NoHire),
            "strong-no-hire" => Ok(Recommendation::StrongNoHire),
            other => Err(format!(
                "unknown recommendation '{}' (strong-hire, hire, no-hire, strong-no-hire)",
                other
            )),
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recommendation::StrongHire => "strong-hire",
            Recommendation::Hire => "hire",
            Recommendation::NoHire => "no-hire",
            Recommendation::StrongNoHire => "strong-no-hire",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewFeedback {
    pub rating: u8, // 1..=5
    pub recommendation: Recommendation,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub comments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interview {
    pub id: String,
    pub application_id: String,
    pub scheduled_date: DateTime<Utc>,
    pub interviewer_name: String,
    pub interviewer_email: Option<String>,
    #[serde(flatten)]
    pub format: InterviewFormat,
    pub duration: u32, // minutes
    pub status: InterviewStatus,
    pub feedback: Option<InterviewFeedback>,
    pub created_at: DateTime<Utc>,
}

// --- Offers ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
    Countered,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Cancelled => "cancelled",
            OfferStatus::Countered => "countered",
        }
    }
}

impl FromStr for OfferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OfferStatus::Pending),
            "accepted" => Ok(OfferStatus::Accepted),
            "rejected" => Ok(OfferStatus::Rejected),
            "cancelled" => Ok(OfferStatus::Cancelled),
            "countered" => Ok(OfferStatus::Countered),
            other => Err(format!("unknown offer status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: String,
    pub application_id: String,
    pub status: OfferStatus,
    pub is_offered_by_candidate: bool,
    pub salary: f64,
    pub currency: String,
    pub start_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeEntry {
    pub from_stage_key: Option<String>,
    pub to_stage_key: String,
    pub reason: String,
    #[serde(default)]
    pub notes: String,
    pub changed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interview_format_clears_non_applicable_field() {
        let video = InterviewFormat::from_parts(
            InterviewKind::Video,
            Some("Room 4".to_string()),
            Some("https://meet.example/abc".to_string()),
        );
        assert_eq!(video.location(), None);
        assert_eq!(video.meeting_link(), Some("https://meet.example/abc"));

        let onsite = InterviewFormat::from_parts(
            InterviewKind::InPerson,
            Some("Room 4".to_string()),
            Some("https://meet.example/abc".to_string()),
        );
        assert_eq!(onsite.meeting_link(), None);
        assert_eq!(onsite.location(), Some("Room 4"));

        let phone = InterviewFormat::from_parts(
            InterviewKind::Phone,
            Some("Room 4".to_string()),
            Some("https://meet.example/abc".to_string()),
        );
        assert_eq!(phone.location(), None);
        assert_eq!(phone.meeting_link(), None);
    }

    #[test]
    fn test_interview_format_blank_fields_become_none() {
        let video = InterviewFormat::from_parts(InterviewKind::Video, None, Some("  ".to_string()));
        assert_eq!(video, InterviewFormat::Video { meeting_link: None });
    }

    #[test]
    fn test_interview_json_is_flat() {
        let json = r#"{
            "id": "7",
            "applicationId": "3",
            "scheduledDate": "2026-03-01T15:00:00Z",
            "interviewerName": "Dana Reyes",
            "interviewerEmail": null,
            "type": "in-person",
            "location": "HQ, floor 2",
            "duration": 45,
            "status": "scheduled",
            "feedback": null,
            "createdAt": "2026-02-20T09:00:00Z"
        }"#;
        let interview: Interview = serde_json::from_str(json).unwrap();
        assert_eq!(interview.format.kind(), InterviewKind::InPerson);
        assert_eq!(interview.format.location(), Some("HQ, floor 2"));

        let value = serde_json::to_value(&interview).unwrap();
        assert_eq!(value["type"], "in-person");
        assert_eq!(value["location"], "HQ, floor 2");
        assert!(value.get("meetingLink").is_none());
    }

    #[test]
    fn test_stage_type_parses_lowercase() {
        let stage: PipelineStage =
            serde_json::from_str(r#"{"key":"offer","name":"Offer","type":"offer"}"#).unwrap();
        assert_eq!(stage.stage_type, StageType::Offer);
    }

    #[test]
    fn test_interview_kind_from_str() {
        assert_eq!("in-person".parse::<InterviewKind>().unwrap(), InterviewKind::InPerson);
        assert_eq!("video".parse::<InterviewKind>().unwrap(), InterviewKind::Video);
        assert!("carrier-pigeon".parse::<InterviewKind>().is_err());
    }
}
