use anyhow::{anyhow, Context, Result as AnyResult};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::api::{InterviewInput, OfferInput, RecruitingApi, RescheduleInput, StageUpdate};
use crate::error::{PipelineError, Result};
use crate::models::{Application, Interview, InterviewFeedback, Offer, Pipeline};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    message: Option<String>,
    current_version: Option<u64>,
}

/// Client for the remote recruiting REST service.
#[derive(Debug)]
pub struct HttpApi {
    base_url: Url,
    token: Option<String>,
    client: Client,
}

impl HttpApi {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> AnyResult<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid API base URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("API base URL cannot carry a path: {}", base_url));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url,
            token,
            client,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn transmit(&self, request: RequestBuilder) -> Result<Response> {
        self.authorized(request).send().map_err(|e| {
            tracing::warn!(error = %e, "request to recruiting API failed");
            PipelineError::Http(e)
        })
    }

    /// Sends the request and turns non-2xx statuses into typed errors.
    /// `subject` names the entity a 404 refers to.
    fn send(&self, request: RequestBuilder, subject: (&'static str, &str)) -> Result<Response> {
        let response = self.transmit(request)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        tracing::debug!(status = status.as_u16(), %body, "recruiting API returned an error");
        Err(error_for_status(status, body, subject))
    }

    fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        subject: (&'static str, &str),
    ) -> Result<T> {
        let response = self.send(request, subject)?;
        Ok(response.json()?)
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.trim().to_string())
}

fn error_for_status(status: StatusCode, body: String, subject: (&'static str, &str)) -> PipelineError {
    match status {
        StatusCode::NOT_FOUND => PipelineError::not_found(subject.0, subject.1),
        StatusCode::PRECONDITION_FAILED => PipelineError::PreconditionFailed(error_message(&body)),
        StatusCode::FORBIDDEN | StatusCode::UNPROCESSABLE_ENTITY => {
            PipelineError::NotPermitted(error_message(&body))
        }
        _ => PipelineError::Server {
            status: status.as_u16(),
            body,
        },
    }
}

/// A 409 on a stage update means the application moved on since `expected`.
fn stage_update_error(status: StatusCode, body: String, application_id: &str, expected: u64) -> PipelineError {
    if status != StatusCode::CONFLICT {
        return error_for_status(status, body, ("application", application_id));
    }
    let actual = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.current_version);
    PipelineError::Conflict {
        application_id: application_id.to_string(),
        expected,
        actual,
    }
}

impl RecruitingApi for HttpApi {
    fn get_pipeline_by_job_id(&self, job_id: &str) -> Result<Pipeline> {
        let url = self.url(&["jobs", job_id, "pipeline"]);
        self.fetch(self.client.get(url), ("pipeline for job", job_id))
    }

    fn get_application_by_id(&self, application_id: &str) -> Result<Application> {
        let url = self.url(&["applications", application_id]);
        self.fetch(self.client.get(url), ("application", application_id))
    }

    fn update_application_stage_for_recruiter(
        &self,
        application_id: &str,
        update: &StageUpdate,
    ) -> Result<()> {
        let url = self.url(&["recruiter", "applications", application_id, "stage"]);
        let response = self.transmit(self.client.put(url).json(update))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        tracing::debug!(status = status.as_u16(), %body, "stage update refused");
        Err(stage_update_error(status, body, application_id, update.expected_version))
    }

    fn create_interview(&self, application_id: &str, input: &InterviewInput) -> Result<Interview> {
        let url = self.url(&["applications", application_id, "interviews"]);
        self.fetch(self.client.post(url).json(input), ("application", application_id))
    }

    fn update_interview(&self, interview_id: &str, input: &InterviewInput) -> Result<Interview> {
        let url = self.url(&["interviews", interview_id]);
        self.fetch(self.client.put(url).json(input), ("interview", interview_id))
    }

    fn delete_interview(&self, interview_id: &str) -> Result<()> {
        let url = self.url(&["interviews", interview_id]);
        self.send(self.client.delete(url), ("interview", interview_id))?;
        Ok(())
    }

    fn add_interview_feedback(
        &self,
        interview_id: &str,
        feedback: &InterviewFeedback,
    ) -> Result<Interview> {
        let url = self.url(&["interviews", interview_id, "feedback"]);
        self.fetch(self.client.post(url).json(feedback), ("interview", interview_id))
    }

    fn reschedule_interview(&self, interview_id: &str, input: &RescheduleInput) -> Result<Interview> {
        let url = self.url(&["interviews", interview_id, "reschedule"]);
        self.fetch(self.client.post(url).json(input), ("interview", interview_id))
    }

    fn cancel_interview(&self, interview_id: &str) -> Result<Interview> {
        let url = self.url(&["interviews", interview_id, "cancel"]);
        self.fetch(self.client.post(url), ("interview", interview_id))
    }

    fn create_offer(&self, application_id: &str, input: &OfferInput) -> Result<Offer> {
        let url = self.url(&["applications", application_id, "offers"]);
        self.fetch(self.client.post(url).json(input), ("application", application_id))
    }

    fn update_offer(&self, offer_id: &str, input: &OfferInput) -> Result<Offer> {
        let url = self.url(&["offers", offer_id]);
        self.fetch(self.client.put(url).json(input), ("offer", offer_id))
    }

    fn accept_offer(&self, offer_id: &str) -> Result<Offer> {
        let url = self.url(&["offers", offer_id, "accept"]);
        self.fetch(self.client.post(url), ("offer", offer_id))
    }

    fn reject_offer(&self, offer_id: &str) -> Result<Offer> {
        let url = self.url(&["offers", offer_id, "reject"]);
        self.fetch(self.client.post(url), ("offer", offer_id))
    }

    fn cancel_offer(&self, offer_id: &str) -> Result<Offer> {
        let url = self.url(&["offers", offer_id, "cancel"]);
        self.fetch(self.client.post(url), ("offer", offer_id))
    }

    fn counter_offer(&self, offer_id: &str, input: &OfferInput) -> Result<Offer> {
        let url = self.url(&["offers", offer_id, "counter"]);
        self.fetch(self.client.post(url).json(input), ("offer", offer_id))
    }
}
