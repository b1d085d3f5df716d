use chrono::NaiveDate;

use crate::api::{OfferInput, RecruitingApi};
use crate::error::{PipelineError, Result};
use crate::models::{Application, Offer, OfferStatus};

/// Offers in reverse-chronological order. Offers created at the same instant
/// keep the order the backend returned them in.
pub fn newest_first(offers: &[Offer]) -> Vec<&Offer> {
    let mut sorted: Vec<&Offer> = offers.iter().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted
}

/// Only the recruiter's own pending offers can be edited.
pub fn can_edit(offer: &Offer) -> bool {
    offer.status == OfferStatus::Pending && !offer.is_offered_by_candidate
}

/// Accept/reject/counter apply to the most recent offer only (`idx == 0`
/// in newest-first order) and only when the candidate proposed it.
pub fn can_respond(offer: &Offer, idx: usize) -> bool {
    idx == 0 && offer.is_offered_by_candidate && offer.status == OfferStatus::Pending
}

pub fn can_cancel(offer: &Offer) -> bool {
    can_edit(offer)
}

/// Finds the offer and its position in newest-first order.
fn locate<'a>(offers: &'a [Offer], offer_id: &str) -> Result<(usize, &'a Offer)> {
    newest_first(offers)
        .into_iter()
        .enumerate()
        .find(|(_, o)| o.id == offer_id)
        .ok_or_else(|| PipelineError::not_found("offer", offer_id))
}

pub fn ensure_can_respond(offers: &[Offer], offer_id: &str, action: &str) -> Result<()> {
    let (idx, offer) = locate(offers, offer_id)?;
    if can_respond(offer, idx) {
        return Ok(());
    }
    let why = if idx != 0 {
        "only the most recent offer can be answered"
    } else if !offer.is_offered_by_candidate {
        "the offer was not proposed by the candidate"
    } else {
        "the offer is no longer pending"
    };
    Err(PipelineError::NotPermitted(format!(
        "cannot {} offer '{}': {}",
        action, offer_id, why
    )))
}

pub fn ensure_can_edit(offer: &Offer, action: &str) -> Result<()> {
    if can_edit(offer) {
        return Ok(());
    }
    let why = if offer.is_offered_by_candidate {
        "it was proposed by the candidate"
    } else {
        "it is no longer pending"
    };
    Err(PipelineError::NotPermitted(format!(
        "cannot {} offer '{}': {}",
        action, offer.id, why
    )))
}

#[derive(Debug, Clone)]
pub struct OfferDraft {
    pub salary: f64,
    pub currency: String,
    pub start_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl OfferDraft {
    pub fn into_input(self) -> Result<OfferInput> {
        if !self.salary.is_finite() || self.salary <= 0.0 {
            return Err(PipelineError::NotPermitted(format!(
                "salary must be a positive amount, got {}",
                self.salary
            )));
        }
        let currency = self.currency.trim().to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PipelineError::NotPermitted(format!(
                "currency must be a three-letter code, got '{}'",
                self.currency
            )));
        }
        Ok(OfferInput {
            salary: self.salary,
            currency,
            start_date: self.start_date,
            notes: self.notes.filter(|n| !n.trim().is_empty()),
        })
    }
}

/// Offer actions for one application. Accepting an offer leaves its
/// siblings untouched.
pub struct OfferManager<'a> {
    api: &'a dyn RecruitingApi,
}

impl<'a> OfferManager<'a> {
    pub fn new(api: &'a dyn RecruitingApi) -> Self {
        Self { api }
    }

    pub fn create(&self, application: &Application, draft: OfferDraft) -> Result<Offer> {
        let input = draft.into_input()?;
        let offer = self.api.create_offer(&application.id, &input)?;
        tracing::info!(application_id = %application.id, offer_id = %offer.id, "offer extended");
        Ok(offer)
    }

    pub fn edit(&self, application: &Application, offer_id: &str, draft: OfferDraft) -> Result<Offer> {
        let (_, offer) = locate(&application.offers, offer_id)?;
        ensure_can_edit(offer, "edit")?;
        self.api.update_offer(offer_id, &draft.into_input()?)
    }

    pub fn cancel(&self, application: &Application, offer_id: &str) -> Result<Offer> {
        let (_, offer) = locate(&application.offers, offer_id)?;
        ensure_can_edit(offer, "cancel")?;
        self.api.cancel_offer(offer_id)
    }

    pub fn accept(&self, application: &Application, offer_id: &str) -> Result<Offer> {
        ensure_can_respond(&application.offers, offer_id, "accept")?;
        let offer = self.api.accept_offer(offer_id)?;
        tracing::info!(application_id = %application.id, offer_id, "offer accepted");
        Ok(offer)
    }

    pub fn reject(&self, application: &Application, offer_id: &str) -> Result<Offer> {
        ensure_can_respond(&application.offers, offer_id, "reject")?;
        self.api.reject_offer(offer_id)
    }

    /// Answers a candidate proposal with new terms. Returns the new pending offer.
    pub fn counter(&self, application: &Application, offer_id: &str, draft: OfferDraft) -> Result<Offer> {
        ensure_can_respond(&application.offers, offer_id, "counter")?;
        self.api.counter_offer(offer_id, &draft.into_input()?)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::{DateTime, Utc};

    pub fn offer(id: &str, status: OfferStatus, by_candidate: bool, created_at: &str) -> Offer {
        let created_at: DateTime<Utc> = created_at.parse().unwrap();
        Offer {
            id: id.to_string(),
            application_id: "1".to_string(),
            status,
            is_offered_by_candidate: by_candidate,
            salary: 120_000.0,
            currency: "USD".to_string(),
            start_date: None,
            notes: None,
            created_at,
        }
    }

    pub fn draft(salary: f64) -> OfferDraft {
        OfferDraft {
            salary,
            currency: "usd".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 6, 1),
            notes: Some("Includes signing bonus".to_string()),
        }
    }
}
