use anyhow::{anyhow, Context, Result as AnyResult};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row, Transaction};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::api::{InterviewInput, OfferInput, RecruitingApi, RescheduleInput, StageUpdate};
use crate::error::{PipelineError, Result};
use crate::gate;
use crate::interviews;
use crate::models::{
    Application, Interview, InterviewFeedback, InterviewFormat, InterviewKind, InterviewStatus,
    Job, Offer, OfferStatus, Pipeline, PipelineStage, PipelineTransition, StageType,
    StatusChangeEntry,
};
use crate::offers;
use crate::pipeline;

/// Pipeline definition as imported from a JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDefinition {
    pub organization_id: String,
    pub name: String,
    pub stages: Vec<PipelineStage>,
    pub transitions: Vec<PipelineTransition>,
}

impl From<PipelineDefinition> for Pipeline {
    fn from(def: PipelineDefinition) -> Self {
        Pipeline {
            id: String::new(),
            organization_id: def.organization_id,
            name: def.name,
            stages: def.stages,
            transitions: def.transitions,
        }
    }
}

/// Local SQLite backend. Applies the same rules a recruiting server does,
/// so the CLI works offline and tests run against real persistence.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> AnyResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> AnyResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn init(&self) -> AnyResult<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pipelines (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                organization_id TEXT NOT NULL,
                name TEXT NOT NULL,
                stages TEXT NOT NULL,
                transitions TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                pipeline_id INTEGER NOT NULL REFERENCES pipelines(id)
            );

            CREATE TABLE IF NOT EXISTS applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id INTEGER NOT NULL REFERENCES jobs(id),
                candidate_id TEXT NOT NULL,
                current_stage_key TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                applied_date TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS interviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id INTEGER NOT NULL REFERENCES applications(id),
                scheduled_date TEXT NOT NULL,
                interviewer_name TEXT NOT NULL,
                interviewer_email TEXT,
                kind TEXT NOT NULL CHECK (kind IN ('video', 'phone', 'in-person')),
                location TEXT,
                meeting_link TEXT,
                duration INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'scheduled'
                    CHECK (status IN ('scheduled', 'rescheduled', 'completed', 'cancelled')),
                feedback TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS offers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id INTEGER NOT NULL REFERENCES applications(id),
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'accepted', 'rejected', 'cancelled', 'countered')),
                is_offered_by_candidate INTEGER NOT NULL DEFAULT 0,
                salary REAL NOT NULL,
                currency TEXT NOT NULL,
                start_date TEXT,
                notes TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS status_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id INTEGER NOT NULL REFERENCES applications(id),
                from_stage_key TEXT,
                to_stage_key TEXT NOT NULL,
                reason TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                changed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_pipeline ON jobs(pipeline_id);
            CREATE INDEX IF NOT EXISTS idx_applications_job ON applications(job_id);
            CREATE INDEX IF NOT EXISTS idx_interviews_application ON interviews(application_id);
            CREATE INDEX IF NOT EXISTS idx_offers_application ON offers(application_id);
            CREATE INDEX IF NOT EXISTS idx_history_application ON status_history(application_id);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> AnyResult<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='applications'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!("Database not initialized. Run 'hire init' first."));
        }
        Ok(())
    }

    // --- Pipeline and job setup ---

    pub fn import_pipeline(&self, file: &Path) -> AnyResult<Pipeline> {
        let raw = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read pipeline file: {}", file.display()))?;
        let def: PipelineDefinition = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse pipeline file: {}", file.display()))?;
        Ok(self.create_pipeline(&def.into())?)
    }

    pub fn create_pipeline(&self, pipeline: &Pipeline) -> Result<Pipeline> {
        pipeline::validate(pipeline)?;
        self.conn.execute(
            "INSERT INTO pipelines (organization_id, name, stages, transitions) VALUES (?1, ?2, ?3, ?4)",
            params![
                pipeline.organization_id,
                pipeline.name,
                serde_json::to_string(&pipeline.stages)?,
                serde_json::to_string(&pipeline.transitions)?,
            ],
        )?;
        let mut created = pipeline.clone();
        created.id = self.conn.last_insert_rowid().to_string();
        Ok(created)
    }

    pub fn list_pipelines(&self) -> Result<Vec<Pipeline>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, organization_id, name, stages, transitions FROM pipelines ORDER BY id",
        )?;
        let rows = stmt.query_map([], Self::row_to_pipeline)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn get_pipeline(&self, id: i64) -> Result<Option<Pipeline>> {
        let result = self.conn.query_row(
            "SELECT id, organization_id, name, stages, transitions FROM pipelines WHERE id = ?1",
            [id],
            Self::row_to_pipeline,
        );
        match result {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn create_job(&self, title: &str, pipeline_id: &str) -> Result<Job> {
        let pid = parse_id("pipeline", pipeline_id)?;
        if self.get_pipeline(pid)?.is_none() {
            return Err(PipelineError::not_found("pipeline", pipeline_id));
        }
        self.conn.execute(
            "INSERT INTO jobs (title, pipeline_id) VALUES (?1, ?2)",
            params![title, pid],
        )?;
        Ok(Job {
            id: self.conn.last_insert_rowid().to_string(),
            title: title.to_string(),
            pipeline_id: pipeline_id.to_string(),
        })
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        let mut stmt = self.conn.prepare("SELECT id, title, pipeline_id FROM jobs ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Job {
                id: row.get::<_, i64>(0)?.to_string(),
                title: row.get(1)?,
                pipeline_id: row.get::<_, i64>(2)?.to_string(),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Creates an application at `stage_key`, or at the pipeline's first
    /// stage when none is given.
    pub fn create_application(
        &self,
        job_id: &str,
        candidate_id: &str,
        stage_key: Option<&str>,
    ) -> Result<Application> {
        let pipeline = self.get_pipeline_by_job_id(job_id)?;
        let stage = match stage_key {
            Some(key) => pipeline
                .stage(key)
                .ok_or_else(|| PipelineError::not_found("stage", key))?,
            None => pipeline
                .stages
                .first()
                .ok_or_else(|| PipelineError::InvalidPipeline("pipeline has no stages".into()))?,
        };

        let now = Utc::now();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO applications (job_id, candidate_id, current_stage_key, status, applied_date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                parse_id("job", job_id)?,
                candidate_id,
                stage.key,
                status_label(stage.stage_type),
                now.date_naive(),
            ],
        )?;
        let app_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO status_history (application_id, from_stage_key, to_stage_key, reason, changed_at)
             VALUES (?1, NULL, ?2, ?3, ?4)",
            params![app_id, stage.key, "Application received", now],
        )?;
        tx.commit()?;

        self.get_application_by_id(&app_id.to_string())
    }

    pub fn list_applications(&self, job_id: Option<&str>) -> Result<Vec<Application>> {
        let ids: Vec<i64> = match job_id {
            Some(job) => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT id FROM applications WHERE job_id = ?1 ORDER BY id")?;
                let rows = stmt.query_map([parse_id("job", job)?], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = self.conn.prepare("SELECT id FROM applications ORDER BY id")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };

        ids.into_iter()
            .map(|id| self.get_application_by_id(&id.to_string()))
            .collect()
    }

    /// Records an offer proposed by the candidate, as the candidate portal would.
    pub fn create_candidate_offer(&self, application_id: &str, input: &OfferInput) -> Result<Offer> {
        self.insert_offer(application_id, input, true)
    }

    // --- Row mapping ---

    fn row_to_pipeline(row: &Row) -> rusqlite::Result<Pipeline> {
        let stages: String = row.get(3)?;
        let transitions: String = row.get(4)?;
        Ok(Pipeline {
            id: row.get::<_, i64>(0)?.to_string(),
            organization_id: row.get(1)?,
            name: row.get(2)?,
            stages: from_json(3, &stages)?,
            transitions: from_json(4, &transitions)?,
        })
    }

    fn row_to_interview(row: &Row) -> rusqlite::Result<Interview> {
        let kind: InterviewKind = parse_column(row, 5)?;
        let feedback: Option<String> = row.get(10)?;
        Ok(Interview {
            id: row.get::<_, i64>(0)?.to_string(),
            application_id: row.get::<_, i64>(1)?.to_string(),
            scheduled_date: row.get(2)?,
            interviewer_name: row.get(3)?,
            interviewer_email: row.get(4)?,
            format: InterviewFormat::from_parts(kind, row.get(6)?, row.get(7)?),
            duration: row.get(8)?,
            status: parse_column(row, 9)?,
            feedback: feedback.map(|f| from_json(10, &f)).transpose()?,
            created_at: row.get(11)?,
        })
    }

    fn row_to_offer(row: &Row) -> rusqlite::Result<Offer> {
        Ok(Offer {
            id: row.get::<_, i64>(0)?.to_string(),
            application_id: row.get::<_, i64>(1)?.to_string(),
            status: parse_column(row, 2)?,
            is_offered_by_candidate: row.get(3)?,
            salary: row.get(4)?,
            currency: row.get(5)?,
            start_date: row.get(6)?,
            notes: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    // --- Loaders ---

    fn get_interview(&self, id: i64) -> Result<Option<Interview>> {
        let result = self.conn.query_row(
            "SELECT id, application_id, scheduled_date, interviewer_name, interviewer_email, kind,
                    location, meeting_link, duration, status, feedback, created_at
             FROM interviews WHERE id = ?1",
            [id],
            Self::row_to_interview,
        );
        match result {
            Ok(i) => Ok(Some(i)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn require_interview(&self, interview_id: &str) -> Result<(i64, Interview)> {
        let id = parse_id("interview", interview_id)?;
        let interview = self
            .get_interview(id)?
            .ok_or_else(|| PipelineError::not_found("interview", interview_id))?;
        Ok((id, interview))
    }

    fn interviews_for(&self, application_id: i64) -> Result<Vec<Interview>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, application_id, scheduled_date, interviewer_name, interviewer_email, kind,
                    location, meeting_link, duration, status, feedback, created_at
             FROM interviews WHERE application_id = ?1 ORDER BY scheduled_date, id",
        )?;
        let rows = stmt.query_map([application_id], Self::row_to_interview)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn get_offer(&self, id: i64) -> Result<Option<Offer>> {
        let result = self.conn.query_row(
            "SELECT id, application_id, status, is_offered_by_candidate, salary, currency,
                    start_date, notes, created_at
             FROM offers WHERE id = ?1",
            [id],
            Self::row_to_offer,
        );
        match result {
            Ok(o) => Ok(Some(o)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn require_offer(&self, offer_id: &str) -> Result<(i64, Offer)> {
        let id = parse_id("offer", offer_id)?;
        let offer = self
            .get_offer(id)?
            .ok_or_else(|| PipelineError::not_found("offer", offer_id))?;
        Ok((id, offer))
    }

    // Newest first
    fn offers_for(&self, application_id: i64) -> Result<Vec<Offer>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, application_id, status, is_offered_by_candidate, salary, currency,
                    start_date, notes, created_at
             FROM offers WHERE application_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([application_id], Self::row_to_offer)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn history_for(&self, application_id: i64) -> Result<Vec<StatusChangeEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT from_stage_key, to_stage_key, reason, notes, changed_at
             FROM status_history WHERE application_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([application_id], |row| {
            Ok(StatusChangeEntry {
                from_stage_key: row.get(0)?,
                to_stage_key: row.get(1)?,
                reason: row.get(2)?,
                notes: row.get(3)?,
                changed_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// The stage the application currently sits in, resolved against its job's pipeline.
    fn stage_of(&self, application_id: &str) -> Result<PipelineStage> {
        let app = self.get_application_by_id(application_id)?;
        let pipeline = self.get_pipeline_by_job_id(&app.job_id)?;
        pipeline::current_stage(&pipeline, &app).cloned()
    }

    // --- Writers ---

    fn bump_version(tx: &Transaction, application_id: i64) -> Result<()> {
        tx.execute(
            "UPDATE applications SET version = version + 1 WHERE id = ?1",
            [application_id],
        )?;
        Ok(())
    }

    fn insert_offer_row(tx: &Transaction, app_id: i64, input: &OfferInput, by_candidate: bool) -> Result<i64> {
        tx.execute(
            "INSERT INTO offers (application_id, status, is_offered_by_candidate, salary, currency,
                                 start_date, notes, created_at)
             VALUES (?1, 'pending', ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                app_id,
                by_candidate,
                input.salary,
                input.currency,
                input.start_date,
                input.notes,
                Utc::now(),
            ],
        )?;
        Ok(tx.last_insert_rowid())
    }

    fn insert_offer(&self, application_id: &str, input: &OfferInput, by_candidate: bool) -> Result<Offer> {
        let app_id = parse_id("application", application_id)?;
        self.get_application_by_id(application_id)?;

        let tx = self.conn.unchecked_transaction()?;
        let offer_id = Self::insert_offer_row(&tx, app_id, input, by_candidate)?;
        Self::bump_version(&tx, app_id)?;
        tx.commit()?;

        self.get_offer(offer_id)?
            .ok_or_else(|| PipelineError::not_found("offer", offer_id.to_string()))
    }

    fn set_offer_status(&self, offer_id: i64, application_id: &str, status: OfferStatus) -> Result<Offer> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE offers SET status = ?1 WHERE id = ?2",
            params![status.as_str(), offer_id],
        )?;
        Self::bump_version(&tx, parse_id("application", application_id)?)?;
        tx.commit()?;
        self.get_offer(offer_id)?
            .ok_or_else(|| PipelineError::not_found("offer", offer_id.to_string()))
    }

    fn stale(application_id: &str, expected: u64, actual: u64) -> PipelineError {
        tracing::warn!(application_id, expected, actual, "stage update rejected: stale version");
        PipelineError::Conflict {
            application_id: application_id.to_string(),
            expected,
            actual: Some(actual),
        }
    }

    fn respondable_offer(&self, offer_id: &str, action: &str) -> Result<(i64, Offer)> {
        let (id, offer) = self.require_offer(offer_id)?;
        let siblings = self.offers_for(parse_id("application", &offer.application_id)?)?;
        offers::ensure_can_respond(&siblings, offer_id, action)?;
        Ok((id, offer))
    }

    fn write_interview(&self, interview_id: i64, application_id: &str, apply: impl FnOnce(&Transaction) -> Result<()>) -> Result<Interview> {
        let tx = self.conn.unchecked_transaction()?;
        apply(&tx)?;
        Self::bump_version(&tx, parse_id("application", application_id)?)?;
        tx.commit()?;
        self.get_interview(interview_id)?
            .ok_or_else(|| PipelineError::not_found("interview", interview_id.to_string()))
    }
}

impl RecruitingApi for Database {
    fn get_pipeline_by_job_id(&self, job_id: &str) -> Result<Pipeline> {
        let jid = parse_id("job", job_id)?;
        let pipeline_id: i64 = match self.conn.query_row(
            "SELECT pipeline_id FROM jobs WHERE id = ?1",
            [jid],
            |row| row.get(0),
        ) {
            Ok(id) => id,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(PipelineError::not_found("job", job_id))
            }
            Err(e) => return Err(e.into()),
        };
        self.get_pipeline(pipeline_id)?
            .ok_or_else(|| PipelineError::not_found("pipeline for job", job_id))
    }

    fn get_application_by_id(&self, application_id: &str) -> Result<Application> {
        let id = parse_id("application", application_id)?;
        let result = self.conn.query_row(
            "SELECT id, job_id, candidate_id, current_stage_key, status, applied_date, version
             FROM applications WHERE id = ?1",
            [id],
            |row| {
                Ok(Application {
                    id: row.get::<_, i64>(0)?.to_string(),
                    job_id: row.get::<_, i64>(1)?.to_string(),
                    candidate_id: row.get(2)?,
                    current_stage_key: row.get(3)?,
                    status: row.get(4)?,
                    applied_date: row.get(5)?,
                    version: row.get::<_, i64>(6)? as u64,
                    interviews: Vec::new(),
                    offers: Vec::new(),
                    status_history: Vec::new(),
                })
            },
        );
        let mut app = match result {
            Ok(app) => app,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(PipelineError::not_found("application", application_id))
            }
            Err(e) => return Err(e.into()),
        };

        app.interviews = self.interviews_for(id)?;
        app.offers = self.offers_for(id)?;
        app.status_history = self.history_for(id)?;
        Ok(app)
    }

    fn update_application_stage_for_recruiter(
        &self,
        application_id: &str,
        update: &StageUpdate,
    ) -> Result<()> {
        let app = self.get_application_by_id(application_id)?;
        if app.version != update.expected_version {
            return Err(Self::stale(application_id, update.expected_version, app.version));
        }
        let pipeline = self.get_pipeline_by_job_id(&app.job_id)?;
        let transition = pipeline
            .transitions
            .iter()
            .find(|t| t.from_stage_key == app.current_stage_key && t.to_stage_key == update.stage_key)
            .ok_or_else(|| PipelineError::InvalidTransition {
                to_stage_key: update.stage_key.clone(),
            })?;
        let to_stage = gate::check(&pipeline, &app, transition)?;

        let tx = self.conn.unchecked_transaction()?;
        // Compare-and-swap on the version the caller read
        let changed = tx.execute(
            "UPDATE applications SET current_stage_key = ?1, status = ?2, version = version + 1
             WHERE id = ?3 AND version = ?4",
            params![
                to_stage.key,
                status_label(to_stage.stage_type),
                parse_id("application", application_id)?,
                update.expected_version as i64,
            ],
        )?;
        if changed == 0 {
            let actual: i64 = tx.query_row(
                "SELECT version FROM applications WHERE id = ?1",
                [parse_id("application", application_id)?],
                |row| row.get(0),
            )?;
            return Err(Self::stale(application_id, update.expected_version, actual as u64));
        }
        tx.execute(
            "INSERT INTO status_history (application_id, from_stage_key, to_stage_key, reason, notes, changed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                parse_id("application", application_id)?,
                app.current_stage_key,
                to_stage.key,
                update.reason,
                update.notes,
                Utc::now(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn create_interview(&self, application_id: &str, input: &InterviewInput) -> Result<Interview> {
        let app_id = parse_id("application", application_id)?;
        interviews::ensure_can_schedule(&self.stage_of(application_id)?)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO interviews (application_id, scheduled_date, interviewer_name, interviewer_email,
                                     kind, location, meeting_link, duration, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'scheduled', ?9)",
            params![
                app_id,
                input.scheduled_date,
                input.interviewer_name,
                input.interviewer_email,
                input.format.kind().as_str(),
                input.format.location(),
                input.format.meeting_link(),
                input.duration,
                Utc::now(),
            ],
        )?;
        let interview_id = tx.last_insert_rowid();
        Self::bump_version(&tx, app_id)?;
        tx.commit()?;

        self.get_interview(interview_id)?
            .ok_or_else(|| PipelineError::not_found("interview", interview_id.to_string()))
    }

    fn update_interview(&self, interview_id: &str, input: &InterviewInput) -> Result<Interview> {
        let (id, interview) = self.require_interview(interview_id)?;
        interviews::ensure_can_modify(&interview, "edit")?;
        self.write_interview(id, &interview.application_id, |tx| {
            // Both columns are rewritten so a type change clears the stale one
            tx.execute(
                "UPDATE interviews SET scheduled_date = ?1, interviewer_name = ?2, interviewer_email = ?3,
                        kind = ?4, location = ?5, meeting_link = ?6, duration = ?7
                 WHERE id = ?8",
                params![
                    input.scheduled_date,
                    input.interviewer_name,
                    input.interviewer_email,
                    input.format.kind().as_str(),
                    input.format.location(),
                    input.format.meeting_link(),
                    input.duration,
                    id,
                ],
            )?;
            Ok(())
        })
    }

    fn delete_interview(&self, interview_id: &str) -> Result<()> {
        let (id, interview) = self.require_interview(interview_id)?;
        interviews::ensure_can_modify(&interview, "delete")?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM interviews WHERE id = ?1", [id])?;
        Self::bump_version(&tx, parse_id("application", &interview.application_id)?)?;
        tx.commit()?;
        Ok(())
    }

    fn add_interview_feedback(
        &self,
        interview_id: &str,
        feedback: &InterviewFeedback,
    ) -> Result<Interview> {
        let (id, interview) = self.require_interview(interview_id)?;
        interviews::ensure_can_modify(&interview, "add feedback to")?;
        interviews::validate_feedback(feedback)?;
        let json = serde_json::to_string(feedback)?;
        self.write_interview(id, &interview.application_id, |tx| {
            tx.execute(
                "UPDATE interviews SET feedback = ?1, status = ?2 WHERE id = ?3",
                params![json, InterviewStatus::Completed.as_str(), id],
            )?;
            Ok(())
        })
    }

    fn reschedule_interview(&self, interview_id: &str, input: &RescheduleInput) -> Result<Interview> {
        let (id, interview) = self.require_interview(interview_id)?;
        interviews::ensure_can_modify(&interview, "reschedule")?;
        let duration = input.duration.unwrap_or(interview.duration);
        self.write_interview(id, &interview.application_id, |tx| {
            tx.execute(
                "UPDATE interviews SET scheduled_date = ?1, duration = ?2, status = ?3 WHERE id = ?4",
                params![
                    input.scheduled_date,
                    duration,
                    InterviewStatus::Rescheduled.as_str(),
                    id
                ],
            )?;
            Ok(())
        })
    }

    fn cancel_interview(&self, interview_id: &str) -> Result<Interview> {
        let (id, interview) = self.require_interview(interview_id)?;
        interviews::ensure_can_modify(&interview, "cancel")?;
        self.write_interview(id, &interview.application_id, |tx| {
            tx.execute(
                "UPDATE interviews SET status = ?1 WHERE id = ?2",
                params![InterviewStatus::Cancelled.as_str(), id],
            )?;
            Ok(())
        })
    }

    fn create_offer(&self, application_id: &str, input: &OfferInput) -> Result<Offer> {
        self.insert_offer(application_id, input, false)
    }

    fn update_offer(&self, offer_id: &str, input: &OfferInput) -> Result<Offer> {
        let (id, offer) = self.require_offer(offer_id)?;
        offers::ensure_can_edit(&offer, "edit")?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE offers SET salary = ?1, currency = ?2, start_date = ?3, notes = ?4 WHERE id = ?5",
            params![input.salary, input.currency, input.start_date, input.notes, id],
        )?;
        Self::bump_version(&tx, parse_id("application", &offer.application_id)?)?;
        tx.commit()?;
        self.get_offer(id)?
            .ok_or_else(|| PipelineError::not_found("offer", offer_id))
    }

    fn accept_offer(&self, offer_id: &str) -> Result<Offer> {
        let (id, offer) = self.respondable_offer(offer_id, "accept")?;
        self.set_offer_status(id, &offer.application_id, OfferStatus::Accepted)
    }

    fn reject_offer(&self, offer_id: &str) -> Result<Offer> {
        let (id, offer) = self.respondable_offer(offer_id, "reject")?;
        self.set_offer_status(id, &offer.application_id, OfferStatus::Rejected)
    }

    fn cancel_offer(&self, offer_id: &str) -> Result<Offer> {
        let (id, offer) = self.require_offer(offer_id)?;
        offers::ensure_can_edit(&offer, "cancel")?;
        self.set_offer_status(id, &offer.application_id, OfferStatus::Cancelled)
    }

    fn counter_offer(&self, offer_id: &str, input: &OfferInput) -> Result<Offer> {
        let (id, offer) = self.respondable_offer(offer_id, "counter")?;
        let app_id = parse_id("application", &offer.application_id)?;

        // The proposal is superseded only if the replacement lands too.
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE offers SET status = ?1 WHERE id = ?2",
            params![OfferStatus::Countered.as_str(), id],
        )?;
        let counter_id = Self::insert_offer_row(&tx, app_id, input, false)?;
        Self::bump_version(&tx, app_id)?;
        tx.commit()?;

        self.get_offer(counter_id)?
            .ok_or_else(|| PipelineError::not_found("offer", counter_id.to_string()))
    }
}

// --- Helpers ---

/// Ids are integers locally; anything else cannot exist.
fn parse_id(entity: &'static str, id: &str) -> Result<i64> {
    id.trim()
        .parse::<i64>()
        .map_err(|_| PipelineError::not_found(entity, id))
}

/// Coarse application status derived from the stage type.
fn status_label(stage_type: StageType) -> &'static str {
    match stage_type {
        StageType::Hired => "hired",
        StageType::Rejected => "rejected",
        _ => "active",
    }
}

fn conversion_error(idx: usize, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn from_json<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| conversion_error(idx, e))
}

fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::hiring_pipeline;

    fn setup(stage: &str) -> (Database, Application) {
        let db = Database::open_in_memory().unwrap();
        let pipeline = db.create_pipeline(&hiring_pipeline()).unwrap();
        let job = db.create_job("SRE", &pipeline.id).unwrap();
        let app = db.create_application(&job.id, "cand-1", Some(stage)).unwrap();
        (db, app)
    }

    fn stage_update(key: &str, version: u64) -> StageUpdate {
        StageUpdate {
            stage_key: key.to_string(),
            reason: format!("Moved to {} stage", key),
            notes: String::new(),
            expected_version: version,
        }
    }

    #[test]
    fn test_ensure_initialized_on_fresh_file() {
        let dir = std::env::temp_dir().join(format!("hire-test-{}", std::process::id()));
        let path = dir.join("fresh.db");
        let _ = std::fs::remove_file(&path);
        let db = Database::open(&path).unwrap();
        assert!(db.ensure_initialized().is_err());
        db.init().unwrap();
        assert!(db.ensure_initialized().is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_new_application_starts_at_first_stage_with_history() {
        let db = Database::open_in_memory().unwrap();
        let pipeline = db.create_pipeline(&hiring_pipeline()).unwrap();
        let job = db.create_job("SRE", &pipeline.id).unwrap();
        let app = db.create_application(&job.id, "cand-1", None).unwrap();

        assert_eq!(app.current_stage_key, "sourcing");
        assert_eq!(app.status, "active");
        assert_eq!(app.version, 0);
        assert_eq!(app.status_history.len(), 1);
        assert_eq!(app.status_history[0].from_stage_key, None);
        assert_eq!(db.list_applications(Some(&job.id)).unwrap().len(), 1);
    }

    #[test]
    fn test_create_application_unknown_stage() {
        let db = Database::open_in_memory().unwrap();
        let pipeline = db.create_pipeline(&hiring_pipeline()).unwrap();
        let job = db.create_job("SRE", &pipeline.id).unwrap();
        let err = db.create_application(&job.id, "cand-1", Some("limbo")).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { entity: "stage", .. }));
    }

    #[test]
    fn test_create_pipeline_rejects_invalid_definition() {
        let db = Database::open_in_memory().unwrap();
        let mut pipeline = hiring_pipeline();
        pipeline.transitions[0].to_stage_key = "nowhere".into();
        assert!(matches!(
            db.create_pipeline(&pipeline),
            Err(PipelineError::InvalidPipeline(_))
        ));
        assert!(db.list_pipelines().unwrap().is_empty());
    }

    #[test]
    fn test_pipeline_round_trips_through_storage() {
        let db = Database::open_in_memory().unwrap();
        let created = db.create_pipeline(&hiring_pipeline()).unwrap();
        let job = db.create_job("SRE", &created.id).unwrap();
        assert_eq!(db.get_pipeline_by_job_id(&job.id).unwrap(), created);
        assert_eq!(db.list_jobs().unwrap(), vec![job]);
    }

    #[test]
    fn test_missing_entities_are_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_application_by_id("1"), Err(PipelineError::NotFound { .. })));
        assert!(matches!(db.get_application_by_id("abc"), Err(PipelineError::NotFound { .. })));
        assert!(matches!(db.get_pipeline_by_job_id("5"), Err(PipelineError::NotFound { entity: "job", .. })));
        assert!(matches!(db.create_job("x", "9"), Err(PipelineError::NotFound { .. })));
    }

    #[test]
    fn test_stage_update_appends_history_and_bumps_version() {
        let (db, app) = setup("interview");
        db.update_application_stage_for_recruiter(&app.id, &stage_update("offer", app.version))
            .unwrap();

        let reloaded = db.get_application_by_id(&app.id).unwrap();
        assert_eq!(reloaded.current_stage_key, "offer");
        assert_eq!(reloaded.version, app.version + 1);
        let last = reloaded.status_history.last().unwrap();
        assert_eq!(last.from_stage_key.as_deref(), Some("interview"));
        assert_eq!(last.to_stage_key, "offer");
        assert_eq!(last.reason, "Moved to offer stage");
    }

    #[test]
    fn test_stage_update_with_stale_version_conflicts() {
        let (db, app) = setup("interview");
        db.update_application_stage_for_recruiter(&app.id, &stage_update("offer", app.version))
            .unwrap();

        let err = db
            .update_application_stage_for_recruiter(&app.id, &stage_update("rejected", app.version))
            .unwrap_err();
        match err {
            PipelineError::Conflict { expected, actual, .. } => {
                assert_eq!(expected, 0);
                assert_eq!(actual, Some(1));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        let reloaded = db.get_application_by_id(&app.id).unwrap();
        assert_eq!(reloaded.current_stage_key, "offer");
        assert_eq!(reloaded.status_history.len(), 2);
    }

    #[test]
    fn test_stage_update_unknown_stage_is_invalid_transition() {
        let (db, app) = setup("interview");
        let err = db
            .update_application_stage_for_recruiter(&app.id, &stage_update("archived", app.version))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
    }

    #[test]
    fn test_stage_update_enforces_offer_gate() {
        let (db, app) = setup("offer");
        let err = db
            .update_application_stage_for_recruiter(&app.id, &stage_update("hired", app.version))
            .unwrap_err();
        assert!(matches!(err, PipelineError::PreconditionFailed(ref m) if m == gate::ACCEPTED_OFFER_REQUIRED));

        let reloaded = db.get_application_by_id(&app.id).unwrap();
        assert_eq!(reloaded.current_stage_key, "offer");
        assert_eq!(reloaded.version, app.version);
        assert_eq!(reloaded.status_history.len(), 1);
    }

    #[test]
    fn test_stage_update_requires_declared_transition() {
        let (db, app) = setup("sourcing");
        let err = db
            .update_application_stage_for_recruiter(&app.id, &stage_update("hired", app.version))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { ref to_stage_key } if to_stage_key == "hired"));
        assert_eq!(db.get_application_by_id(&app.id).unwrap().current_stage_key, "sourcing");
    }

    #[test]
    fn test_counter_is_a_single_write() {
        let (db, app) = setup("offer");
        let input = OfferInput {
            salary: 120_000.0,
            currency: "USD".into(),
            start_date: None,
            notes: None,
        };
        let proposal = db.create_candidate_offer(&app.id, &input).unwrap();
        let before = db.get_application_by_id(&app.id).unwrap().version;

        let counter = db
            .counter_offer(&proposal.id, &OfferInput { salary: 130_000.0, ..input.clone() })
            .unwrap();
        let reloaded = db.get_application_by_id(&app.id).unwrap();
        assert_eq!(reloaded.version, before + 1);
        assert_eq!(reloaded.offers.len(), 2);
        assert_eq!(reloaded.offers[0].id, counter.id);
        assert_eq!(reloaded.offer(&proposal.id).unwrap().status, OfferStatus::Countered);
    }

    #[test]
    fn test_failed_counter_leaves_proposal_pending() {
        let (db, app) = setup("offer");
        let input = OfferInput {
            salary: 120_000.0,
            currency: "USD".into(),
            start_date: None,
            notes: None,
        };
        let proposal = db.create_candidate_offer(&app.id, &input).unwrap();
        let before = db.get_application_by_id(&app.id).unwrap().version;

        // Make the insert of the replacement offer fail mid-way.
        db.conn
            .execute_batch(
                "CREATE TRIGGER block_recruiter_offers BEFORE INSERT ON offers
                 WHEN NEW.is_offered_by_candidate = 0
                 BEGIN SELECT RAISE(ABORT, 'offers frozen'); END;",
            )
            .unwrap();
        assert!(matches!(
            db.counter_offer(&proposal.id, &input),
            Err(PipelineError::Storage(_))
        ));

        let reloaded = db.get_application_by_id(&app.id).unwrap();
        assert_eq!(reloaded.version, before);
        assert_eq!(reloaded.offers.len(), 1);
        assert_eq!(reloaded.offers[0].status, OfferStatus::Pending);
    }

    #[test]
    fn test_sub_mutations_bump_version() {
        let (db, app) = setup("offer");
        let input = OfferInput {
            salary: 90_000.0,
            currency: "EUR".into(),
            start_date: None,
            notes: None,
        };
        db.create_offer(&app.id, &input).unwrap();
        assert_eq!(db.get_application_by_id(&app.id).unwrap().version, app.version + 1);
    }

    #[test]
    fn test_hired_stage_sets_status_label() {
        let (db, app) = setup("offer");
        db.update_application_stage_for_recruiter(&app.id, &stage_update("rejected", app.version))
            .unwrap();
        assert_eq!(db.get_application_by_id(&app.id).unwrap().status, "rejected");
    }

    #[test]
    fn test_import_pipeline_from_json_file() {
        let dir = std::env::temp_dir().join(format!("hire-import-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("pipeline.json");
        std::fs::write(
            &file,
            r#"{
                "organizationId": "org-9",
                "name": "Sales",
                "stages": [
                    {"key": "screen", "name": "Phone Screen", "type": "screening"},
                    {"key": "rejected", "name": "Rejected", "type": "rejected"}
                ],
                "transitions": [{"fromStageKey": "screen", "toStageKey": "rejected"}]
            }"#,
        )
        .unwrap();

        let db = Database::open_in_memory().unwrap();
        let pipeline = db.import_pipeline(&file).unwrap();
        assert_eq!(pipeline.name, "Sales");
        assert_eq!(pipeline.stages[0].stage_type, StageType::Screening);
        assert_eq!(db.list_pipelines().unwrap().len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
