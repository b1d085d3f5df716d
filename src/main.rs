mod api;
mod config;
mod db;
mod error;
mod gate;
mod http;
mod interviews;
mod models;
mod offers;
mod pipeline;
mod screen;
mod tui;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use config::{Backend, Config};
use db::Database;
use gate::TransitionGate;
use interviews::{InterviewDraft, InterviewManager};
use models::{Application, InterviewFeedback, InterviewKind, Recommendation};
use offers::{OfferDraft, OfferManager};
use pipeline::PipelineLookup;

#[derive(Parser)]
#[command(name = "hire")]
#[command(about = "Recruiter pipeline - move applications through hiring stages")]
struct Cli {
    /// Base URL of the recruiting API (overrides HIRE_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Use a local database file instead of the API (overrides HIRE_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the local database
    Init,

    /// Manage pipeline definitions
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },

    /// Manage jobs (local database)
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Record a new application for a job (local database)
    Apply {
        /// Job ID
        job_id: String,

        /// Candidate identifier
        candidate: String,

        /// Starting stage key (defaults to the pipeline's first stage)
        #[arg(short, long)]
        stage: Option<String>,
    },

    /// Review and move applications
    App {
        #[command(subcommand)]
        command: AppCommands,
    },

    /// Manage interviews for an application
    Interview {
        #[command(subcommand)]
        command: InterviewCommands,
    },

    /// Manage offers for an application
    Offer {
        #[command(subcommand)]
        command: OfferCommands,
    },
}

#[derive(Subcommand)]
enum PipelineCommands {
    /// Import a pipeline definition from a JSON file
    Import {
        /// Path to the pipeline JSON file
        file: PathBuf,
    },

    /// List pipelines
    List,

    /// Show the pipeline governing a job
    Show {
        /// Job ID
        job_id: String,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// Add a job bound to a pipeline
    Add {
        /// Job title
        title: String,

        /// Pipeline ID
        #[arg(short, long)]
        pipeline: String,
    },

    /// List jobs
    List,
}

#[derive(Subcommand)]
enum AppCommands {
    /// List applications (local database)
    List {
        /// Filter by job
        #[arg(short, long)]
        job: Option<String>,
    },

    /// Show application details
    Show {
        /// Application ID
        id: String,
    },

    /// List the moves available from the current stage
    Transitions {
        /// Application ID
        id: String,
    },

    /// Move an application to another stage
    Move {
        /// Application ID
        id: String,

        /// Target stage key
        to: String,
    },

    /// Open the interactive application screen
    Review {
        /// Application ID
        id: String,
    },
}

#[derive(Args)]
struct InterviewFields {
    /// Start time (RFC 3339, e.g. 2026-05-01T15:00:00Z)
    #[arg(long)]
    at: DateTime<Utc>,

    /// Interviewer name
    #[arg(long)]
    interviewer: String,

    /// Interviewer email
    #[arg(long)]
    email: Option<String>,

    /// Interview type (video, phone, in-person)
    #[arg(short = 't', long = "type", default_value = "video")]
    kind: InterviewKind,

    /// Location, for in-person interviews
    #[arg(long)]
    location: Option<String>,

    /// Meeting link, for video interviews
    #[arg(long)]
    link: Option<String>,

    /// Duration in minutes
    #[arg(short, long, default_value = "60")]
    duration: u32,
}

impl InterviewFields {
    fn into_draft(self) -> InterviewDraft {
        InterviewDraft {
            scheduled_date: self.at,
            interviewer_name: self.interviewer,
            interviewer_email: self.email,
            kind: self.kind,
            location: self.location,
            meeting_link: self.link,
            duration: self.duration,
        }
    }
}

#[derive(Subcommand)]
enum InterviewCommands {
    /// Schedule an interview (application must be in an interview stage)
    Schedule {
        /// Application ID
        application: String,

        #[command(flatten)]
        fields: InterviewFields,
    },

    /// Edit a scheduled interview
    Edit {
        /// Application ID
        application: String,

        /// Interview ID
        interview: String,

        #[command(flatten)]
        fields: InterviewFields,
    },

    /// Move a scheduled interview to a new time
    Reschedule {
        /// Application ID
        application: String,

        /// Interview ID
        interview: String,

        /// New start time (RFC 3339)
        #[arg(long)]
        at: DateTime<Utc>,

        /// New duration in minutes
        #[arg(short, long)]
        duration: Option<u32>,
    },

    /// Record feedback (completes the interview)
    Feedback {
        /// Application ID
        application: String,

        /// Interview ID
        interview: String,

        /// Rating from 1 to 5
        #[arg(short, long)]
        rating: u8,

        /// strong-hire, hire, no-hire, strong-no-hire
        #[arg(long)]
        recommendation: Recommendation,

        /// Strength (repeatable)
        #[arg(long = "strength")]
        strengths: Vec<String>,

        /// Weakness (repeatable)
        #[arg(long = "weakness")]
        weaknesses: Vec<String>,

        /// Free-form comments
        #[arg(short, long, default_value = "")]
        comments: String,
    },

    /// Cancel a scheduled interview
    Cancel {
        /// Application ID
        application: String,

        /// Interview ID
        interview: String,
    },

    /// Delete a scheduled interview
    Delete {
        /// Application ID
        application: String,

        /// Interview ID
        interview: String,
    },
}

#[derive(Args)]
struct OfferFields {
    /// Annual salary
    #[arg(long)]
    salary: f64,

    /// ISO currency code
    #[arg(long, default_value = "USD")]
    currency: String,

    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Notes shown with the offer
    #[arg(short, long)]
    notes: Option<String>,
}

impl OfferFields {
    fn into_draft(self) -> OfferDraft {
        OfferDraft {
            salary: self.salary,
            currency: self.currency,
            start_date: self.start_date,
            notes: self.notes,
        }
    }
}

#[derive(Subcommand)]
enum OfferCommands {
    /// Extend an offer to the candidate
    Create {
        /// Application ID
        application: String,

        #[command(flatten)]
        fields: OfferFields,
    },

    /// Edit one of our pending offers
    Edit {
        /// Application ID
        application: String,

        /// Offer ID
        offer: String,

        #[command(flatten)]
        fields: OfferFields,
    },

    /// Accept the candidate's latest offer
    Accept {
        /// Application ID
        application: String,

        /// Offer ID
        offer: String,
    },

    /// Reject the candidate's latest offer
    Reject {
        /// Application ID
        application: String,

        /// Offer ID
        offer: String,
    },

    /// Withdraw one of our pending offers
    Cancel {
        /// Application ID
        application: String,

        /// Offer ID
        offer: String,
    },

    /// Answer the candidate's latest offer with new terms
    Counter {
        /// Application ID
        application: String,

        /// Offer ID
        offer: String,

        #[command(flatten)]
        fields: OfferFields,
    },

    /// Record an offer proposed by the candidate (local database)
    Propose {
        /// Application ID
        application: String,

        #[command(flatten)]
        fields: OfferFields,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hire=warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn local_db(config: &Config) -> Result<Database> {
    match &config.backend {
        Backend::Local { db_path } => Database::open(db_path),
        Backend::Remote { base_url, .. } => Err(anyhow!(
            "This command works on the local database only (API configured: {}). Pass --db to use a local file.",
            base_url
        )),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();
    let config = Config::resolve(cli.api_url, cli.db)?;

    match cli.command {
        Commands::Init => {
            let db = local_db(&config)?;
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Pipeline { command } => match command {
            PipelineCommands::Import { file } => {
                let db = local_db(&config)?;
                db.ensure_initialized()?;
                let pipeline = db.import_pipeline(&file)?;
                println!(
                    "Imported pipeline '{}' (ID: {}) with {} stages and {} transitions",
                    pipeline.name,
                    pipeline.id,
                    pipeline.stages.len(),
                    pipeline.transitions.len()
                );
            }

            PipelineCommands::List => {
                let db = local_db(&config)?;
                db.ensure_initialized()?;
                let pipelines = db.list_pipelines()?;
                if pipelines.is_empty() {
                    println!("No pipelines found.");
                } else {
                    println!("{:<6} {:<16} {:<30} {:>7}", "ID", "ORG", "NAME", "STAGES");
                    println!("{}", "-".repeat(62));
                    for p in pipelines {
                        println!(
                            "{:<6} {:<16} {:<30} {:>7}",
                            p.id,
                            truncate(&p.organization_id, 14),
                            truncate(&p.name, 28),
                            p.stages.len()
                        );
                    }
                }
            }

            PipelineCommands::Show { job_id } => {
                let api = api::create_api(&config)?;
                let mut lookup = PipelineLookup::new(api.as_ref());
                let pipeline = lookup.get(&job_id)?;
                println!("Pipeline #{} - {}", pipeline.id, pipeline.name);
                println!("Organization: {}", pipeline.organization_id);
                println!("\nStages:");
                for stage in &pipeline.stages {
                    println!("  {:<14} {:<24} [{}]", stage.key, stage.name, stage.stage_type);
                }
                println!("\nTransitions:");
                for t in &pipeline.transitions {
                    println!("  {} -> {}", t.from_stage_key, t.to_stage_key);
                }
            }
        },

        Commands::Job { command } => {
            let db = local_db(&config)?;
            db.ensure_initialized()?;
            match command {
                JobCommands::Add { title, pipeline } => {
                    let job = db.create_job(&title, &pipeline)?;
                    println!("Added job #{} ({})", job.id, job.title);
                }

                JobCommands::List => {
                    let jobs = db.list_jobs()?;
                    if jobs.is_empty() {
                        println!("No jobs found.");
                    } else {
                        println!("{:<6} {:<40} {:>9}", "ID", "TITLE", "PIPELINE");
                        println!("{}", "-".repeat(57));
                        for job in jobs {
                            println!("{:<6} {:<40} {:>9}", job.id, truncate(&job.title, 38), job.pipeline_id);
                        }
                    }
                }
            }
        }

        Commands::Apply {
            job_id,
            candidate,
            stage,
        } => {
            let db = local_db(&config)?;
            db.ensure_initialized()?;
            let app = db.create_application(&job_id, &candidate, stage.as_deref())?;
            println!(
                "Created application #{} for {} at stage '{}'",
                app.id, app.candidate_id, app.current_stage_key
            );
        }

        Commands::App { command } => match command {
            AppCommands::List { job } => {
                let db = local_db(&config)?;
                db.ensure_initialized()?;
                let apps = db.list_applications(job.as_deref())?;
                if apps.is_empty() {
                    println!("No applications found.");
                } else {
                    println!(
                        "{:<6} {:<6} {:<20} {:<16} {:<10} {:<12}",
                        "ID", "JOB", "CANDIDATE", "STAGE", "STATUS", "APPLIED"
                    );
                    println!("{}", "-".repeat(74));
                    for app in apps {
                        println!(
                            "{:<6} {:<6} {:<20} {:<16} {:<10} {:<12}",
                            app.id,
                            app.job_id,
                            truncate(&app.candidate_id, 18),
                            truncate(&app.current_stage_key, 14),
                            app.status,
                            app.applied_date
                        );
                    }
                }
            }

            AppCommands::Show { id } => {
                let api = api::create_api(&config)?;
                let app = api.get_application_by_id(&id)?;
                let mut lookup = PipelineLookup::new(api.as_ref());
                let pipeline = lookup.get(&app.job_id)?;
                print_application(&app, pipeline);
            }

            AppCommands::Transitions { id } => {
                let api = api::create_api(&config)?;
                let app = api.get_application_by_id(&id)?;
                let mut lookup = PipelineLookup::new(api.as_ref());
                let pipeline = lookup.get(&app.job_id)?;
                let available = pipeline::available_transitions(pipeline, &app);
                if available.is_empty() {
                    println!("No moves available from '{}'.", app.current_stage_key);
                } else {
                    for t in available {
                        let blocked = gate::check(pipeline, &app, t).err();
                        let name = pipeline
                            .stage(&t.to_stage_key)
                            .map(|s| s.name.as_str())
                            .unwrap_or(t.to_stage_key.as_str());
                        match blocked {
                            Some(e) => println!("  {:<14} {:<24} (blocked: {})", t.to_stage_key, name, e),
                            None => println!("  {:<14} {}", t.to_stage_key, name),
                        }
                    }
                }
            }

            AppCommands::Move { id, to } => {
                let api = api::create_api(&config)?;
                let app = api.get_application_by_id(&id)?;
                let mut lookup = PipelineLookup::new(api.as_ref());
                let pipeline = lookup.get(&app.job_id)?;
                let transition = pipeline::available_transitions(pipeline, &app)
                    .into_iter()
                    .find(|t| t.to_stage_key == to)
                    .ok_or_else(|| {
                        anyhow!(
                            "No transition from '{}' to '{}'. Run 'hire app transitions {}' to see the options.",
                            app.current_stage_key,
                            to,
                            id
                        )
                    })?;
                let updated = TransitionGate::new(api.as_ref()).execute(pipeline, &app, transition)?;
                if let Some(entry) = updated.status_history.last() {
                    println!("{}", entry.reason);
                }
            }

            AppCommands::Review { id } => {
                let api = api::create_api(&config)?;
                tui::run_review(api.as_ref(), &id)?;
            }
        },

        Commands::Interview { command } => {
            let api = api::create_api(&config)?;
            let manager = InterviewManager::new(api.as_ref());
            match command {
                InterviewCommands::Schedule {
                    application,
                    fields,
                } => {
                    let app = api.get_application_by_id(&application)?;
                    let mut lookup = PipelineLookup::new(api.as_ref());
                    let pipeline = lookup.get(&app.job_id)?;
                    let stage = pipeline::current_stage(pipeline, &app)?;
                    let interview = manager.schedule(stage, &app, fields.into_draft())?;
                    println!(
                        "Scheduled interview #{} with {} on {}",
                        interview.id,
                        interview.interviewer_name,
                        interview.scheduled_date.format("%Y-%m-%d %H:%M UTC")
                    );
                }

                InterviewCommands::Edit {
                    application,
                    interview,
                    fields,
                } => {
                    let app = api.get_application_by_id(&application)?;
                    let updated = manager.edit(&app, &interview, fields.into_draft())?;
                    println!("Updated interview #{} ({})", updated.id, updated.format.kind());
                }

                InterviewCommands::Reschedule {
                    application,
                    interview,
                    at,
                    duration,
                } => {
                    let app = api.get_application_by_id(&application)?;
                    let updated = manager.reschedule(&app, &interview, at, duration)?;
                    println!(
                        "Interview #{} moved to {}",
                        updated.id,
                        updated.scheduled_date.format("%Y-%m-%d %H:%M UTC")
                    );
                }

                InterviewCommands::Feedback {
                    application,
                    interview,
                    rating,
                    recommendation,
                    strengths,
                    weaknesses,
                    comments,
                } => {
                    let app = api.get_application_by_id(&application)?;
                    let feedback = InterviewFeedback {
                        rating,
                        recommendation,
                        strengths,
                        weaknesses,
                        comments,
                    };
                    let updated = manager.add_feedback(&app, &interview, &feedback)?;
                    println!("Feedback recorded; interview #{} is {}", updated.id, updated.status.as_str());
                }

                InterviewCommands::Cancel {
                    application,
                    interview,
                } => {
                    let app = api.get_application_by_id(&application)?;
                    manager.cancel(&app, &interview)?;
                    println!("Cancelled interview #{}", interview);
                }

                InterviewCommands::Delete {
                    application,
                    interview,
                } => {
                    let app = api.get_application_by_id(&application)?;
                    manager.delete(&app, &interview)?;
                    println!("Deleted interview #{}", interview);
                }
            }
        }

        Commands::Offer { command } => {
            let api = api::create_api(&config)?;
            let manager = OfferManager::new(api.as_ref());
            match command {
                OfferCommands::Create {
                    application,
                    fields,
                } => {
                    let app = api.get_application_by_id(&application)?;
                    let offer = manager.create(&app, fields.into_draft())?;
                    println!("Extended offer #{} ({:.0} {})", offer.id, offer.salary, offer.currency);
                }

                OfferCommands::Edit {
                    application,
                    offer,
                    fields,
                } => {
                    let app = api.get_application_by_id(&application)?;
                    let updated = manager.edit(&app, &offer, fields.into_draft())?;
                    println!("Updated offer #{} ({:.0} {})", updated.id, updated.salary, updated.currency);
                }

                OfferCommands::Accept { application, offer } => {
                    let app = api.get_application_by_id(&application)?;
                    manager.accept(&app, &offer)?;
                    println!("Accepted offer #{}", offer);
                }

                OfferCommands::Reject { application, offer } => {
                    let app = api.get_application_by_id(&application)?;
                    manager.reject(&app, &offer)?;
                    println!("Rejected offer #{}", offer);
                }

                OfferCommands::Cancel { application, offer } => {
                    let app = api.get_application_by_id(&application)?;
                    manager.cancel(&app, &offer)?;
                    println!("Cancelled offer #{}", offer);
                }

                OfferCommands::Counter {
                    application,
                    offer,
                    fields,
                } => {
                    let app = api.get_application_by_id(&application)?;
                    let counter = manager.counter(&app, &offer, fields.into_draft())?;
                    println!(
                        "Countered offer #{} with offer #{} ({:.0} {})",
                        offer, counter.id, counter.salary, counter.currency
                    );
                }

                OfferCommands::Propose {
                    application,
                    fields,
                } => {
                    let db = local_db(&config)?;
                    let offer = propose_offer(&db, &application, fields)?;
                    println!("Recorded candidate offer #{} ({:.0} {})", offer.id, offer.salary, offer.currency);
                }
            }
        }
    }

    Ok(())
}

fn propose_offer(db: &Database, application_id: &str, fields: OfferFields) -> Result<models::Offer> {
    db.ensure_initialized()?;
    let input = fields.into_draft().into_input()?;
    Ok(db.create_candidate_offer(application_id, &input)?)
}

fn print_application(app: &Application, pipeline: &models::Pipeline) {
    let stage_name = pipeline
        .stage(&app.current_stage_key)
        .map(|s| s.name.as_str())
        .unwrap_or(app.current_stage_key.as_str());

    println!("Application #{}", app.id);
    println!("Candidate: {}", app.candidate_id);
    println!("Job: {}", app.job_id);
    println!("Stage: {} ({})", stage_name, app.current_stage_key);
    println!("Status: {}", app.status);
    println!("Applied: {}", app.applied_date);
    println!("Version: {}", app.version);

    if !app.interviews.is_empty() {
        println!("\nInterviews:");
        for i in &app.interviews {
            println!(
                "  #{:<4} {} {:<20} {:<10} {:>4}m {}",
                i.id,
                i.scheduled_date.format("%Y-%m-%d %H:%M"),
                truncate(&i.interviewer_name, 18),
                i.format.kind(),
                i.duration,
                i.status.as_str()
            );
            if let Some(place) = i.format.location().or(i.format.meeting_link()) {
                println!("        {}", place);
            }
            if let Some(fb) = &i.feedback {
                println!("        Rating {}/5, {}", fb.rating, fb.recommendation);
                if !fb.strengths.is_empty() {
                    println!("        Strengths: {}", fb.strengths.join(", "));
                }
                if !fb.weaknesses.is_empty() {
                    println!("        Weaknesses: {}", fb.weaknesses.join(", "));
                }
                for line in textwrap::fill(&fb.comments, 70).lines() {
                    println!("        {}", line);
                }
            }
        }
    }

    if !app.offers.is_empty() {
        println!("\nOffers (newest first):");
        for (idx, o) in offers::newest_first(&app.offers).into_iter().enumerate() {
            let from = if o.is_offered_by_candidate { "candidate" } else { "recruiter" };
            let hint = if offers::can_respond(o, idx) {
                "  <- awaiting your answer"
            } else if offers::can_cancel(o) {
                "  (ours, can be edited or withdrawn)"
            } else {
                ""
            };
            println!(
                "  #{:<4} {:>10.0} {} {:<10} {:<10}{}",
                o.id,
                o.salary,
                o.currency,
                from,
                o.status.as_str(),
                hint
            );
        }
    }

    if !app.status_history.is_empty() {
        println!("\nHistory:");
        for entry in &app.status_history {
            println!(
                "  {} {:<14} {}",
                entry.changed_at.format("%Y-%m-%d %H:%M"),
                entry.to_stage_key,
                entry.reason
            );
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
