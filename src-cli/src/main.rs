//! Resilio dispatch console.
//!
//! Thin command-line surface over the incident service. Every command prints JSON on stdout;
//! failures print the structured error on stderr and exit non-zero.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resilio_core::config::ServiceConfig;
use resilio_core::demo::seed_demo_incidents;
use resilio_core::domain::{
    Category, Department, EvidenceKind, GeoPoint, Incident, IncidentFilter, IncidentStatus,
    ReportSubmission, Severity,
};
use resilio_core::error::AppError;
use resilio_core::lifecycle::TransitionRequest;
use resilio_core::priority::{self, SeverityFilter};
use resilio_core::service::{IncidentApi, IncidentService};
use resilio_core::store::SqliteIncidentStore;
use resilio_sync::{DashboardAgent, FieldUnitAgent, Notice, Settlement};

#[derive(Parser)]
#[command(name = "resilio")]
#[command(about = "Incident intake, dispatch and tracking", long_about = None)]
#[command(version)]
struct Cli {
    /// SQLite database file (defaults to RESILIO_DB_PATH, else in-memory)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Events buffered per live subscriber
    #[arg(long, global = true)]
    fanout_capacity: Option<usize>,

    /// Log level
    #[arg(long, env = "RESILIO_LOG", default_value = "warn", global = true)]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "RESILIO_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a field report; severity is assigned automatically
    Submit {
        #[arg(long)]
        category: Category,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        /// Image evidence address (repeatable)
        #[arg(long = "image")]
        images: Vec<String>,
        /// Audio evidence address (repeatable)
        #[arg(long = "audio")]
        audio: Vec<String>,
    },
    /// List incidents, newest first, or in dashboard priority order with --priority
    List {
        #[arg(long = "status")]
        statuses: Vec<IncidentStatus>,
        #[arg(long)]
        severity: Option<Severity>,
        #[arg(long)]
        department: Option<Department>,
        #[arg(long)]
        priority: bool,
    },
    /// Show one incident
    Get { id: i64 },
    /// Move an incident along its lifecycle
    Transition {
        id: i64,
        #[arg(long)]
        to: IncidentStatus,
        #[arg(long)]
        department: Option<Department>,
        #[arg(long)]
        severity: Option<Severity>,
        #[arg(long)]
        category: Option<Category>,
        #[arg(long)]
        report: Option<String>,
        #[arg(long)]
        resolved_by: Option<String>,
    },
    /// Remove an incident that has not been resolved
    Remove { id: i64 },
    /// Submit the demo report set
    SeedDemo,
    /// Run a dashboard and a field unit against an in-memory service
    Simulate,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    ok: bool,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    seeded: usize,
    dispatched: i64,
    settlements: Vec<String>,
    dashboard_feed: Vec<Incident>,
    dashboard_resolved: Vec<Incident>,
    dashboard_unread: usize,
    dashboard_notices: Vec<Notice>,
    field_unit_notices: Vec<Notice>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());
    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    match run(cli) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(code = %err.code, "command failed");
            let body = serde_json::to_string_pretty(&err).unwrap_or_else(|_| err.to_string());
            eprintln!("{body}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<ServiceConfig, AppError> {
    let mut config = ServiceConfig::from_env()?;
    if let Some(path) = &cli.db_path {
        config.db_path = Some(path.clone());
    }
    if let Some(capacity) = cli.fanout_capacity {
        config.fanout_capacity = capacity;
    }
    config.validate()?;
    Ok(config)
}

fn to_json<T: Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value).map_err(|e| {
        AppError::validation("CLI_OUTPUT_FAILED", "Failed to encode output")
            .with_details(e.to_string())
    })
}

fn run(cli: Cli) -> Result<String, AppError> {
    let config = load_config(&cli)?;
    let open = || IncidentService::from_config(&config);

    match cli.command {
        Command::Submit {
            category,
            description,
            lat,
            lng,
            images,
            audio,
        } => {
            let svc = open()?;
            let mut submission =
                ReportSubmission::new(category, description.as_deref(), GeoPoint::new(lat, lng));
            for address in images {
                submission = submission.with_evidence(EvidenceKind::Image, address);
            }
            for address in audio {
                submission = submission.with_evidence(EvidenceKind::Audio, address);
            }
            to_json(&svc.submit_incident(submission)?)
        }
        Command::List {
            statuses,
            severity,
            department,
            priority,
        } => {
            let filter = IncidentFilter {
                statuses: (!statuses.is_empty()).then_some(statuses),
                severity,
                department,
            };
            let records = open()?.list_incidents(&filter)?;
            if priority {
                to_json(&priority::order(&records, SeverityFilter::All))
            } else {
                to_json(&records)
            }
        }
        Command::Get { id } => to_json(&open()?.get_incident(id)?),
        Command::Transition {
            id,
            to,
            department,
            severity,
            category,
            report,
            resolved_by,
        } => {
            let request = TransitionRequest {
                target: Some(to),
                department,
                severity,
                category,
                report,
                resolved_by,
            };
            to_json(&open()?.transition_request(id, request)?)
        }
        Command::Remove { id } => {
            open()?.remove(id)?;
            to_json(&DeleteResponse { ok: true })
        }
        Command::SeedDemo => to_json(&seed_demo_incidents(&open()?)?),
        // In-memory regardless of --db-path.
        Command::Simulate => to_json(&simulate(config.fanout_capacity)?),
    }
}

/// Drive both client roles through one dispatch-to-resolution cycle.
fn simulate(fanout_capacity: usize) -> Result<SimulationReport, AppError> {
    let svc = IncidentService::new(SqliteIncidentStore::open_in_memory()?, fanout_capacity);
    let mut dashboard = DashboardAgent::open(&svc)?;
    let mut unit = FieldUnitAgent::open(&svc, "Engine-12", Department::Fire)?;

    let seeded = seed_demo_incidents(&svc)?.len();
    dashboard.pump(&svc)?;
    unit.pump(&svc)?;

    let top = dashboard
        .feed()
        .into_iter()
        .find(|r| r.category == Category::Fire)
        .map(|r| r.id)
        .ok_or_else(|| AppError::not_found("No fire report in the dashboard feed"))?;

    let mut settlements = Vec::new();
    let mut record = |label: &str, s: Settlement| settlements.push(format!("{label}: {s:?}"));

    record("dispatch", dashboard.dispatch(&svc, top, Department::Fire, None)?);
    unit.pump(&svc)?;
    unit.open_mission(top);
    record("begin_travel", unit.begin_travel(&svc, top)?);
    record("arrive", unit.arrive(&svc, top)?);
    record(
        "resolve",
        unit.resolve(&svc, top, "Fire contained; building evacuated")?,
    );
    dashboard.pump(&svc)?;
    // Resolved cases are retained; the dashboard gets a rejection notice.
    record("remove_resolved", dashboard.remove(&svc, top));

    Ok(SimulationReport {
        seeded,
        dispatched: top,
        settlements,
        dashboard_feed: dashboard.feed().into_iter().cloned().collect(),
        dashboard_resolved: dashboard.resolved().into_iter().cloned().collect(),
        dashboard_unread: dashboard.unread(),
        dashboard_notices: dashboard.drain_notices(),
        field_unit_notices: unit.drain_notices(),
    })
}
