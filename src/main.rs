//! # DialClaw — Outbound Campaign Cadence Runner
//!
//! Runs multi-day retry schedules ("cadences") for outbound-contact
//! campaigns: a periodic trigger scans eligible campaigns, a worker
//! drains execution passes, and every executed slot lands in an
//! idempotent progress ledger.
//!
//! Usage:
//!   dialclaw run                                  # Start trigger + worker
//!   dialclaw execute --campaign <id>              # One pass, right now
//!   dialclaw create-campaign --name "Q3 Leads"
//!   dialclaw add-leads --campaign <id> --file leads.json
//!   dialclaw create-template --name fast --file cadence.json
//!   dialclaw stop-cadence --campaign <id>
//!   dialclaw resume-cadence --campaign <id>

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use dialclaw_cadence::{
    CadenceEngine, CadenceTrigger, JobQueue, QueuePolicy, VoiceApiDispatcher, spawn_worker,
};
use dialclaw_core::config::DialClawConfig;
use dialclaw_core::traits::{CallDispatcher, CampaignStore, LeadStore, TemplateStore};
use dialclaw_core::types::DayConfig;
use dialclaw_db::{CadenceDb, NewLead};

#[derive(Parser)]
#[command(
    name = "dialclaw",
    version,
    about = "📞 DialClaw — Outbound Campaign Cadence Runner"
)]
struct Cli {
    /// Config file (TOML)
    #[arg(short, long, default_value = "~/.dialclaw/config.toml")]
    config: String,

    /// Database path (overrides config)
    #[arg(long)]
    db_path: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the cadence service (trigger + worker) until Ctrl-C
    Run,
    /// Run one execution pass for a campaign immediately
    Execute {
        #[arg(long)]
        campaign: String,
        /// Use resume-mode day math
        #[arg(long)]
        resume: bool,
    },
    /// Create a campaign
    CreateCampaign {
        #[arg(long)]
        name: String,
    },
    /// Import leads from a JSON file into a campaign
    AddLeads {
        #[arg(long)]
        campaign: String,
        /// JSON array: [{"name", "phone_number", "phone_id"?}, ...]
        #[arg(long)]
        file: String,
    },
    /// Show a campaign's counters
    Stats {
        #[arg(long)]
        campaign: String,
    },
    /// Create a cadence template from a JSON file
    CreateTemplate {
        #[arg(long)]
        name: String,
        /// JSON: {"retry_dispositions": [...], "days": {"1": {"attempts", "time_windows"}}}
        #[arg(long)]
        file: String,
    },
    /// List cadence templates
    ListTemplates,
    /// Delete a cadence template
    DeleteTemplate {
        #[arg(long)]
        id: String,
    },
    /// Attach a cadence template to a campaign
    AttachCadence {
        #[arg(long)]
        campaign: String,
        #[arg(long)]
        template: String,
        /// RFC 3339 start instant; defaults to now
        #[arg(long)]
        start: Option<String>,
    },
    /// Pause a campaign's cadence (records the resume day)
    StopCadence {
        #[arg(long)]
        campaign: String,
    },
    /// Resume a stopped cadence (day math re-bases on now)
    ResumeCadence {
        #[arg(long)]
        campaign: String,
    },
    /// Recompute a campaign's counters from its lead rows
    Reconcile {
        #[arg(long)]
        campaign: String,
    },
}

#[derive(Deserialize)]
struct LeadImport {
    name: String,
    phone_number: String,
    #[serde(default)]
    phone_id: Option<String>,
}

#[derive(Deserialize)]
struct TemplateImport {
    #[serde(default)]
    retry_dispositions: Vec<String>,
    days: std::collections::BTreeMap<u32, DayConfig>,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "dialclaw=debug,dialclaw_cadence=debug,dialclaw_db=debug"
    } else {
        "dialclaw=info,dialclaw_cadence=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = expand_path(&cli.config);
    let mut config = DialClawConfig::load(Path::new(&config_path))?;
    if let Some(db_path) = &cli.db_path {
        config.db_path = db_path.clone();
    }
    let db_path = expand_path(&config.db_path);
    let db = Arc::new(CadenceDb::open(Path::new(&db_path))?);

    match cli.command {
        Command::Run => run_service(db, config, &db_path).await,
        Command::Execute { campaign, resume } => {
            let engine = build_engine(Arc::clone(&db), &config);
            let outcome = if resume {
                engine.execute_resume_cadence(&campaign).await?
            } else {
                engine.execute_campaign_cadence(&campaign).await?
            };
            println!("✅ Pass finished: {outcome:?}");
            Ok(())
        }
        Command::CreateCampaign { name } => {
            let c = db.create_campaign(&name)?;
            println!("✅ Campaign created: {} ({})", c.name, c.id);
            Ok(())
        }
        Command::AddLeads { campaign, file } => {
            let raw = std::fs::read_to_string(expand_path(&file))
                .with_context(|| format!("read {file}"))?;
            let imports: Vec<LeadImport> =
                serde_json::from_str(&raw).with_context(|| format!("parse {file}"))?;
            let leads: Vec<NewLead> = imports
                .into_iter()
                .map(|l| NewLead {
                    name: l.name,
                    phone_number: l.phone_number,
                    phone_id: l.phone_id,
                })
                .collect();
            let added = db.add_leads(&campaign, &leads)?;
            println!("✅ Imported {added} lead(s) into {campaign}");
            Ok(())
        }
        Command::Stats { campaign } => {
            let counters = db.campaign_stats(&campaign)?;
            println!("📊 Campaign {campaign}");
            println!("   Leads:       {}", counters.leads_count);
            println!("   Completed:   {}", counters.completed);
            println!("   In progress: {}", counters.in_progress);
            println!("   Remaining:   {}", counters.remaining);
            println!("   Failed:      {}", counters.failed);
            if !counters.balanced() {
                println!("   ⚠️  Counters out of balance — run `dialclaw reconcile`");
            }
            Ok(())
        }
        Command::CreateTemplate { name, file } => {
            let raw = std::fs::read_to_string(expand_path(&file))
                .with_context(|| format!("read {file}"))?;
            let import: TemplateImport =
                serde_json::from_str(&raw).with_context(|| format!("parse {file}"))?;
            let tpl = db.create_cadence_template(&name, import.retry_dispositions, import.days)?;
            println!("✅ Template created: {} ({})", tpl.name, tpl.id);
            Ok(())
        }
        Command::ListTemplates => {
            let templates = db.list_cadence_templates()?;
            if templates.is_empty() {
                println!("No cadence templates.");
            }
            for t in templates {
                println!(
                    "📋 {} ({}) — {} day(s), retries on {:?}",
                    t.name,
                    t.id,
                    t.days.len(),
                    t.retry_dispositions
                );
            }
            Ok(())
        }
        Command::DeleteTemplate { id } => {
            db.delete_cadence_template(&id)?;
            println!("🗑️ Template {id} deleted");
            Ok(())
        }
        Command::AttachCadence {
            campaign,
            template,
            start,
        } => {
            if db.template(&template)?.is_none() {
                anyhow::bail!("template {template} not found");
            }
            let start_date = match start {
                Some(s) => chrono::DateTime::parse_from_rfc3339(&s)
                    .with_context(|| format!("parse start date {s}"))?
                    .with_timezone(&chrono::Utc),
                None => chrono::Utc::now(),
            };
            db.attach_cadence(&campaign, &template, start_date)?;
            println!("✅ Cadence {template} attached to {campaign} (starts {start_date})");
            Ok(())
        }
        Command::StopCadence { campaign } => {
            let engine = build_engine(Arc::clone(&db), &config);
            engine.stop_cadence(&campaign)?;
            println!("⏸️ Cadence stopped for {campaign}");
            Ok(())
        }
        Command::ResumeCadence { campaign } => {
            let engine = build_engine(Arc::clone(&db), &config);
            engine.resume_cadence(&campaign)?;
            println!("▶️ Cadence resumed for {campaign}");
            Ok(())
        }
        Command::Reconcile { campaign } => {
            let counters = db.reconcile_counters(&campaign)?;
            println!(
                "✅ Counters reconciled for {campaign}: {} lead(s), {} completed, {} in progress, {} remaining, {} failed",
                counters.leads_count,
                counters.completed,
                counters.in_progress,
                counters.remaining,
                counters.failed
            );
            Ok(())
        }
    }
}

fn build_engine(db: Arc<CadenceDb>, config: &DialClawConfig) -> Arc<CadenceEngine<CadenceDb>> {
    let dispatcher: Arc<dyn CallDispatcher> = Arc::new(VoiceApiDispatcher::new(
        config.voice_api.clone(),
        Arc::clone(&db) as Arc<dyn LeadStore>,
    ));
    Arc::new(CadenceEngine::new(db, dispatcher, config.cadence.clone()))
}

async fn run_service(db: Arc<CadenceDb>, config: DialClawConfig, db_path: &str) -> Result<()> {
    println!("📞 DialClaw v{}", env!("CARGO_PKG_VERSION"));
    println!("   🗄️  Database:   {db_path}");
    println!("   🌍 Time zone:  {}", config.cadence.timezone);
    println!("   ⏱️  Tick:       every {} min", config.cadence.tick_minutes);
    println!();

    let queue = JobQueue::new(QueuePolicy {
        max_attempts: config.cadence.job_max_attempts,
        backoff: std::time::Duration::from_secs(config.cadence.job_backoff_secs),
        retention: config.cadence.job_retention,
    });
    let engine = build_engine(Arc::clone(&db), &config);
    let trigger = CadenceTrigger::new(Arc::clone(&db), Arc::clone(&queue), config.cadence.tick_minutes);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = spawn_worker(Arc::clone(&queue), engine, shutdown_rx.clone());
    let trigger_task = tokio::spawn(async move { trigger.run(shutdown_rx).await });

    tokio::signal::ctrl_c()
        .await
        .context("wait for shutdown signal")?;
    println!("\n🛑 Shutting down...");
    shutdown_tx.send(true).ok();
    trigger_task.await.ok();
    worker.await.ok();
    Ok(())
}
