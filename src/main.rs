use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use transcribe_store::config;
use transcribe_store::model::ListQuery;
use transcribe_store::runner;
use transcribe_store::transcriber::CommandTranscriber;
use transcribe_store::{BatchOrchestrator, HistoryStore};

#[derive(Debug, Parser)]
#[command(author, version, about = "Transcription history and batch job store")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Transcription history
    #[command(subcommand)]
    History(HistoryCmd),
    /// Batch jobs
    #[command(subcommand)]
    Batch(BatchCmd),
}

#[derive(Debug, Subcommand)]
enum HistoryCmd {
    Add {
        text: String,
        #[arg(long, default_value_t = 0)]
        duration_ms: u64,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        language: Option<String>,
    },
    Get {
        id: String,
    },
    List {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
        #[arg(long)]
        search: Option<String>,
    },
    Delete {
        id: String,
    },
    Clear,
    Stats,
}

#[derive(Debug, Subcommand)]
enum BatchCmd {
    Create {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    Get {
        id: String,
    },
    List {
        #[arg(long)]
        limit: Option<u32>,
    },
    Cancel {
        id: String,
    },
    /// Reset failed files to pending; all of them unless --file is given
    Retry {
        id: String,
        #[arg(long = "file")]
        files: Vec<String>,
    },
    Delete {
        id: String,
    },
    /// Transcribe every pending file with the configured engine
    Run {
        id: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let db_path = std::env::var("TRANSCRIBE_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| cfg.database_path());
    info!(path = %db_path.display(), "opening store");

    match args.command {
        Cmd::History(cmd) => {
            let history = HistoryStore::new(&db_path);
            history.initialize().await?;
            let res = run_history(&history, &cfg, cmd).await;
            history.close().await;
            res
        }
        Cmd::Batch(cmd) => {
            let orchestrator = BatchOrchestrator::new(&db_path);
            orchestrator.initialize().await?;
            let res = run_batch(&orchestrator, &cfg, &db_path, cmd).await;
            orchestrator.close().await;
            res
        }
    }
}

async fn run_history(history: &HistoryStore, cfg: &config::Config, cmd: HistoryCmd) -> Result<()> {
    match cmd {
        HistoryCmd::Add {
            text,
            duration_ms,
            model,
            language,
        } => {
            let record = history
                .add(&text, duration_ms, model.as_deref(), language.as_deref())
                .await?;
            print_json(&record)
        }
        HistoryCmd::Get { id } => {
            let record = history
                .get(&id)
                .await?
                .ok_or_else(|| anyhow!("no record {id}"))?;
            print_json(&record)
        }
        HistoryCmd::List {
            limit,
            offset,
            search,
        } => {
            let query = ListQuery {
                limit: Some(limit.unwrap_or(cfg.history.page_size)),
                offset,
                search,
            };
            let (records, total) = history.list(&query).await?;
            print_json(&serde_json::json!({ "records": records, "totalCount": total }))
        }
        HistoryCmd::Delete { id } => print_json(&history.delete(&id).await?),
        HistoryCmd::Clear => print_json(&history.clear().await?),
        HistoryCmd::Stats => print_json(&history.stats().await?),
    }
}

async fn run_batch(
    orchestrator: &BatchOrchestrator,
    cfg: &config::Config,
    db_path: &std::path::Path,
    cmd: BatchCmd,
) -> Result<()> {
    match cmd {
        BatchCmd::Create { paths } => {
            let job = orchestrator.create_job(paths.as_slice()).await?;
            print_json(&job.report())
        }
        BatchCmd::Get { id } => {
            let job = orchestrator
                .get_job(&id)
                .await?
                .ok_or_else(|| anyhow!("no batch job {id}"))?;
            print_json(&job.report())
        }
        BatchCmd::List { limit } => {
            let jobs = orchestrator
                .list_jobs(Some(limit.unwrap_or(cfg.batch.list_limit)))
                .await?;
            let reports: Vec<_> = jobs.iter().map(|j| j.report()).collect();
            print_json(&reports)
        }
        BatchCmd::Cancel { id } => print_json(&orchestrator.cancel_job(&id).await?),
        BatchCmd::Retry { id, files } => {
            let file_ids = (!files.is_empty()).then_some(files.as_slice());
            let job = orchestrator
                .retry_failed(&id, file_ids)
                .await?
                .ok_or_else(|| anyhow!("no batch job {id}"))?;
            print_json(&job.report())
        }
        BatchCmd::Delete { id } => print_json(&orchestrator.delete_job(&id).await?),
        BatchCmd::Run { id } => {
            let transcriber = CommandTranscriber::from_argv(&cfg.engine.command)?;
            let history = HistoryStore::new(db_path);
            history.initialize().await?;
            let res = runner::run_job(
                orchestrator,
                &history,
                &transcriber,
                &id,
                cfg.engine.language.as_deref(),
            )
            .await;
            history.close().await;
            let job = res?.ok_or_else(|| anyhow!("no batch job {id}"))?;
            print_json(&job.report())
        }
    }
}
