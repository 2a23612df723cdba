//! `retain` binary: run the retention analysis pipeline, serve the query
//! API, ask one-shot questions, or test the email configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};

use retain_agent::analysis::format_report;
use retain_agent::notify::Notifier;
use retain_agent::tickets::normalize_tickets;
use retain_agent::{SmtpNotifier, Workflow};
use retain_core::config::Settings;
use retain_core::loader::{load_ticket_values, load_usage_data, usage_summary};
use retain_core::{Indexer, RetainError};
use retain_engines::{EmbeddingClient, GeminiOracle};
use retain_rag::{AppState, QueryEngine, SledVectorStore, VectorStore};

#[derive(Parser)]
#[command(name = "retain", about = "Customer churn-risk analysis pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full analysis pipeline over usage and ticket data
    Run {
        /// Usage data file (defaults to the configured data dir)
        #[arg(long)]
        usage: Option<PathBuf>,
        /// Ticket data file (optional; analysis degrades without it)
        #[arg(long)]
        tickets: Option<PathBuf>,
        /// Skip the email notification step
        #[arg(long)]
        skip_email: bool,
        /// Skip the vector indexing step
        #[arg(long)]
        skip_index: bool,
    },
    /// Serve the query API over HTTP
    Serve {
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: String,
    },
    /// Ask a one-shot question against the indexed knowledge base
    Query {
        question: String,
        /// Number of chunks to retrieve (auto-classified if not set)
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Test the SMTP configuration
    TestEmail,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let settings = Arc::new(Settings::from_env());

    match cli.command {
        Command::Run {
            usage,
            tickets,
            skip_email,
            skip_index,
        } => run_pipeline(settings, usage, tickets, skip_email, skip_index).await,
        Command::Serve { addr } => serve(settings, &addr).await,
        Command::Query { question, k } => one_shot_query(settings, &question, k).await,
        Command::TestEmail => test_email(settings).await,
    }
}

fn oracle_timeout(settings: &Settings) -> Option<Duration> {
    settings.oracle_timeout_secs.map(Duration::from_secs)
}

fn open_store(settings: &Arc<Settings>, api_key: &str) -> Result<Arc<SledVectorStore>> {
    let embedder = EmbeddingClient::new(
        api_key,
        &settings.embedding_model,
        oracle_timeout(settings),
    )?;
    Ok(Arc::new(SledVectorStore::open(
        &settings.store_path,
        &settings.collection_name,
        Arc::new(embedder),
    )?))
}

async fn run_pipeline(
    settings: Arc<Settings>,
    usage_path: Option<PathBuf>,
    tickets_path: Option<PathBuf>,
    skip_email: bool,
    skip_index: bool,
) -> Result<()> {
    // Hard preconditions: credentials and usage data, before anything starts.
    let api_key = settings.require_api_key()?.to_string();
    let usage_path = usage_path.unwrap_or_else(|| settings.usage_file.clone());
    let usage = load_usage_data(&usage_path)?;

    // Ticket data is optional; its absence degrades to an empty set.
    let tickets_path = tickets_path.unwrap_or_else(|| settings.tickets_file.clone());
    let raw_tickets = match load_ticket_values(&tickets_path) {
        Ok(raw) => raw,
        Err(RetainError::MissingInput(path)) => {
            warn!("No ticket data at {}, continuing without it", path);
            Vec::new()
        }
        Err(err) => return Err(err.into()),
    };
    let tickets = normalize_tickets(&raw_tickets, &settings);
    let total_activity: u64 = usage_summary(&usage)
        .values()
        .map(|s| s.total_activities)
        .sum();
    info!(
        "Loaded {} clients ({} activities) and {} tickets",
        usage.len(),
        total_activity,
        tickets.len()
    );

    let oracle = Arc::new(GeminiOracle::new(
        &api_key,
        &settings.model,
        oracle_timeout(&settings),
    )?);
    let indexer: Option<Arc<dyn Indexer>> = if skip_index {
        None
    } else {
        Some(open_store(&settings, &api_key)?)
    };
    let notifier: Option<Arc<dyn Notifier>> = if skip_email {
        None
    } else {
        Some(Arc::new(SmtpNotifier::new(settings.smtp.clone())))
    };

    let workflow = Workflow::new(oracle, indexer, notifier, settings.clone());
    let state = workflow.run(&usage, &tickets).await?;

    if let Some(analysis) = &state.analysis {
        print!("{}", format_report(&analysis.assessments));
        println!("Results written to {}", settings.results_file.display());
    }
    if let Some(chunking) = &state.chunking {
        println!(
            "Knowledge base: {} chunks created, {} indexed",
            chunking.chunks.len(),
            chunking.indexed
        );
    }
    if let Some(notify) = &state.notify {
        if notify.sent {
            println!("Notification sent to {}: {}", notify.recipient, notify.subject);
        } else {
            println!("Notification skipped: {}", notify.detail);
        }
        if let Some(engagement) = &notify.engagement {
            println!(
                "Engagement emails: {} sent, {} skipped, {} failed",
                engagement.sent.len(),
                engagement.skipped.len(),
                engagement.failed.len()
            );
        }
    }
    if !state.errors.is_empty() {
        println!("\nCompleted with {} error(s):", state.errors.len());
        for error in &state.errors {
            println!("  - {}", error);
        }
    }
    Ok(())
}

async fn serve(settings: Arc<Settings>, addr: &str) -> Result<()> {
    let api_key = settings.require_api_key()?.to_string();
    let store = open_store(&settings, &api_key)?;
    let oracle = Arc::new(GeminiOracle::new(
        &api_key,
        &settings.model,
        oracle_timeout(&settings),
    )?);

    let engine = Arc::new(QueryEngine::new(
        store.clone() as Arc<dyn VectorStore>,
        oracle,
        settings.clone(),
    ));
    let state = AppState {
        engine,
        store: store as Arc<dyn VectorStore>,
        collection_name: settings.collection_name.clone(),
    };
    retain_rag::serve(state, addr).await
}

async fn one_shot_query(settings: Arc<Settings>, question: &str, k: Option<usize>) -> Result<()> {
    let api_key = settings.require_api_key()?.to_string();
    let store = open_store(&settings, &api_key)?;
    let oracle = Arc::new(GeminiOracle::new(
        &api_key,
        &settings.model,
        oracle_timeout(&settings),
    )?);
    let engine = QueryEngine::new(store as Arc<dyn VectorStore>, oracle, settings);

    let outcome = engine.query(question, k).await;
    println!("{}", outcome.answer);
    if !outcome.sources.is_empty() {
        println!("\nSources: {}", outcome.sources.join(", "));
        println!("Query type: {}", outcome.query_type.as_str());
    }
    Ok(())
}

async fn test_email(settings: Arc<Settings>) -> Result<()> {
    let notifier = SmtpNotifier::new(settings.smtp.clone());
    let status = notifier.test_connection().await;
    println!(
        "configured: {}\nsuccess: {}\n{}",
        status.configured, status.success, status.message
    );
    Ok(())
}
