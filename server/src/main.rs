#![allow(dead_code)]

mod classifier;
mod cli;
mod conf;
mod engine;
mod error;
mod llm;
mod mail;
mod rate_limiters;
mod request_tracing;
mod routes;
mod store;
#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

use std::{
    net::SocketAddr,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        Arc,
    },
    time::Duration,
};

use clap::Parser;
use futures::future::join_all;
use mimalloc::MiMalloc;
use tokio::signal;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use conf::ConfigStore;
use engine::{
    bootstrap::BootstrapEngine,
    digest::DigestGenerator,
    id_migration,
    queue::SuggestionQueue,
    thread::ThreadContextManager,
    triage::{DryRunLimits, TriageEngine},
    waiting_for::WaitingForTracker,
};
use classifier::{EmailClassifier, PreferenceLearner};
use llm::{AnthropicClient, LlmClient};
use mail::{GraphMailClient, MailClient, SentItemsCache};
use routes::{AppRouter, ServerState};
use store::Store;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

/// Hard deadline for one triage cycle.
const CYCLE_DEADLINE: Duration = Duration::from_secs(300);

struct Runtime {
    config: Arc<ConfigStore>,
    store: Arc<Store>,
    mail: Arc<dyn MailClient>,
    llm: Arc<dyn LlmClient>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(conf::config_path_from_env);

    match cli.command {
        Command::ValidateConfig => {
            let (is_valid, message) = conf::validate_config_file(&config_path);
            println!("{message}");
            std::process::exit(if is_valid { 0 } else { 1 });
        }
        Command::Serve { host, port } => {
            let runtime = build_runtime(&config_path).await?;
            serve(runtime, &host, port).await
        }
        Command::Bootstrap { days } => {
            let runtime = build_runtime(&config_path).await?;
            let cfg = runtime.config.get();
            let bootstrap = BootstrapEngine::new(runtime.store.clone(), runtime.mail.clone());
            let stats = bootstrap.run(&cfg, days).await?;
            println!(
                "Bootstrap complete: {} emails scanned, {} senders seen, {} categories created",
                stats.emails_scanned, stats.senders_seen, stats.categories_created
            );
            Ok(())
        }
        Command::DryRun {
            days,
            sample,
            limit,
        } => {
            let runtime = build_runtime(&config_path).await?;
            let engine = build_engine(&runtime, true).with_limits(DryRunLimits {
                lookback_hours: Some(days * 24),
                max_messages: limit,
                sample: Some(sample),
            });
            let result = engine.run_cycle().await;
            print_cycle_summary(&result);
            Ok(())
        }
        Command::Triage { once, dry_run } => {
            let runtime = build_runtime(&config_path).await?;
            if once {
                let engine = build_engine(&runtime, dry_run);
                match tokio::time::timeout(CYCLE_DEADLINE, engine.run_cycle()).await {
                    Ok(result) => print_cycle_summary(&result),
                    Err(_) => anyhow::bail!("triage cycle exceeded the {CYCLE_DEADLINE:?} deadline"),
                }
                Ok(())
            } else {
                let engine = Arc::new(build_engine(&runtime, dry_run));
                let scheduler = start_scheduler(&runtime, engine).await?;
                wait_for_shutdown(scheduler, CancellationToken::new()).await
            }
        }
    }
}

async fn build_runtime(config_path: &Path) -> anyhow::Result<Runtime> {
    let config = Arc::new(ConfigStore::load(config_path.to_path_buf())?);
    let cfg = config.get();

    let store = Arc::new(Store::connect(Path::new(&cfg.database.path)).await?);

    let http_client = reqwest::ClientBuilder::new().use_rustls_tls().build()?;
    let mail: Arc<dyn MailClient> = Arc::new(GraphMailClient::from_env(
        http_client.clone(),
        cfg.auth.token_cache_path.as_deref(),
    )?);
    let llm: Arc<dyn LlmClient> = Arc::new(AnthropicClient::from_env(
        http_client,
        cfg.models.requests_per_second,
    )?);

    Ok(Runtime {
        config,
        store,
        mail,
        llm,
    })
}

fn build_engine(runtime: &Runtime, dry_run: bool) -> TriageEngine {
    let classifier = Arc::new(EmailClassifier::new(
        runtime.llm.clone(),
        runtime.store.clone(),
    ));
    let sent_cache = Arc::new(SentItemsCache::new(runtime.mail.clone()));

    TriageEngine::new(
        runtime.store.clone(),
        runtime.mail.clone(),
        runtime.config.clone(),
        classifier,
        ThreadContextManager::new(runtime.store.clone()),
        SuggestionQueue::new(runtime.store.clone(), runtime.mail.clone()),
        WaitingForTracker::new(runtime.store.clone(), sent_cache),
        PreferenceLearner::new(runtime.store.clone(), runtime.llm.clone()),
        DigestGenerator::new(runtime.store.clone(), runtime.llm.clone()),
        dry_run,
    )
}

async fn serve(runtime: Runtime, host: &str, port: u16) -> anyhow::Result<()> {
    let engine = Arc::new(build_engine(&runtime, false));
    let cancel = CancellationToken::new();

    // One-shot immutable id migration in the background; cancelled on shutdown
    {
        let store = runtime.store.clone();
        let mail = runtime.mail.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("immutable id migration cancelled");
                }
                result = async { id_migration::migrate_to_immutable_ids(&store, mail.as_ref()).await } => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "immutable id migration failed");
                    }
                }
            }
        });
    }

    let scheduler = start_scheduler(&runtime, engine).await?;

    let router = AppRouter::create(ServerState {
        store: runtime.store.clone(),
    });
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!("review API listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "server exited");
        }
    });

    let shutdown_handle = tokio::spawn(async move {
        let mut scheduler = scheduler;
        if signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::info!("received ctrl-c, shutting down");
        cancel.cancel();
        if let Err(e) = scheduler.shutdown().await {
            tracing::error!(error = %e, "scheduler shutdown failed");
        }
        std::process::exit(0);
    });

    join_all(vec![server_handle, shutdown_handle]).await;
    Ok(())
}

/// Schedule the periodic triage job. An atomic in-flight flag enforces
/// max-one-cycle; a fire that lands while a cycle is running is coalesced
/// into a skip.
async fn start_scheduler(
    runtime: &Runtime,
    engine: Arc<TriageEngine>,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;
    let interval_minutes = runtime.config.get().triage.interval_minutes;
    let in_flight = Arc::new(AtomicBool::new(false));

    {
        let engine = engine.clone();
        let in_flight = in_flight.clone();
        // Run a cycle right away at startup
        scheduler
            .add(Job::new_one_shot_async(
                Duration::from_secs(0),
                move |_uuid, _l| {
                    let engine = engine.clone();
                    let in_flight = in_flight.clone();
                    Box::pin(async move {
                        run_guarded_cycle(engine, in_flight).await;
                    })
                },
            )?)
            .await?;
    }

    {
        let engine = engine.clone();
        let in_flight = in_flight.clone();
        scheduler
            .add(Job::new_repeated_async(
                Duration::from_secs(interval_minutes as u64 * 60),
                move |_uuid, _l| {
                    let engine = engine.clone();
                    let in_flight = in_flight.clone();
                    Box::pin(async move {
                        run_guarded_cycle(engine, in_flight).await;
                    })
                },
            )?)
            .await?;
    }

    scheduler.start().await?;
    tracing::info!(interval_minutes, "triage scheduler started");
    Ok(scheduler)
}

async fn run_guarded_cycle(engine: Arc<TriageEngine>, in_flight: Arc<AtomicBool>) {
    if in_flight
        .compare_exchange(false, true, SeqCst, SeqCst)
        .is_err()
    {
        tracing::info!("previous triage cycle still running, skipping this fire");
        return;
    }

    match tokio::time::timeout(CYCLE_DEADLINE, engine.run_cycle()).await {
        Ok(_result) => {}
        Err(_) => {
            // Delta token was not advanced; those messages reprocess next
            // cycle (classification is idempotent by primary key)
            tracing::error!(
                deadline_secs = CYCLE_DEADLINE.as_secs(),
                "triage cycle exceeded deadline, abandoned"
            );
        }
    }

    in_flight.store(false, SeqCst);
}

async fn wait_for_shutdown(
    mut scheduler: JobScheduler,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    signal::ctrl_c().await?;
    tracing::info!("received ctrl-c, shutting down");
    cancel.cancel();
    scheduler.shutdown().await?;
    Ok(())
}

fn print_cycle_summary(result: &engine::triage::TriageCycleResult) {
    println!("Cycle {} complete:", result.cycle_id);
    println!("  fetched:        {}", result.fetched);
    println!("  auto-ruled:     {}", result.auto_ruled);
    println!("  inherited:      {}", result.inherited);
    println!("  classified:     {}", result.classified);
    println!("  failed:         {}", result.failed);
    println!("  auto-approved:  {}", result.suggestions_auto_approved);
    println!("  expired:        {}", result.suggestions_expired);
    println!(
        "  waiting-for:    resolved={} nudged={} escalated={} unchanged={} errors={}",
        result.waiting.resolved,
        result.waiting.nudged,
        result.waiting.escalated,
        result.waiting.unchanged,
        result.waiting.errors
    );
    if let Some(error) = &result.cycle_error {
        println!("  cycle error:    {error}");
    }
}
