//! Lab validator - differential validation harness
//!
//! Runs once at startup, then again on every new restart signal and
//! whenever the poll interval passes without one.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lab_validator::{
    checks::CheckRegistry,
    config::{Args, LogFormat},
    db::MongoClient,
    engine::{DifferentialTestEngine, EngineSettings},
    probe::{build_http_client, HttpServiceProbe},
    scheduler::{ExecutionScheduler, RunTranscript, SchedulerSink, TriggerCause},
    shutdown,
    signal::{SignalFiles, SignalWatcher, TriggerSink, WatcherSettings},
    store::MongoResultStore,
    types::EnvironmentInfo,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    let json = args.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lab_validator={},info", log_level).into()),
        )
        .with((!json).then(tracing_subscriber::fmt::layer))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let principal = args.principal();
    let target = args.target_url(&principal);

    info!("======================================");
    info!("  Lab Validator");
    info!("======================================");
    info!("Principal: {}", principal);
    info!("Target: {}", target.as_deref().unwrap_or("(not configured)"));
    info!("Results DB: {}", args.results_db);
    info!("Signal dir: {}", args.signal_dir.display());
    info!("Poll interval: {}s (fallback {}s)", args.poll_interval_secs, args.fallback_poll_secs);
    info!("Mode: {}", if args.run_once { "RUN ONCE" } else { "WATCH" });
    info!("======================================");

    // Without the database there is nowhere to record anything
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.results_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            client
        }
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let store = match MongoResultStore::new(&mongo, args.scenario_key.clone()).await {
        Ok(store) => store,
        Err(e) => {
            error!("Result store initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    let http = build_http_client(args.insecure_tls)?;
    let probe = HttpServiceProbe::new(http.clone(), args.probe_path.clone());
    let (shutdown_trigger, shutdown) = shutdown::channel();

    let settings = EngineSettings {
        inter_check_delay: args.inter_check_delay(),
        check_timeout: args.check_timeout(),
        environment: EnvironmentInfo {
            environment: args.environment.clone(),
            log_level: args.log_level.clone(),
            service_name: target.clone(),
        },
    };

    let engine = DifferentialTestEngine::new(
        principal.clone(),
        Arc::new(store),
        Arc::new(probe),
        CheckRegistry::builtin(),
        http,
    )
    .with_target(target)
    .with_ground_truth(mongo.database(principal.as_str()))
    .with_settings(settings)
    .with_shutdown(shutdown.clone());

    let scheduler = Arc::new(
        ExecutionScheduler::new(Arc::new(engine))
            .with_transcript(RunTranscript::in_dir(&args.signal_dir)),
    );

    if args.run_once {
        scheduler.trigger(TriggerCause::Startup).await;
        info!("Single run finished, exiting");
        return Ok(());
    }

    let sink = SchedulerSink::new(scheduler.clone());
    sink.fire(TriggerCause::Startup);

    let watcher = SignalWatcher::new(
        SignalFiles::new(&args.signal_dir),
        WatcherSettings {
            poll_interval: args.poll_interval(),
            fallback_poll_interval: args.fallback_poll_interval(),
        },
        Arc::new(sink),
        shutdown,
    );
    let watcher_handle = tokio::spawn(watcher.run());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    shutdown_trigger.trigger();

    if let Err(e) = watcher_handle.await {
        warn!("Signal watcher task failed: {}", e);
    }

    // An in-flight check may still be running; give it its timeout to finish
    let grace = args.check_timeout() + args.inter_check_delay();
    if tokio::time::timeout(grace, scheduler.wait_idle()).await.is_err() {
        warn!("Run still in progress after {}s, exiting anyway", grace.as_secs());
    }

    info!("Lab validator stopped");
    Ok(())
}
