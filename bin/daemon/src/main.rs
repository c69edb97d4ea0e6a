//! Automation daemon: wires the workflow engine and the trigger scanner
//! into a single runnable process backed by in-memory stores.

mod config;
mod handlers;

use config::DaemonConfig;
use copper_relay_engine::{
    ActionExecutor, Dispatcher, ExecutionWorker, MemoryExecutionStore, MemoryWorkflowDirectory,
};
use copper_relay_scanner::{MemoryEventCalendar, MemoryWatermarkStore, TriggerScanner};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = DaemonConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let directory = Arc::new(MemoryWorkflowDirectory::new());
    let store = Arc::new(MemoryExecutionStore::new());
    let calendar = Arc::new(MemoryEventCalendar::new());
    let watermark = Arc::new(MemoryWatermarkStore::new());
    let registry = Arc::new(handlers::logging_registry());

    let executor = Arc::new(ActionExecutor::new(store.clone(), registry));
    let (queue_tx, queue_rx) = mpsc::channel(config.execution.queue_capacity);

    let dispatcher = Arc::new(Dispatcher::new(
        directory.clone(),
        store.clone(),
        executor.clone(),
        queue_tx,
    ));

    let worker = ExecutionWorker::new(directory.clone(), store.clone(), executor, queue_rx);
    let worker_task = tokio::spawn(worker.run());

    let scanner = TriggerScanner::new(
        dispatcher,
        directory,
        calendar,
        watermark,
        Duration::from_secs(config.scanner.interval_seconds),
    );
    let scanner_task = tokio::spawn(scanner.run());

    tracing::info!("Daemon started, press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    tracing::info!("Shutting down");

    scanner_task.abort();
    worker_task.abort();
}
