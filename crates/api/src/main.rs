//! Saga service entry point.
//!
//! Runs three supervised tasks: the HTTP server, the response pump feeding
//! the saga coordinator, and a hook closing the database pool on shutdown.

use std::future::IntoFuture;
use std::sync::Arc;

use api::AppState;
use api::config::Config;
use api::error::StartupError;
use api::telemetry;
use queue::{MessageChannel, MessagePump, PostgresChannel};
use saga::{SagaCoordinator, WorkflowDefinition};
use sqlx::postgres::PgPoolOptions;
use state_store::PostgresStateStore;
use supervisor::{ExitStatus, TaskSupervisor, cancelled, drain_within};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("startup: {e}");
            std::process::exit(1);
        }
    };
    telemetry::init_tracing(config.log_format);

    let code = match run(config).await {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            1
        }
    };
    std::process::exit(code);
}

async fn run(config: Config) -> Result<ExitStatus, StartupError> {
    tracing::info!(build = %config.build, ?config, "starting saga service");

    // 1. Metrics recorder
    let metrics = telemetry::init_metrics()?;

    // 2. Database pool and schema
    let pool = PgPoolOptions::new()
        .max_connections(config.db.max_connections)
        .connect_lazy_with(config.db.connect_options()?);
    let store = PostgresStateStore::new(pool.clone());
    store.run_migrations().await?;

    // 3. Workflow, coordinator and response channel
    let visibility_timeout = config.queue.visibility_timeout;
    let channel_for = |queue: &str| -> Arc<dyn MessageChannel> {
        Arc::new(PostgresChannel::new(pool.clone(), queue).with_visibility_timeout(visibility_timeout))
    };
    let workflow = WorkflowDefinition::build(&config.workflow, channel_for);
    tracing::info!(participants = workflow.len(), "workflow loaded");
    let coordinator = Arc::new(SagaCoordinator::new(store.clone(), Arc::new(workflow)));
    let responses = channel_for(&config.queue.responses_queue);

    // 4. HTTP application
    let state = Arc::new(AppState {
        coordinator: Arc::clone(&coordinator),
        store,
        build: config.build.clone(),
        pod: config.pod.clone(),
        metrics,
    });
    let app = api::create_app(state);

    let addr = config.web.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!(%addr, "listening");

    // 5. Supervised tasks
    let mut supervisor = TaskSupervisor::new();

    let shutdown_timeout = config.web.shutdown_timeout;
    supervisor.add("http", move |shutdown| async move {
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(cancelled(shutdown.clone()))
            .into_future();
        drain_within(server, shutdown, shutdown_timeout)
            .await
            .map_err(|_| format!("http server did not stop within {shutdown_timeout:?}"))??;
        tracing::info!("server shut down gracefully");
        Ok(())
    });

    let pump = MessagePump::new(responses, coordinator, config.queue.pump_config());
    supervisor.add("response-pump", move |shutdown| async move {
        pump.run(shutdown).await?;
        Ok(())
    });

    supervisor.add("db-close", move |shutdown| async move {
        cancelled(shutdown).await;
        pool.close().await;
        tracing::info!("database pool closed");
        Ok(())
    });

    let (_parent, parent_rx) = watch::channel(false);
    let report = supervisor.run(parent_rx).await;
    for failure in &report.failures {
        tracing::error!(error = %failure, "task failure");
    }
    tracing::info!(status = ?report.status, "shutdown complete");

    Ok(report.status)
}
