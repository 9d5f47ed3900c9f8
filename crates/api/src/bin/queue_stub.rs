//! Participant stub: answers every command on its queue with `done`.

use std::sync::Arc;

use api::config::StubConfig;
use api::stub::StubParticipant;
use api::telemetry;
use queue::{MessagePump, PostgresChannel};
use sqlx::postgres::PgPoolOptions;
use supervisor::{ExitStatus, TaskSupervisor, cancelled, drain_within};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let config = match StubConfig::from_env() {
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

async fn run(config: StubConfig) -> Result<ExitStatus, api::error::StartupError> {
    tracing::info!(build = %config.build, ?config, "starting queue stub");

    let pool = PgPoolOptions::new()
        .max_connections(config.db.max_connections)
        .connect_lazy_with(config.db.connect_options()?);

    let responses = PostgresChannel::new(pool.clone(), config.queue.responses_queue.clone());
    let commands = PostgresChannel::new(pool.clone(), config.commands_queue.clone())
        .with_visibility_timeout(config.queue.visibility_timeout);

    let stub = Arc::new(StubParticipant::new(
        config.service_name.clone(),
        Arc::new(responses),
    ));
    let pump = MessagePump::new(Arc::new(commands), stub, config.queue.pump_config());

    let mut supervisor = TaskSupervisor::new();
    let shutdown_timeout = config.shutdown_timeout;
    supervisor.add("command-pump", move |shutdown| async move {
        drain_within(pump.run(shutdown.clone()), shutdown, shutdown_timeout)
            .await
            .map_err(|_| format!("command pump did not stop within {shutdown_timeout:?}"))??;
        Ok(())
    });
    supervisor.add("db-close", move |shutdown| async move {
        cancelled(shutdown).await;
        pool.close().await;
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
