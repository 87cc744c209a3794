use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use config::pgenv::PgEnvironment;
use config::pgpass::lookup_password;
use config::shared::LoadSettings;
use config::{SettingsOverrides, load_settings};
use console::Term;
use loader::destination::postgres::connect_destinations;
use loader::driver::{RunReport, drive};
use loader::source::collect_tasks;
use loader::task::effective_worker_count;
use loader::workers::pool::WorkManager;
use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::error::{CliError, CliResult};

/// Resolves the settings, opens the connections and runs the load until it ends.
pub async fn run(overrides: SettingsOverrides, password_prompt: bool) -> CliResult<RunReport> {
    let pg_env = PgEnvironment::from_env();
    let mut settings = load_settings(&overrides, &pg_env).map_err(CliError::config)?;
    settings.validate().map_err(CliError::config)?;

    resolve_password(&mut settings, password_prompt, &pg_env)?;
    log_settings(&settings);

    let tasks = collect_tasks(&settings.input, settings.dest_path.as_deref())?;
    let workers = effective_worker_count(settings.workers, tasks.len());
    if workers < settings.workers {
        info!(
            requested = settings.workers,
            workers, "fewer files than workers, reducing the number of workers"
        );
    }

    let destinations = connect_destinations(
        &settings.connection,
        &settings.table,
        settings.tag.as_deref(),
        workers,
    )
    .await?;

    let mut manager = WorkManager::new(tasks, destinations, settings.stop_on_error)?;
    let interrupt = interrupt_signal()?;
    let report = drive(
        &mut manager,
        interrupt,
        Duration::from_millis(settings.heartbeat_interval_ms),
    )
    .await?;

    Ok(report)
}

/// Fills in the connection password.
///
/// The terminal prompt wins when requested. Otherwise a password from the configuration or
/// `PGPASSWORD` is kept, and the password file is consulted last.
fn resolve_password(
    settings: &mut LoadSettings,
    password_prompt: bool,
    pg_env: &PgEnvironment,
) -> anyhow::Result<()> {
    let connection = &mut settings.connection;

    if password_prompt {
        let term = Term::stderr();
        term.write_str(&format!("Password for user {}: ", connection.username))
            .context("failed to write the password prompt")?;
        let password = term
            .read_secure_line()
            .context("failed to read the password from the terminal")?;
        connection.password = Some(SecretString::new(password));

        return Ok(());
    }

    if connection.password.is_some() {
        return Ok(());
    }

    let Some(passfile) = pg_env.passfile() else {
        return Ok(());
    };

    match lookup_password(
        &passfile,
        &connection.host,
        connection.port,
        &connection.name,
        &connection.username,
    ) {
        Ok(Some(password)) => {
            debug!(passfile = %passfile.display(), "using password from password file");
            connection.password = Some(password);
        }
        Ok(None) => {}
        Err(err) => warn!(error = %err, "ignoring password file"),
    }

    Ok(())
}

fn log_settings(settings: &LoadSettings) {
    info!(
        host = %settings.connection.host,
        port = settings.connection.port,
        database = %settings.connection.name,
        username = %settings.connection.username,
        tls = settings.connection.tls.enabled,
        "destination database"
    );

    info!(
        table = %settings.table,
        input = %settings.input,
        dest_path = ?settings.dest_path,
        tag = ?settings.tag,
        workers = settings.workers,
        stop_on_error = settings.stop_on_error,
        "load settings"
    );
}

/// Resolves once Ctrl-C or, on unix, SIGTERM is received.
///
/// Handlers are registered before the future is returned so that no signal is missed.
fn interrupt_signal() -> CliResult<impl Future<Output = ()>> {
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(async move {
        #[cfg(unix)]
        let terminate = async move {
            sigterm.recv().await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("sigint (ctrl+c) received, stopping load"),
                Err(err) => {
                    warn!(error = %err, "failed to listen for ctrl+c");
                    std::future::pending::<()>().await;
                }
            },
            _ = terminate => {
                info!("sigterm received, stopping load");
            }
        }
    })
}
