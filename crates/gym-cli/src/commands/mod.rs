//! CLI command implementations.

mod auth;
mod workouts;

pub use auth::{login, logout, passwd, rename, signup, status};
pub use workouts::{exercise, exercises, groups, history, mark_done};

use anyhow::{Context, Result};
use credential_store::create_file_store;
use gym_config_and_utils::{init_logging, Config, Paths};
use session_engine::{ApiClient, GymApi, SessionController};
use std::io::{self, Write};
use tracing::debug;

/// Everything a command needs: the restored session and the domain API on top of it.
pub struct Client {
    pub controller: SessionController,
    pub api: GymApi,
}

/// Load config, start logging and restore the stored session.
pub async fn connect(log_level: Option<&str>) -> Result<Client> {
    let paths = Paths::new()?;
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    let level = log_level.unwrap_or(&config.log_level);
    init_logging("gymctl", level, &paths, false);

    let base_url = config.api_base_url()?;
    let client = ApiClient::with_timeout(base_url.as_str(), config.request_timeout())?;
    let store = create_file_store(paths.credentials_dir())
        .context("Failed to open credential store")?;

    let controller = SessionController::new(store, client);
    controller.bootstrap().await;
    debug!(authenticated = controller.is_authenticated(), "Session restored");

    let api = GymApi::new(controller.gateway().clone());
    Ok(Client { controller, api })
}

/// Fail early with a readable message when there is no stored session.
fn require_session(client: &Client) -> Result<()> {
    if !client.controller.is_authenticated() {
        anyhow::bail!("Not logged in. Run 'gymctl login' first");
    }
    Ok(())
}

/// Read one trimmed line from stdin after printing `label`.
fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
