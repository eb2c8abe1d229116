//! ns-agent
//!
//! Entry point invoked by the orchestrator for every lifecycle hook and
//! action of the network service unit.
//!
//! - `ns-agent hook <name>`: run a lifecycle hook
//! - `ns-agent action <name> [--params <json>]`: run an action; parameters
//!   come from `action-get` unless given explicitly
//!
//! With `--dry-run` no orchestrator is contacted: remote actions are
//! simulated, status changes are only logged and action results are printed
//! to stdout.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nsc_action_client::{HttpActionClient, RemoteActionClient, ScriptedActionClient};
use nsc_agent::coordinator::{ADD_USER_ACTION, SET_POLICY_ACTION};
use nsc_agent::hook_tools::HookTools;
use nsc_agent::status::LogStatusReporter;
use nsc_agent::{ActionOutcome, Cancellation, CharmConfig, HookEvent, LifecycleController, StatusReporter};
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Network service agent.
#[derive(Debug, Parser)]
#[command(name = "ns-agent")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (JSON, YAML or TOML).
    #[arg(long, global = true, env = "NSC_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Simulate remote actions and print results instead of using hook tools.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a lifecycle hook.
    Hook {
        /// Hook name (install, upgrade-charm, config-changed).
        name: String,
    },

    /// Run an action.
    Action {
        /// Action name (add-user).
        name: String,

        /// Action parameters as a JSON object.
        #[arg(long)]
        params: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = CharmConfig::load(cli.config.as_deref())?;

    // Logs go to stderr; stdout carries dry-run results.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.as_str().into()))
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    info!(
        model = %config.model,
        orchestrator_url = %config.orchestrator_url,
        dry_run = cli.dry_run,
        "Starting ns-agent"
    );

    run(cli, config, &mut std::io::stdout()).await?;

    info!("ns-agent finished");
    Ok(())
}

/// Execute the requested hook or action.
///
/// Dry-run action results are written to `out`.
async fn run<W: Write>(cli: Cli, config: CharmConfig, out: &mut W) -> Result<()> {
    let config = Arc::new(config);
    let tools = HookTools::new();

    let (client, status): (Arc<dyn RemoteActionClient>, Arc<dyn StatusReporter>) = if cli.dry_run {
        (Arc::new(simulated_client(&config)), Arc::new(LogStatusReporter))
    } else {
        let client = HttpActionClient::new(config.http_client_config())
            .context("failed to create action client")?;
        (Arc::new(client), Arc::new(tools.clone()))
    };

    let controller = LifecycleController::new(Arc::clone(&config), status, client);

    match cli.command {
        Commands::Hook { name } => {
            let event: HookEvent = name.parse()?;
            controller.handle_hook(event).await?;
        }
        Commands::Action { name, params } => {
            let params = match params {
                Some(raw) => serde_json::from_str(&raw).context("--params is not valid JSON")?,
                None if cli.dry_run => anyhow::bail!("--params is required with --dry-run"),
                None => tools.action_get().await?,
            };

            // Ctrl+C abandons the pending remote call.
            let (cancel_tx, cancel) = Cancellation::channel();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Received interrupt, cancelling action");
                    let _ = cancel_tx.send(true);
                }
            });

            let outcome = controller.run_action(&name, &params, cancel).await;
            interrupt.abort();

            match outcome? {
                ActionOutcome::Completed(results) if cli.dry_run => {
                    writeln!(out, "{}", serde_json::Value::Object(results))?;
                }
                ActionOutcome::Completed(results) => tools.action_set(&results).await?,
                ActionOutcome::Failed(message) if cli.dry_run => {
                    error!(action = %name, message = %message, "Action failed");
                    anyhow::bail!(message);
                }
                ActionOutcome::Failed(message) => {
                    error!(action = %name, message = %message, "Action failed");
                    tools.action_fail(&message).await?;
                }
            }
        }
    }

    Ok(())
}

/// A client answering `add-user` with increasing ids and accepting every
/// `set-policy`.
fn simulated_client(config: &CharmConfig) -> ScriptedActionClient {
    let client = ScriptedActionClient::new();
    let Ok(locators) = config.locators() else {
        return client;
    };
    let (Ok(user_app), Ok(policy_app)) = (
        locators.user.application_name(),
        locators.policy.application_name(),
    ) else {
        return client;
    };

    let next_id = AtomicU64::new(1);
    client
        .respond_with(&user_app, ADD_USER_ACTION, move |_| {
            let id = next_id.fetch_add(1, Ordering::SeqCst);
            Ok(nsc_action_client::output(json!({ "user-id": id.to_string() })))
        })
        .respond(&policy_app, SET_POLICY_ACTION, json!({ "success": "true" }))
}
