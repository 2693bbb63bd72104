//! enginelink CLI - starts the automation engine and talks to it.
//!
//! ```text
//! main() -> EngineClient::start() -> Start: print events until Ctrl-C
//!                                  -> Send:  one message, optionally await the reply
//!                                  -> dispose()
//! ```

use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::Mutex,
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use enginelink_client::{ClientEvent, EngineClient, Payload};
use enginelink_config::{EngineLinkConfig, STATE_DIR};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "enginelink")]
#[command(about = "Drive a locally spawned automation engine")]
struct Cli {
    /// Config file (defaults to $ENGINELINK_CONFIG or ~/.enginelink/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine and print every message until Ctrl-C
    Start,
    /// Start the engine, send one message, then shut down
    Send {
        /// Message kind
        kind: String,
        /// JSON object sent as the message payload
        #[arg(long)]
        data: Option<String>,
        /// Wait for the engine's reply and print its payload
        #[arg(long)]
        wait: bool,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // stdout carries command output; logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates(dirs::home_dir()) {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

/// Log locations in preference order. The config file override does not
/// move the logs.
fn log_file_candidates(home: Option<PathBuf>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.enginelink/logs/enginelink.log
    if let Some(home) = home {
        candidates.push(home.join(STATE_DIR).join("logs").join("enginelink.log"));
    }

    // Fallback: ./.enginelink/logs/enginelink.log
    candidates.push(PathBuf::from(STATE_DIR).join("logs").join("enginelink.log"));

    candidates
}

fn parse_payload(raw: &str) -> Result<Payload> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("--data is not valid JSON")?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("--data must be a JSON object, got {other}"),
    }
}

fn describe(event: &ClientEvent) -> Result<String> {
    Ok(match event {
        ClientEvent::MessageReceived(envelope) => {
            format!("<- {}", serde_json::to_string(envelope)?)
        }
        ClientEvent::MessageSent(envelope) => format!("-> {}", serde_json::to_string(envelope)?),
        ClientEvent::Provisioning(stage) => format!("** {stage:?}"),
    })
}

async fn run_start(client: &EngineClient) -> Result<()> {
    let mut events = client.subscribe();
    client.start().await?;
    println!("engine ready; press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => println!("{}", describe(&event)?),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event printer fell behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

async fn run_send(
    client: &EngineClient,
    kind: String,
    data: Option<Payload>,
    wait: bool,
) -> Result<()> {
    client.start().await?;

    if wait {
        let reply = client.request(kind, data).await?;
        match reply {
            Some(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
            None => println!("(reply carried no payload)"),
        }
    } else {
        let id = client.send(kind, data)?;
        println!("sent message {id}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = EngineLinkConfig::load_or_default(cli.config.as_deref())?;
    let client = EngineClient::new(config.client);

    let outcome = match cli.command {
        Commands::Start => run_start(&client).await,
        Commands::Send { kind, data, wait } => {
            let data = data.as_deref().map(parse_payload).transpose()?;
            run_send(&client, kind, data, wait).await
        }
    };

    client.dispose().await;
    outcome
}
