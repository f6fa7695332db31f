pub mod agent_engine;
pub mod commands;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod perception;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::agent_engine::engine::Session;
use crate::agent_engine::event_bus::EventBus;
use crate::agent_engine::loop_control::StopSignal;
use crate::commands::{render_event, AgentHandle};
use crate::config::{AppConfig, SharedSettings};
use crate::errors::DeskPilotResult;
use crate::executor::input::EnigoDriver;
use crate::llm::registry::ProviderRegistry;
use crate::perception::traits::XcapScreen;

/// Installs the global subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Wires the real screen, input backend and active model provider into a running engine.
pub fn bootstrap(config: &AppConfig) -> DeskPilotResult<(AgentHandle, JoinHandle<()>)> {
    let registry = ProviderRegistry::from_config(&config.llm);
    let client = registry.get_active()?;
    let settings = SharedSettings::new(config.session.clone())?;

    let session = Session::new(
        client,
        Arc::new(EnigoDriver::new()?),
        Arc::new(XcapScreen),
        settings,
        config.agent.clone(),
        StopSignal::new(),
        EventBus::default(),
    )?;
    Ok(AgentHandle::spawn(session))
}

/// Line-oriented front-end: a line starts a task, `stop` stops it, `quit` exits.
pub async fn run() -> DeskPilotResult<()> {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "no .env file loaded");
    }

    let config = config::load_config()?;
    let (handle, engine) = bootstrap(&config)?;

    let mut feed = handle.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(event) => println!("{}", render_event(&event)),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "feed printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    println!("deskpilot ready. Type a task, `stop` to stop it, `quit` to exit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "quit" | "exit" => break,
            "stop" => {
                if !handle.stop_task() {
                    println!("no task is running");
                }
            }
            task => {
                if let Err(e) = handle.start_task(task).await {
                    println!("! {e}");
                }
            }
        }
    }

    handle.shutdown().await;
    if let Err(e) = engine.await {
        tracing::error!(error = %e, "engine task ended abnormally");
    }
    printer.abort();
    Ok(())
}
