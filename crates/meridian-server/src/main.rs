//! `meridian [config.json]`: headless server with in-memory persistence.
//!
//! Lines typed on stdin are run as console commands.

use std::io::BufRead;
use std::sync::mpsc::{self, TryRecvError};

use anyhow::Context as _;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use meridian_server::boundary::network::LoggingNetwork;
use meridian_server::prelude::*;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => ServerConfig::default(),
    };
    info!(?config, "starting");

    let mut game = Game::new(
        config,
        Box::new(MemoryStore::new()),
        Box::new(LoggingNetwork),
    )?;

    let (lines, input) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if lines.send(line).is_err() {
                break;
            }
        }
    });

    let result = game.run(|game| loop {
        match input.try_recv() {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => match game.console(line.trim()) {
                Ok(reply) => info!("{reply}"),
                Err(err) => warn!(error = %err, "console"),
            },
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => return true,
        }
    });

    if let Err(err) = &result {
        error!(error = %err, "server stopped");
    }
    result.context("tick loop")
}
