//! Load the features advertised by the agent devices.
//!
//! The capabilities of each configured device are either pulled from its HTTP API
//! or pushed on an MQTT broker, then reconciled with the features loaded for that device.
#![forbid(unsafe_code)]

pub mod config;
pub mod logging;
pub mod platform;
pub mod registry;
pub mod supervisor;
pub mod worker;

#[cfg(test)]
mod tests;

use crate::config::BridgeConfig;
use crate::platform::Platforms;
use crate::registry::LocalRegistry;
use crate::supervisor::Supervisor;
use crate::supervisor::Transports;
use agent_reconciler::ReconciliationEngine;
use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing::warn;

#[derive(Debug, Parser)]
#[clap(
    name = clap::crate_name!(),
    version = clap::crate_version!(),
    about = clap::crate_description!()
)]
pub struct BridgeOpt {
    #[command(flatten)]
    pub log_args: logging::LogConfigArgs,

    /// Start the bridge from custom path
    ///
    /// [env: AGENT_BRIDGE_CONFIG_DIR, default: /etc/agent-bridge]
    #[clap(
        long = "config-dir",
        env = "AGENT_BRIDGE_CONFIG_DIR",
        default_value = config::DEFAULT_CONFIG_DIR,
        hide_env_values = true,
        hide_default_value = true,
    )]
    pub config_dir: Utf8PathBuf,
}

/// Run the bridge till interrupted
///
/// - SIGHUP reloads all the devices.
/// - SIGINT and SIGTERM unload all the devices and stop the bridge.
pub async fn run(opt: BridgeOpt) -> anyhow::Result<()> {
    let config = BridgeConfig::load(&opt.config_dir)
        .with_context(|| format!("Fail to load the configuration from {}", opt.config_dir))?;
    logging::log_init(&opt.log_args, &config.log)?;
    info!(
        "Starting {} with {} device(s)",
        clap::crate_name!(),
        config.devices.len()
    );

    let platforms = Platforms::new();
    let registry = Arc::new(LocalRegistry::new());
    let engine = Arc::new(ReconciliationEngine::new(
        registry,
        platforms.lifecycle_manager(),
    ));
    let transports = Arc::new(Transports::new(&config));
    let supervisor = Supervisor::new(engine, transports.clone(), config.devices.clone());

    let mut signals = signals::Signals::new().context("Fail to install the signal handlers")?;
    supervisor.setup_all().await;

    while let Some(signal) = signals.next().await {
        match signal {
            signals::Signal::Reload => {
                supervisor.reload().await;
            }
            signals::Signal::Terminate => break,
        }
    }

    info!("Stopping {}", clap::crate_name!());
    let failures = supervisor.shutdown().await;
    if !failures.is_empty() {
        warn!("{} device(s) not cleanly unloaded", failures.len());
    }
    transports.close().await;
    Ok(())
}

mod signals {
    use tokio::signal::unix::signal;
    use tokio::signal::unix::Signal as UnixSignal;
    use tokio::signal::unix::SignalKind;

    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub enum Signal {
        Reload,
        Terminate,
    }

    pub struct Signals {
        hangup: UnixSignal,
        interrupt: UnixSignal,
        terminate: UnixSignal,
    }

    impl Signals {
        pub fn new() -> std::io::Result<Self> {
            Ok(Signals {
                hangup: signal(SignalKind::hangup())?,
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        pub async fn next(&mut self) -> Option<Signal> {
            tokio::select! {
                Some(()) = self.hangup.recv() => Some(Signal::Reload),
                Some(()) = self.interrupt.recv() => Some(Signal::Terminate),
                Some(()) = self.terminate.recv() => Some(Signal::Terminate),
                else => None,
            }
        }
    }
}
