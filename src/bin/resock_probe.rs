//! Resilient connection probe
//!
//! Connects to the configured WebSocket address, logs every connection
//! event and forwards stdin lines as text messages. Lines typed while the
//! link is down are queued and delivered once it is back.
//!
//! The config path comes from `PROBE_CONFIG_PATH`, else the first CLI
//! argument (which `CONFIG_PATH` overrides), else `config/probe.yaml`.
//!
//! Control lines:
//! - `/retry`, `/refresh`: drop the transport and reconnect
//! - `/close`: close for good and exit

use anyhow::{Context, Result};
use resock_workbench::bin_common::{
    init_tracing, load_config_from_env, parse_args, BinaryRunner, ConfigType, ProbeConfig,
    RunConfig,
};
use resock_workbench::resock::{Connection, Event, VerboseSwitch};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

struct ProbeApp {
    config: ProbeConfig,
    run_config: RunConfig,
    stats: Option<String>,
}

impl ProbeApp {
    fn new(config: ProbeConfig) -> Self {
        let run_config =
            RunConfig::new("resock probe").with_heartbeat(config.heartbeat_interval_secs);
        Self {
            config,
            run_config,
            stats: None,
        }
    }

    fn connect(&self) -> Result<Connection> {
        VerboseSwitch::global().set(self.config.verbose);

        let conn = Connection::builder()
            .url(self.config.url.clone())
            .config(self.config.connection.clone())
            .on_connecting(|_: &Event| info!("Connecting..."))
            .on_open(|_: &Event| info!("Open"))
            .on_message(|event: &Event| {
                if let Event::Message(payload) = event {
                    match payload.as_text() {
                        Some(text) => info!("<< {}", text),
                        None => info!("<< {} bytes", payload.len()),
                    }
                }
            })
            .on_error(|event: &Event| {
                if let Event::Error(e) = event {
                    error!("Transport error: {}", e);
                }
            })
            .on_close(|event: &Event| {
                if let Event::Close(close) = event {
                    warn!(
                        "Closed ({}): code {} reason {:?}",
                        close.kind(),
                        close.code,
                        close.reason
                    );
                }
            })
            .on_timeout(|_: &Event| warn!("Connect attempt timed out"))
            .build()
            .context("failed to build connection")?;

        Ok(conn)
    }
}

impl BinaryRunner for ProbeApp {
    async fn run(&mut self) -> Result<()> {
        self.config.log();
        let conn = self.connect()?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut heartbeat =
            tokio::time::interval(Duration::from_secs(self.run_config.heartbeat_interval_secs));
        heartbeat.tick().await;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line.context("failed to read stdin")? {
                        Some(line) => match line.trim() {
                            "" => {}
                            "/retry" => conn.retry()?,
                            "/refresh" => conn.refresh()?,
                            "/close" => break,
                            text => conn.send(text)?,
                        },
                        None => {
                            info!("stdin closed");
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    let metrics = conn.metrics();
                    info!(
                        "state {:?}, attempt {}, sent {}, received {}, reconnects {}, queued {}",
                        conn.lifecycle(),
                        conn.attempt(),
                        metrics.messages_sent,
                        metrics.messages_received,
                        metrics.reconnect_count,
                        metrics.pending
                    );
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        let metrics = conn.metrics();
        conn.shutdown().await?;
        self.stats = Some(format!(
            "Sent {} / received {} messages over {} reconnects ({} timeouts)",
            metrics.messages_sent,
            metrics.messages_received,
            metrics.reconnect_count,
            metrics.timeouts
        ));
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn stats(&self) -> Option<String> {
        self.stats.clone()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config_type = match parse_args().into_iter().next() {
        Some(path) if std::env::var(ConfigType::Probe.env_var_name()).is_err() => {
            ConfigType::Custom(path)
        }
        _ => ConfigType::Probe,
    };
    let config_path = load_config_from_env(config_type);
    let config = ProbeConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    init_tracing(&config.log_level);

    let mut app = ProbeApp::new(config);
    app.execute().await
}
