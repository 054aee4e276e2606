//! mqttsub - Main Entry Point
//!
//! Parses the command line, loads configuration and runs one subscriber
//! session until the user quits or the session fails.

use clap::Parser;
use mqttsub::config::{ClientConfig, DEFAULT_CONFIG_FILE};
use mqttsub::observability::init_default_logging;
use mqttsub::{aggregate, create_handler, AppResult, CliInput, ConnectionLifecycle, MqttBroker};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Subscribe to MQTT topics and print incoming messages
#[derive(Parser, Debug)]
#[command(name = "mqttsub")]
#[command(about = "Subscribe to MQTT topics and print incoming messages")]
#[command(version)]
struct Cli {
    /// Connection protocol (tcp or ssl) [default: tcp]
    #[arg(long, value_name = "PROTO")]
    proto: Option<String>,

    /// Broker IPv4 address [default: 127.0.0.1]
    #[arg(long, value_name = "IP")]
    ip: Option<String>,

    /// Broker port [default: 1883]
    #[arg(long, value_name = "PORT", allow_hyphen_values = true)]
    port: Option<String>,

    /// Topics to subscribe to; cannot be combined with --device or --sensors
    #[arg(long, value_name = "TOPIC", num_args = 1.., value_delimiter = ',')]
    topics: Option<Vec<String>>,

    /// Device whose sensors to subscribe to
    #[arg(long, value_name = "DEVICE")]
    device: Option<String>,

    /// Sensors to subscribe to, under --device when given
    #[arg(long, value_name = "SENSOR", num_args = 1.., value_delimiter = ',')]
    sensors: Option<Vec<String>>,

    /// QoS level per topic (0, 1 or 2); the last value repeats [default: 1]
    #[arg(
        long,
        value_name = "QOS",
        num_args = 1..,
        value_delimiter = ',',
        allow_hyphen_values = true
    )]
    qos: Option<Vec<String>>,

    /// Print payloads verbatim (default handler)
    #[arg(long)]
    raw: bool,

    /// Pretty-print JSON payloads
    #[arg(long)]
    json: bool,

    /// Configuration file path [default: ./mqttsub.toml if present]
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn input(&self) -> CliInput {
        CliInput {
            proto: self.proto.clone(),
            ip: self.ip.clone(),
            port: self.port.clone(),
            topics: self.topics.clone(),
            device: self.device.clone(),
            sensors: self.sensors.clone(),
            qos: self.qos.clone(),
            raw: self.raw,
            json: self.json,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.verbose);

    if let Err(e) = run(&cli).await {
        error!("{}", e);
        process::exit(1);
    }

    info!("Subscriber shutdown complete");
}

async fn run(cli: &Cli) -> AppResult<()> {
    let config = ClientConfig::load_or_default(cli.config.as_deref(), Path::new(DEFAULT_CONFIG_FILE))?;
    let params = aggregate(config.apply_broker_defaults(cli.input()))?;

    info!(
        "Connecting to the MQTT server '{}' with client id prefix '{}'",
        params.connection.server_uri(),
        config.session.client_id
    );

    let (broker, events) = MqttBroker::new(config.session.clone());
    let mut lifecycle = ConnectionLifecycle::new(
        broker,
        events,
        params.connection,
        params.subscriptions,
        create_handler(params.handler),
        config.retry.policy(),
    );

    info!("Press Q<Enter> or Ctrl+C to quit");
    lifecycle.run(spawn_shutdown_listener()).await?;
    Ok(())
}

/// Turn a `q` line on stdin or Ctrl+C into the lifecycle's shutdown signal
fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    let tx = Arc::new(tx);

    let signal_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            let _ = signal_tx.send(true);
        }
    });

    // Blocking stdin reads stay on their own thread so they never hold up runtime shutdown
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                    let _ = tx.send(true);
                    return;
                }
                Ok(_) => {}
                Err(_) => return,
            }
        }
    });

    rx
}
