//! # MQ Relay CLI
//!
//! Command-line interface for the mq-relay message adapter.
//!
//! This module provides CLI commands for:
//! - Encoding and decoding payloads in a wire format
//! - Checking a delivery delay against the broker bound
//! - Validating and printing the resolved configuration
//! - Simulating a redelivery chain on an in-memory topic

use clap::{CommandFactory, Parser, Subcommand};
use mq_relay_core::rules::{
    CHAIN_ID_PROPERTY, ORIGIN_ID_PROPERTY, ORIGIN_PUBLISH_TIME_PROPERTY,
    TOTAL_CONSUMED_TIMES_PROPERTY,
};
use mq_relay_core::{
    codec, handler_fn, verify_delay_in_range, BoxError, ConsumerSettings, Message,
    ProducerSettings, RelayClient, RelayConfig, RelayError, MAX_DELIVER_OFFSET_SECS,
};
use mq_relay_runtime::InMemoryBroker;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// MQ Relay CLI - message codec and redelivery tooling
#[derive(Parser)]
#[command(name = "mq-relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Message codec and redelivery tooling for topic brokers")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MQ_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Encode text into its wire form
    Encode {
        /// Text to encode
        text: String,

        /// Wire format (raw, b64, h16 and synonyms)
        #[arg(short, long)]
        format: Option<String>,

        /// Character set
        #[arg(long)]
        charset: Option<String>,
    },

    /// Decode a wire string back into text
    Decode {
        /// Wire string to decode
        wire: String,

        /// Wire format (raw, b64, h16 and synonyms)
        #[arg(short, long)]
        format: Option<String>,

        /// Character set
        #[arg(long)]
        charset: Option<String>,
    },

    /// Check a delivery delay in seconds against the broker bound
    VerifyDelay {
        #[arg(allow_hyphen_values = true)]
        seconds: i64,
    },

    /// Validate configuration
    Config {
        /// Configuration file to validate
        #[arg(long)]
        file: Option<PathBuf>,

        /// Show resolved configuration
        #[arg(short, long)]
        show: bool,

        /// Output format for configuration
        #[arg(short = 'f', long, default_value = "yaml")]
        format: ConfigFormat,
    },

    /// Publish a message to an in-memory topic and retry it repeatedly
    Simulate {
        /// Number of retries to request
        #[arg(long, default_value = "2")]
        hops: u32,

        /// Message body
        #[arg(long, default_value = "hello")]
        body: String,

        /// Message tag
        #[arg(long, default_value = "t1")]
        tag: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Configuration format options
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
    /// TOML format
    Toml,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Could not render configuration as {format}: {message}")]
    Serialization { format: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Relay(RelayError::Configuration(_)) => 1,
            Self::Relay(RelayError::UnsupportedFormat { .. }) => 1,
            Self::Relay(RelayError::DeliveryDelayOutOfRange { .. }) => 2,
            Self::Relay(_) => 6,
            Self::CommandFailed { .. } => 3,
            Self::InvalidArgument { .. } => 4,
            Self::Serialization { .. } => 3,
            Self::Io(_) => 5,
        }
    }
}

// ============================================================================
// Main CLI Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli.log_level, cli.json_logs)?;

    match cli.command {
        Commands::Completions { shell } => {
            execute_completions_command(shell);
            Ok(())
        }
        command => {
            let output = execute(command, cli.config).await?;
            print!("{output}");
            Ok(())
        }
    }
}

/// Run a command, returning what it prints
pub async fn execute(command: Commands, config: Option<PathBuf>) -> Result<String, CliError> {
    match command {
        Commands::Encode {
            text,
            format,
            charset,
        } => execute_encode_command(&text, format.as_deref(), charset.as_deref()),
        Commands::Decode {
            wire,
            format,
            charset,
        } => execute_decode_command(&wire, format.as_deref(), charset.as_deref()),
        Commands::VerifyDelay { seconds } => execute_verify_delay_command(seconds),
        Commands::Config { file, show, format } => {
            execute_config_command(file.or(config), show, format)
        }
        Commands::Simulate { hops, body, tag } => {
            execute_simulate_command(hops, &body, &tag).await
        }
        Commands::Completions { .. } => Err(CliError::InvalidArgument {
            arg: "completions".to_string(),
            message: "completions are written directly to stdout".to_string(),
        }),
    }
}

/// Install the tracing subscriber; `RUST_LOG` wins over `level`
pub fn initialize_logging(level: &str, json: bool) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| CliError::InvalidArgument {
            arg: "log-level".to_string(),
            message: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    result.map_err(|e| CliError::CommandFailed {
        message: format!("logging initialization failed: {e}"),
    })
}

// ============================================================================
// Command Implementations
// ============================================================================

fn execute_encode_command(
    text: &str,
    format: Option<&str>,
    charset: Option<&str>,
) -> Result<String, CliError> {
    let encoded = codec::encode_named(Some(text), format, charset)?.unwrap_or_default();
    Ok(format!("{encoded}\n"))
}

fn execute_decode_command(
    wire: &str,
    format: Option<&str>,
    charset: Option<&str>,
) -> Result<String, CliError> {
    let decoded = codec::decode_named(Some(wire), format, charset)?.unwrap_or_default();
    Ok(format!("{decoded}\n"))
}

fn execute_verify_delay_command(seconds: i64) -> Result<String, CliError> {
    verify_delay_in_range(seconds)?;
    Ok(format!(
        "Delay {seconds}s is within (0,{MAX_DELIVER_OFFSET_SECS}]\n"
    ))
}

fn execute_config_command(
    file: Option<PathBuf>,
    show: bool,
    format: ConfigFormat,
) -> Result<String, CliError> {
    let config = RelayConfig::load(file.as_deref())?;
    info!(
        consumers = config.consumers.len(),
        producers = config.producers.len(),
        "Configuration loaded"
    );

    if !show {
        return Ok(format!(
            "Configuration is valid: {} consumer(s), {} producer(s)\n",
            config.consumers.len(),
            config.producers.len()
        ));
    }

    render_config(&config, format)
}

fn render_config(config: &RelayConfig, format: ConfigFormat) -> Result<String, CliError> {
    let failed = |format: &str, message: String| CliError::Serialization {
        format: format.to_string(),
        message,
    };

    match format {
        ConfigFormat::Yaml => {
            serde_yaml::to_string(config).map_err(|e| failed("yaml", e.to_string()))
        }
        ConfigFormat::Json => serde_json::to_string_pretty(config)
            .map(|json| json + "\n")
            .map_err(|e| failed("json", e.to_string())),
        ConfigFormat::Toml => {
            toml::to_string_pretty(config).map_err(|e| failed("toml", e.to_string()))
        }
    }
}

const SIMULATION_INSTANCE: &str = "local";
const SIMULATION_TOPIC: &str = "simulation";
const SIMULATION_GROUP: &str = "simulation-group";

/// Publish one message, request `hops` retries and report the provenance
/// seen on every delivery
async fn execute_simulate_command(hops: u32, body: &str, tag: &str) -> Result<String, CliError> {
    let broker = InMemoryBroker::default();
    let mut config = RelayConfig::default();
    config.producers.insert(
        SIMULATION_TOPIC.to_string(),
        ProducerSettings::new(SIMULATION_INSTANCE, SIMULATION_TOPIC),
    );
    let mut consumer_settings =
        ConsumerSettings::new(SIMULATION_INSTANCE, SIMULATION_TOPIC, SIMULATION_GROUP);
    consumer_settings.timeout = 0;
    config
        .consumers
        .insert(SIMULATION_TOPIC.to_string(), consumer_settings);

    let client = RelayClient::with_standard_rules(config, Arc::new(broker.clone()))?;
    let producer = client.create_producer(SIMULATION_TOPIC)?;
    let consumer = client.create_consumer(SIMULATION_TOPIC)?;
    let topic = broker.topic(SIMULATION_INSTANCE, SIMULATION_TOPIC);

    let id = producer
        .publish(&Message::new(body).with_tag(tag))
        .await?;

    let mut output = String::new();
    let wire = topic
        .published()
        .first()
        .and_then(|m| m.body.clone())
        .unwrap_or_default();
    let _ = writeln!(output, "published {id} body={wire}");

    for hop in 0..=hops {
        let received: Mutex<Option<Message>> = Mutex::new(None);
        let retry = hop < hops;
        let handler = handler_fn(|message: &Message| {
            if let Ok(mut slot) = received.lock() {
                *slot = Some(message.clone());
            }
            Ok::<u64, BoxError>(if retry { 1 } else { 0 })
        });

        let report = consumer.consume(&handler).await?;
        let message = received
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or_else(|| CliError::CommandFailed {
                message: format!("hop {hop} delivered nothing ({report:?})"),
            })?;

        let property = |key: &str| message.property(key).unwrap_or("-").to_string();
        let _ = writeln!(
            output,
            "hop {hop}: id={} origin={} chain={} origin_publish_time={} total_consumed_times={}",
            message.id.as_ref().map(|i| i.as_str()).unwrap_or("-"),
            property(ORIGIN_ID_PROPERTY),
            property(CHAIN_ID_PROPERTY),
            property(ORIGIN_PUBLISH_TIME_PROPERTY),
            property(TOTAL_CONSUMED_TIMES_PROPERTY),
        );

        // Skip the retry delay
        topic.release_scheduled();
    }

    Ok(output)
}

/// Write completions for `shell` to stdout
fn execute_completions_command(shell: clap_complete::Shell) {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
}
