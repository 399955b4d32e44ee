//! Command-line tool for offline secure messaging
//!
//! Wraps plain command APDUs and unwraps protected responses with given
//! session keys and counter, for test rigs and trace analysis.

use clap::{Parser, Subcommand};
use healthcard_apdu_core::Command;
use healthcard_sm::{ChannelConfig, SequenceCounter, Session, SessionKeys, WireResponse};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(version, about = "Secure messaging wrap/unwrap tool for health cards")]
struct Cli {
    /// Encryption session key (hex, 16/24/32 bytes)
    #[arg(long)]
    enc_key: String,

    /// MAC session key (hex, 16/24/32 bytes)
    #[arg(long)]
    mac_key: String,

    /// Send sequence counter before the operation (hex, up to 16 bytes)
    #[arg(long, default_value = "00")]
    ssc: String,

    /// Refuse extended length wire commands
    #[arg(long)]
    short_only: bool,

    /// Debug level output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Protect a plain command APDU
    Wrap {
        /// Plain command APDU (hex)
        apdu: String,
    },

    /// Verify and decrypt a protected response APDU
    ///
    /// The counter is the value after the matching command was wrapped.
    Unwrap {
        /// Protected response including SW1 SW2 (hex)
        response: String,
    },
}

fn parse_counter(value: &str) -> Result<SequenceCounter, Box<dyn std::error::Error>> {
    let bytes = hex::decode(value)?;
    if bytes.len() > 16 {
        return Err("sequence counter is longer than 16 bytes".into());
    }
    let mut block = [0u8; 16];
    block[16 - bytes.len()..].copy_from_slice(&bytes);
    Ok(SequenceCounter::from_slice(&block)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let keys = SessionKeys::new(&hex::decode(&cli.enc_key)?, &hex::decode(&cli.mac_key)?)?;
    let counter = parse_counter(&cli.ssc)?;
    let config = ChannelConfig::new().with_extended_length(!cli.short_only);
    debug!(ssc = %counter, ?config, "Starting offline session");

    let mut session = Session::with_counter(keys, counter);

    match &cli.command {
        Commands::Wrap { apdu } => {
            let command = Command::from_bytes(&hex::decode(apdu)?)?;
            let wire = session.encrypt(&command)?;
            let bytes = wire.to_bytes(config.extended_length)?;
            info!(objects = wire.objects.len(), "Command protected");
            println!("wire: {}", hex::encode_upper(&bytes));
            println!("ssc:  {}", session.counter());
        }
        Commands::Unwrap { response } => {
            let wire = WireResponse::from_bytes(&hex::decode(response)?)?;
            let plain = session.decrypt(&wire)?;
            info!(status = %plain.status, "Response verified");
            println!("data:   {}", hex::encode_upper(&plain.data));
            println!("status: {} ({})", plain.status, plain.status.description());
            println!("ssc:    {}", session.counter());
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, &directives))
        .with_ansi(true)
        .init();
}

/// `--verbose` picks the default level; RUST_LOG directives refine it
fn log_filter(verbose: bool, directives: &str) -> EnvFilter {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(directives)
}
