//! Burrow CLI - sign and verify control-plane messages
//!
//! Handy for checking an auth configuration against a server or a remote
//! identity authority without starting a tunnel.

use anyhow::{bail, Context, Result};
use burrow_auth::keyed_hash::{auth_key, unix_now};
use burrow_auth::{AuthConfig, AuthSetter, AuthVerifier, ClientAuth, ServerAuth};
use burrow_proto::{Login, NewWorkConn, Ping};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LONG_VERSION: &str = concat!(
    env!("GIT_TAG"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

/// Burrow - control-plane authentication toolkit
#[derive(Parser, Debug)]
#[command(name = "burrow")]
#[command(about = "Sign and verify burrow control messages")]
#[command(version, long_version = LONG_VERSION)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    Login,
    Ping,
    NewWorkConn,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the privilege key for a secret and timestamp
    Key {
        /// Shared secret
        #[arg(long, env = "BURROW_TOKEN")]
        secret: String,

        /// Unix timestamp in seconds
        #[arg(long)]
        timestamp: i64,
    },

    /// Build a control message, sign it and print it as JSON
    #[command(long_about = r#"
Build a control message, sign it with the configured auth method and print
it as JSON on stdout.

EXAMPLES:
  # Sign a login with the current time
  burrow sign --config auth.yml --kind login

  # Sign a login for a fixed timestamp
  burrow sign --config auth.yml --kind login --timestamp 1700000000

ENVIRONMENT VARIABLES:
  BURROW_AUTH_CONFIG     Path to the auth config file
    "#)]
    Sign {
        /// Auth config file (YAML)
        #[arg(long, env = "BURROW_AUTH_CONFIG")]
        config: PathBuf,

        /// Message to sign
        #[arg(long, value_enum)]
        kind: Kind,

        /// Login timestamp (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,

        /// Run ID for login and new work connection messages
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Verify a JSON control message
    Verify {
        /// Auth config file (YAML)
        #[arg(long, env = "BURROW_AUTH_CONFIG")]
        config: PathBuf,

        /// Message kind
        #[arg(long, value_enum)]
        kind: Kind,

        /// JSON message file, or "-" for stdin
        #[arg(long, default_value = "-")]
        message: String,
    },
}

/// Setup logging with the specified log level
fn setup_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

fn load_config(path: &Path) -> Result<AuthConfig> {
    let config = AuthConfig::load(path)
        .with_context(|| format!("Failed to load auth config: {:?}", path))?;
    debug!("Loaded {} auth config from {:?}", config.method, path);
    Ok(config)
}

fn read_message(source: &str) -> Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read message from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read message file: {}", source))
    }
}

fn sign(
    config: &AuthConfig,
    kind: Kind,
    timestamp: Option<i64>,
    run_id: Option<String>,
) -> Result<String> {
    let client = ClientAuth::from_config(config).context("Invalid client auth config")?;
    let run_id = run_id.unwrap_or_default();

    let json = match kind {
        Kind::Login => {
            let timestamp = timestamp.unwrap_or_else(unix_now);
            let mut login = Login::new(run_id, timestamp);
            login.hostname = std::env::var("HOSTNAME").unwrap_or_default();
            client.set_login(&mut login)?;
            serde_json::to_string_pretty(&login)?
        }
        Kind::Ping => {
            let mut ping = Ping::default();
            client.set_ping(&mut ping)?;
            serde_json::to_string_pretty(&ping)?
        }
        Kind::NewWorkConn => {
            let run_id = if run_id.is_empty() {
                format!("run-{}", uuid::Uuid::new_v4())
            } else {
                run_id
            };
            let mut conn = NewWorkConn::new(run_id);
            client.set_new_work_conn(&mut conn)?;
            serde_json::to_string_pretty(&conn)?
        }
    };

    Ok(json)
}

async fn verify(config: &AuthConfig, kind: Kind, raw: &str) -> Result<()> {
    let server = ServerAuth::from_config(config, None).context("Invalid server auth config")?;

    match kind {
        Kind::Login => {
            let login: Login = serde_json::from_str(raw).context("Failed to parse Login")?;
            server.verify_login(&login).await?;
        }
        Kind::Ping => {
            let ping: Ping = serde_json::from_str(raw).context("Failed to parse Ping")?;
            server.verify_ping(&ping).await?;
        }
        Kind::NewWorkConn => {
            let conn: NewWorkConn =
                serde_json::from_str(raw).context("Failed to parse NewWorkConn")?;
            server.verify_new_work_conn(&conn).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Key { secret, timestamp } => {
            println!("{}", auth_key(&secret, timestamp));
            Ok(())
        }
        Commands::Sign {
            config,
            kind,
            timestamp,
            run_id,
        } => {
            let config = load_config(&config)?;
            let json = sign(&config, kind, timestamp, run_id)?;
            println!("{}", json);
            Ok(())
        }
        Commands::Verify {
            config,
            kind,
            message,
        } => {
            let config = load_config(&config)?;
            let raw = read_message(&message)?;

            match verify(&config, kind, &raw).await {
                Ok(()) => {
                    info!("{:?} accepted", kind);
                    println!("ok");
                    Ok(())
                }
                Err(e) => {
                    error!("{:?} rejected: {:#}", kind, e);
                    bail!("verification failed: {:#}", e)
                }
            }
        }
    }
}
