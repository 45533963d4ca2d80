//! Affirm daemon: operator CLI for the address verification node.
//!
//! Every command opens the node, performs one operation and prints its
//! result as JSON on stdout. Logs go to stderr.

use std::path::PathBuf;

use affirm_node::{AffirmNode, NodeConfig};
use affirm_store::{MailTemplate, MessageStatus};
use affirm_types::{FlowId, IdentityId, Timestamp, Via};
use affirm_utils::{init_logging, LogFormat};
use affirm_verification::{
    parse_verification_link, FlowState, MailError, MailTransport, VerificationError,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

#[derive(Parser)]
#[command(name = "affirm", about = "Address verification node")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "AFFIRM_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for the LMDB environment.
    #[arg(long, env = "AFFIRM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Public base URL verification links are built under.
    #[arg(long, env = "AFFIRM_PUBLIC_URL")]
    public_url: Option<String>,

    /// Lifetime of a challenge's token and code, in seconds.
    #[arg(long, env = "AFFIRM_CHALLENGE_LIFESPAN")]
    challenge_lifespan: Option<u64>,

    /// Lifetime of the browser-facing flow, in seconds.
    #[arg(long, env = "AFFIRM_FLOW_LIFESPAN")]
    flow_lifespan: Option<u64>,

    /// Wrong codes allowed per challenge (0 disables the bound).
    #[arg(long, env = "AFFIRM_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "AFFIRM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "AFFIRM_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register an identity with an email address and mail a verification link.
    Register {
        #[arg(long)]
        identity: String,
        #[arg(long)]
        email: String,
    },
    /// Change an identity's email address (settings edit).
    ChangeEmail {
        #[arg(long)]
        identity: String,
        #[arg(long)]
        email: String,
    },
    /// Request verification for an address value ("resend" form).
    Resend {
        #[arg(long)]
        email: String,
    },
    /// Open a verification link.
    OpenLink { url: String },
    /// Submit the code for a flow.
    Submit {
        #[arg(long)]
        flow: String,
        #[arg(long)]
        code: String,
    },
    /// Show an identity's addresses and their verification state.
    Status {
        #[arg(long)]
        identity: String,
    },
    /// List every flow issued for an identity's email address, oldest first.
    History {
        #[arg(long)]
        identity: String,
    },
    /// Inspect a flow.
    Flow {
        #[command(subcommand)]
        action: FlowAction,
    },
    /// Inspect or drain the courier outbox.
    Outbox {
        #[command(subcommand)]
        action: OutboxAction,
    },
    /// Expire every challenge whose lifetime ran out.
    Sweep,
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Subcommand)]
enum FlowAction {
    /// Current state of a flow.
    Resume { flow: String },
    /// What a resend offer for an expired flow would show.
    Expired { flow: String },
}

#[derive(Subcommand)]
enum OutboxAction {
    /// List messages.
    List {
        /// Only messages still waiting for delivery.
        #[arg(long)]
        queued: bool,
    },
    /// Deliver queued messages to stdout as JSON lines.
    Send,
}

/// Delivers mail by printing it, one JSON object per line.
struct StdoutTransport;

impl MailTransport for StdoutTransport {
    fn send(&self, template: &MailTemplate) -> Result<(), MailError> {
        let line =
            serde_json::to_string(template).map_err(|e| MailError::Rejected(e.to_string()))?;
        println!("{line}");
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = effective_config(&cli)?;
    init_logging(config.log_format, &config.log_level)
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;

    // Printing the configuration must not create the data directory.
    if let Command::Config = cli.command {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let node = AffirmNode::open(config).context("failed to open verification node")?;
    run(&node, cli.command)
}

/// File settings first, then CLI flags and env vars on top.
fn effective_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let base = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => NodeConfig::default(),
    };
    Ok(NodeConfig {
        data_dir: cli.data_dir.clone().unwrap_or(base.data_dir),
        public_url: cli.public_url.clone().unwrap_or(base.public_url),
        challenge_lifespan_secs: cli
            .challenge_lifespan
            .unwrap_or(base.challenge_lifespan_secs),
        flow_lifespan_secs: cli.flow_lifespan.unwrap_or(base.flow_lifespan_secs),
        max_attempts: cli.max_attempts.unwrap_or(base.max_attempts),
        log_level: cli.log_level.clone().unwrap_or(base.log_level),
        log_format: cli.log_format.unwrap_or(base.log_format),
        ..base
    })
}

fn run(node: &AffirmNode, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Register { identity, email } => {
            let identity = IdentityId::new(identity)?;
            emit(&node.register(&identity, &email)?)
        }
        Command::ChangeEmail { identity, email } => {
            let identity = IdentityId::new(identity)?;
            emit(&node.change_email(&identity, &email)?)
        }
        Command::Resend { email } => emit(&verified(
            node.engine().request_verification_by_value(Via::Email, &email),
        )?),
        Command::OpenLink { url } => {
            let opened = parse_verification_link(&url)
                .and_then(|(flow, token)| node.engine().start_flow_from_link(&flow, &token));
            emit(&verified(opened)?)
        }
        Command::Submit { flow, code } => {
            let flow = FlowId::from_hex(&flow)?;
            emit(&verified(node.engine().submit_code(&flow, &code))?)
        }
        Command::Status { identity } => {
            let identity = IdentityId::new(identity)?;
            emit(&node.engine().addresses(&identity)?)
        }
        Command::History { identity } => {
            let identity = IdentityId::new(identity)?;
            let now = Timestamp::now();
            let mut flows: Vec<FlowState> = Vec::new();
            for address in node.engine().addresses(&identity)? {
                flows.extend(
                    node.engine()
                        .history(&address.id)?
                        .iter()
                        .map(|c| FlowState::from_challenge(c, now)),
                );
            }
            emit(&flows)
        }
        Command::Flow { action } => match action {
            FlowAction::Resume { flow } => {
                let flow = FlowId::from_hex(&flow)?;
                emit(&verified(node.flows().resume(&flow))?)
            }
            FlowAction::Expired { flow } => {
                let flow = FlowId::from_hex(&flow)?;
                emit(&verified(node.flows().render_expired_context(&flow))?)
            }
        },
        Command::Outbox { action } => match action {
            OutboxAction::List { queued } => {
                let filter = queued.then_some(MessageStatus::Queued);
                emit(&node.outbox().messages(filter)?)
            }
            OutboxAction::Send => {
                let sent = node.courier().dispatch_queued(&StdoutTransport)?;
                tracing::info!(sent, "outbox delivered to stdout");
                Ok(())
            }
        },
        Command::Sweep => emit(&json!({ "expired": node.engine().sweep_expired()? })),
        Command::Config => {
            print!("{}", node.config().to_toml_string()?);
            Ok(())
        }
    }
}

/// Recoverable verification errors are answers, not crashes: print them as
/// JSON so a caller can act on them, then exit non-zero.
fn verified<T>(result: Result<T, VerificationError>) -> anyhow::Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_recoverable() => {
            let body = match &e {
                VerificationError::ExpiredFlow(context) => {
                    json!({ "error": "expired_flow", "context": context })
                }
                VerificationError::InvalidCode { attempts_remaining } => {
                    json!({ "error": "invalid_code", "attempts_remaining": attempts_remaining })
                }
                other => json!({ "error": other.to_string() }),
            };
            println!("{body}");
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn emit<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
