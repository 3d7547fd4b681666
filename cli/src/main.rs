//! medic CLI - drive medic agents from the command line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use medic::protocol::Invitation;
use medic::{
    attribute_values, launch, AgentConfig, AgentEvent, AgentHandle, AttributeValues, Did,
    MemoryLedger, MemoryRelay,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// medic agent CLI
#[derive(Parser)]
#[command(name = "medic")]
#[command(about = "Connect agents, issue claims and prove them", long_about = None)]
struct Cli {
    /// Path to agent config file (default: platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Invitation tooling
    Invite {
        #[command(subcommand)]
        action: InviteAction,
    },
    /// Agent configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run a steward, a doctor and a patient through every protocol in-process
    Demo {
        /// Print every agent event as JSON
        #[arg(long)]
        events: bool,

        /// Seconds to wait for each step
        #[arg(long, default_value = "5")]
        timeout: u64,
    },
}

#[derive(Subcommand)]
enum InviteAction {
    /// Decode and print an invitation code
    Decode { code: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a configuration file
    Init {
        /// Owner label
        #[arg(short, long)]
        label: Option<String>,

        /// Answer connection requests immediately
        #[arg(long)]
        auto_respond: bool,

        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

fn get_config_path(cli_path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_path {
        return Ok(path);
    }

    let proj_dirs = directories::ProjectDirs::from("org", "medic", "medic")
        .context("Could not determine config directory")?;

    Ok(proj_dirs.config_dir().join("config.json"))
}

/// Defaults when the file does not exist yet.
fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        return Ok(AgentConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read config file: {}", path.display()))?;
    serde_json::from_str(&contents).context("Invalid config file format")
}

fn cmd_invite_decode(code: &str) -> Result<()> {
    let invitation = Invitation::decode(code).context("Not a valid invitation code")?;

    println!("Invitation:");
    println!("  From: {}", invitation.label);
    println!("  Connection key: {}", invitation.connection_key()?);
    println!("  Issuer ready: {}", invitation.initialized);
    println!();
    println!("{}", serde_json::to_string_pretty(&invitation)?);

    Ok(())
}

fn cmd_config_show(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    println!("# {}", path.display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_config_init(
    path: &Path,
    label: Option<String>,
    auto_respond: bool,
    force: bool,
) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    let mut config = label.map(AgentConfig::new).unwrap_or_default();
    config.auto_respond = auto_respond;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&config)?)
        .with_context(|| format!("Could not write config file: {}", path.display()))?;

    println!("Wrote config for '{}' to {}", config.label, path.display());
    Ok(())
}

/// Waits on one agent's event stream.
struct Watcher {
    events: broadcast::Receiver<AgentEvent>,
    timeout: Duration,
}

impl Watcher {
    fn new(agent: &AgentHandle, timeout: Duration) -> Self {
        Self {
            events: agent.subscribe(),
            timeout,
        }
    }

    async fn until<T>(&mut self, mut pick: impl FnMut(&AgentEvent) -> Option<T>) -> Result<T> {
        let events = &mut self.events;
        tokio::time::timeout(self.timeout, async move {
            loop {
                match events.recv().await {
                    Ok(AgentEvent::ExchangeAborted {
                        message_type,
                        reason,
                    }) => anyhow::bail!("{message_type} aborted: {reason}"),
                    Ok(event) => {
                        if let Some(found) = pick(&event) {
                            return Ok(found);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "event stream lagged")
                    }
                    Err(broadcast::error::RecvError::Closed) => anyhow::bail!("agent stopped"),
                }
            }
        })
        .await
        .context("Timed out waiting for agent")?
    }
}

/// Connect two agents; returns each side's DID for the other.
async fn connect(
    inviter: &AgentHandle,
    invitee: &AgentHandle,
    timeout: Duration,
) -> Result<(Did, Did)> {
    let mut inviter_events = Watcher::new(inviter, timeout);
    let mut invitee_events = Watcher::new(invitee, timeout);

    let code = inviter.generate_invitation().await?;
    println!("  {} invites: {}...", inviter.label(), &code[..code.len().min(32)]);
    let key = invitee.receive_invitation(&code).await?;
    invitee.send_request(key).await?;

    let invitee_did = inviter_events
        .until(|e| match e {
            AgentEvent::ConnectionRequested {
                connection_key,
                their_did,
                ..
            } if *connection_key == key => Some(their_did.clone()),
            _ => None,
        })
        .await?;
    println!("  {} requested ({})", invitee.label(), invitee_did);
    inviter.send_response(key).await?;

    let inviter_did = invitee_events
        .until(|e| match e {
            AgentEvent::ConnectionEstablished { their_did, .. } => Some(their_did.clone()),
            _ => None,
        })
        .await?;
    println!("  {} <-> {} established", inviter.label(), invitee.label());
    Ok((invitee_did, inviter_did))
}

async fn issue(
    issuer: &AgentHandle,
    holder: &AgentHandle,
    holder_did: &Did,
    schema_type: &str,
    timeout: Duration,
) -> Result<()> {
    let mut holder_events = Watcher::new(holder, timeout);
    let nonce = issuer.offer_credential(holder_did, schema_type).await?;
    println!("  {} offers '{}' (nonce {})", issuer.label(), schema_type, nonce);

    holder_events
        .until(|e| match e {
            AgentEvent::CredentialStored { schema_type: t, .. } if t == schema_type => Some(()),
            _ => None,
        })
        .await?;
    println!("  {} stored '{}'", holder.label(), schema_type);
    Ok(())
}

fn medical_values() -> AttributeValues {
    attribute_values([
        ("first_name", "Bob"),
        ("last_name", "Smith"),
        ("degree", "Doctor"),
        ("level", "Heart"),
        ("year", "2015"),
        ("status", "Good"),
    ])
}

fn consent_values() -> AttributeValues {
    attribute_values([
        ("first_name", "Alice"),
        ("last_name", "Garcia"),
        ("hospital", "Hospital Green"),
        ("status", "Active"),
    ])
}

fn print_events(agent: &AgentHandle) {
    let label = agent.label().to_string();
    let mut events = agent.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                println!("  [{label}] {json}");
            }
        }
    });
}

async fn cmd_demo(base: AgentConfig, events: bool, timeout: u64) -> Result<()> {
    let timeout = Duration::from_secs(timeout);
    let relay = MemoryRelay::new();
    let ledger = Arc::new(MemoryLedger::new());
    let agent = |label: &str| {
        let config = AgentConfig {
            label: label.to_string(),
            ..base.clone()
        };
        launch(config, ledger.clone(), &relay)
    };

    let (steward, steward_worker) = agent("Steward");
    let (doctor, doctor_worker) = agent("Doctor");
    let (patient, patient_worker) = agent("Patient");
    if events {
        for a in [&steward, &doctor, &patient] {
            print_events(a);
        }
    }

    println!("1. Steward setup");
    let nym = steward.publish_identity(Some("TRUST_ANCHOR")).await?;
    println!("  Public DID: {}", nym.did);
    let claim_types = [("medical", medical_values()), ("consent", consent_values())];
    for (schema_type, values) in claim_types {
        let definition = steward
            .register_claim_type(schema_type, schema_type, "1.0", values)
            .await?;
        println!("  Registered '{}' as {}", schema_type, definition.id);
    }

    println!("2. Connections");
    let (doctor_at_steward, _) = connect(&steward, &doctor, timeout).await?;
    let (patient_at_steward, _) = connect(&steward, &patient, timeout).await?;

    println!("3. Credentials");
    issue(&steward, &doctor, &doctor_at_steward, "medical", timeout).await?;
    issue(&steward, &patient, &patient_at_steward, "consent", timeout).await?;

    println!("4. Proof");
    let (doctor_at_patient, patient_at_doctor) = connect(&patient, &doctor, timeout).await?;
    patient.set_trust_anchors(vec![nym.did.clone()]).await?;
    let mut patient_events = Watcher::new(&patient, timeout);
    let nonce = doctor.offer_proof(&patient_at_doctor).await?;
    println!("  Doctor offers proof (nonce {})", nonce);
    let verified = patient_events
        .until(|e| match e {
            AgentEvent::ProofVerified { verified, .. } => Some(*verified),
            _ => None,
        })
        .await?;
    println!("  Patient verified doctor: {}", verified);
    anyhow::ensure!(
        patient.proof_outcome(&doctor_at_patient).await? == Some(verified),
        "Proof outcome disagrees with the verification event"
    );

    for (handle, worker) in [
        (steward, steward_worker),
        (doctor, doctor_worker),
        (patient, patient_worker),
    ] {
        handle.shutdown().await?;
        worker.await.context("Agent worker panicked")?;
    }

    println!();
    if verified {
        println!("✓ Demo complete");
        Ok(())
    } else {
        anyhow::bail!("Proof did not verify")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = get_config_path(cli.config)?;

    match cli.command {
        Commands::Invite { action } => match action {
            InviteAction::Decode { code } => cmd_invite_decode(&code),
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(&config_path),
            ConfigAction::Init {
                label,
                auto_respond,
                force,
            } => cmd_config_init(&config_path, label, auto_respond, force),
        },
        Commands::Demo { events, timeout } => {
            let config = load_config(&config_path)?;
            cmd_demo(config, events, timeout).await
        }
    }
}
