//! molfleet CLI
//!
//! Command-line front end for a molfleet coordinator node

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use eyre::{WrapErr, eyre};
use kameo::actor::{ActorRef, Spawn};
use kameo::error::SendError;
use tokio::sync::broadcast;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use molfleet_api::{FleetEvent, ServiceAction};
use molfleet_client::{ArtifactBundle, HttpClient};
use molfleet_core::{
    ApplyToAll, ApplyUpdate, ControlService, FetchUpdateLog, FleetActor, FleetActorArgs,
    GetSnapshot, HostSelector, LoadSelf, RefreshServiceStatus, RefreshStaging, ReloadSession,
    RemoveStagedVersion, RolloutConfig, RolloutPhase, RolloutTarget, RunDiscovery,
    UploadArtifact,
};

mod config;
mod output;

use config::{Config, LogConfig};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// molfleet: update and control a fleet of mol nodes
#[derive(Parser)]
#[command(name = "molfleet", version, about, long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Coordinator URL, overriding the config file
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover nodes and list them
    Discover,

    /// Show the staging area
    Staging,

    /// Upload an artifact and its config into staging
    Upload {
        /// Artifact binary
        #[arg(long)]
        artifact: PathBuf,
        /// Configuration YAML
        #[arg(long)]
        artifact_config: PathBuf,
    },

    /// Remove the newest staged version
    #[command(alias = "rm")]
    Remove,

    /// Apply an update and wait for confirmation
    ///
    /// Without --ip or --all the coordinator's own node is updated from staging.
    Apply {
        /// Remote node address
        #[arg(long, conflicts_with = "all")]
        ip: Option<String>,
        /// Every remote node for which an update is available
        #[arg(long)]
        all: bool,
        /// Artifact to submit when nothing newer is staged
        #[arg(long, requires = "artifact_config")]
        artifact: Option<PathBuf>,
        /// Configuration YAML for --artifact
        #[arg(long, requires = "artifact")]
        artifact_config: Option<PathBuf>,
    },

    /// Control the managed service
    Service {
        #[command(subcommand)]
        command: ServiceCommand,
    },

    /// Show the last update output of the coordinator's node
    Log,

    /// Reload all state from the coordinator
    Reload,
}

impl ServiceCommand {
    fn ip(&self) -> Option<&str> {
        match self {
            ServiceCommand::Start { ip }
            | ServiceCommand::Stop { ip }
            | ServiceCommand::Status { ip } => ip.as_deref(),
        }
    }
}

impl Commands {
    /// Whether the command acts on the coordinator's own node
    fn targets_own_node(&self) -> bool {
        match self {
            Commands::Apply { ip, all, .. } => ip.is_none() && !all,
            Commands::Service { command } => command.ip().is_none(),
            _ => false,
        }
    }
}

#[derive(Subcommand)]
enum ServiceCommand {
    /// Start the service
    Start {
        #[arg(long)]
        ip: Option<String>,
    },
    /// Stop the service
    Stop {
        #[arg(long)]
        ip: Option<String>,
    },
    /// Show service status
    Status {
        #[arg(long)]
        ip: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(server) = &cli.server {
        config.server.url.clone_from(server);
    }
    init_tracing(&config.log, cli.json_logs);

    let client = HttpClient::new(&config.server.url)
        .wrap_err_with(|| format!("invalid server url {}", config.server.url))?
        .with_api_prefix(&config.server.api_prefix);
    tracing::debug!(server = %config.server.url, "connecting");

    let (event_tx, events) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let fleet = FleetActor::spawn(FleetActorArgs {
        api: Arc::new(client),
        event_tx,
        rollout: config.rollout.clone(),
    });

    let mut session = Session {
        fleet: fleet.clone(),
        events,
        rollout: config.rollout,
        json: cli.json,
    };
    let result = session.run(cli.command).await;

    if let Err(e) = fleet.stop_gracefully().await {
        tracing::debug!(error = ?e, "actor already stopped");
    }
    result
}

fn init_tracing(log: &LogConfig, json_logs: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let registry = tracing_subscriber::registry().with(filter);

    if json_logs || log.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn ask_error<M, E: std::fmt::Display>(err: SendError<M, E>) -> eyre::Report {
    match err {
        SendError::HandlerError(e) => eyre!("{e}"),
        _ => actor_gone(()),
    }
}

fn actor_gone<E>(_err: E) -> eyre::Report {
    eyre!("coordinator actor is not running")
}

async fn read_bundle(artifact: &Path, config: &Path) -> Result<ArtifactBundle> {
    ArtifactBundle::from_files(artifact, config)
        .await
        .wrap_err_with(|| format!("failed to read {}", artifact.display()))
}

/// Worst-case wait for one rollout to reach a terminal phase
fn rollout_timeout(rollout: &RolloutConfig) -> Duration {
    let schedule = rollout.schedule();
    let polls = schedule.initial + schedule.retry * rollout.max_attempts.saturating_sub(1);
    let reload = rollout.countdown_tick() * rollout.reload_countdown;
    polls + reload + Duration::from_secs(60)
}

fn terminal_phase(to: &str) -> Option<RolloutPhase> {
    [
        RolloutPhase::Confirmed,
        RolloutPhase::Exhausted,
        RolloutPhase::Failed,
    ]
    .into_iter()
    .find(|phase| phase.to_string() == to)
}

struct Session {
    fleet: ActorRef<FleetActor>,
    events: broadcast::Receiver<FleetEvent>,
    rollout: RolloutConfig,
    json: bool,
}

impl Session {
    async fn run(&mut self, command: Commands) -> Result<()> {
        if let Err(e) = self.fleet.ask(LoadSelf).await {
            if command.targets_own_node() {
                return Err(ask_error(e));
            }
            tracing::warn!(error = %ask_error(e), "own node unavailable; continuing");
        }

        match command {
            Commands::Discover => {
                let count = self.discover().await?;
                tracing::info!(count, "discovery finished");
                self.print_snapshot().await
            }
            Commands::Staging => {
                let state = self.fleet.ask(RefreshStaging).await.map_err(ask_error)?;
                if self.json {
                    return output::json(&state);
                }
                let snapshot = self.fleet.ask(GetSnapshot).await.map_err(actor_gone)?;
                output::staging(&state, snapshot.last_uploaded.as_deref());
                Ok(())
            }
            Commands::Upload {
                artifact,
                artifact_config,
            } => {
                let bundle = read_bundle(&artifact, &artifact_config).await?;
                let version = self
                    .fleet
                    .ask(UploadArtifact { bundle })
                    .await
                    .map_err(ask_error)?;
                println!("staged {version}");
                Ok(())
            }
            Commands::Remove => {
                self.fleet.ask(RefreshStaging).await.map_err(ask_error)?;
                let removed = self
                    .fleet
                    .ask(RemoveStagedVersion)
                    .await
                    .map_err(ask_error)?;
                println!("removed {removed}");
                Ok(())
            }
            Commands::Apply {
                ip,
                all,
                artifact,
                artifact_config,
            } => {
                let inline = match (artifact, artifact_config) {
                    (Some(artifact), Some(config)) => Some(read_bundle(&artifact, &config).await?),
                    _ => None,
                };
                self.apply(ip, all, inline).await
            }
            Commands::Service { command } => self.service(command).await,
            Commands::Log => {
                let output = self.fleet.ask(FetchUpdateLog).await.map_err(ask_error)?;
                print!("{output}");
                Ok(())
            }
            Commands::Reload => {
                self.fleet.ask(ReloadSession).await.map_err(ask_error)?;
                self.print_snapshot().await
            }
        }
    }

    async fn print_snapshot(&self) -> Result<()> {
        let snapshot = self.fleet.ask(GetSnapshot).await.map_err(actor_gone)?;
        if self.json {
            return output::json(&snapshot);
        }
        output::snapshot(&snapshot);
        Ok(())
    }

    async fn next_event(&mut self) -> Result<FleetEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(eyre!("event stream closed"));
                }
            }
        }
    }

    /// Run one discovery pass and wait for it to end
    async fn discover(&mut self) -> Result<usize> {
        self.fleet.ask(RunDiscovery).await.map_err(ask_error)?;

        tokio::time::timeout(DISCOVERY_TIMEOUT, self.follow_discovery())
            .await
            .map_err(|_| eyre!("discovery did not finish within {DISCOVERY_TIMEOUT:?}"))?
    }

    async fn follow_discovery(&mut self) -> Result<usize> {
        loop {
            match self.next_event().await? {
                FleetEvent::DiscoveryCompleted { count } => return Ok(count),
                FleetEvent::DiscoveryFailed { message } => {
                    return Err(eyre!("discovery failed: {message}"));
                }
                event => output::event(&event),
            }
        }
    }

    /// Resolve an optional address, discovering first when one is given
    async fn select(&mut self, ip: Option<String>) -> Result<HostSelector> {
        match ip {
            Some(ip) => {
                self.discover().await?;
                Ok(HostSelector::Ip(ip))
            }
            None => Ok(HostSelector::SelfHost),
        }
    }

    async fn apply(
        &mut self,
        ip: Option<String>,
        all: bool,
        inline: Option<ArtifactBundle>,
    ) -> Result<()> {
        self.fleet.ask(RefreshStaging).await.map_err(ask_error)?;

        if all {
            self.discover().await?;
            let started = self
                .fleet
                .ask(ApplyToAll { inline })
                .await
                .map_err(ask_error)?;
            if started == 0 {
                println!("every node is up to date");
                return Ok(());
            }
            return self.await_rollouts(started).await;
        }

        let target = self.select(ip).await?;
        let target = self
            .fleet
            .ask(ApplyUpdate { target, inline })
            .await
            .map_err(ask_error)?;

        match target {
            RolloutTarget::SelfHost => self.await_reload().await,
            RolloutTarget::Remote(_) => self.await_rollouts(1).await,
        }
    }

    /// Follow rollout notifications until `expected` rollouts end
    async fn await_rollouts(&mut self, expected: usize) -> Result<()> {
        let timeout = rollout_timeout(&self.rollout);
        let confirmed = tokio::time::timeout(timeout, self.follow_rollouts(expected))
            .await
            .map_err(|_| eyre!("rollouts still pending after {timeout:?}"))??;

        self.print_snapshot().await?;
        if confirmed < expected {
            return Err(eyre!(
                "{} of {expected} rollouts were not confirmed",
                expected - confirmed
            ));
        }
        Ok(())
    }

    /// Returns how many of the ended rollouts were confirmed
    async fn follow_rollouts(&mut self, expected: usize) -> Result<usize> {
        let mut confirmed = 0;
        let mut ended = 0;

        while ended < expected {
            let event = self.next_event().await?;
            output::event(&event);
            if let FleetEvent::RolloutStateChanged { to, .. } = &event
                && let Some(phase) = terminal_phase(to)
            {
                ended += 1;
                if phase == RolloutPhase::Confirmed {
                    confirmed += 1;
                }
            }
        }
        Ok(confirmed)
    }

    /// Follow a self apply through the countdown and session reload
    async fn await_reload(&mut self) -> Result<()> {
        let timeout = rollout_timeout(&self.rollout);
        tokio::time::timeout(timeout, self.follow_reload())
            .await
            .map_err(|_| eyre!("session did not reload within {timeout:?}"))??;

        self.print_snapshot().await
    }

    async fn follow_reload(&mut self) -> Result<()> {
        loop {
            let event = self.next_event().await?;
            output::event(&event);
            match event {
                FleetEvent::SessionReloaded => return Ok(()),
                FleetEvent::RolloutStateChanged { to, .. }
                    if terminal_phase(&to) == Some(RolloutPhase::Failed) =>
                {
                    return Err(eyre!("update was not applied"));
                }
                _ => {}
            }
        }
    }

    async fn service(&mut self, command: ServiceCommand) -> Result<()> {
        let (ip, action) = match command {
            ServiceCommand::Start { ip } => (ip, Some(ServiceAction::Start)),
            ServiceCommand::Stop { ip } => (ip, Some(ServiceAction::Stop)),
            ServiceCommand::Status { ip } => (ip, None),
        };
        let target = self.select(ip).await?;

        match action {
            Some(action) => {
                let report = self
                    .fleet
                    .ask(ControlService { target, action })
                    .await
                    .map_err(ask_error)?;
                if self.json {
                    return output::json(&report);
                }
                output::control(&report);
            }
            None => {
                let status = self
                    .fleet
                    .ask(RefreshServiceStatus { target })
                    .await
                    .map_err(ask_error)?;
                if self.json {
                    return output::json(&status);
                }
                output::status(&status);
            }
        }
        Ok(())
    }
}
