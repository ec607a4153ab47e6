//! `FleetActor`: client-side coordinator state
//!
//! Owns the host registry, staging tracker, discovery run and rollout
//! bookkeeping. Network work that outlives a single message (the discovery
//! stream, confirmation chains, status queries, the reload countdown) runs
//! in spawned tasks that report back through messages.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use molfleet_api::FleetEvent;
use molfleet_client::{ArtifactBundle, ClientError, FleetApi};

use crate::actor::tasks;
use crate::config::RolloutConfig;
use crate::discovery::{DiscoveryRun, Ingested};
use crate::error::CoreError;
use crate::message::{
    ApplySubmitted, ApplyToAll, ApplyUpdate, ConfirmationExhausted, ConfirmationSucceeded,
    ControlReport, ControlService, CountdownElapsed, DiscoveryDescriptor, DiscoveryFinished,
    FetchUpdateLog, FleetSnapshot, GetHost, GetSnapshot, HostSelector, LoadSelf, RefreshHost,
    RefreshServiceStatus, RefreshStaging, ReloadSession, RemoveStagedVersion, RolloutStatus,
    RunDiscovery, ServiceStatusFetched, UploadArtifact,
};
use crate::registry::{HostId, HostRecord, HostRegistry};
use crate::rollout::{RolloutAttempt, RolloutTarget, plan_remote, plan_self};
use crate::service::{ServiceControl, ServiceStatus};
use crate::staging::{StagingState, StagingTracker, is_applicable};
use crate::state::RolloutPhase;

/// Arguments for spawning a `FleetActor`
pub struct FleetActorArgs {
    /// Coordinator API
    pub api: Arc<dyn FleetApi>,
    /// Event broadcast channel
    pub event_tx: broadcast::Sender<FleetEvent>,
    /// Confirmation and countdown timing
    pub rollout: RolloutConfig,
}

/// Rollout bookkeeping for one host
#[derive(Default)]
struct RolloutEntry {
    /// Id of the newest submission; results for older ids are stale
    id: u64,
    phase: RolloutPhase,
    expected_version: Option<String>,
    chain: Option<JoinHandle<()>>,
}

/// Client-side coordinator
pub struct FleetActor {
    api: Arc<dyn FleetApi>,
    event_tx: broadcast::Sender<FleetEvent>,
    config: RolloutConfig,
    registry: HostRegistry,
    staging: StagingTracker,
    discovery: Option<DiscoveryRun>,
    discovery_task: Option<JoinHandle<()>>,
    next_run_id: u64,
    rollouts: HashMap<HostId, RolloutEntry>,
    next_rollout_id: u64,
    countdown: Option<JoinHandle<()>>,
    /// Bumped on every session reload
    session: u64,
    /// Rollout ids at or below this were issued before the last reload
    rollout_floor: u64,
    actor_ref: WeakActorRef<Self>,
}

impl FleetActor {
    fn emit(&self, event: FleetEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn emit_staging(&self) {
        let state = self.staging.state();
        self.emit(FleetEvent::StagingRefreshed {
            staged_versions: state.staged_versions.clone(),
            can_apply_self: state.can_apply_self,
        });
    }

    fn label(&self, id: HostId) -> String {
        self.registry
            .get(id)
            .map_or_else(|| id.to_string(), HostRecord::label)
    }

    fn resolve(&self, selector: &HostSelector) -> Result<HostId, CoreError> {
        match selector {
            HostSelector::SelfHost => Ok(HostId::SELF),
            HostSelector::Id(id) => self
                .registry
                .get(*id)
                .map(|r| r.id)
                .ok_or_else(|| CoreError::HostNotFound(id.to_string())),
            HostSelector::Ip(ip) => self
                .registry
                .find_by_ip(ip)
                .ok_or_else(|| CoreError::HostNotFound(ip.clone())),
        }
    }

    /// Address for requests to `id`; `None` means the own node
    fn request_address(&self, id: HostId) -> Result<Option<String>, CoreError> {
        let record = self
            .registry
            .get(id)
            .ok_or_else(|| CoreError::HostNotFound(id.to_string()))?;

        if record.is_self {
            return Ok(None);
        }
        record
            .address()
            .map(|ip| Some(ip.to_string()))
            .ok_or_else(|| CoreError::Precondition(format!("{} has no known address", record.label())))
    }

    fn phase(&self, id: HostId) -> RolloutPhase {
        self.rollouts.get(&id).map(|r| r.phase).unwrap_or_default()
    }

    fn is_current(&self, id: HostId, rollout_id: u64) -> bool {
        self.rollouts.get(&id).is_some_and(|r| r.id == rollout_id)
    }

    fn set_updating(&mut self, id: HostId, updating: bool) {
        if let Some(record) = self.registry.get_mut(id) {
            record.updating = updating;
        }
    }

    /// Move `id` to `to`, emitting the change
    fn advance(&mut self, id: HostId, to: RolloutPhase) {
        let label = self.label(id);
        let entry = self.rollouts.entry(id).or_default();
        let from = entry.phase;

        if !from.can_transition_to(to) {
            let err = CoreError::InvalidTransition { from, to };
            warn!(host = %label, error = %err, "rollout transition rejected");
            return;
        }
        entry.phase = to;

        info!(host = %label, %from, %to, "rollout transition");
        self.emit(FleetEvent::RolloutStateChanged {
            target: label,
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    fn report(&self, id: HostId, message: impl Into<String>) {
        self.emit(FleetEvent::RolloutMessage {
            target: self.label(id),
            message: message.into(),
        });
    }

    /// Record a failed precondition; an in-flight rollout keeps its phase
    fn reject(&mut self, id: HostId, err: &CoreError) {
        warn!(host = %self.label(id), error = %err, "apply rejected");
        if !self.phase(id).is_in_flight() {
            self.advance(id, RolloutPhase::Failed);
        }
        self.report(id, err.to_string());
    }

    /// Abort any confirmation chain still polling `id`
    fn supersede(&mut self, id: HostId) {
        if let Some(chain) = self.rollouts.get_mut(&id).and_then(|r| r.chain.take()) {
            chain.abort();
            info!(host = %self.label(id), "superseded confirmation chain");
        }
    }

    fn start_rollout(
        &mut self,
        id: HostId,
        inline: Option<&ArtifactBundle>,
    ) -> Result<RolloutTarget, CoreError> {
        let record = self
            .registry
            .get(id)
            .ok_or_else(|| CoreError::HostNotFound(id.to_string()))?;

        let planned = if record.is_self {
            plan_self(self.staging.state()).map(|payload| (payload, None))
        } else {
            match record.address() {
                Some(ip) => plan_remote(&record.version, self.staging.state(), inline)
                    .map(|payload| (payload, Some(ip.to_string()))),
                None => Err(CoreError::Precondition(format!(
                    "{} has no known address",
                    record.label()
                ))),
            }
        };

        let (payload, ip) = match planned {
            Ok(planned) => planned,
            Err(e) => {
                self.reject(id, &e);
                return Err(e);
            }
        };

        self.supersede(id);
        self.next_rollout_id += 1;
        let rollout_id = self.next_rollout_id;
        let entry = self.rollouts.entry(id).or_default();
        entry.id = rollout_id;
        entry.expected_version = payload.known_version().map(str::to_string);

        self.advance(id, RolloutPhase::Submitting);
        self.set_updating(id, true);
        info!(host = %self.label(id), rollout_id, payload = %payload.describe(), "submitting apply");

        let target = RolloutTarget::from_host(id);
        tokio::spawn(tasks::submit_apply(
            Arc::clone(&self.api),
            self.actor_ref.clone(),
            target,
            rollout_id,
            payload.into_request(ip),
        ));
        Ok(target)
    }

    fn spawn_confirmation(&mut self, id: HostId, rollout_id: u64) {
        let ip = match self.request_address(id) {
            Ok(Some(ip)) => ip,
            _ => {
                warn!(host = %self.label(id), "cannot confirm rollout without an address");
                return;
            }
        };
        let Some(entry) = self.rollouts.get_mut(&id) else {
            return;
        };

        let attempt = RolloutAttempt::new(
            rollout_id,
            RolloutTarget::from_host(id),
            ip,
            entry.expected_version.clone(),
            self.config.max_attempts,
            self.config.schedule(),
        );
        entry.chain = Some(tokio::spawn(tasks::confirm_rollout(
            Arc::clone(&self.api),
            self.actor_ref.clone(),
            attempt,
        )));
    }

    fn spawn_status_refresh(&self, id: HostId) {
        match self.request_address(id) {
            Ok(ip) => {
                tokio::spawn(tasks::fetch_status(
                    Arc::clone(&self.api),
                    self.actor_ref.clone(),
                    id,
                    self.session,
                    ip,
                ));
            }
            Err(e) => debug!(host = %self.label(id), error = %e, "skipping status refresh"),
        }
    }

    /// Record a status result; a failed query keeps the previous state
    fn apply_status(
        &mut self,
        id: HostId,
        result: Result<ServiceStatus, ClientError>,
    ) -> Result<ServiceStatus, CoreError> {
        let label = self.label(id);
        match result {
            Ok(status) => {
                if let Some(record) = self.registry.get_mut(id) {
                    record.service_state = status.state;
                }
                let summary = status
                    .active_line
                    .clone()
                    .unwrap_or_else(|| status.state.summary().to_string());
                self.emit(FleetEvent::ServiceStatusChanged {
                    target: label,
                    state: status.state.to_string(),
                    summary,
                });
                Ok(status)
            }
            Err(e) => {
                warn!(host = %label, error = %e, "service status query failed");
                let previous = self
                    .registry
                    .get(id)
                    .map(|r| r.service_state)
                    .unwrap_or_default();
                self.emit(FleetEvent::ServiceStatusChanged {
                    target: label,
                    state: previous.to_string(),
                    summary: e.user_message(),
                });
                Err(e.into())
            }
        }
    }

    async fn query_status(&mut self, id: HostId) -> Result<ServiceStatus, CoreError> {
        let ip = self.request_address(id)?;
        let result = ServiceControl::new(self.api.as_ref(), ip.as_deref())
            .status()
            .await;
        self.apply_status(id, result)
    }

    async fn load_self(&mut self) -> Result<HostRecord, CoreError> {
        let descriptor = self.api.self_descriptor().await.map_err(|e| {
            warn!(error = %e, "failed to load own node");
            CoreError::from(e)
        })?;

        let record = self.registry.load_self(&descriptor);
        info!(version = %record.version, ips = record.known_ips.len(), "loaded own node");
        self.emit(FleetEvent::HostUpdated {
            host: self.label(HostId::SELF),
        });

        if let Err(e) = self.query_status(HostId::SELF).await {
            debug!(error = %e, "own node status unavailable");
        }
        Ok(self.registry.self_record().clone())
    }

    async fn refresh_staging(&mut self) -> Result<StagingState, CoreError> {
        let state = self.staging.refresh(self.api.as_ref()).await?.clone();
        self.emit_staging();
        Ok(state)
    }

    async fn fetch_update_log(&mut self) -> Result<String, CoreError> {
        let output = self.api.update_log().await?;
        self.emit(FleetEvent::ActivityLog {
            output: output.clone(),
            fetched_at: Utc::now(),
        });
        Ok(output)
    }

    /// The own node accepted an apply and is about to restart
    async fn after_self_apply(&mut self) {
        if let Err(e) = self.fetch_update_log().await {
            warn!(error = %e, "failed to fetch update log");
        }
        if let Err(e) = self.refresh_staging().await {
            warn!(error = %e, "failed to refresh staging");
        }

        if let Some(previous) = self.countdown.take() {
            previous.abort();
        }
        self.countdown = Some(tokio::spawn(tasks::reload_countdown(
            self.event_tx.clone(),
            self.actor_ref.clone(),
            self.config.reload_countdown,
            self.config.countdown_tick(),
        )));
    }

    fn abort_background(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            countdown.abort();
        }
        if let Some(pump) = self.discovery_task.take() {
            pump.abort();
        }
        for entry in self.rollouts.values_mut() {
            if let Some(chain) = entry.chain.take() {
                chain.abort();
            }
        }
    }

    /// Drop everything and load it again from the server
    ///
    /// Each reload step is attempted even if an earlier one fails.
    async fn reload_session(&mut self) -> Result<(), CoreError> {
        info!("reloading session");
        self.abort_background();
        self.session += 1;
        self.rollout_floor = self.next_rollout_id;
        self.registry = HostRegistry::new();
        self.staging = StagingTracker::new();
        self.rollouts.clear();
        self.discovery = None;

        let loaded = self.load_self().await.map(|_| ());
        let staged = self.refresh_staging().await.map(|_| ());
        let logged = self.fetch_update_log().await.map(|_| ());

        self.emit(FleetEvent::SessionReloaded);
        loaded.and(staged).and(logged)
    }

    fn snapshot(&self) -> FleetSnapshot {
        let mut rollouts: Vec<RolloutStatus> = self
            .rollouts
            .iter()
            .map(|(host, entry)| RolloutStatus {
                host: *host,
                phase: entry.phase,
            })
            .collect();
        rollouts.sort_by_key(|r| r.host);

        FleetSnapshot {
            self_host: self.registry.self_record().clone(),
            hosts: self.registry.remote_hosts().cloned().collect(),
            staging: self.staging.state().clone(),
            last_uploaded: self.staging.last_uploaded().map(str::to_string),
            discovery_running: self.discovery.is_some(),
            rollouts,
        }
    }
}

impl Actor for FleetActor {
    type Args = FleetActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(id = %actor_ref.id(), "FleetActor starting");

        Ok(Self {
            api: args.api,
            event_tx: args.event_tx,
            config: args.rollout,
            registry: HostRegistry::new(),
            staging: StagingTracker::new(),
            discovery: None,
            discovery_task: None,
            next_run_id: 0,
            rollouts: HashMap::new(),
            next_rollout_id: 0,
            countdown: None,
            session: 0,
            rollout_floor: 0,
            actor_ref: actor_ref.downgrade(),
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(?reason, "FleetActor stopping");
        self.abort_background();
        Ok(())
    }
}

// ============================================================================
// Registry handlers
// ============================================================================

impl Message<LoadSelf> for FleetActor {
    type Reply = Result<HostRecord, CoreError>;

    async fn handle(
        &mut self,
        _msg: LoadSelf,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.load_self().await
    }
}

impl Message<RefreshHost> for FleetActor {
    type Reply = Result<HostRecord, CoreError>;

    async fn handle(
        &mut self,
        msg: RefreshHost,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let id = self.resolve(&msg.target)?;
        if id.is_self() {
            return self.load_self().await;
        }

        let ip = self.request_address(id)?.unwrap_or_default();
        let descriptor = self.api.host_descriptor(&ip).await?;
        if let Some(record) = self.registry.get_mut(id) {
            record.merge(&descriptor);
        }
        self.emit(FleetEvent::HostUpdated {
            host: self.label(id),
        });

        if let Err(e) = self.query_status(id).await {
            debug!(host = %ip, error = %e, "status unavailable after refresh");
        }
        self.registry
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::HostNotFound(id.to_string()))
    }
}

impl Message<GetHost> for FleetActor {
    type Reply = Result<HostRecord, CoreError>;

    async fn handle(&mut self, msg: GetHost, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let id = self.resolve(&msg.target)?;
        self.registry
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::HostNotFound(id.to_string()))
    }
}

impl Message<GetSnapshot> for FleetActor {
    type Reply = FleetSnapshot;

    async fn handle(
        &mut self,
        _msg: GetSnapshot,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.snapshot()
    }
}

// ============================================================================
// Discovery handlers
// ============================================================================

impl Message<RunDiscovery> for FleetActor {
    type Reply = Result<u64, CoreError>;

    async fn handle(
        &mut self,
        _msg: RunDiscovery,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.discovery.is_some() {
            return Err(CoreError::DiscoveryInProgress);
        }

        self.next_run_id += 1;
        let run_id = self.next_run_id;
        self.discovery = Some(DiscoveryRun::new(run_id));
        self.discovery_task = Some(tokio::spawn(tasks::pump_discovery(
            Arc::clone(&self.api),
            self.actor_ref.clone(),
            run_id,
        )));

        info!(run = run_id, "discovery started");
        Ok(run_id)
    }
}

impl Message<DiscoveryDescriptor> for FleetActor {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: DiscoveryDescriptor,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let Some(run) = self
            .discovery
            .as_mut()
            .filter(|run| run.id() == msg.run_id)
        else {
            debug!(run = msg.run_id, "dropping descriptor from stale discovery run");
            return;
        };

        let ingested = run.ingest(&mut self.registry, &msg.descriptor);
        let count = run.count();

        let id = match ingested {
            Ingested::OwnNode | Ingested::Ignored => return,
            Ingested::Created(id) => {
                info!(host = %self.label(id), "host discovered");
                self.emit(FleetEvent::HostDiscovered {
                    host: self.label(id),
                });
                id
            }
            Ingested::Merged(id) => {
                self.emit(FleetEvent::HostUpdated {
                    host: self.label(id),
                });
                id
            }
        };

        self.emit(FleetEvent::DiscoveryProgress { count });
        self.spawn_status_refresh(id);
    }
}

impl Message<DiscoveryFinished> for FleetActor {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: DiscoveryFinished,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let Some(run) = self.discovery.take_if(|run| run.id() == msg.run_id) else {
            debug!(run = msg.run_id, "ignoring end of stale discovery run");
            return;
        };
        self.discovery_task = None;

        let outcome = run.finish(msg.end);
        info!(run = run.id(), ?outcome, "discovery finished");
        self.emit(outcome.into_event());
    }
}

// ============================================================================
// Staging handlers
// ============================================================================

impl Message<RefreshStaging> for FleetActor {
    type Reply = Result<StagingState, CoreError>;

    async fn handle(
        &mut self,
        _msg: RefreshStaging,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.refresh_staging().await
    }
}

impl Message<UploadArtifact> for FleetActor {
    type Reply = Result<String, CoreError>;

    async fn handle(
        &mut self,
        msg: UploadArtifact,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let version = self.staging.upload(self.api.as_ref(), &msg.bundle).await?;
        self.emit_staging();
        Ok(version)
    }
}

impl Message<RemoveStagedVersion> for FleetActor {
    type Reply = Result<String, CoreError>;

    async fn handle(
        &mut self,
        _msg: RemoveStagedVersion,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let result = self.staging.remove(self.api.as_ref()).await;
        if !matches!(result, Err(CoreError::Precondition(_))) {
            self.emit_staging();
        }
        result
    }
}

impl Message<FetchUpdateLog> for FleetActor {
    type Reply = Result<String, CoreError>;

    async fn handle(
        &mut self,
        _msg: FetchUpdateLog,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.fetch_update_log().await
    }
}

// ============================================================================
// Rollout handlers
// ============================================================================

impl Message<ApplyUpdate> for FleetActor {
    type Reply = Result<RolloutTarget, CoreError>;

    async fn handle(
        &mut self,
        msg: ApplyUpdate,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let id = self.resolve(&msg.target)?;
        self.start_rollout(id, msg.inline.as_ref())
    }
}

impl Message<ApplyToAll> for FleetActor {
    type Reply = Result<usize, CoreError>;

    async fn handle(
        &mut self,
        msg: ApplyToAll,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let inline = msg.inline.as_ref();
        let has_inline = inline.is_some_and(ArtifactBundle::is_ready);
        let staging = self.staging.state();

        let candidates: Vec<HostId> = self
            .registry
            .remote_hosts()
            .filter(|r| r.address().is_some())
            .filter(|r| !self.phase(r.id).is_in_flight())
            .filter(|r| is_applicable(&r.version, staging, has_inline))
            .map(|r| r.id)
            .collect();

        let mut started = 0;
        for id in candidates {
            match self.start_rollout(id, inline) {
                Ok(_) => started += 1,
                Err(e) => warn!(host = %self.label(id), error = %e, "skipping host"),
            }
        }

        info!(started, "fleet apply submitted");
        Ok(started)
    }
}

impl Message<ApplySubmitted> for FleetActor {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ApplySubmitted,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let id = msg.target.host_id();
        if !self.is_current(id, msg.rollout_id) {
            debug!(host = %self.label(id), rollout_id = msg.rollout_id, "ignoring stale apply result");
            return;
        }

        match msg.result {
            Ok(ack) => {
                let ack = if ack.trim().is_empty() {
                    "apply accepted".to_string()
                } else {
                    ack
                };
                self.report(id, ack);

                let expected = self.rollouts.get(&id).and_then(|r| r.expected_version.clone());
                if let Some(version) = expected
                    && let Some(record) = self.registry.get_mut(id)
                {
                    record.version = version;
                }
                self.advance(id, RolloutPhase::AwaitingConfirmation);

                match msg.target {
                    RolloutTarget::SelfHost => self.after_self_apply().await,
                    RolloutTarget::Remote(_) => {
                        self.spawn_status_refresh(id);
                        self.spawn_confirmation(id, msg.rollout_id);
                    }
                }
            }
            Err(e) => {
                warn!(host = %self.label(id), error = %e, "apply failed");
                self.set_updating(id, false);
                self.advance(id, RolloutPhase::Failed);
                self.report(id, e.user_message());

                if msg.target == RolloutTarget::SelfHost
                    && let Err(e) = self.refresh_staging().await
                {
                    warn!(error = %e, "failed to refresh staging");
                }
            }
        }
    }
}

impl Message<ConfirmationSucceeded> for FleetActor {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ConfirmationSucceeded,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let id = msg.target.host_id();
        if msg.rollout_id <= self.rollout_floor {
            debug!(rollout_id = msg.rollout_id, "dropping confirmation from a previous session");
            return;
        }
        if let Some(record) = self.registry.get_mut(id) {
            record.merge(&msg.descriptor);
        }
        if !self.is_current(id, msg.rollout_id) {
            debug!(host = %self.label(id), rollout_id = msg.rollout_id, "merged stale confirmation");
            return;
        }

        let expected = self.rollouts.get_mut(&id).and_then(|r| {
            r.chain = None;
            r.expected_version.clone()
        });
        self.set_updating(id, false);

        let version = self
            .registry
            .get(id)
            .map(|r| r.version.clone())
            .unwrap_or_default();
        info!(host = %self.label(id), attempts = msg.attempts, %version, "node answered after apply");
        if let Some(expected) = expected
            && expected != version
        {
            self.report(id, format!("node reports version {version}, expected {expected}"));
        }

        self.advance(id, RolloutPhase::Confirmed);
        self.emit(FleetEvent::HostUpdated {
            host: self.label(id),
        });
        self.spawn_status_refresh(id);
    }
}

impl Message<ConfirmationExhausted> for FleetActor {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ConfirmationExhausted,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let id = msg.target.host_id();
        if !self.is_current(id, msg.rollout_id) {
            return;
        }

        if let Some(entry) = self.rollouts.get_mut(&id) {
            entry.chain = None;
        }
        self.set_updating(id, false);
        warn!(host = %self.label(id), attempts = msg.attempts, "node did not answer after apply");

        self.advance(id, RolloutPhase::Exhausted);
        self.report(
            id,
            format!("no answer after {} attempts; refresh the host manually", msg.attempts),
        );
        self.spawn_status_refresh(id);
    }
}

impl Message<CountdownElapsed> for FleetActor {
    type Reply = ();

    async fn handle(
        &mut self,
        _msg: CountdownElapsed,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.countdown = None;
        if let Err(e) = self.reload_session().await {
            warn!(error = %e, "session reload incomplete");
        }
    }
}

impl Message<ReloadSession> for FleetActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        _msg: ReloadSession,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.reload_session().await
    }
}

// ============================================================================
// Service control handlers
// ============================================================================

impl Message<ControlService> for FleetActor {
    type Reply = Result<ControlReport, CoreError>;

    async fn handle(
        &mut self,
        msg: ControlService,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let id = self.resolve(&msg.target)?;
        let ip = self.request_address(id)?;

        info!(host = %self.label(id), action = %msg.action, "service control");
        let outcome = ServiceControl::new(self.api.as_ref(), ip.as_deref())
            .control(msg.action)
            .await;
        let status = self.apply_status(id, outcome.status)?;

        Ok(ControlReport {
            acknowledgement: outcome.acknowledgement,
            controls: status.state.controls(),
            status,
        })
    }
}

impl Message<RefreshServiceStatus> for FleetActor {
    type Reply = Result<ServiceStatus, CoreError>;

    async fn handle(
        &mut self,
        msg: RefreshServiceStatus,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let id = self.resolve(&msg.target)?;
        self.query_status(id).await
    }
}

impl Message<ServiceStatusFetched> for FleetActor {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ServiceStatusFetched,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if msg.session != self.session {
            debug!(host = %msg.host, "dropping status from a previous session");
            return;
        }
        // Failures are already logged and reported
        let _ = self.apply_status(msg.host, msg.result);
    }
}
