//! Background work spawned by the fleet actor
//!
//! Each task owns its inputs and reports back with `tell`. A task whose
//! actor has gone away just ends.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kameo::actor::WeakActorRef;
use tokio::sync::broadcast;
use tracing::debug;

use molfleet_api::FleetEvent;
use molfleet_client::{ApplyRequest, DiscoveryItem, FleetApi};

use crate::actor::fleet::FleetActor;
use crate::discovery::DiscoveryEnd;
use crate::message::{
    ApplySubmitted, ConfirmationExhausted, ConfirmationSucceeded, CountdownElapsed,
    DiscoveryDescriptor, DiscoveryFinished, ServiceStatusFetched,
};
use crate::registry::HostId;
use crate::rollout::{RolloutAttempt, RolloutTarget};
use crate::service::ServiceControl;

pub(crate) async fn submit_apply(
    api: Arc<dyn FleetApi>,
    actor: WeakActorRef<FleetActor>,
    target: RolloutTarget,
    rollout_id: u64,
    request: ApplyRequest,
) {
    let result = api.apply_update(&request).await;
    if let Some(actor) = actor.upgrade() {
        let _ = actor
            .tell(ApplySubmitted {
                target,
                rollout_id,
                result,
            })
            .await;
    }
}

/// Poll the node's descriptor until it answers or attempts run out
pub(crate) async fn confirm_rollout(
    api: Arc<dyn FleetApi>,
    actor: WeakActorRef<FleetActor>,
    mut attempt: RolloutAttempt,
) {
    while let Some(delay) = attempt.next_delay() {
        tokio::time::sleep(delay).await;

        match api.host_descriptor(&attempt.ip).await {
            Ok(descriptor) => {
                if let Some(actor) = actor.upgrade() {
                    let _ = actor
                        .tell(ConfirmationSucceeded {
                            target: attempt.target,
                            rollout_id: attempt.rollout_id,
                            attempts: attempt.attempt_count,
                            descriptor,
                        })
                        .await;
                }
                return;
            }
            Err(e) => debug!(
                host = %attempt.ip,
                attempt = attempt.attempt_count,
                max_attempts = attempt.max_attempts,
                error = %e,
                "confirmation attempt failed"
            ),
        }
    }

    if let Some(actor) = actor.upgrade() {
        let _ = actor
            .tell(ConfirmationExhausted {
                target: attempt.target,
                rollout_id: attempt.rollout_id,
                attempts: attempt.attempt_count,
            })
            .await;
    }
}

pub(crate) async fn fetch_status(
    api: Arc<dyn FleetApi>,
    actor: WeakActorRef<FleetActor>,
    host: HostId,
    session: u64,
    ip: Option<String>,
) {
    let result = ServiceControl::new(api.as_ref(), ip.as_deref())
        .status()
        .await;
    if let Some(actor) = actor.upgrade() {
        let _ = actor
            .tell(ServiceStatusFetched {
                host,
                session,
                result,
            })
            .await;
    }
}

/// Forward every streamed descriptor, then report how the stream ended
pub(crate) async fn pump_discovery(
    api: Arc<dyn FleetApi>,
    actor: WeakActorRef<FleetActor>,
    run_id: u64,
) {
    let end = match api.discovery_stream().await {
        Err(e) => DiscoveryEnd::Interrupted(e.user_message()),
        Ok(mut stream) => loop {
            match stream.next().await {
                Some(Ok(DiscoveryItem::Host(descriptor))) => {
                    let Some(actor) = actor.upgrade() else {
                        return;
                    };
                    if actor
                        .tell(DiscoveryDescriptor { run_id, descriptor })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Some(Ok(DiscoveryItem::Done)) => break DiscoveryEnd::Completed,
                Some(Err(e)) => break DiscoveryEnd::Interrupted(e.user_message()),
                None => break DiscoveryEnd::Interrupted("discovery stream closed".to_string()),
            }
        },
    };

    if let Some(actor) = actor.upgrade() {
        let _ = actor.tell(DiscoveryFinished { run_id, end }).await;
    }
}

/// Tick down to a session reload
pub(crate) async fn reload_countdown(
    event_tx: broadcast::Sender<FleetEvent>,
    actor: WeakActorRef<FleetActor>,
    ticks: u32,
    tick: Duration,
) {
    for remaining in (1..=ticks).rev() {
        let _ = event_tx.send(FleetEvent::ReloadCountdown { remaining });
        tokio::time::sleep(tick).await;
    }

    if let Some(actor) = actor.upgrade() {
        let _ = actor.tell(CountdownElapsed).await;
    }
}
