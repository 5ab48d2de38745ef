use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::{LatencyAuthority, LatencyReading, SessionContext, SessionManager, UpstreamError};

/// Why a reading was not delivered upstream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    #[error("no session available: {0}")]
    NoSession(String),

    #[error("upstream call timed out")]
    Timeout,

    #[error("upstream rejected the reading: {0}")]
    Rejected(String),

    #[error("session renewal failed: {0}")]
    RenewalFailed(String),

    #[error("upstream rejected the renewed session")]
    StillUnauthenticated,
}

impl From<UpstreamError> for DropReason {
    fn from(error: UpstreamError) -> Self {
        match error {
            UpstreamError::Unauthenticated => DropReason::StillUnauthenticated,
            UpstreamError::Timeout(_) => DropReason::Timeout,
            UpstreamError::Rejected(status) => {
                DropReason::Rejected(format!("{}: {}", status.code(), status.message()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    Delivered,
    DeliveredAfterRenewal,
    Dropped(DropReason),
}

/// Relays one reading to the cluster API, renewing the session at most once.
pub struct Forwarder {
    session: Arc<dyn SessionManager>,
    authority: Arc<dyn LatencyAuthority>,
    request_timeout: Duration,
}

impl Forwarder {
    pub fn new(
        session: Arc<dyn SessionManager>,
        authority: Arc<dyn LatencyAuthority>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            session,
            authority,
            request_timeout,
        }
    }

    #[instrument(
        name = "ForwardLatency",
        skip(self, reading),
        fields(
            organization_id = %reading.organization_id(),
            device_group_id = %reading.device_group_id(),
            device_id = %reading.device_id(),
        )
    )]
    pub async fn forward(&self, reading: &LatencyReading) -> ForwardOutcome {
        let outcome = self.attempt(reading).await;

        match &outcome {
            ForwardOutcome::Delivered => debug!("Latency delivered"),
            ForwardOutcome::DeliveredAfterRenewal => info!("Latency delivered after session renewal"),
            ForwardOutcome::Dropped(reason) => warn!(
                organization_id = %reading.organization_id(),
                device_group_id = %reading.device_group_id(),
                device_id = %reading.device_id(),
                latency = reading.measure(),
                reason = %reason,
                "Dropping latency reading"
            ),
        }
        outcome
    }

    async fn attempt(&self, reading: &LatencyReading) -> ForwardOutcome {
        let context = match self.session.current().await {
            Ok(context) => context,
            Err(e) => return ForwardOutcome::Dropped(DropReason::NoSession(e.to_string())),
        };

        match self.call(&context, reading).await {
            Ok(()) => return ForwardOutcome::Delivered,
            Err(UpstreamError::Unauthenticated) => {
                debug!(generation = context.generation(), "Session rejected upstream");
            }
            Err(e) => return ForwardOutcome::Dropped(e.into()),
        }

        let fresh =
            match tokio::time::timeout(self.request_timeout, self.session.renew(&context)).await {
                Ok(Ok(fresh)) => fresh,
                Ok(Err(e)) => return ForwardOutcome::Dropped(DropReason::RenewalFailed(e.to_string())),
                Err(_) => {
                    return ForwardOutcome::Dropped(DropReason::RenewalFailed(format!(
                        "timed out after {:?}",
                        self.request_timeout
                    )))
                }
            };

        match self.call(&fresh, reading).await {
            Ok(()) => ForwardOutcome::DeliveredAfterRenewal,
            Err(e) => ForwardOutcome::Dropped(e.into()),
        }
    }

    async fn call(
        &self,
        context: &SessionContext,
        reading: &LatencyReading,
    ) -> Result<(), UpstreamError> {
        tokio::time::timeout(
            self.request_timeout,
            self.authority.register_latency(context, reading),
        )
        .await
        .unwrap_or(Err(UpstreamError::Timeout(self.request_timeout)))
    }
}

/// Accepts readings for asynchronous forwarding without waiting
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait ForwardingSink: Send + Sync {
    fn submit(&self, reading: LatencyReading);
}

#[derive(Debug, Clone)]
pub struct ForwardingConfig {
    pub queue_capacity: usize,
    pub max_in_flight: usize,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_in_flight: 32,
        }
    }
}

/// Sending half of the forwarding pipeline
#[derive(Clone)]
pub struct ForwardingQueue {
    sender: mpsc::Sender<LatencyReading>,
}

impl ForwardingSink for ForwardingQueue {
    fn submit(&self, reading: LatencyReading) {
        match self.sender.try_send(reading) {
            Ok(()) => {}
            Err(TrySendError::Full(reading)) => warn!(
                organization_id = %reading.organization_id(),
                device_group_id = %reading.device_group_id(),
                device_id = %reading.device_id(),
                "Forwarding queue full, dropping latency reading"
            ),
            Err(TrySendError::Closed(reading)) => warn!(
                organization_id = %reading.organization_id(),
                device_group_id = %reading.device_group_id(),
                device_id = %reading.device_id(),
                "Forwarding stopped, dropping latency reading"
            ),
        }
    }
}

/// Drains the queue into at most `max_in_flight` concurrent forwards
pub struct ForwardingDispatcher {
    receiver: mpsc::Receiver<LatencyReading>,
    forwarder: Arc<Forwarder>,
    max_in_flight: usize,
}

/// Build the queue and its dispatcher.
pub fn forwarding_pipeline(
    forwarder: Arc<Forwarder>,
    config: &ForwardingConfig,
) -> (ForwardingQueue, ForwardingDispatcher) {
    let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
    (
        ForwardingQueue { sender },
        ForwardingDispatcher {
            receiver,
            forwarder,
            max_in_flight: config.max_in_flight.max(1),
        },
    )
}

impl ForwardingDispatcher {
    /// Run until cancelled. In-flight forwards are aborted on shutdown.
    pub async fn run(mut self, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        info!(max_in_flight = self.max_in_flight, "Starting forwarding dispatcher");
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = cancellation_token.cancelled() => break,

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Forward task panicked");
                        }
                    }
                }

                next = self.receiver.recv(), if in_flight.len() < self.max_in_flight => {
                    let Some(reading) = next else {
                        debug!("Forwarding queue closed");
                        while in_flight.join_next().await.is_some() {}
                        return Ok(());
                    };
                    let forwarder = self.forwarder.clone();
                    in_flight.spawn(async move {
                        forwarder.forward(&reading).await;
                    });
                }
            }
        }

        let aborted = in_flight.len();
        in_flight.shutdown().await;
        info!(aborted, "Forwarding dispatcher stopped");
        Ok(())
    }
}
