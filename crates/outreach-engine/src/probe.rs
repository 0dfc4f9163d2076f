use crate::ack::{await_delivery, AckWait};
use crate::transport::Transport;
use chrono::Utc;
use outreach_core::config::OutreachConfig;
use outreach_core::pacing::PacingEngine;
use outreach_core::phone::CanonicalAddress;
use outreach_core::session::{SessionState, SessionStore};
use outreach_core::types::Lead;
use outreach_core::{OutreachError, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ─── ProbeVerdict ─────────────────────────────────────────────────────────

/// Classification of an address after reachability probing.
///
/// Terminal verdicts map to lead statuses at the driver: `Unreachable`,
/// `Timeout` and `TransportFailed` become `Invalid`; `AlreadyEngaged`
/// becomes `Contacted`. None of them ever implies a reply classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// Both probes acknowledged; the session is `Complete` and eligible for
    /// the sequence-send claim.
    Reachable,
    /// No live account behind the address. Nothing was sent.
    Unreachable,
    /// A conversation thread already exists. Nothing was sent.
    AlreadyEngaged,
    /// No acknowledgment within the primary window plus the single retry
    /// extension.
    Timeout,
    /// The transport rejected a probe send or reported it failed.
    TransportFailed(String),
}

// ─── ReachabilityProbe ────────────────────────────────────────────────────

/// The core verification state machine.
///
/// Drives a session through
/// `Started → Probe1Sent → Probe1Verified → Probe2Sent → Complete`,
/// suspending on the ack stream between sends. Each probe gets the primary
/// acknowledgment window and exactly one extended retry window, never
/// unbounded polling.
pub struct ReachabilityProbe {
    transport: Arc<dyn Transport>,
    sessions: Arc<SessionStore>,
    pacing: Arc<Mutex<PacingEngine>>,
    config: OutreachConfig,
}

impl ReachabilityProbe {
    pub fn new(
        transport: Arc<dyn Transport>,
        sessions: Arc<SessionStore>,
        pacing: Arc<Mutex<PacingEngine>>,
        config: OutreachConfig,
    ) -> Self {
        Self {
            transport,
            sessions,
            pacing,
            config,
        }
    }

    /// Verify that `address` is reachable by a live account.
    ///
    /// Creates and owns the session for the duration of probing. On a
    /// `Reachable` verdict the session is left in `Complete`, ready for the
    /// driver's sequence-send claim; every other verdict leaves it `Failed`
    /// or never creates one at all.
    pub async fn verify(
        &self,
        lead: &Lead,
        address: &CanonicalAddress,
        cancel: &CancellationToken,
    ) -> Result<ProbeVerdict> {
        if cancel.is_cancelled() {
            return Err(OutreachError::Cancelled);
        }

        // Registration check comes first: nothing is ever sent to an
        // address that fails it.
        if !self.transport.is_registered(address).await? {
            info!(%address, "address not registered on transport");
            return Ok(ProbeVerdict::Unreachable);
        }

        if self.transport.has_conversation(address).await? {
            info!(%address, "conversation already exists, skipping probes");
            return Ok(ProbeVerdict::AlreadyEngaged);
        }

        self.sessions
            .create(address, &lead.name, Utc::now(), self.config.session_ttl())?;

        let windows = [
            self.config.probe_timeout(),
            self.config.probe_retry_extension(),
        ];

        // Probe 1.
        match self
            .send_probe(address, 0, SessionState::Probe1Sent, &windows, cancel)
            .await?
        {
            ProbeStep::Delivered => {
                self.sessions.mark_probe1_delivered(address)?;
                self.sessions
                    .transition(address, SessionState::Probe1Verified)?;
            }
            ProbeStep::Terminal(verdict) => return Ok(verdict),
        }

        // Inter-probe pacing: type the second probe like a human would.
        let delay = {
            let mut pacing = self.pacing.lock().unwrap();
            pacing.typing_delay(&self.config.probe_messages[1])
        };
        self.cancellable_sleep(address, delay, cancel).await?;

        // Probe 2, only reachable once probe 1 verified.
        match self
            .send_probe(address, 1, SessionState::Probe2Sent, &windows, cancel)
            .await?
        {
            ProbeStep::Delivered => {
                self.sessions.mark_probe2_delivered(address)?;
                self.sessions.transition(address, SessionState::Complete)?;
                info!(%address, "address verified reachable");
                Ok(ProbeVerdict::Reachable)
            }
            ProbeStep::Terminal(verdict) => Ok(verdict),
        }
    }

    async fn send_probe(
        &self,
        address: &CanonicalAddress,
        probe_index: usize,
        sent_state: SessionState,
        windows: &[Duration],
        cancel: &CancellationToken,
    ) -> Result<ProbeStep> {
        if cancel.is_cancelled() {
            self.sessions.fail(address);
            return Err(OutreachError::Cancelled);
        }

        // Subscribe before the send so an instant ack cannot be missed.
        let mut acks = self.transport.subscribe_acks();
        let text = &self.config.probe_messages[probe_index];
        let message_id = match self.transport.send(address, text).await {
            Ok(id) => id,
            Err(e) => {
                warn!(%address, probe = probe_index + 1, error = %e, "probe send rejected");
                self.sessions.fail(address);
                return Ok(ProbeStep::Terminal(ProbeVerdict::TransportFailed(
                    e.to_string(),
                )));
            }
        };
        self.sessions.transition(address, sent_state)?;
        self.sessions.push_message_id(address, message_id.as_str())?;
        debug!(%address, probe = probe_index + 1, %message_id, "probe sent, awaiting ack");

        match await_delivery(&mut acks, &message_id, windows).await {
            AckWait::Delivered(level) => {
                debug!(%address, probe = probe_index + 1, %level, "probe acknowledged");
                Ok(ProbeStep::Delivered)
            }
            AckWait::Failed => {
                warn!(%address, probe = probe_index + 1, "transport reported probe failed");
                self.sessions.fail(address);
                Ok(ProbeStep::Terminal(ProbeVerdict::TransportFailed(
                    "transport reported send failure".to_string(),
                )))
            }
            AckWait::TimedOut => {
                warn!(%address, probe = probe_index + 1, "no ack within wait budget");
                self.sessions.fail(address);
                Ok(ProbeStep::Terminal(ProbeVerdict::Timeout))
            }
        }
    }

    async fn cancellable_sleep(
        &self,
        address: &CanonicalAddress,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => {
                self.sessions.fail(address);
                Err(OutreachError::Cancelled)
            }
            _ = sleep(duration) => Ok(()),
        }
    }
}

enum ProbeStep {
    Delivered,
    Terminal(ProbeVerdict),
}
