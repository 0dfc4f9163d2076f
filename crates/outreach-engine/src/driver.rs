use crate::collaborators::{MessageComposer, PersistenceApi};
use crate::probe::{ProbeVerdict, ReachabilityProbe};
use crate::transport::Transport;
use chrono::{FixedOffset, Utc};
use outreach_core::config::OutreachConfig;
use outreach_core::pacing::PacingEngine;
use outreach_core::phone::{normalize, CanonicalAddress};
use outreach_core::rate_limit::RateLimiter;
use outreach_core::session::SessionStore;
use outreach_core::types::{AckLevel, Lead, LeadStatus, MessageRecord};
use outreach_core::{OutreachError, Result};
use std::sync::{Arc, Mutex};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

// ─── LeadOutcome ──────────────────────────────────────────────────────────

/// Structured per-lead result. Errors inside the flow are converted here,
/// never thrown past the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadOutcome {
    /// The lead was contacted; `partial` is true when some sequence slots
    /// failed to send.
    Contacted { messages_sent: usize, partial: bool },
    /// A conversation already existed; marked contacted without probing.
    AlreadyEngaged,
    /// The lead cannot be contacted (no/bad phone, unreachable, probe
    /// timeout). Not retried within this run or automatically across runs.
    Invalid { reason: String },
    /// The daily cap is reached: a run-level pause, not a lead failure.
    /// The lead stays pending for a future run.
    RateLimited,
    /// Processing unwound early on the cancellation signal.
    Cancelled,
    /// An unexpected error; the lead was still marked contacted
    /// (fail-closed) to prevent repeated attempts on an address that may
    /// already have received a probe.
    Failed { reason: String },
}

// ─── RunSummary ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub contacted: usize,
    pub invalid: usize,
    pub failed: usize,
    pub rate_limited: bool,
    pub cancelled: bool,
}

// ─── SequenceDriver ───────────────────────────────────────────────────────

/// Top-level per-lead orchestrator.
///
/// Composes the normalizer, the reachability probe, the session store, the
/// pacing engine and the rate limiter, and talks to the external
/// collaborators for message text and persistence. One instance drives one
/// transport connection; sends to a given address are always serialized.
pub struct SequenceDriver {
    transport: Arc<dyn Transport>,
    composer: Arc<dyn MessageComposer>,
    persistence: Arc<dyn PersistenceApi>,
    sessions: Arc<SessionStore>,
    pacing: Arc<Mutex<PacingEngine>>,
    limiter: Mutex<RateLimiter>,
    probe: ReachabilityProbe,
    config: OutreachConfig,
    tz: FixedOffset,
}

impl SequenceDriver {
    /// Build a driver, resuming the day's rate-limiter counters from the
    /// persistence collaborator if a snapshot exists.
    pub async fn new(
        transport: Arc<dyn Transport>,
        composer: Arc<dyn MessageComposer>,
        persistence: Arc<dyn PersistenceApi>,
        config: OutreachConfig,
    ) -> Result<Self> {
        Self::with_pacing(
            transport,
            composer,
            persistence,
            PacingEngine::new(config.pacing.clone()),
            config,
        )
        .await
    }

    /// Like [`SequenceDriver::new`] but with a caller-supplied pacing
    /// engine (tests seed its RNG).
    pub async fn with_pacing(
        transport: Arc<dyn Transport>,
        composer: Arc<dyn MessageComposer>,
        persistence: Arc<dyn PersistenceApi>,
        pacing: PacingEngine,
        config: OutreachConfig,
    ) -> Result<Self> {
        let tz = config.timezone_offset()?;
        let limiter = match persistence.load_rate_limiter_state().await? {
            Some(state) => {
                info!(date = %state.date, leads = state.leads_contacted_today, "resuming rate limiter state");
                RateLimiter::resume(state, config.daily_lead_cap, tz)
            }
            None => RateLimiter::new(config.daily_lead_cap, tz, Utc::now()),
        };

        let sessions = Arc::new(SessionStore::new());
        let pacing = Arc::new(Mutex::new(pacing));
        let probe = ReachabilityProbe::new(
            transport.clone(),
            sessions.clone(),
            pacing.clone(),
            config.clone(),
        );

        Ok(Self {
            transport,
            composer,
            persistence,
            sessions,
            pacing,
            limiter: Mutex::new(limiter),
            probe,
            config,
            tz,
        })
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    // ─── Batch loop ───────────────────────────────────────────────────────

    /// Process a batch of leads in order, stopping on the daily cap or on
    /// cancellation.
    pub async fn run_batch(&self, leads: &[Lead], cancel: &CancellationToken) -> RunSummary {
        let swept = self.sessions.sweep(self.config.session_ttl(), Utc::now());
        if swept > 0 {
            warn!(swept, "discarded stale sessions before run");
        }

        let mut summary = RunSummary::default();
        for lead in leads {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let outcome = self.process_lead(lead, cancel).await;
            summary.processed += 1;
            match outcome {
                LeadOutcome::Contacted { .. } | LeadOutcome::AlreadyEngaged => {
                    summary.contacted += 1
                }
                LeadOutcome::Invalid { .. } => summary.invalid += 1,
                LeadOutcome::Failed { .. } => summary.failed += 1,
                LeadOutcome::RateLimited => {
                    // The cap pauses the whole run; this lead was not
                    // processed after all.
                    summary.processed -= 1;
                    summary.rate_limited = true;
                    break;
                }
                LeadOutcome::Cancelled => {
                    summary.cancelled = true;
                    break;
                }
            }
            self.pacing.lock().unwrap().lead_finished();
        }
        info!(
            processed = summary.processed,
            contacted = summary.contacted,
            invalid = summary.invalid,
            rate_limited = summary.rate_limited,
            cancelled = summary.cancelled,
            "run finished"
        );
        summary
    }

    // ─── Per-lead flow ────────────────────────────────────────────────────

    /// Drive one lead end to end. Never returns an error: every failure is
    /// folded into a [`LeadOutcome`].
    pub async fn process_lead(&self, lead: &Lead, cancel: &CancellationToken) -> LeadOutcome {
        match self.try_process(lead, cancel).await {
            Ok(outcome) => outcome,
            Err(OutreachError::Cancelled) => LeadOutcome::Cancelled,
            Err(e) => {
                // Fail-closed: prefer never re-contacting an address that
                // may already have received a probe over retrying it.
                error!(lead = %lead.id, error = %e, "lead processing failed, marking contacted");
                self.set_status(lead, LeadStatus::Contacted).await;
                self.record_contact(0, false).await;
                LeadOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_process(&self, lead: &Lead, cancel: &CancellationToken) -> Result<LeadOutcome> {
        let Some(raw_phone) = lead.raw_phone.as_deref() else {
            info!(lead = %lead.id, "no phone number");
            self.set_status(lead, LeadStatus::Invalid).await;
            return Ok(LeadOutcome::Invalid {
                reason: "no phone number".to_string(),
            });
        };

        let address = match normalize(raw_phone) {
            Ok(address) => address,
            Err(e) => {
                info!(lead = %lead.id, error = %e, "phone normalization failed");
                self.set_status(lead, LeadStatus::Invalid).await;
                return Ok(LeadOutcome::Invalid {
                    reason: e.to_string(),
                });
            }
        };

        if !self.limiter.lock().unwrap().can_contact_more(Utc::now()) {
            info!("daily lead cap reached, pausing run");
            return Ok(LeadOutcome::RateLimited);
        }

        // Sessions never outlive the attempt that owns them: on any early
        // unwind (cancellation, unexpected error) the session is destroyed
        // here rather than lingering until the next TTL sweep.
        let verdict = match self.probe.verify(lead, &address, cancel).await {
            Ok(verdict) => verdict,
            Err(e) => {
                self.sessions.remove(&address);
                return Err(e);
            }
        };

        match verdict {
            ProbeVerdict::Reachable => {
                let outcome = self.send_sequence(lead, &address, cancel).await;
                if outcome.is_err() {
                    self.sessions.remove(&address);
                }
                outcome
            }
            ProbeVerdict::Unreachable => {
                self.set_status(lead, LeadStatus::Invalid).await;
                Ok(LeadOutcome::Invalid {
                    reason: "not registered on transport".to_string(),
                })
            }
            ProbeVerdict::AlreadyEngaged => {
                self.set_status(lead, LeadStatus::Contacted).await;
                if self.config.count_already_engaged {
                    self.record_contact(0, true).await;
                }
                Ok(LeadOutcome::AlreadyEngaged)
            }
            ProbeVerdict::Timeout => {
                self.sessions.remove(&address);
                self.set_status(lead, LeadStatus::Invalid).await;
                Ok(LeadOutcome::Invalid {
                    reason: "probe acknowledgment timed out".to_string(),
                })
            }
            ProbeVerdict::TransportFailed(reason) => {
                self.sessions.remove(&address);
                self.set_status(lead, LeadStatus::Invalid).await;
                Ok(LeadOutcome::Invalid { reason })
            }
        }
    }

    /// Send the remaining sequence slots to a verified address.
    async fn send_sequence(
        &self,
        lead: &Lead,
        address: &CanonicalAddress,
        cancel: &CancellationToken,
    ) -> Result<LeadOutcome> {
        if !self.sessions.claim_sequence_send(address) {
            // Another path already owns the sequence for this session; the
            // address has been contacted either way.
            warn!(%address, "sequence already claimed, not sending again");
            self.set_status(lead, LeadStatus::Contacted).await;
            self.sessions.remove(address);
            return Ok(LeadOutcome::Contacted {
                messages_sent: 0,
                partial: false,
            });
        }

        let sequence = match self.composer.compose_sequence(lead).await {
            Ok(s) => s,
            Err(e) => {
                self.sessions.remove(address);
                return Err(OutreachError::Composer(e.to_string()));
            }
        };

        // Slots 0 and 1 are the probes, already delivered during
        // verification.
        let remaining = sequence.len().saturating_sub(2);
        let mut sent = 0usize;
        let mut cancelled = false;

        for (index, text) in sequence.iter().enumerate().skip(2) {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            // The lock must not be held across the break sleep.
            let brk = {
                let mut pacing = self.pacing.lock().unwrap();
                pacing.should_break(Utc::now().with_timezone(&self.tz))
            };
            if let Some(brk) = brk {
                info!(kind = %brk.kind, secs = brk.duration.as_secs(), reason = %brk.reason, "taking a break");
                if self.pause(brk.duration, cancel).await.is_err() {
                    cancelled = true;
                    break;
                }
            }

            let delay = {
                let mut pacing = self.pacing.lock().unwrap();
                pacing.typing_delay(text) + pacing.sample_delay(self.config.inter_message_delay_ms)
            };
            if self.pause(delay, cancel).await.is_err() {
                cancelled = true;
                break;
            }

            match self.transport.send(address, text).await {
                Ok(message_id) => {
                    sent += 1;
                    self.sessions.push_message_id(address, message_id.as_str())?;
                    let record = MessageRecord {
                        lead_id: lead.id.clone(),
                        address: address.to_string(),
                        message_id: message_id.to_string(),
                        sequence_index: index,
                        content: text.clone(),
                        sent_at: Utc::now(),
                        ack_level: AckLevel::Sent,
                    };
                    if let Err(e) = self.persistence.record_message(record).await {
                        warn!(%address, index, error = %e, "failed to persist message record");
                    }
                }
                Err(e) => {
                    // Partial-failure tolerant: skip this slot and keep
                    // going; on the final slot the loop simply ends.
                    warn!(%address, index, error = %e, "sequence slot send failed, skipping");
                }
            }
        }

        // Whether full or partial, the lead was contacted.
        self.set_status(lead, LeadStatus::Contacted).await;
        let success = !cancelled && sent == remaining;
        self.record_contact((sent + 2) as u32, success).await;
        self.sessions.remove(address);

        if cancelled {
            info!(%address, sent, remaining, "sequence cancelled mid-send");
            return Ok(LeadOutcome::Cancelled);
        }
        info!(%address, sent, remaining, "sequence finished");
        Ok(LeadOutcome::Contacted {
            messages_sent: sent,
            partial: sent < remaining,
        })
    }

    // ─── Helpers ──────────────────────────────────────────────────────────

    async fn pause(&self, duration: std::time::Duration, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(OutreachError::Cancelled),
            _ = sleep(duration) => Ok(()),
        }
    }

    /// Request a status transition, honoring the forward-only lattice.
    async fn set_status(&self, lead: &Lead, status: LeadStatus) {
        if !lead.status.can_advance_to(status) {
            warn!(lead = %lead.id, from = %lead.status, to = %status, "refusing status regression");
            return;
        }
        if let Err(e) = self.persistence.set_lead_status(&lead.id, status).await {
            error!(lead = %lead.id, error = %e, "failed to persist lead status");
        }
    }

    /// Count a contacted lead against the daily cap and persist the
    /// limiter snapshot.
    async fn record_contact(&self, message_count: u32, success: bool) {
        let snapshot = {
            let mut limiter = self.limiter.lock().unwrap();
            limiter.record_lead(Utc::now(), message_count, success).clone()
        };
        if let Err(e) = self.persistence.save_rate_limiter_state(&snapshot).await {
            error!(error = %e, "failed to persist rate limiter state");
        }
    }
}
