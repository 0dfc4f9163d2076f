use async_trait::async_trait;
use outreach_core::rate_limit::RateLimiterState;
use outreach_core::types::{Lead, LeadStatus, MessageRecord};
use outreach_core::Result;

// ─── MessageComposer ──────────────────────────────────────────────────────

/// External text-composition service.
///
/// Returns the full ordered message sequence for a lead. Slot count is
/// deterministic per campaign; slots 0 and 1 correspond to the probe
/// messages the verifier already sent, so the driver delivers slots 2
/// onward.
#[async_trait]
pub trait MessageComposer: Send + Sync {
    async fn compose_sequence(&self, lead: &Lead) -> Result<Vec<String>>;
}

// ─── PersistenceApi ───────────────────────────────────────────────────────

/// External record store. The engine never owns lead records; it only
/// requests status transitions and hands over message metadata.
#[async_trait]
pub trait PersistenceApi: Send + Sync {
    async fn set_lead_status(&self, lead_id: &str, status: LeadStatus) -> Result<()>;

    async fn record_message(&self, record: MessageRecord) -> Result<()>;

    async fn load_rate_limiter_state(&self) -> Result<Option<RateLimiterState>>;

    async fn save_rate_limiter_state(&self, state: &RateLimiterState) -> Result<()>;
}
