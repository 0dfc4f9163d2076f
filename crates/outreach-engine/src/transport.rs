use async_trait::async_trait;
use outreach_core::phone::CanonicalAddress;
use outreach_core::types::AckLevel;
use outreach_core::Result;
use std::fmt;
use tokio::sync::broadcast;

// ─── MessageId ────────────────────────────────────────────────────────────

/// Opaque transport identifier for one outbound message. Acknowledgment
/// events are correlated to sends through it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        MessageId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── AckEvent ─────────────────────────────────────────────────────────────

/// A transport-reported acknowledgment. Arrives on the event stream
/// independently of the call that issued the send.
#[derive(Debug, Clone)]
pub struct AckEvent {
    pub message_id: MessageId,
    pub level: AckLevel,
}

// ─── Transport ────────────────────────────────────────────────────────────

/// The message-delivery platform, as the engine sees it.
///
/// One logical outbound actor: implementations serialize sends on a single
/// connection. The ack stream is a broadcast channel so the probe can
/// subscribe before each send and never miss an early acknowledgment.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether a live account exists for the address at all.
    async fn is_registered(&self, address: &CanonicalAddress) -> Result<bool>;

    /// Whether a conversation thread with this address already exists.
    async fn has_conversation(&self, address: &CanonicalAddress) -> Result<bool>;

    async fn send(&self, address: &CanonicalAddress, text: &str) -> Result<MessageId>;

    fn subscribe_acks(&self) -> broadcast::Receiver<AckEvent>;
}
