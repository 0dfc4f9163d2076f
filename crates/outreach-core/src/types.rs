use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// LeadStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Pending,
    Contacted,
    Interested,
    NotInterested,
    Invalid,
}

impl LeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::Pending => "pending",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Interested => "interested",
            LeadStatus::NotInterested => "not_interested",
            LeadStatus::Invalid => "invalid",
        }
    }

    /// Whether a status move is allowed by the forward-only lattice:
    /// `Pending → {Invalid, Contacted} → {Interested, NotInterested}`.
    /// A status never regresses; an explicit operator reset lives outside
    /// this check.
    pub fn can_advance_to(self, next: LeadStatus) -> bool {
        match (self, next) {
            (a, b) if a == b => true,
            (LeadStatus::Pending, LeadStatus::Invalid) => true,
            (LeadStatus::Pending, LeadStatus::Contacted) => true,
            (LeadStatus::Contacted, LeadStatus::Interested) => true,
            (LeadStatus::Contacted, LeadStatus::NotInterested) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LeadStatus::Interested | LeadStatus::NotInterested | LeadStatus::Invalid
        )
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = crate::error::OutreachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LeadStatus::Pending),
            "contacted" => Ok(LeadStatus::Contacted),
            "interested" => Ok(LeadStatus::Interested),
            "not_interested" | "not-interested" => Ok(LeadStatus::NotInterested),
            "invalid" => Ok(LeadStatus::Invalid),
            _ => Err(crate::error::OutreachError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// AckLevel
// ---------------------------------------------------------------------------

/// Transport-reported acknowledgment level for an outbound message.
///
/// Ordered by delivery progress so `level >= DeliveredToServer` means the
/// message reached at least the transport server. `Failed` sits above the
/// rest numerically but never counts as delivered; check [`AckLevel::is_delivered`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckLevel {
    None,
    Sent,
    DeliveredToServer,
    DeliveredToDevice,
    Read,
    Failed,
}

impl AckLevel {
    pub fn is_delivered(self) -> bool {
        matches!(
            self,
            AckLevel::DeliveredToServer | AckLevel::DeliveredToDevice | AckLevel::Read
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AckLevel::None => "none",
            AckLevel::Sent => "sent",
            AckLevel::DeliveredToServer => "delivered_to_server",
            AckLevel::DeliveredToDevice => "delivered_to_device",
            AckLevel::Read => "read",
            AckLevel::Failed => "failed",
        }
    }
}

impl fmt::Display for AckLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// A candidate contact. Owned by the external persistence collaborator;
/// the engine only ever requests status transitions for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub name: String,
    pub raw_phone: Option<String>,
    pub status: LeadStatus,
}

impl Lead {
    pub fn new(id: impl Into<String>, name: impl Into<String>, raw_phone: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            raw_phone,
            status: LeadStatus::Pending,
        }
    }
}

// ---------------------------------------------------------------------------
// MessageRecord
// ---------------------------------------------------------------------------

/// Metadata for one sent message, handed to the persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub lead_id: String,
    pub address: String,
    pub message_id: String,
    pub sequence_index: usize,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub ack_level: AckLevel,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
