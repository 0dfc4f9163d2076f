//! Async reachability probing and sequence delivery.
//!
//! The engine decides, using only transport delivery acknowledgments,
//! whether an address is reachable by a live account, then delivers the
//! remaining message sequence at a human-plausible pace without ever
//! double-sending or exceeding the daily cap.
//!
//! # Architecture
//!
//! ```text
//! SequenceDriver      ← per-lead orchestrator, fail-closed error handling
//!     │
//!     ▼
//! ReachabilityProbe   ← Started → Probe1Sent → Probe1Verified
//!     │                         → Probe2Sent → Complete state machine
//!     ▼
//! await_delivery      ← one bounded ack window per attempt, raced
//!     │                 against the broadcast ack stream
//!     ▼
//! Transport trait     ← is_registered / has_conversation / send / acks
//! ```
//!
//! Session state and the duplicate-send guard live in
//! `outreach_core::session`; the pacing and rate-limit policies in
//! `outreach_core::pacing` / `rate_limit`. The lead store, the message
//! composer and the record store are external collaborators behind the
//! traits in [`collaborators`].

pub mod ack;
pub mod collaborators;
pub mod driver;
pub mod probe;
pub mod transport;


pub use ack::{await_delivery, AckWait};
pub use collaborators::{MessageComposer, PersistenceApi};
pub use driver::{LeadOutcome, RunSummary, SequenceDriver};
pub use probe::{ProbeVerdict, ReachabilityProbe};
pub use transport::{AckEvent, MessageId, Transport};
