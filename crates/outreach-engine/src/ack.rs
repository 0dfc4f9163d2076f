use crate::transport::{AckEvent, MessageId};
use outreach_core::types::AckLevel;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

// ─── AckWait ──────────────────────────────────────────────────────────────

/// Outcome of waiting for a delivery acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckWait {
    /// The transport confirmed delivery at or above `DeliveredToServer`.
    Delivered(AckLevel),
    /// The transport reported the send itself failed.
    Failed,
    /// Every wait window elapsed without a delivery-level ack.
    TimedOut,
}

// ─── await_delivery ───────────────────────────────────────────────────────

/// Wait for a delivery acknowledgment of `message_id`, one bounded window
/// at a time.
///
/// Each entry in `windows` opens one more wait; when the last window
/// elapses the wait is over; there is no unbounded polling. A `Sent`-level
/// ack keeps the window open (the message reached our side of the wire but
/// not the recipient); `Failed` ends the wait immediately.
///
/// The caller must subscribe to the ack stream **before** issuing the send
/// so an early acknowledgment cannot slip past the receiver.
pub async fn await_delivery(
    rx: &mut broadcast::Receiver<AckEvent>,
    message_id: &MessageId,
    windows: &[Duration],
) -> AckWait {
    for (attempt, window) in windows.iter().enumerate() {
        let deadline = Instant::now() + *window;
        loop {
            match timeout_at(deadline, rx.recv()).await {
                // Window elapsed; move on to the next one, if any.
                Err(_) => {
                    debug!(%message_id, attempt, "ack window elapsed");
                    break;
                }
                Ok(Ok(event)) => {
                    if event.message_id != *message_id {
                        continue;
                    }
                    if event.level == AckLevel::Failed {
                        return AckWait::Failed;
                    }
                    if event.level.is_delivered() {
                        return AckWait::Delivered(event.level);
                    }
                    // Sent-level only: keep waiting within this window.
                }
                // Dropped behind the broadcast buffer; keep draining.
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => return AckWait::TimedOut,
            }
        }
    }
    AckWait::TimedOut
}

// ─── Tests ────────────────────────────────────────────────────────────────
