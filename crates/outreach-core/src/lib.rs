//! Domain layer for the outreach verification and sequencing engine.
//!
//! Everything here is synchronous and free of I/O apart from config and
//! state-file helpers: phone normalization, the pacing policy, the daily
//! rate limiter, and the session store with its duplicate-send guard. The
//! async orchestration that drives a transport lives in `outreach-engine`.

pub mod config;
pub mod error;
pub mod io;
pub mod pacing;
pub mod phone;
pub mod rate_limit;
pub mod session;
pub mod types;

pub use error::{OutreachError, Result};
