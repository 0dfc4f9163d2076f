use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

// ---------------------------------------------------------------------------
// RateLimiterState
// ---------------------------------------------------------------------------

/// The persisted slice of the rate limiter: one record per calendar day.
///
/// Saved through the persistence collaborator after every recorded lead so
/// a process restart mid-day does not reset the cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterState {
    pub date: NaiveDate,
    pub leads_contacted_today: u32,
    pub messages_sent_today: u32,
    pub daily_cap: u32,
}

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

/// Enforces the per-day cap on leads contacted, in the campaign's local
/// timezone. Counters reset at local midnight.
///
/// The limiter itself is not thread-safe; the driver guards the single
/// shared instance behind one exclusive section.
pub struct RateLimiter {
    state: RateLimiterState,
    tz: FixedOffset,
}

impl RateLimiter {
    pub fn new(daily_cap: u32, tz: FixedOffset, now: DateTime<Utc>) -> Self {
        Self {
            state: RateLimiterState {
                date: now.with_timezone(&tz).date_naive(),
                leads_contacted_today: 0,
                messages_sent_today: 0,
                daily_cap,
            },
            tz,
        }
    }

    /// Rebuild from a persisted snapshot, keeping mid-day counters. The cap
    /// always comes from current configuration, not from the snapshot.
    pub fn resume(mut state: RateLimiterState, daily_cap: u32, tz: FixedOffset) -> Self {
        state.daily_cap = daily_cap;
        Self { state, tz }
    }

    pub fn state(&self) -> &RateLimiterState {
        &self.state
    }

    /// Whether another lead may be contacted today. Rolls the counters over
    /// first if the local date has advanced since the last call.
    pub fn can_contact_more(&mut self, now: DateTime<Utc>) -> bool {
        self.rollover_if_needed(now);
        self.state.leads_contacted_today < self.state.daily_cap
    }

    /// Record one contacted lead and the messages sent to it. Returns the
    /// updated state for the caller to persist.
    pub fn record_lead(
        &mut self,
        now: DateTime<Utc>,
        message_count: u32,
        success: bool,
    ) -> &RateLimiterState {
        self.rollover_if_needed(now);
        self.state.leads_contacted_today += 1;
        self.state.messages_sent_today += message_count;
        info!(
            leads = self.state.leads_contacted_today,
            messages = self.state.messages_sent_today,
            cap = self.state.daily_cap,
            success,
            "recorded lead against daily cap"
        );
        &self.state
    }

    fn rollover_if_needed(&mut self, now: DateTime<Utc>) {
        let today = now.with_timezone(&self.tz).date_naive();
        if today != self.state.date {
            info!(from = %self.state.date, to = %today, "daily rate counters reset");
            self.state.date = today;
            self.state.leads_contacted_today = 0;
            self.state.messages_sent_today = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tz() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn cap_blocks_after_limit() {
        let now = utc(2025, 6, 2, 15, 0);
        let mut limiter = RateLimiter::new(5, tz(), now);

        for _ in 0..5 {
            assert!(limiter.can_contact_more(now));
            limiter.record_lead(now, 4, true);
        }
        assert!(!limiter.can_contact_more(now));
        assert_eq!(limiter.state().leads_contacted_today, 5);
        assert_eq!(limiter.state().messages_sent_today, 20);
    }

    #[test]
    fn midnight_rollover_resets_counters() {
        // 23:59 local on June 1 (UTC-3) is 02:59 UTC on June 2.
        let before_midnight = utc(2025, 6, 2, 2, 59);
        let mut limiter = RateLimiter::new(2, tz(), before_midnight);
        limiter.record_lead(before_midnight, 3, true);
        limiter.record_lead(before_midnight, 3, true);
        assert!(!limiter.can_contact_more(before_midnight));

        // 00:01 local on June 2.
        let after_midnight = utc(2025, 6, 2, 3, 1);
        assert!(limiter.can_contact_more(after_midnight));
        assert_eq!(limiter.state().leads_contacted_today, 0);
        assert_eq!(limiter.state().messages_sent_today, 0);
        assert_eq!(
            limiter.state().date,
            NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
        );
    }

    #[test]
    fn resume_keeps_counters_and_takes_configured_cap() {
        let now = utc(2025, 6, 2, 15, 0);
        let snapshot = RateLimiterState {
            date: now.with_timezone(&tz()).date_naive(),
            leads_contacted_today: 3,
            messages_sent_today: 12,
            daily_cap: 99,
        };
        let mut limiter = RateLimiter::resume(snapshot, 4, tz());
        assert!(limiter.can_contact_more(now));
        limiter.record_lead(now, 1, true);
        assert!(!limiter.can_contact_more(now));
    }

    #[test]
    fn resume_from_stale_date_rolls_over() {
        let now = utc(2025, 6, 3, 15, 0);
        let snapshot = RateLimiterState {
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            leads_contacted_today: 30,
            messages_sent_today: 120,
            daily_cap: 30,
        };
        let mut limiter = RateLimiter::resume(snapshot, 30, tz());
        assert!(limiter.can_contact_more(now));
        assert_eq!(limiter.state().leads_contacted_today, 0);
    }

    #[test]
    fn failed_lead_still_counts_toward_cap() {
        // Fail-closed: a lead that received even a probe consumed capacity.
        let now = utc(2025, 6, 2, 15, 0);
        let mut limiter = RateLimiter::new(1, tz(), now);
        limiter.record_lead(now, 0, false);
        assert!(!limiter.can_contact_more(now));
    }

    #[test]
    fn state_roundtrips_through_yaml() {
        let now = utc(2025, 6, 2, 15, 0);
        let mut limiter = RateLimiter::new(30, tz(), now);
        limiter.record_lead(now, 4, true);

        let yaml = serde_yaml::to_string(limiter.state()).unwrap();
        let parsed: RateLimiterState = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(&parsed, limiter.state());
    }
}
