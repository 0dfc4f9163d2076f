use chrono::{DateTime, FixedOffset, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// DelayRangeMs
// ---------------------------------------------------------------------------

/// An inclusive millisecond range a delay is sampled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRangeMs {
    pub min: u64,
    pub max: u64,
}

impl DelayRangeMs {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }
}

// ---------------------------------------------------------------------------
// PacingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Typing speed range, words per minute.
    #[serde(default = "default_wpm_min")]
    pub wpm_min: f64,
    #[serde(default = "default_wpm_max")]
    pub wpm_max: f64,
    /// Reading speed, words per minute.
    #[serde(default = "default_reading_wpm")]
    pub reading_wpm: f64,

    #[serde(default = "default_thinking_pause_prob")]
    pub thinking_pause_prob: f64,
    #[serde(default = "default_thinking_pause_ms")]
    pub thinking_pause_ms: DelayRangeMs,
    #[serde(default = "default_distraction_prob")]
    pub distraction_prob: f64,
    #[serde(default = "default_distraction_ms")]
    pub distraction_ms: DelayRangeMs,
    #[serde(default = "default_correction_prob")]
    pub correction_prob: f64,
    #[serde(default = "default_correction_ms")]
    pub correction_ms: DelayRangeMs,

    /// Break probability scaling per lead processed this run.
    #[serde(default = "default_fatigue_per_lead")]
    pub fatigue_per_lead: f64,

    #[serde(default = "default_short_break_prob")]
    pub short_break_prob: f64,
    #[serde(default = "default_short_break_min_interval_secs")]
    pub short_break_min_interval_secs: u64,
    #[serde(default = "default_short_break_ms")]
    pub short_break_ms: DelayRangeMs,

    #[serde(default = "default_long_break_prob")]
    pub long_break_prob: f64,
    #[serde(default = "default_long_break_min_interval_secs")]
    pub long_break_min_interval_secs: u64,
    #[serde(default = "default_long_break_ms")]
    pub long_break_ms: DelayRangeMs,

    #[serde(default = "default_lunch_prob")]
    pub lunch_prob: f64,
    /// Local hours (inclusive start, exclusive end) of the lunch window.
    #[serde(default = "default_lunch_window")]
    pub lunch_window_hours: (u32, u32),
    #[serde(default = "default_lunch_min_interval_secs")]
    pub lunch_min_interval_secs: u64,
    #[serde(default = "default_lunch_ms")]
    pub lunch_ms: DelayRangeMs,
}

fn default_wpm_min() -> f64 {
    30.0
}
fn default_wpm_max() -> f64 {
    55.0
}
fn default_reading_wpm() -> f64 {
    200.0
}
fn default_thinking_pause_prob() -> f64 {
    0.25
}
fn default_thinking_pause_ms() -> DelayRangeMs {
    DelayRangeMs::new(1_500, 4_000)
}
fn default_distraction_prob() -> f64 {
    0.05
}
fn default_distraction_ms() -> DelayRangeMs {
    DelayRangeMs::new(8_000, 25_000)
}
fn default_correction_prob() -> f64 {
    0.15
}
fn default_correction_ms() -> DelayRangeMs {
    DelayRangeMs::new(800, 2_500)
}
fn default_fatigue_per_lead() -> f64 {
    0.03
}
fn default_short_break_prob() -> f64 {
    0.10
}
fn default_short_break_min_interval_secs() -> u64 {
    20 * 60
}
fn default_short_break_ms() -> DelayRangeMs {
    DelayRangeMs::new(60_000, 5 * 60_000)
}
fn default_long_break_prob() -> f64 {
    0.04
}
fn default_long_break_min_interval_secs() -> u64 {
    90 * 60
}
fn default_long_break_ms() -> DelayRangeMs {
    DelayRangeMs::new(10 * 60_000, 20 * 60_000)
}
fn default_lunch_prob() -> f64 {
    0.30
}
fn default_lunch_window() -> (u32, u32) {
    (12, 14)
}
fn default_lunch_min_interval_secs() -> u64 {
    4 * 3600
}
fn default_lunch_ms() -> DelayRangeMs {
    DelayRangeMs::new(20 * 60_000, 45 * 60_000)
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            wpm_min: default_wpm_min(),
            wpm_max: default_wpm_max(),
            reading_wpm: default_reading_wpm(),
            thinking_pause_prob: default_thinking_pause_prob(),
            thinking_pause_ms: default_thinking_pause_ms(),
            distraction_prob: default_distraction_prob(),
            distraction_ms: default_distraction_ms(),
            correction_prob: default_correction_prob(),
            correction_ms: default_correction_ms(),
            fatigue_per_lead: default_fatigue_per_lead(),
            short_break_prob: default_short_break_prob(),
            short_break_min_interval_secs: default_short_break_min_interval_secs(),
            short_break_ms: default_short_break_ms(),
            long_break_prob: default_long_break_prob(),
            long_break_min_interval_secs: default_long_break_min_interval_secs(),
            long_break_ms: default_long_break_ms(),
            lunch_prob: default_lunch_prob(),
            lunch_window_hours: default_lunch_window(),
            lunch_min_interval_secs: default_lunch_min_interval_secs(),
            lunch_ms: default_lunch_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Breaks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakKind {
    Short,
    Long,
    Lunch,
}

impl fmt::Display for BreakKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BreakKind::Short => "short",
            BreakKind::Long => "long",
            BreakKind::Lunch => "lunch",
        })
    }
}

/// An advisory break grant. The caller is responsible for actually
/// suspending for `duration`; the engine only records its own bookkeeping.
#[derive(Debug, Clone)]
pub struct BreakDecision {
    pub kind: BreakKind,
    pub duration: Duration,
    pub reason: String,
}

/// Process-lifetime pacing counters. Never persisted.
#[derive(Debug, Clone)]
pub struct BehaviorProfile {
    pub leads_processed_this_run: u32,
    pub run_started_at: DateTime<Utc>,
    last_short_break: Option<DateTime<Utc>>,
    last_long_break: Option<DateTime<Utc>>,
    last_lunch_break: Option<DateTime<Utc>>,
}

impl BehaviorProfile {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            leads_processed_this_run: 0,
            run_started_at: now,
            last_short_break: None,
            last_long_break: None,
            last_lunch_break: None,
        }
    }
}

// ---------------------------------------------------------------------------
// PacingEngine
// ---------------------------------------------------------------------------

/// Computes human-plausible typing/reading delays and periodic break
/// decisions. All randomness flows through one owned RNG so tests can seed
/// it and get reproducible schedules.
pub struct PacingEngine {
    cfg: PacingConfig,
    rng: StdRng,
    profile: BehaviorProfile,
}

impl PacingEngine {
    pub fn new(cfg: PacingConfig) -> Self {
        Self::with_rng(cfg, StdRng::from_entropy())
    }

    pub fn with_seed(cfg: PacingConfig, seed: u64) -> Self {
        Self::with_rng(cfg, StdRng::seed_from_u64(seed))
    }

    fn with_rng(cfg: PacingConfig, rng: StdRng) -> Self {
        Self {
            cfg,
            rng,
            profile: BehaviorProfile::new(Utc::now()),
        }
    }

    pub fn profile(&self) -> &BehaviorProfile {
        &self.profile
    }

    /// Record that a lead finished processing; scales future break odds.
    pub fn lead_finished(&mut self) {
        self.profile.leads_processed_this_run += 1;
    }

    /// How long a human would plausibly take to type `text`.
    ///
    /// Word count over a sampled words-per-minute rate, with stochastic
    /// thinking, distraction, and correction pauses layered on top.
    pub fn typing_delay(&mut self, text: &str) -> Duration {
        let words = word_count(text);
        let wpm = sample_f64(&mut self.rng, self.cfg.wpm_min, self.cfg.wpm_max);
        let mut ms = (words / wpm * 60_000.0) as u64;

        if self.rng.gen_bool(clamp_prob(self.cfg.thinking_pause_prob)) {
            ms += self.sample_range(self.cfg.thinking_pause_ms);
        }
        if self.rng.gen_bool(clamp_prob(self.cfg.distraction_prob)) {
            ms += self.sample_range(self.cfg.distraction_ms);
        }
        if self.rng.gen_bool(clamp_prob(self.cfg.correction_prob)) {
            ms += self.sample_range(self.cfg.correction_ms);
        }
        Duration::from_millis(ms)
    }

    /// How long a human would plausibly take to read `text`, jittered ±30%.
    pub fn reading_delay(&mut self, text: &str) -> Duration {
        let words = word_count(text);
        let base_ms = words / self.cfg.reading_wpm * 60_000.0;
        let jitter = sample_f64(&mut self.rng, 0.7, 1.3);
        Duration::from_millis((base_ms * jitter) as u64)
    }

    /// Sample a delay from an explicit range (e.g. the configured
    /// inter-message delay).
    pub fn sample_delay(&mut self, range: DelayRangeMs) -> Duration {
        Duration::from_millis(self.sample_range(range))
    }

    /// Decide whether the operator persona takes a break right now.
    ///
    /// `now` is local to the campaign timezone so the lunch window lines up
    /// with the persona's clock. Purely advisory: the caller suspends for
    /// the returned duration; bookkeeping updates only when a break is
    /// granted.
    pub fn should_break(&mut self, now: DateTime<FixedOffset>) -> Option<BreakDecision> {
        let now_utc = now.with_timezone(&Utc);
        let fatigue =
            1.0 + self.profile.leads_processed_this_run as f64 * self.cfg.fatigue_per_lead;

        // Lunch first: a time-of-day spike that outranks the generic breaks.
        let (lunch_start, lunch_end) = self.cfg.lunch_window_hours;
        if (lunch_start..lunch_end).contains(&now.hour())
            && elapsed_at_least(self.profile.last_lunch_break, now_utc, self.cfg.lunch_min_interval_secs)
            && self.rng.gen_bool(clamp_prob(self.cfg.lunch_prob))
        {
            self.profile.last_lunch_break = Some(now_utc);
            let duration = Duration::from_millis(self.sample_range(self.cfg.lunch_ms));
            return Some(BreakDecision {
                kind: BreakKind::Lunch,
                duration,
                reason: format!("lunch window at {:02}:{:02} local", now.hour(), now.minute()),
            });
        }

        if elapsed_at_least(self.profile.last_long_break, now_utc, self.cfg.long_break_min_interval_secs)
            && self.rng.gen_bool(clamp_prob(self.cfg.long_break_prob * fatigue))
        {
            self.profile.last_long_break = Some(now_utc);
            let duration = Duration::from_millis(self.sample_range(self.cfg.long_break_ms));
            return Some(BreakDecision {
                kind: BreakKind::Long,
                duration,
                reason: format!(
                    "fatigue x{fatigue:.2} after {} leads",
                    self.profile.leads_processed_this_run
                ),
            });
        }

        if elapsed_at_least(self.profile.last_short_break, now_utc, self.cfg.short_break_min_interval_secs)
            && self.rng.gen_bool(clamp_prob(self.cfg.short_break_prob * fatigue))
        {
            self.profile.last_short_break = Some(now_utc);
            let duration = Duration::from_millis(self.sample_range(self.cfg.short_break_ms));
            return Some(BreakDecision {
                kind: BreakKind::Short,
                duration,
                reason: format!(
                    "fatigue x{fatigue:.2} after {} leads",
                    self.profile.leads_processed_this_run
                ),
            });
        }

        None
    }

    fn sample_range(&mut self, range: DelayRangeMs) -> u64 {
        if range.min >= range.max {
            return range.min;
        }
        self.rng.gen_range(range.min..=range.max)
    }
}

fn word_count(text: &str) -> f64 {
    text.split_whitespace().count().max(1) as f64
}

fn sample_f64(rng: &mut StdRng, min: f64, max: f64) -> f64 {
    if min >= max {
        return min;
    }
    rng.gen_range(min..=max)
}

fn clamp_prob(p: f64) -> f64 {
    p.clamp(0.0, 1.0)
}

fn elapsed_at_least(last: Option<DateTime<Utc>>, now: DateTime<Utc>, min_secs: u64) -> bool {
    match last {
        None => true,
        Some(t) => (now - t).num_seconds() >= min_secs as i64,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
