use crate::error::{OutreachError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// CanonicalAddress
// ---------------------------------------------------------------------------

/// The normalized, transport-addressable form of a phone number.
///
/// Only [`normalize`] constructs these, so holding one is proof the number
/// passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalAddress(String);

impl CanonicalAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Test-only escape hatch for building addresses without going through
    /// the normalizer.
    #[cfg(test)]
    pub fn from_raw(s: impl Into<String>) -> Self {
        CanonicalAddress(s.into())
    }
}

impl fmt::Display for CanonicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// normalize
// ---------------------------------------------------------------------------

const COUNTRY_MOBILE_PREFIX: &str = "549";
const CAPITAL_METRO_AREA: &str = "11";

/// Convert a raw, loosely formatted Argentine mobile number into canonical
/// `549<area><subscriber>` form.
///
/// The area-code length heuristic (2 digits for the capital metro prefix,
/// otherwise 3 falling back to 4) is an approximation of the national
/// numbering plan, kept as-is rather than replaced with a full prefix table.
///
/// Pure and deterministic: no I/O, no randomness.
pub fn normalize(raw: &str) -> Result<CanonicalAddress> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(OutreachError::Normalization {
            reason: format!("no digits in '{raw}'"),
        });
    }

    // Callers sometimes hand us numbers that already carry the country code.
    let mut rest = digits.as_str();
    if let Some(stripped) = rest.strip_prefix(COUNTRY_MOBILE_PREFIX) {
        if stripped.len() >= 9 {
            rest = stripped;
        }
    } else if let Some(stripped) = rest.strip_prefix("54") {
        if stripped.len() >= 9 {
            rest = stripped;
        }
    }

    // National trunk prefix is never part of the canonical form.
    rest = rest.strip_prefix('0').unwrap_or(rest);

    if rest.len() < 7 {
        return Err(OutreachError::Normalization {
            reason: format!("too few digits ({}) in '{raw}'", rest.len()),
        });
    }

    let (area, subscriber) = if rest.starts_with(CAPITAL_METRO_AREA) {
        rest.split_at(2)
    } else {
        let (area3, sub3) = rest.split_at(3);
        if sub3.len() < 6 {
            rest.split_at(4)
        } else {
            (area3, sub3)
        }
    };

    // Mobile-indicator infix, dialed domestically before the subscriber part.
    let subscriber = subscriber.strip_prefix("15").unwrap_or(subscriber);

    let canonical = format!("{COUNTRY_MOBILE_PREFIX}{area}{subscriber}");
    if !(12..=13).contains(&canonical.len()) {
        return Err(OutreachError::Normalization {
            reason: format!(
                "canonical form '{canonical}' has {} digits, expected 12-13",
                canonical.len()
            ),
        });
    }

    Ok(CanonicalAddress(canonical))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
