//! Freshness classification for stored artifacts.
//!
//! An artifact is `Fresh` inside its TTL, `Stale` inside the grace window that
//! follows, and `Expired` after that. The verdict drives whether the caller
//! serves, serves-and-regenerates, or regenerates synchronously.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// How long an artifact stays servable after its TTL elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaleWindowPolicy {
    /// The stale window equals the TTL (`max(0, ttl)`).
    #[default]
    MirrorTtl,
    /// A fixed stale window in seconds, independent of the TTL.
    Fixed(u64),
    /// No stale window: artifacts go straight from fresh to expired.
    Disabled,
}

impl StaleWindowPolicy {
    fn override_seconds(&self) -> Option<i64> {
        match self {
            Self::MirrorTtl => None,
            Self::Fixed(seconds) => Some(i64::try_from(*seconds).unwrap_or(i64::MAX)),
            Self::Disabled => Some(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

impl Freshness {
    pub fn recommended_action(self) -> RecommendedAction {
        match self {
            Self::Fresh => RecommendedAction::Serve,
            Self::Stale => RecommendedAction::Revalidate,
            Self::Expired => RecommendedAction::Discard,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the regeneration scheduler should do with an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    /// Serve as-is.
    Serve,
    /// Serve the current content and regenerate in the background.
    Revalidate,
    /// Regenerate before serving.
    Discard,
}

/// Classification of one artifact at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreshnessVerdict {
    pub state: Freshness,
    /// `now - created_at`; negative under clock skew.
    pub age_seconds: i64,
    /// `ttl - age`; negative once the TTL has elapsed.
    pub expires_in_seconds: i64,
}

impl FreshnessVerdict {
    pub fn is_fresh(&self) -> bool {
        self.state == Freshness::Fresh
    }

    pub fn is_stale(&self) -> bool {
        self.state == Freshness::Stale
    }

    pub fn is_expired(&self) -> bool {
        self.state == Freshness::Expired
    }

    pub fn recommended_action(&self) -> RecommendedAction {
        self.state.recommended_action()
    }
}

/// Timestamps supplied by the artifact store for one lookup.
///
/// A missing `created_at` means "now"; a missing TTL means zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ArtifactMetadata {
    pub created_at: Option<i64>,
    pub ttl_seconds: Option<i64>,
}

/// Classifies artifacts under a fixed stale-window policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreshnessEngine {
    policy: StaleWindowPolicy,
}

impl FreshnessEngine {
    pub fn new(policy: StaleWindowPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> StaleWindowPolicy {
        self.policy
    }

    /// Effective stale window for a given TTL.
    pub fn stale_window(&self, ttl_seconds: i64) -> i64 {
        self.policy
            .override_seconds()
            .unwrap_or_else(|| ttl_seconds.max(0))
    }

    pub fn classify(&self, created_at: i64, ttl_seconds: i64, now: i64) -> FreshnessVerdict {
        let age = now.saturating_sub(created_at);
        let stale_window = self.stale_window(ttl_seconds);

        let state = if ttl_seconds < 0 {
            Freshness::Expired
        } else if ttl_seconds == 0 {
            // Never fresh, but still servable for the stale window.
            if age < stale_window {
                Freshness::Stale
            } else {
                Freshness::Expired
            }
        } else if age < ttl_seconds {
            Freshness::Fresh
        } else if age < ttl_seconds.saturating_add(stale_window) {
            Freshness::Stale
        } else {
            Freshness::Expired
        };

        FreshnessVerdict {
            state,
            age_seconds: age,
            expires_in_seconds: ttl_seconds.saturating_sub(age),
        }
    }

    pub fn classify_metadata(&self, metadata: &ArtifactMetadata, now: i64) -> FreshnessVerdict {
        self.classify(
            metadata.created_at.unwrap_or(now),
            metadata.ttl_seconds.unwrap_or(0),
            now,
        )
    }

    /// Classify against the current wall clock.
    pub fn classify_now(&self, created_at: i64, ttl_seconds: i64) -> FreshnessVerdict {
        self.classify(created_at, ttl_seconds, unix_now())
    }

    pub fn is_fresh(&self, created_at: i64, ttl_seconds: i64, now: i64) -> bool {
        self.classify(created_at, ttl_seconds, now).is_fresh()
    }

    pub fn is_stale(&self, created_at: i64, ttl_seconds: i64, now: i64) -> bool {
        self.classify(created_at, ttl_seconds, now).is_stale()
    }

    pub fn is_expired(&self, created_at: i64, ttl_seconds: i64, now: i64) -> bool {
        self.classify(created_at, ttl_seconds, now).is_expired()
    }

    pub fn recommended_action(&self, verdict: &FreshnessVerdict) -> RecommendedAction {
        verdict.recommended_action()
    }

    /// Share of the TTL left: 100 at creation, 0 at the TTL boundary,
    /// negative beyond it. A future `created_at` counts as just created.
    pub fn percent_remaining(&self, created_at: i64, ttl_seconds: i64, now: i64) -> f64 {
        if ttl_seconds <= 0 {
            return 0.0;
        }
        let age = now.saturating_sub(created_at).max(0);
        let remaining = ttl_seconds.saturating_sub(age) as f64;
        remaining / ttl_seconds as f64 * 100.0
    }

    /// Seconds until the artifact leaves the stale window; negative once expired.
    pub fn seconds_until_full_expiry(&self, created_at: i64, ttl_seconds: i64, now: i64) -> i64 {
        let age = now.saturating_sub(created_at);
        if ttl_seconds < 0 {
            return ttl_seconds.saturating_sub(age).min(0);
        }
        ttl_seconds
            .saturating_add(self.stale_window(ttl_seconds))
            .saturating_sub(age)
    }
}

pub(crate) fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
