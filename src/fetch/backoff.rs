//! Randomized waits before rate-limited remote calls
//!
//! Every call to the search or browse endpoints is preceded by a wait drawn
//! uniformly from `[min * factor, max * factor]`. A throttled call is retried
//! after a wait with the escalated factor.

use crate::config::BackoffConfig;
use std::time::Duration;

/// Bounds and escalation factor for backoff waits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Lower bound of an unescalated wait, in seconds
    pub min_seconds: f64,

    /// Upper bound of an unescalated wait, in seconds
    pub max_seconds: f64,

    /// Multiplier applied to both bounds when retrying after a throttle
    pub escalation_factor: f64,

    /// When false, waits always use the upper bound
    pub jitter: bool,
}

impl BackoffPolicy {
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            min_seconds: config.min_seconds,
            max_seconds: config.max_seconds,
            escalation_factor: config.escalation_factor,
            jitter: true,
        }
    }

    /// A policy that never sleeps
    pub fn none() -> Self {
        Self {
            min_seconds: 0.0,
            max_seconds: 0.0,
            escalation_factor: 1.0,
            jitter: false,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

/// Chooses a wait in `[min * factor, max * factor]` with millisecond resolution
///
/// With `jitter` disabled, or when the bounds collapse, the upper bound is used.
pub fn pick_duration(
    min_seconds: f64,
    max_seconds: f64,
    factor: f64,
    jitter: bool,
    rng: &mut fastrand::Rng,
) -> Duration {
    let low = (min_seconds * factor).max(0.0);
    let high = (max_seconds * factor).max(low);

    let seconds = if jitter && high > low {
        low + rng.f64() * (high - low)
    } else {
        high
    };

    Duration::from_millis((seconds * 1000.0).round() as u64)
}

/// Sleeps for backoff waits drawn from a policy
///
/// Holds no state between waits apart from its random source.
pub struct BackoffScheduler {
    policy: BackoffPolicy,
    rng: fastrand::Rng,
}

impl BackoffScheduler {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            rng: fastrand::Rng::new(),
        }
    }

    /// Creates a scheduler with a fixed seed, for reproducible waits
    pub fn with_seed(policy: BackoffPolicy, seed: u64) -> Self {
        Self {
            policy,
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Sleeps for a duration in `[min * factor, max * factor]` and returns it
    pub async fn wait(
        &mut self,
        min_seconds: f64,
        max_seconds: f64,
        factor: f64,
        jitter: bool,
    ) -> Duration {
        let duration = pick_duration(min_seconds, max_seconds, factor, jitter, &mut self.rng);
        if factor > 1.0 {
            tracing::info!(
                "Backing off for {:.3}s (escalated x{})",
                duration.as_secs_f64(),
                factor
            );
        } else {
            tracing::debug!("Waiting {:.3}s before next request", duration.as_secs_f64());
        }
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
        duration
    }

    /// Regular wait before a remote call
    pub async fn pause(&mut self) -> Duration {
        let BackoffPolicy {
            min_seconds,
            max_seconds,
            jitter,
            ..
        } = self.policy;
        self.wait(min_seconds, max_seconds, 1.0, jitter).await
    }

    /// Escalated wait before retrying a throttled call
    pub async fn escalate(&mut self) -> Duration {
        let BackoffPolicy {
            min_seconds,
            max_seconds,
            escalation_factor,
            jitter,
        } = self.policy;
        self.wait(min_seconds, max_seconds, escalation_factor, jitter)
            .await
    }
}
