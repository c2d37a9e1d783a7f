//! Rate Limiting Middleware using GCRA Algorithm
//!
//! Limits `/api` requests per peer IP with tower_governor. GCRA needs no
//! background refill task; stale per-IP entries are pruned periodically.

use governor::middleware::StateInformationMiddleware;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tracing::debug;

/// Governor config with X-RateLimit-* headers enabled
pub type DefaultGovernorConfig =
    tower_governor::governor::GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Seconds per replenished request
    pub per_second: u64,
    /// Requests that can be made immediately
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 1,
            burst_size: 10,
        }
    }
}

impl RateLimitConfig {
    /// Tighter limits for exposed deployments
    pub fn strict() -> Self {
        Self {
            per_second: 4,
            burst_size: 2,
        }
    }
}

/// Build the governor config.
///
/// Requires the service to run with
/// `into_make_service_with_connect_info::<SocketAddr>()` for IP extraction.
pub fn create_governor_config(config: &RateLimitConfig) -> anyhow::Result<Arc<DefaultGovernorConfig>> {
    let governor = GovernorConfigBuilder::default()
        .per_second(config.per_second.max(1))
        .burst_size(config.burst_size.max(1))
        .use_headers()
        .finish()
        .ok_or_else(|| anyhow::anyhow!("invalid rate limit settings: {:?}", config))?;
    Ok(Arc::new(governor))
}

/// Periodically drop limiter state for IPs that have gone quiet
pub fn spawn_limiter_cleanup(config: &Arc<DefaultGovernorConfig>, every: Duration) -> tokio::task::JoinHandle<()> {
    let limiter = config.limiter().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            debug!(tracked = limiter.len(), "Pruning rate limiter state");
            limiter.retain_recent();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.per_second, 1);
        assert_eq!(config.burst_size, 10);
    }

    #[test]
    fn test_strict_config() {
        let config = RateLimitConfig::strict();
        assert_eq!(config.per_second, 4);
        assert_eq!(config.burst_size, 2);
    }

    #[test]
    fn test_zero_settings_are_clamped() {
        let config = RateLimitConfig {
            per_second: 0,
            burst_size: 0,
        };
        assert!(create_governor_config(&config).is_ok());
    }
}
