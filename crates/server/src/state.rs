use crate::auth::TokenKeys;
use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::telemetry::{prometheus_handle, PrometheusTransformMetrics};
use dashmap::DashMap;
use imgshift::Pipeline;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;
use store::{ImageStore, Stores, UserStore};

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Rate limit tracking: client key -> (count, window_start)
    pub rate_limiter: Arc<DashMap<String, (u32, Instant)>>,

    pub images: Arc<dyn ImageStore>,
    pub users: Arc<dyn UserStore>,

    /// Transform pipeline (shared across requests)
    pub pipeline: Pipeline,

    pub tokens: TokenKeys,

    /// Present when metrics are enabled and the recorder installed.
    pub metrics: Option<PrometheusHandle>,
}

impl ServerState {
    /// Create server state over already-built stores.
    pub fn new(mut config: ServerConfig, stores: Stores) -> Self {
        config.ensure_jwt_secret();
        let tokens = TokenKeys::new(
            &config.jwt_secret,
            std::time::Duration::from_secs(config.token_ttl_secs),
        );

        let metrics = if config.metrics_enabled {
            imgshift::set_transform_metrics(Some(Arc::new(PrometheusTransformMetrics)));
            prometheus_handle()
        } else {
            None
        };

        Self {
            config: Arc::new(config),
            rate_limiter: Arc::new(DashMap::new()),
            images: stores.images,
            users: stores.users,
            pipeline: Pipeline::default(),
            tokens,
            metrics,
        }
    }

    /// Build the configured storage backend, then the state.
    pub async fn from_config(config: ServerConfig) -> ServerResult<Self> {
        let stores = config.storage.build().await?;
        Ok(Self::new(config, stores))
    }

    /// Count one request against `key`'s fixed window.
    ///
    /// Returns false once the window's allowance is spent. The map holds at
    /// most `rate_limit_max_clients` keys: when full, expired windows are
    /// dropped, and a new key is refused if none were.
    pub fn check_rate_limit(&self, key: &str) -> bool {
        let now = Instant::now();
        let window = self.config.rate_limit_window();
        let limit = self.config.rate_limit_requests;
        let capacity = self.config.rate_limit_max_clients;

        if !self.rate_limiter.contains_key(key) && self.rate_limiter.len() >= capacity {
            self.rate_limiter
                .retain(|_, (_, window_start)| now.duration_since(*window_start) <= window);
            if self.rate_limiter.len() >= capacity {
                tracing::warn!(clients = capacity, "rate limiter full, refusing new client");
                return false;
            }
        }

        let mut entry = self.rate_limiter.entry(key.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        // Reset if window has passed
        if now.duration_since(*window_start) > window {
            *count = 0;
            *window_start = now;
        }

        // Check limit
        if *count >= limit {
            return false;
        }

        *count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(limit: u32) -> ServerState {
        let config = ServerConfig {
            rate_limit_requests: limit,
            metrics_enabled: false,
            ..Default::default()
        };
        ServerState::new(config, Stores::in_memory())
    }

    #[test]
    fn rate_limit_is_per_key() {
        let state = state(2);
        assert!(state.check_rate_limit("a"));
        assert!(state.check_rate_limit("a"));
        assert!(!state.check_rate_limit("a"));
        assert!(state.check_rate_limit("b"));
    }

    #[test]
    fn limiter_map_stays_bounded() {
        let config = ServerConfig {
            rate_limit_requests: 1,
            rate_limit_max_clients: 50,
            metrics_enabled: false,
            ..Default::default()
        };
        let state = ServerState::new(config, Stores::in_memory());

        let allowed = (0..1_000)
            .filter(|i| state.check_rate_limit(&format!("10.0.{}.{}", i / 256, i % 256)))
            .count();
        assert_eq!(allowed, 50);
        assert_eq!(state.rate_limiter.len(), 50);
        // Tracked clients keep their own window.
        assert!(!state.check_rate_limit("10.0.0.0"));
    }

    #[test]
    fn expired_windows_make_room() {
        let config = ServerConfig {
            rate_limit_requests: 1,
            rate_limit_window_secs: 0,
            rate_limit_max_clients: 2,
            metrics_enabled: false,
            ..Default::default()
        };
        let state = ServerState::new(config, Stores::in_memory());
        assert!(state.check_rate_limit("a"));
        assert!(state.check_rate_limit("b"));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(state.check_rate_limit("c"));
        assert!(state.rate_limiter.len() <= 2);
    }

    #[test]
    fn missing_secret_is_generated() {
        let state = state(1);
        assert!(!state.config.jwt_secret.is_empty());
        assert!(state.metrics.is_none());
    }
}
