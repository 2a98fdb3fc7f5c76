//! Startup probes: backend health and storefront configuration.

use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::backend::Backend;
use crate::config::{CallClass, ClientConfig};
use crate::error::SunprintError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Online { attempts: u32 },
    /// Every attempt was unreachable.
    Offline { attempts: u32 },
}

impl HealthStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online { .. })
    }
}

/// Probe the backend, retrying unreachable answers on the health policy.
///
/// `on_retry` receives the failed attempt number and the error before each
/// wait, so callers can show "waking up the server" style progress.
#[instrument(level = "info", skip_all)]
pub async fn check_health<N>(
    backend: &dyn Backend,
    config: &ClientConfig,
    on_retry: N,
) -> HealthStatus
where
    N: FnMut(u32, &SunprintError),
{
    let start = Instant::now();
    let policy = config.health_retry;
    let mut attempts = 0u32;
    let result = policy
        .retry_unreachable(
            || {
                attempts += 1;
                config.timeouts.guard(CallClass::Health, backend.health())
            },
            on_retry,
        )
        .await;

    let latency_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(()) => {
            info!(attempts, latency_ms, "Backend online");
            HealthStatus::Online { attempts }
        }
        Err(e) => {
            warn!(attempts, latency_ms, error = %e, "Backend offline");
            HealthStatus::Offline { attempts }
        }
    }
}

/// Storefront domain from the backend, or `None` to keep the configured one.
#[instrument(level = "debug", skip_all)]
pub async fn fetch_store_domain(backend: &dyn Backend, config: &ClientConfig) -> Option<String> {
    match config
        .timeouts
        .guard(CallClass::Health, backend.store_config())
        .await
    {
        Ok(store) => {
            debug!(domain = ?store.storefront_domain, "Store config loaded");
            store.storefront_domain
        }
        Err(e) => {
            debug!(error = %e, "Store config unavailable, keeping default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_online_after_retries() {
        let mock = MockBackend::new().unreachable_for(2);
        let mut retries = Vec::new();
        let start = tokio::time::Instant::now();
        let status = check_health(&mock, &ClientConfig::default(), |n, _| retries.push(n)).await;
        assert_eq!(status, HealthStatus::Online { attempts: 3 });
        assert_eq!(retries, vec![1, 2]);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_after_five_attempts() {
        let mock = MockBackend::new().unreachable_for(u32::MAX);
        let status = check_health(&mock, &ClientConfig::default(), |_, _| {}).await;
        assert_eq!(status, HealthStatus::Offline { attempts: 5 });
        assert!(!status.is_online());
    }

    #[tokio::test]
    async fn test_store_domain() {
        let config = ClientConfig::default();
        let mock = MockBackend::new().with_store_domain("sun.example.com");
        assert_eq!(
            fetch_store_domain(&mock, &config).await.as_deref(),
            Some("sun.example.com")
        );
        assert_eq!(fetch_store_domain(&MockBackend::new(), &config).await, None);
    }
}
