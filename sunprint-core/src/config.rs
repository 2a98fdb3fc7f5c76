//! Client configuration.
//!
//! Loaded from environment variables with defaults matching the production
//! backend's expectations.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::error::{Result, SunprintError};
use crate::retry::RetryPolicy;

/// Default backend origin when `SUNPRINT_API_BASE` is unset.
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";

/// Default storefront domain used for the fallback collection URL.
pub const DEFAULT_STORE_DOMAIN: &str = "solar-archive.myshopify.com";

/// Print providers tried, in order, when resolving a blueprint.
pub const DEFAULT_PROVIDER_PREFERENCE: [u64; 11] = [16, 29, 99, 1, 6, 28, 27, 55, 58, 44, 3];

/// Longest side of an exported raster, in pixels.
pub const DEFAULT_EXPORT_MAX_DIM: u32 = 4096;

/// Network call classes, each with its own timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallClass {
    Health,
    Generation,
    HqGeneration,
    Catalog,
    VariantLookup,
    Checkout,
    PollTick,
}

impl fmt::Display for CallClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Health => write!(f, "health check"),
            Self::Generation => write!(f, "generation"),
            Self::HqGeneration => write!(f, "HQ generation"),
            Self::Catalog => write!(f, "catalog"),
            Self::VariantLookup => write!(f, "variant lookup"),
            Self::Checkout => write!(f, "checkout submission"),
            Self::PollTick => write!(f, "status poll"),
        }
    }
}

/// Per-class request timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    pub health: Duration,
    pub generation: Duration,
    pub hq_generation: Duration,
    pub catalog: Duration,
    /// Per-provider variant request during catalog resolution.
    pub variant_lookup: Duration,
    pub checkout: Duration,
    pub poll_tick: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            health: Duration::from_secs(12),
            generation: Duration::from_secs(90),
            hq_generation: Duration::from_secs(120),
            catalog: Duration::from_secs(45),
            variant_lookup: Duration::from_secs(30),
            checkout: Duration::from_secs(180),
            poll_tick: Duration::from_secs(15),
        }
    }
}

impl Timeouts {
    pub fn for_class(&self, class: CallClass) -> Duration {
        match class {
            CallClass::Health => self.health,
            CallClass::Generation => self.generation,
            CallClass::HqGeneration => self.hq_generation,
            CallClass::Catalog => self.catalog,
            CallClass::VariantLookup => self.variant_lookup,
            CallClass::Checkout => self.checkout,
            CallClass::PollTick => self.poll_tick,
        }
    }

    /// Run `fut` under the timeout of `class`.
    ///
    /// An elapsed timeout becomes [`SunprintError::Unreachable`] with
    /// `timed_out` set.
    pub async fn guard<T, F>(&self, class: CallClass, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let limit = self.for_class(class);
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(SunprintError::timed_out(format!(
                "{class} request timed out after {}s; the backend may be down or overloaded",
                limit.as_secs()
            ))),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin that relative backend URLs are resolved against.
    pub api_base: String,
    /// Storefront domain for the fallback collection link.
    pub store_domain: String,
    /// Mission sent with generation requests (e.g. "SDO").
    pub mission: String,
    /// Detector sent with HQ generation requests (e.g. "AIA").
    pub detector: String,
    pub timeouts: Timeouts,
    /// Health probe retries: fixed delay, capped attempts.
    pub health_retry: RetryPolicy,
    pub preview_poll: RetryPolicy,
    pub hq_poll: RetryPolicy,
    pub storefront_poll: RetryPolicy,
    /// Pause after a failed mockup before the next one is requested.
    pub mockup_failure_delay: Duration,
    /// Delay between session start and the one-shot catalog resolution.
    pub resolver_delay: Duration,
    pub provider_preference: Vec<u64>,
    pub export_max_dim: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            store_domain: DEFAULT_STORE_DOMAIN.to_string(),
            mission: "SDO".to_string(),
            detector: "AIA".to_string(),
            timeouts: Timeouts::default(),
            health_retry: RetryPolicy::new(Duration::from_secs(5), 5),
            preview_poll: RetryPolicy::new(Duration::from_secs(3), 60)
                .with_initial_delay(Duration::from_secs(3)),
            hq_poll: RetryPolicy::new(Duration::from_millis(1500), 80),
            storefront_poll: RetryPolicy::new(Duration::from_secs(3), 30),
            mockup_failure_delay: Duration::from_millis(500),
            resolver_delay: Duration::from_millis(1500),
            provider_preference: DEFAULT_PROVIDER_PREFERENCE.to_vec(),
            export_max_dim: DEFAULT_EXPORT_MAX_DIM,
        }
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
}

impl ClientConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let api_base = std::env::var("SUNPRINT_API_BASE")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base);
        url::Url::parse(&api_base)
            .map_err(|e| SunprintError::Config(format!("Invalid SUNPRINT_API_BASE: {e}")))?;

        let store_domain =
            std::env::var("SUNPRINT_STORE_DOMAIN").unwrap_or(defaults.store_domain);
        let mission = std::env::var("SUNPRINT_MISSION").unwrap_or(defaults.mission);
        let detector = std::env::var("SUNPRINT_DETECTOR").unwrap_or(defaults.detector);

        let d = defaults.timeouts;
        let timeouts = Timeouts {
            health: env_secs("SUNPRINT_TIMEOUT_HEALTH_SECS").unwrap_or(d.health),
            generation: env_secs("SUNPRINT_TIMEOUT_GENERATION_SECS").unwrap_or(d.generation),
            hq_generation: env_secs("SUNPRINT_TIMEOUT_HQ_SECS").unwrap_or(d.hq_generation),
            catalog: env_secs("SUNPRINT_TIMEOUT_CATALOG_SECS").unwrap_or(d.catalog),
            variant_lookup: env_secs("SUNPRINT_TIMEOUT_VARIANTS_SECS").unwrap_or(d.variant_lookup),
            checkout: env_secs("SUNPRINT_TIMEOUT_CHECKOUT_SECS").unwrap_or(d.checkout),
            poll_tick: env_secs("SUNPRINT_TIMEOUT_POLL_SECS").unwrap_or(d.poll_tick),
        };

        let resolver_delay = std::env::var("SUNPRINT_RESOLVER_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.resolver_delay);

        Ok(Self {
            api_base,
            store_domain,
            mission,
            detector,
            timeouts,
            resolver_delay,
            ..Self::default()
        })
    }

    /// Generic collection page used when the storefront link never arrives.
    pub fn fallback_storefront_url(&self) -> String {
        format!("https://{}/collections/all", self.store_domain)
    }
}
