//! Startup configuration, read once from the environment.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

const DAY_MS: i64 = 24 * 3600 * 1000;

/// Cache lifetime settings. Fixed for the life of a `CacheService`.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl_days: u32,
    pub stale_after_days: u32,
    /// In-memory hot tier capacity; 0 disables it.
    pub hot_capacity: usize,
    pub refresh_workers: usize,
    pub refresh_queue: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_days: 30,
            stale_after_days: 7,
            hot_capacity: 512,
            refresh_workers: 2,
            refresh_queue: 64,
        }
    }
}

impl CacheConfig {
    pub fn ttl_ms(&self) -> i64 {
        self.ttl_days as i64 * DAY_MS
    }

    pub fn stale_after_ms(&self) -> i64 {
        self.stale_after_days as i64 * DAY_MS
    }
}

/// Completion provider endpoint settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    /// Minimum spacing between requests.
    pub min_interval: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.deepseek.com".into(),
            model: "deepseek-chat".into(),
            timeout: Duration::from_secs(30),
            min_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub db_path: PathBuf,
    /// `None` uses the bundled term catalog.
    pub catalog_path: Option<PathBuf>,
    pub cache: CacheConfig,
    pub provider: ProviderConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("slang_bridge_cache.db"),
            catalog_path: None,
            cache: CacheConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unparseable values keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("SLANG_BRIDGE_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        config.catalog_path = lookup("SLANG_BRIDGE_CATALOG_PATH").map(PathBuf::from);

        let cache = &mut config.cache;
        cache.ttl_days = parse_or(&lookup, "SLANG_BRIDGE_TTL_DAYS", cache.ttl_days);
        cache.stale_after_days =
            parse_or(&lookup, "SLANG_BRIDGE_STALE_AFTER_DAYS", cache.stale_after_days);
        cache.refresh_workers =
            parse_or(&lookup, "SLANG_BRIDGE_REFRESH_WORKERS", cache.refresh_workers);
        cache.refresh_queue = parse_or(&lookup, "SLANG_BRIDGE_REFRESH_QUEUE", cache.refresh_queue);
        cache.hot_capacity =
            parse_or(&lookup, "SLANG_BRIDGE_HOT_CACHE_CAPACITY", cache.hot_capacity);

        if cache.ttl_days == 0 {
            warn!("SLANG_BRIDGE_TTL_DAYS must be positive, using 30");
            cache.ttl_days = 30;
        }
        if cache.stale_after_days >= cache.ttl_days {
            let clamped = cache.ttl_days / 2;
            warn!(
                stale_after_days = cache.stale_after_days,
                ttl_days = cache.ttl_days,
                clamped,
                "stale-after must be below TTL, clamping"
            );
            cache.stale_after_days = clamped;
        }
        cache.refresh_workers = cache.refresh_workers.max(1);
        cache.refresh_queue = cache.refresh_queue.max(1);

        let provider = &mut config.provider;
        provider.api_key = lookup("DEEPSEEK_API_KEY").filter(|k| !k.trim().is_empty());
        if let Some(url) = lookup("SLANG_BRIDGE_PROVIDER_URL") {
            provider.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("SLANG_BRIDGE_PROVIDER_MODEL") {
            provider.model = model;
        }
        let timeout_secs = parse_or(
            &lookup,
            "SLANG_BRIDGE_PROVIDER_TIMEOUT_SECS",
            provider.timeout.as_secs(),
        );
        provider.timeout = Duration::from_secs(timeout_secs.max(1));

        config
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match lookup(name) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, default = %default, "invalid setting, using default");
            default
        }),
    }
}
