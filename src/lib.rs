//! slang-bridge: style and slang translation over an external completion
//! provider, with a stale-while-revalidate result cache and a
//! freshness-aware candidate reranker.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod freshness;
pub mod metrics;
pub mod pipeline;
pub mod provider;
pub mod repair;
pub mod style;

pub use cache::key::CacheKey;
pub use cache::{CacheService, CacheStats, EntryMeta};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BridgeConfig, CacheConfig, ProviderConfig};
pub use error::{BridgeError, InitError, ProviderError, ValidationError};
pub use freshness::{CatalogRegistry, FreshnessMetadata, TermRegistry};
pub use pipeline::{BridgeService, CacheTarget, TranslateMetadata, TranslateOptions, TranslateOutput};
pub use provider::CompletionProvider;
pub use style::Style;

/// Install the fmt subscriber, filtered by `RUST_LOG` (default
/// `slang_bridge=debug`). `SLANG_BRIDGE_LOG_FORMAT=json` switches to JSON
/// lines. Later calls are no-ops.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("slang_bridge=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    let json = std::env::var("SLANG_BRIDGE_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
