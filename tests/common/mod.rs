//! Shared integration-test helpers: a scripted provider, a manual clock and
//! a service wired to an in-memory store.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;

use slang_bridge::cache::sqlite::SqliteStore;
use slang_bridge::{
    BridgeService, CacheConfig, CacheService, CatalogRegistry, CompletionProvider, ManualClock,
    ProviderError,
};

pub const DAY: Duration = Duration::from_secs(24 * 3600);

/// Replies with the first rule whose needle occurs in the instruction.
/// Counts every call and can be switched to fail.
pub struct ScriptedProvider {
    rules: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
    calls: AtomicUsize,
    inputs: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rules: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        })
    }

    /// Add or replace the reply for instructions containing `needle`.
    pub fn reply(&self, needle: &str, text: &str) -> &Self {
        let mut rules = self.rules.lock();
        match rules.iter_mut().find(|(n, _)| n == needle) {
            Some(rule) => rule.1 = text.to_string(),
            None => rules.push((needle.to_string(), text.to_string())),
        }
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, instruction: &str, input: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().push(input.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Api("scripted failure".into()));
        }
        self.rules
            .lock()
            .iter()
            .find(|(needle, _)| instruction.contains(needle.as_str()))
            .map(|(_, text)| text.clone())
            .ok_or_else(|| ProviderError::Api(format!("no scripted reply for: {instruction}")))
    }
}

/// Needles matching the instruction templates.
pub mod needles {
    /// Any instruction normalizing into the baseline.
    pub const NORMALIZE: &str = "into plain, neutral standard English";
    /// The multi-candidate trend-slang instruction.
    pub const CANDIDATES: &str = "|||";
    pub const FORMAL: &str = "formal, professional";
    pub const CASUAL_PEER: &str = "between peers";
}

pub struct TestEnv {
    pub service: BridgeService,
    pub provider: Arc<ScriptedProvider>,
    pub clock: Arc<ManualClock>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        let clock = Arc::new(ManualClock::at_date(
            NaiveDate::from_ymd_opt(2026, 10, 15).expect("valid date"),
        ));
        let store = SqliteStore::open_in_memory().expect("in-memory sqlite");
        let cache = CacheService::new(store, &config, clock.clone());
        let provider = ScriptedProvider::new();
        let registry = Arc::new(CatalogRegistry::bundled().expect("bundled catalog"));
        let service = BridgeService::new(provider.clone(), registry, cache);
        Self {
            service,
            provider,
            clock,
        }
    }
}

/// Poll `cond` every 10ms until it holds or `timeout` passes.
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
