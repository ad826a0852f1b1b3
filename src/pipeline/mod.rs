//! Bridge translation pipeline.
//!
//! `BridgeService::translate` walks Validate → CheckDirectMapping →
//! CheckCache → Normalize → TargetDispatch → Repair → CacheWrite → Return.
//! Provider failures never fail a request: the stage that failed passes its
//! input through and the result is marked degraded (and not cached). Only
//! validation errors reach the caller.

pub mod direct;
pub mod protect;
pub mod stage;
pub mod templates;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::key::CacheKey;
use crate::cache::refresh::{RefreshHandler, RefreshJob};
use crate::cache::sqlite::SqliteStore;
use crate::cache::{CacheService, CacheStats, EntryMeta, MAX_TEXT_CHARS};
use crate::clock::{Clock, SystemClock};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, InitError, ProviderError, RefreshError, RegistryError, ValidationError};
use crate::freshness::{CatalogRegistry, FreshnessMetadata, FreshnessReranker, TermRegistry};
use crate::metrics::{metric_names, MetricSummary, MetricsRegistry};
use crate::provider::deepseek::DeepSeekProvider;
use crate::provider::{parse_candidates, CompletionProvider};
use crate::repair::{ContractionRestoration, RepairContext, TextRepairChain};
use crate::style::Style;

use self::protect::PlaceholderProtector;
use self::stage::{Stage, StageTrace};

/// Upper bound on one provider call, retries included.
const PROVIDER_CALL_LIMIT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Default)]
pub struct TranslateOptions {
    /// Rerank multi-candidate output by term currency.
    pub use_latest_slang: bool,
    /// Skip both the cache read and the cache write.
    pub bypass_cache: bool,
    /// Free-form hint passed to the provider and to context detection.
    pub context: Option<String>,
}

/// A validated translation request.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRequest {
    pub text: String,
    pub from: Style,
    pub to: Style,
    pub use_latest_slang: bool,
    pub context: Option<String>,
}

impl PipelineRequest {
    pub fn validate(
        text: &str,
        from: &str,
        to: &str,
        options: &TranslateOptions,
    ) -> Result<Self, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyText);
        }
        let len = text.chars().count();
        if len > MAX_TEXT_CHARS {
            return Err(ValidationError::TooLong {
                len,
                max: MAX_TEXT_CHARS,
            });
        }
        let from: Style = from.parse()?;
        let to: Style = to.parse()?;
        if from == to {
            return Err(ValidationError::SameStyle(from.to_string()));
        }
        Ok(Self {
            text: text.to_string(),
            from,
            to,
            use_latest_slang: options.use_latest_slang,
            context: options
                .context
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        })
    }

    /// Text the reranker classifies: the input plus any caller context.
    fn detection_text(&self) -> String {
        match &self.context {
            Some(context) => format!("{} {}", self.text, context),
            None => self.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TranslateMetadata {
    pub request_id: String,
    pub from_style: Style,
    pub to_style: Style,
    pub cached: bool,
    pub cache_age_ms: Option<i64>,
    pub direct_mapping: bool,
    pub refresh_scheduled: bool,
    pub degraded: bool,
    pub freshness: Option<FreshnessMetadata>,
    pub stages: Vec<Stage>,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranslateOutput {
    pub translation: String,
    pub metadata: TranslateMetadata,
}

/// Which cache entry to invalidate.
#[derive(Debug, Clone, Copy)]
pub enum CacheTarget<'a> {
    /// Hex-encoded cache key.
    Key(&'a str),
    Text {
        from: &'a str,
        to: &'a str,
        text: &'a str,
    },
}

/// Result of the non-caching stages.
struct StagesOutput {
    text: String,
    freshness: Option<FreshnessMetadata>,
    degraded: bool,
}

/// Per-request outcome flags folded into `TranslateMetadata`.
#[derive(Default)]
struct Outcome {
    cached: bool,
    cache_age_ms: Option<i64>,
    direct_mapping: bool,
    refresh_scheduled: bool,
    degraded: bool,
    freshness: Option<FreshnessMetadata>,
}

/// Normalize → TargetDispatch → Repair. Shared by requests and refreshes.
struct Pipeline {
    provider: Arc<dyn CompletionProvider>,
    registry: RwLock<Arc<dyn TermRegistry>>,
    reranker: FreshnessReranker,
    repair: TextRepairChain,
    protector: PlaceholderProtector,
    metrics: Arc<MetricsRegistry>,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    fn registry(&self) -> Arc<dyn TermRegistry> {
        self.registry.read().clone()
    }

    async fn call(&self, stage: Stage, instruction: &str, input: &str) -> Result<String, ProviderError> {
        let span = self.metrics.span(metric_names::PROVIDER_CALL);
        let result = match tokio::time::timeout(
            PROVIDER_CALL_LIMIT,
            self.provider.complete(instruction, input),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        };
        let elapsed = span.finish();
        match result {
            Ok(text) if text.trim().is_empty() => Err(ProviderError::EmptyResponse),
            Ok(text) => {
                debug!(stage = %stage, elapsed_ms = elapsed.as_millis() as u64, "provider call done");
                Ok(text.trim().to_string())
            }
            Err(e) => Err(e),
        }
    }

    async fn run(&self, request: &PipelineRequest, trace: &mut StageTrace) -> StagesOutput {
        let (protected, placeholders) = self.protector.protect(&request.text);
        let repair_ctx = RepairContext {
            source_text: &request.text,
        };
        let context = request.context.as_deref();
        let mut degraded = false;

        trace.advance(Stage::Normalize);
        let normalized = if request.from == Style::Standard {
            protected
        } else {
            let instruction = templates::normalize_instruction(request.from, context);
            match self.call(Stage::Normalize, &instruction, &protected).await {
                Ok(text) => self
                    .repair
                    .apply_named(ContractionRestoration::NAME, &text, &repair_ctx),
                Err(e) => {
                    warn!(from = %request.from, error = %e, "normalize failed, passing input through");
                    degraded = true;
                    protected
                }
            }
        };

        trace.advance(Stage::TargetDispatch);
        let mut freshness = None;
        let dispatched = if request.to == Style::Standard {
            normalized
        } else if request.to.wants_candidates() {
            let instruction = templates::candidates_instruction(request.to, context);
            match self.call(Stage::TargetDispatch, &instruction, &normalized).await {
                Ok(raw) => {
                    let candidates = parse_candidates(&raw);
                    let span = self.metrics.span(metric_names::RERANK);
                    let registry = self.registry();
                    let outcome = self.reranker.rerank(
                        &candidates,
                        request.use_latest_slang,
                        &request.detection_text(),
                        registry.as_ref(),
                        self.clock.today(),
                    );
                    span.finish();
                    match outcome {
                        Some(outcome) => {
                            debug!(
                                candidates = candidates.len(),
                                chosen = outcome.index,
                                blocked = outcome.metadata.blocked_terms.len(),
                                "candidates reranked"
                            );
                            freshness = Some(outcome.metadata);
                            outcome.text
                        }
                        None => {
                            warn!(to = %request.to, "provider returned no usable candidates");
                            degraded = true;
                            normalized
                        }
                    }
                }
                Err(e) => {
                    warn!(to = %request.to, error = %e, "target dispatch failed, passing input through");
                    degraded = true;
                    normalized
                }
            }
        } else {
            let instruction = templates::target_instruction(request.to, context);
            match self.call(Stage::TargetDispatch, &instruction, &normalized).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(to = %request.to, error = %e, "target dispatch failed, passing input through");
                    degraded = true;
                    normalized
                }
            }
        };

        trace.advance(Stage::Repair);
        let repaired = self.repair.apply(&dispatched, &repair_ctx);
        StagesOutput {
            text: self.protector.restore(&repaired, &placeholders),
            freshness,
            degraded,
        }
    }
}

/// Replays a stale entry through the pipeline and overwrites it, unless the
/// entry was invalidated or rewritten in the meantime.
struct PipelineRefresher {
    pipeline: Arc<Pipeline>,
    cache: Arc<CacheService>,
}

#[async_trait]
impl RefreshHandler for PipelineRefresher {
    async fn refresh(&self, job: RefreshJob) -> Result<(), RefreshError> {
        let span = self.pipeline.metrics.span(metric_names::REFRESH_DONE);
        let request = PipelineRequest {
            text: job.source_text.clone(),
            from: job.from,
            to: job.to,
            use_latest_slang: job.meta.use_latest_slang,
            context: job.meta.context.clone(),
        };
        let mut trace = StageTrace::starting_at(Stage::CheckCache);
        let output = self.pipeline.run(&request, &mut trace).await;
        if output.degraded {
            return Err(RefreshError::Degraded);
        }

        trace.advance(Stage::CacheWrite);
        let meta = EntryMeta {
            use_latest_slang: request.use_latest_slang,
            context: request.context.clone(),
            freshness: output.freshness,
            refreshed: true,
        };
        let replaced = self.cache.try_replace(&job, &output.text, meta)?;
        span.finish();
        debug!(key = %job.key, replaced, "cache entry refreshed");
        Ok(())
    }
}

/// The translation service: orchestrates the pipeline over a shared cache.
#[derive(Clone)]
pub struct BridgeService {
    pipeline: Arc<Pipeline>,
    cache: Arc<CacheService>,
}

impl BridgeService {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        registry: Arc<dyn TermRegistry>,
        cache: CacheService,
    ) -> Self {
        let pipeline = Pipeline {
            provider,
            registry: RwLock::new(registry),
            reranker: FreshnessReranker::default(),
            repair: TextRepairChain::standard(),
            protector: PlaceholderProtector::new(),
            metrics: Arc::new(MetricsRegistry::new()),
            clock: Arc::clone(cache.clock()),
        };
        Self {
            pipeline: Arc::new(pipeline),
            cache: Arc::new(cache),
        }
    }

    /// Build the production service: DeepSeek provider, configured (or
    /// bundled) term catalog, file-backed SQLite store. An unusable database
    /// path falls back to an in-memory store.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, InitError> {
        let provider = Arc::new(DeepSeekProvider::new(&config.provider)?);
        let registry = load_registry(config);

        let store = match SqliteStore::open(&config.db_path) {
            Ok(store) => store,
            Err(e) => {
                warn!(
                    path = %config.db_path.display(),
                    error = %e,
                    "result store open failed, caching in memory only"
                );
                SqliteStore::open_in_memory()?
            }
        };
        let cache = CacheService::new(store, &config.cache, Arc::new(SystemClock));
        Ok(Self::new(provider, registry, cache))
    }

    /// Remove expired entries, then start the configured refresh workers and
    /// a cleanup loop ticking every `cleanup_every`. Must run inside a tokio
    /// runtime.
    pub fn start(&self, cleanup_every: Duration) -> JoinHandle<()> {
        let removed = self.cache.cleanup_expired();
        let workers = self.cache.refresh_workers();
        let handler = Arc::new(PipelineRefresher {
            pipeline: Arc::clone(&self.pipeline),
            cache: Arc::clone(&self.cache),
        });
        let started = self.cache.refresh_coordinator().start(workers, handler);
        info!(workers, removed, started, "bridge service started");
        self.cache.spawn_cleanup_loop(cleanup_every)
    }

    /// Stop refresh workers and the cleanup loop. Requests keep working;
    /// stale reads no longer refresh.
    pub fn shutdown(&self) {
        self.cache.refresh_coordinator().shutdown();
        info!("bridge service shut down");
    }

    pub fn cache(&self) -> &Arc<CacheService> {
        &self.cache
    }

    pub async fn translate(
        &self,
        text: &str,
        from: &str,
        to: &str,
        options: TranslateOptions,
    ) -> Result<TranslateOutput, BridgeError> {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let mut trace = StageTrace::new();

        let request = match PipelineRequest::validate(text, from, to, &options) {
            Ok(request) => request,
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "translate request rejected");
                return Err(e.into());
            }
        };

        trace.advance(Stage::CheckDirectMapping);
        if let Some(mapped) = direct::lookup(request.from, request.to, &request.text) {
            trace.advance(Stage::Return);
            let outcome = Outcome {
                direct_mapping: true,
                ..Outcome::default()
            };
            return Ok(self.finish(request_id, &request, mapped.to_string(), outcome, trace, started));
        }

        trace.advance(Stage::CheckCache);
        if !options.bypass_cache {
            let span = self.pipeline.metrics.span(metric_names::CACHE_LOOKUP);
            let hit = self.cache.get(request.from, request.to, &request.text);
            span.finish();
            if let Some(hit) = hit {
                trace.advance(Stage::Return);
                let outcome = Outcome {
                    cached: true,
                    cache_age_ms: Some(hit.age_ms),
                    refresh_scheduled: hit.refresh_scheduled,
                    freshness: hit.entry.meta.freshness,
                    ..Outcome::default()
                };
                return Ok(self.finish(request_id, &request, hit.entry.output_text, outcome, trace, started));
            }
        }

        let output = self.pipeline.run(&request, &mut trace).await;

        if !options.bypass_cache && !output.degraded {
            trace.advance(Stage::CacheWrite);
            let meta = EntryMeta {
                use_latest_slang: request.use_latest_slang,
                context: request.context.clone(),
                freshness: output.freshness.clone(),
                refreshed: false,
            };
            self.cache
                .set(request.from, request.to, &request.text, &output.text, meta);
        }
        trace.advance(Stage::Return);

        let outcome = Outcome {
            degraded: output.degraded,
            freshness: output.freshness,
            ..Outcome::default()
        };
        Ok(self.finish(request_id, &request, output.text, outcome, trace, started))
    }

    fn finish(
        &self,
        request_id: String,
        request: &PipelineRequest,
        translation: String,
        outcome: Outcome,
        trace: StageTrace,
        started: Instant,
    ) -> TranslateOutput {
        let elapsed = started.elapsed();
        self.pipeline
            .metrics
            .record(metric_names::TRANSLATE_DONE, elapsed);
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;

        info!(
            request_id = %request_id,
            from = %request.from,
            to = %request.to,
            cached = outcome.cached,
            direct_mapping = outcome.direct_mapping,
            degraded = outcome.degraded,
            elapsed_ms,
            "translate done"
        );

        TranslateOutput {
            translation,
            metadata: TranslateMetadata {
                request_id,
                from_style: request.from,
                to_style: request.to,
                cached: outcome.cached,
                cache_age_ms: outcome.cache_age_ms,
                direct_mapping: outcome.direct_mapping,
                refresh_scheduled: outcome.refresh_scheduled,
                degraded: outcome.degraded,
                freshness: outcome.freshness,
                stages: trace.into_path(),
                elapsed_ms,
            },
        }
    }

    /// Delete one cache entry. Returns whether it existed. A malformed hex
    /// key matches nothing.
    pub fn invalidate(&self, target: CacheTarget<'_>) -> Result<bool, BridgeError> {
        match target {
            CacheTarget::Key(hex) => match hex.parse::<CacheKey>() {
                Ok(key) => Ok(self.cache.invalidate(&key)),
                Err(e) => {
                    debug!(error = %e, "invalidate with malformed key");
                    Ok(false)
                }
            },
            CacheTarget::Text { from, to, text } => {
                let from: Style = from.parse()?;
                let to: Style = to.parse()?;
                Ok(self.cache.invalidate_text(from, to, text))
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cleanup_expired(&self) -> usize {
        self.cache.cleanup_expired()
    }

    pub fn metrics_summary(&self) -> HashMap<String, MetricSummary> {
        self.pipeline.metrics.summary()
    }

    pub fn registry_version(&self) -> u32 {
        self.pipeline.registry().version()
    }

    /// Swap the term catalog used by subsequent reranks.
    pub fn replace_registry(&self, registry: Arc<dyn TermRegistry>) {
        let version = registry.version();
        *self.pipeline.registry.write() = registry;
        info!(version, "term catalog replaced");
    }

    /// Reload the term catalog from a file. The current one stays in use
    /// on error.
    pub fn reload_registry(&self, path: &std::path::Path) -> Result<u32, RegistryError> {
        let registry = CatalogRegistry::load_from_file(path)?;
        let version = registry.version();
        self.replace_registry(Arc::new(registry));
        Ok(version)
    }
}

fn load_registry(config: &BridgeConfig) -> Arc<dyn TermRegistry> {
    if let Some(path) = &config.catalog_path {
        match CatalogRegistry::load_from_file(path) {
            Ok(registry) => return Arc::new(registry),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "term catalog load failed, using bundled");
            }
        }
    }
    match CatalogRegistry::bundled() {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            warn!(error = %e, "bundled term catalog unusable, reranking without terms");
            Arc::new(CatalogRegistry::empty())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::CacheConfig;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers by instruction substring; counts calls.
    struct FakeProvider {
        replies: Vec<(&'static str, Result<&'static str, ()>)>,
        calls: AtomicUsize,
        inputs: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn new(replies: Vec<(&'static str, Result<&'static str, ()>)>) -> Arc<Self> {
            Arc::new(Self {
                replies,
                calls: AtomicUsize::new(0),
                inputs: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for FakeProvider {
        async fn complete(&self, instruction: &str, input: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inputs.lock().push(input.to_string());
            for (needle, reply) in &self.replies {
                if instruction.contains(needle) {
                    return match reply {
                        Ok(text) => Ok(text.to_string()),
                        Err(()) => Err(ProviderError::Api("boom".into())),
                    };
                }
            }
            Err(ProviderError::Api("unexpected instruction".into()))
        }
    }

    fn service(provider: Arc<FakeProvider>) -> BridgeService {
        let clock = Arc::new(ManualClock::at_date(
            chrono::NaiveDate::from_ymd_opt(2026, 10, 15).unwrap(),
        ));
        let cache = CacheService::new(
            SqliteStore::open_in_memory().unwrap(),
            &CacheConfig::default(),
            clock,
        );
        BridgeService::new(provider, Arc::new(CatalogRegistry::bundled().unwrap()), cache)
    }

    #[test]
    fn validate_rejects_malformed_requests() {
        let opts = TranslateOptions::default();
        assert_eq!(
            PipelineRequest::validate("  \n ", "standard", "formal", &opts),
            Err(ValidationError::EmptyText)
        );
        assert_eq!(
            PipelineRequest::validate("hi", "formal", "formal", &opts),
            Err(ValidationError::SameStyle("formal".into()))
        );
        assert_eq!(
            PipelineRequest::validate("hi", "standard", "pirate", &opts),
            Err(ValidationError::UnknownStyle("pirate".into()))
        );
        let long = "x".repeat(MAX_TEXT_CHARS + 1);
        assert!(matches!(
            PipelineRequest::validate(&long, "standard", "formal", &opts),
            Err(ValidationError::TooLong { len, .. }) if len == MAX_TEXT_CHARS + 1
        ));
        let exact = "x".repeat(MAX_TEXT_CHARS);
        assert!(PipelineRequest::validate(&exact, "standard", "formal", &opts).is_ok());
    }

    #[tokio::test]
    async fn slang_to_formal_makes_one_call_per_stage() {
        let provider = FakeProvider::new(vec![
            ("neutral standard English", Ok("I am not sure")),
            ("formal", Ok("I am uncertain.")),
        ]);
        let svc = service(Arc::clone(&provider));
        let out = svc
            .translate("idk tbh", "trend-slang", "formal", TranslateOptions::default())
            .await
            .unwrap();
        assert_eq!(out.translation, "I am uncertain.");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(!out.metadata.degraded);
        assert_eq!(
            out.metadata.stages,
            vec![
                Stage::Validate,
                Stage::CheckDirectMapping,
                Stage::CheckCache,
                Stage::Normalize,
                Stage::TargetDispatch,
                Stage::Repair,
                Stage::CacheWrite,
                Stage::Return,
            ]
        );
    }

    #[tokio::test]
    async fn normalize_restores_contractions_from_source() {
        let provider = FakeProvider::new(vec![("neutral standard English", Ok("It is not that deep"))]);
        let svc = service(Arc::clone(&provider));
        let out = svc
            .translate("it's not that deep fr", "trend-slang", "standard", TranslateOptions::default())
            .await
            .unwrap();
        assert_eq!(out.translation, "It's not that deep");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provider_failure_degrades_and_skips_cache() {
        let provider = FakeProvider::new(vec![("formal", Err(()))]);
        let svc = service(Arc::clone(&provider));
        let out = svc
            .translate("see you later", "standard", "formal", TranslateOptions::default())
            .await
            .unwrap();
        assert_eq!(out.translation, "see you later");
        assert!(out.metadata.degraded);
        assert!(!out.metadata.stages.contains(&Stage::CacheWrite));
        assert_eq!(svc.stats().total, 0);
    }

    struct Truncating;

    #[async_trait]
    impl CompletionProvider for Truncating {
        async fn complete(&self, _instruction: &str, _input: &str) -> Result<String, ProviderError> {
            Err(ProviderError::Truncated { max_tokens: 160 })
        }
    }

    #[tokio::test]
    async fn truncated_completion_is_not_cached() {
        let clock = Arc::new(ManualClock::at_date(
            chrono::NaiveDate::from_ymd_opt(2026, 10, 15).unwrap(),
        ));
        let cache = CacheService::new(
            SqliteStore::open_in_memory().unwrap(),
            &CacheConfig::default(),
            clock,
        );
        let svc = BridgeService::new(
            Arc::new(Truncating),
            Arc::new(CatalogRegistry::bundled().unwrap()),
            cache,
        );
        let out = svc
            .translate("see you at the party", "standard", "trend-slang", TranslateOptions::default())
            .await
            .unwrap();
        assert!(out.metadata.degraded);
        assert_eq!(out.translation, "see you at the party");
        assert_eq!(svc.stats().total, 0);
    }

    #[tokio::test]
    async fn placeholders_survive_the_provider() {
        let provider = FakeProvider::new(vec![("formal", Ok("Kindly consult <<PH0>>."))]);
        let svc = service(Arc::clone(&provider));
        let out = svc
            .translate("check https://x.co/a", "standard", "formal", TranslateOptions::default())
            .await
            .unwrap();
        assert_eq!(out.translation, "Kindly consult https://x.co/a.");
        assert_eq!(provider.inputs.lock()[0], "check <<PH0>>");
    }

    #[tokio::test]
    async fn trend_slang_reranks_candidates() {
        let provider = FakeProvider::new(vec![(
            "|||",
            Ok("those shoes are on fleek ||| those shoes are bussin"),
        )]);
        let svc = service(Arc::clone(&provider));
        let opts = TranslateOptions {
            use_latest_slang: true,
            ..TranslateOptions::default()
        };
        let out = svc
            .translate("those shoes are great", "standard", "trend-slang", opts)
            .await
            .unwrap();
        assert_eq!(out.translation, "those shoes are bussin");
        let freshness = out.metadata.freshness.unwrap();
        assert!(freshness.blocked_terms.contains("on fleek"));
    }

    #[tokio::test]
    async fn invalidate_by_hex_key_and_text() {
        let provider = FakeProvider::new(vec![("formal", Ok("Greetings."))]);
        let svc = service(provider);
        svc.translate("hi", "standard", "formal", TranslateOptions::default())
            .await
            .unwrap();

        let key = CacheKey::compute(Style::Standard, Style::Formal, "hi").to_hex();
        assert!(!svc.invalidate(CacheTarget::Key("not-hex")).unwrap());
        assert!(svc.invalidate(CacheTarget::Key(&key)).unwrap());
        assert!(!svc
            .invalidate(CacheTarget::Text { from: "standard", to: "formal", text: "hi" })
            .unwrap());
        assert!(svc
            .invalidate(CacheTarget::Text { from: "standard", to: "klingon", text: "hi" })
            .is_err());
    }

    fn stale_job(svc: &BridgeService, text: &str) -> RefreshJob {
        let hit = svc.cache.get(Style::Standard, Style::Formal, text).unwrap();
        RefreshJob {
            key: hit.entry.key,
            from: Style::Standard,
            to: Style::Formal,
            source_text: hit.entry.source_text,
            meta: hit.entry.meta,
            created_at_ms: hit.entry.created_at_ms,
        }
    }

    fn refresher(svc: &BridgeService) -> PipelineRefresher {
        PipelineRefresher {
            pipeline: Arc::clone(&svc.pipeline),
            cache: Arc::clone(&svc.cache),
        }
    }

    #[tokio::test]
    async fn refresh_overwrites_the_entry_it_started_from() {
        let provider = FakeProvider::new(vec![("formal", Ok("Greetings."))]);
        let svc = service(provider);
        svc.translate("hi", "standard", "formal", TranslateOptions::default())
            .await
            .unwrap();
        let job = stale_job(&svc, "hi");

        refresher(&svc).refresh(job).await.unwrap();
        let hit = svc.cache.get(Style::Standard, Style::Formal, "hi").unwrap();
        assert!(hit.entry.meta.refreshed);
    }

    #[tokio::test]
    async fn refresh_after_invalidate_writes_nothing() {
        let provider = FakeProvider::new(vec![("formal", Ok("Greetings."))]);
        let svc = service(Arc::clone(&provider));
        svc.translate("hi", "standard", "formal", TranslateOptions::default())
            .await
            .unwrap();
        let job = stale_job(&svc, "hi");

        // The job was queued before the entry was invalidated.
        let target = CacheTarget::Text { from: "standard", to: "formal", text: "hi" };
        assert!(svc.invalidate(target).unwrap());
        refresher(&svc).refresh(job).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(svc.cache.get(Style::Standard, Style::Formal, "hi").is_none());
        assert_eq!(svc.stats().total, 0);
    }

    #[test]
    fn replace_registry_swaps_catalog() {
        let svc = service(FakeProvider::new(Vec::new()));
        assert!(svc.registry_version() >= 1);
        svc.replace_registry(Arc::new(CatalogRegistry::empty()));
        assert_eq!(svc.registry_version(), 0);
    }
}
