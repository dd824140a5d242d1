//! Context manager: the entry point tying chunker, optimizer, analysis and
//! cache together.
//!
//! One manager owns one cache. Operations are synchronous and take `&self`;
//! the cache mutex is only held for lookups and inserts, never while a
//! context or fragment list is being computed, so a shared manager can serve
//! concurrent callers.

use std::collections::HashSet;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use specweave_core::{ElementKind, SpecDocument};
use specweave_settings::{AnalysisThresholds, SpecweaveSettings};
use specweave_tokens::{ModelProfile, ModelRegistry, TokenEstimator};
use tracing::{debug, error, info, instrument};

use crate::cache::{CacheConfig, CacheKey, CacheStats, CachedValue, ContextCache};
use crate::chunker::{FragmentStream, SemanticChunker};
use crate::constants::{CACHE_OP_CHUNKS, CACHE_OP_CONTEXT};
use crate::context::{ContextAnalysis, ProcessingContext, analyze};
use crate::errors::{ContextError, Result};
use crate::optimizer::{ContextOptimizer, OptimizationOptions};
use crate::types::{ContextFragment, StrategyName, StreamingOptions};

// =============================================================================
// Options
// =============================================================================

/// Options for [`ContextManager::create_context`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextOptions {
    /// Look up and store the result in the cache.
    pub use_cache: bool,
    /// Run the compression pipeline when the baseline estimate is over
    /// budget; `false` keeps the document as given.
    pub optimize: bool,
    /// Budget, model and level for the compression pipeline.
    pub optimization: OptimizationOptions,
    /// Model the context is meant for; drives the token estimate.
    pub model: Option<String>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            optimize: true,
            optimization: OptimizationOptions::default(),
            model: None,
        }
    }
}

impl ContextOptions {
    /// Options that fit the context into `model`'s budget.
    pub fn optimized_for(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }
}

/// Options for [`ContextManager::merge_contexts`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeOptions {
    /// Keep only the first element with a given id.
    pub deduplicate: bool,
    /// Re-optimize the merged context when it is above this many tokens.
    pub max_tokens: Option<usize>,
    /// Model for the re-optimization.
    pub model: Option<String>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            deduplicate: true,
            max_tokens: None,
            model: None,
        }
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Builds, merges, chunks and analyzes processing contexts.
pub struct ContextManager {
    chunker: SemanticChunker,
    optimizer: ContextOptimizer,
    analysis: AnalysisThresholds,
    cache_enabled: bool,
    cache: Mutex<ContextCache>,
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new(&SpecweaveSettings::default(), ModelRegistry::with_builtin())
    }
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("cache_enabled", &self.cache_enabled)
            .field("cache", &self.cache.lock().stats())
            .finish_non_exhaustive()
    }
}

impl ContextManager {
    /// Manager configured from `settings` with model profiles from `registry`.
    pub fn new(settings: &SpecweaveSettings, registry: ModelRegistry) -> Self {
        Self {
            chunker: SemanticChunker::new(settings),
            optimizer: ContextOptimizer::new(registry, settings.optimizer.clone()),
            analysis: settings.analysis.clone(),
            cache_enabled: settings.cache.enabled,
            cache: Mutex::new(ContextCache::new(CacheConfig::from(&settings.cache))),
        }
    }

    /// Chunker used for fragment operations.
    pub fn chunker(&self) -> &SemanticChunker {
        &self.chunker
    }

    /// Optimizer used for budget fitting.
    pub fn optimizer(&self) -> &ContextOptimizer {
        &self.optimizer
    }

    /// Profile for `name`; the fallback profile when unknown.
    pub fn model_profile(&self, name: &str) -> &ModelProfile {
        self.optimizer.registry().get_or_default(name)
    }

    // ── Contexts ────────────────────────────────────────────────────────────

    /// Build a context over `document`, compressed when its estimate is over
    /// the token budget.
    #[instrument(skip_all, fields(document = %document.name, optimize = options.optimize))]
    pub fn create_context(
        &self,
        document: &SpecDocument,
        options: &ContextOptions,
    ) -> Result<ProcessingContext> {
        let started = Instant::now();
        self.build_context(document, options, started)
            .inspect_err(|err| log_failure("create_context", started, err))
    }

    /// Union of `contexts` as one context.
    ///
    /// With `deduplicate`, the first element with a given id wins. The result
    /// is re-optimized when it exceeds `options.max_tokens`.
    #[instrument(skip_all, fields(contexts = contexts.len()))]
    pub fn merge_contexts(
        &self,
        contexts: &[ProcessingContext],
        options: &MergeOptions,
    ) -> Result<ProcessingContext> {
        let started = Instant::now();
        self.merge(contexts, options, started)
            .inspect_err(|err| log_failure("merge_contexts", started, err))
    }

    /// Quality, efficiency and relationship preservation of `context`.
    pub fn analyze_context(&self, context: &ProcessingContext) -> ContextAnalysis {
        analyze(context, &self.analysis)
    }

    // ── Fragments ───────────────────────────────────────────────────────────

    /// Semantic fragments of `document` with at most `chunk_size` elements each.
    #[instrument(skip_all, fields(document = %document.name, chunk_size = chunk_size))]
    pub fn chunk_document(
        &self,
        document: &SpecDocument,
        chunk_size: usize,
    ) -> Result<Vec<ContextFragment>> {
        let started = Instant::now();
        self.chunk(document, chunk_size)
            .inspect_err(|err| log_failure("chunk_document", started, err))
    }

    /// Lazy fragment stream over `document`.
    pub fn stream_context<'a>(
        &'a self,
        document: &'a SpecDocument,
        options: &StreamingOptions,
    ) -> Result<FragmentStream<'a>> {
        let started = Instant::now();
        self.chunker
            .stream(document, options)
            .inspect_err(|err| log_failure("stream_context", started, err))
    }

    // ── Cache ───────────────────────────────────────────────────────────────

    /// Drop every cached entry and reset the counters.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
        debug!("context cache cleared");
    }

    /// Cache counters.
    pub fn get_cache_stats(&self) -> CacheStats {
        let mut cache = self.cache.lock();
        cache.cleanup();
        cache.stats()
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn build_context(
        &self,
        document: &SpecDocument,
        options: &ContextOptions,
        started: Instant,
    ) -> Result<ProcessingContext> {
        let key = self.cache_key(CACHE_OP_CONTEXT, document, options, options.use_cache)?;
        if let Some(key) = &key {
            if let Some(CachedValue::Context(context)) = self.cache.lock().get(key).cloned() {
                debug!(context_id = %context.id, "context cache hit");
                return Ok(context);
            }
        }

        let model = options
            .optimization
            .model
            .as_deref()
            .or(options.model.as_deref());
        let tokens = self.estimate(document, model)?;
        let budget = options
            .optimization
            .max_tokens
            .unwrap_or(self.optimizer.profile(model).max_tokens);
        let mut context = ProcessingContext::new(document.clone(), tokens);
        context.target_model = model.map(str::to_string);

        if options.optimize && tokens > budget {
            debug!(tokens, budget, "context over budget, optimizing");
            context = self.optimizer.optimize_context(&context, &options.optimization)?;
        }
        context.metrics.processing_time_ms = elapsed_ms(started);
        info!(
            context_id = %context.id,
            tokens = context.metrics.final_tokens,
            elements = context.document.total_elements(),
            elapsed_ms = context.metrics.processing_time_ms,
            "context created"
        );

        if let Some(key) = key {
            self.cache
                .lock()
                .insert(key, CachedValue::Context(context.clone()));
        }
        Ok(context)
    }

    fn merge(
        &self,
        contexts: &[ProcessingContext],
        options: &MergeOptions,
        started: Instant,
    ) -> Result<ProcessingContext> {
        if contexts.is_empty() {
            return Err(ContextError::InvalidInput("no contexts to merge".into()));
        }

        let document = union(contexts, options.deduplicate);
        let tokens = self.estimate(&document, options.model.as_deref())?;
        let mut merged = ProcessingContext::new(document, tokens);
        merged.target_model = options.model.clone();

        if let Some(max_tokens) = options.max_tokens {
            if tokens > max_tokens {
                let reoptimize = OptimizationOptions {
                    max_tokens: Some(max_tokens),
                    model: options.model.clone(),
                    compression_level: None,
                };
                merged = self.optimizer.optimize_context(&merged, &reoptimize)?;
            }
        }
        merged.metrics.processing_time_ms = elapsed_ms(started);
        info!(
            context_id = %merged.id,
            sources = contexts.len(),
            elements = merged.document.total_elements(),
            tokens = merged.metrics.final_tokens,
            "contexts merged"
        );
        Ok(merged)
    }

    fn chunk(&self, document: &SpecDocument, chunk_size: usize) -> Result<Vec<ContextFragment>> {
        let mut strategy = self
            .chunker
            .strategy(StrategyName::Semantic)
            .with_chunk_size(chunk_size);
        strategy.priority_fields = ElementKind::ALL.to_vec();

        let key = self.cache_key(CACHE_OP_CHUNKS, document, &strategy, true)?;
        if let Some(key) = &key {
            if let Some(CachedValue::Fragments(fragments)) = self.cache.lock().get(key).cloned() {
                debug!(fragments = fragments.len(), "fragment cache hit");
                return Ok(fragments);
            }
        }

        let fragments = self.chunker.semantic(document, &strategy)?;
        if let Some(key) = key {
            self.cache
                .lock()
                .insert(key, CachedValue::Fragments(fragments.clone()));
        }
        Ok(fragments)
    }

    /// Estimate with the same profile the optimizer would resolve for `model`.
    fn estimate(&self, document: &SpecDocument, model: Option<&str>) -> Result<usize> {
        let profile = self.optimizer.profile(model);
        Ok(TokenEstimator::for_profile(profile).estimate(document)?)
    }

    fn cache_key<O: Serialize + ?Sized>(
        &self,
        operation: &str,
        document: &SpecDocument,
        options: &O,
        requested: bool,
    ) -> Result<Option<CacheKey>> {
        if !(self.cache_enabled && requested) {
            return Ok(None);
        }
        CacheKey::new(operation, document, options).map(Some)
    }
}

/// Element-wise union of the documents of `contexts`.
fn union(contexts: &[ProcessingContext], deduplicate: bool) -> SpecDocument {
    let name = contexts
        .iter()
        .map(|c| c.document.name.as_str())
        .collect::<Vec<_>>()
        .join("+");
    let mut merged = SpecDocument::new(name);
    let mut seen: HashSet<String> = HashSet::new();
    let mut admit = |id: &str| !deduplicate || seen.insert(id.to_string());

    for context in contexts {
        let doc = &context.document;
        if merged.description.is_none() {
            merged.description.clone_from(&doc.description);
        }
        for rule in &doc.business_rules {
            if admit(&rule.id) {
                merged.business_rules.push(rule.clone());
            }
        }
        for structure in &doc.data_structures {
            if admit(&structure.id) {
                merged.data_structures.push(structure.clone());
            }
        }
        for endpoint in &doc.api_endpoints {
            if admit(&endpoint.id) {
                merged.api_endpoints.push(endpoint.clone());
            }
        }
        for step in &doc.workflow_steps {
            if admit(&step.id) {
                merged.workflow_steps.push(step.clone());
            }
        }
        for tag in &doc.tags {
            if !merged.tags.contains(tag) {
                merged.tags.push(tag.clone());
            }
        }
        for (key, value) in &doc.metadata {
            let _ = merged.metadata.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    merged
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn log_failure(operation: &str, started: Instant, err: &ContextError) {
    error!(
        operation,
        elapsed_ms = elapsed_ms(started),
        error = %err,
        structural = err.is_structural(),
        "context operation failed"
    );
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use specweave_core::logging::test_utils::capture_logs;
    use specweave_core::{BusinessRule, DataStructure, WorkflowStep};
    use tracing::Level;

    fn rule(id: &str) -> BusinessRule {
        BusinessRule {
            id: id.into(),
            name: format!("rule {id}"),
            ..BusinessRule::default()
        }
    }

    fn structure(id: &str) -> DataStructure {
        DataStructure {
            id: id.into(),
            name: id.into(),
            ..DataStructure::default()
        }
    }

    fn doc(name: &str, rules: &[&str], structures: &[&str]) -> SpecDocument {
        SpecDocument {
            business_rules: rules.iter().map(|id| rule(id)).collect(),
            data_structures: structures.iter().map(|id| structure(id)).collect(),
            ..SpecDocument::new(name)
        }
    }

    // -- create_context --

    #[test]
    fn create_context_builds_metrics() {
        let manager = ContextManager::default();
        let document = doc("shop", &["R1", "R2"], &["S1"]);
        let context = manager
            .create_context(&document, &ContextOptions::default())
            .unwrap();

        assert_eq!(context.document, document);
        assert!(context.metrics.original_tokens > 0);
        assert_eq!(context.metrics.original_tokens, context.metrics.final_tokens);
        assert_eq!(context.metrics.final_counts[&ElementKind::BusinessRules], 2);
        assert!(context.optimization.is_none());
    }

    #[test]
    fn create_context_hits_cache() {
        let manager = ContextManager::default();
        let document = doc("shop", &["R1"], &[]);
        let first = manager.create_context(&document, &ContextOptions::default()).unwrap();
        let second = manager.create_context(&document, &ContextOptions::default()).unwrap();

        assert_eq!(first.id, second.id);
        let stats = manager.get_cache_stats();
        assert_eq!((stats.hits, stats.misses, stats.entry_count), (1, 1, 1));
    }

    #[test]
    fn create_context_without_cache() {
        let manager = ContextManager::default();
        let document = doc("shop", &["R1"], &[]);
        let options = ContextOptions {
            use_cache: false,
            ..ContextOptions::default()
        };
        let first = manager.create_context(&document, &options).unwrap();
        let second = manager.create_context(&document, &options).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(manager.get_cache_stats(), CacheStats::default());
    }

    #[test]
    fn disabled_cache_is_never_used() {
        let mut settings = SpecweaveSettings::default();
        settings.cache.enabled = false;
        let manager = ContextManager::new(&settings, ModelRegistry::with_builtin());
        let document = doc("shop", &["R1"], &[]);
        let _ = manager.create_context(&document, &ContextOptions::default()).unwrap();
        let _ = manager.chunk_document(&document, 4).unwrap();
        assert_eq!(manager.get_cache_stats().entry_count, 0);
    }

    #[test]
    fn create_context_optimizes_over_model_budget() {
        let manager = ContextManager::default();
        let rules: Vec<String> = (0..400).map(|i| format!("R{i}")).collect();
        let rules: Vec<&str> = rules.iter().map(String::as_str).collect();
        let document = doc("shop", &rules, &[]);
        let options = ContextOptions {
            model: Some("gpt-4".into()),
            ..ContextOptions::default()
        };
        let context = manager.create_context(&document, &options).unwrap();
        let budget = manager.model_profile("gpt-4").max_tokens;

        assert!(context.metrics.original_tokens > budget);
        let record = context.optimization.as_ref().unwrap();
        assert!(record.applied);
        assert_eq!(record.target_tokens, budget);
        assert_eq!(record.final_tokens, context.metrics.final_tokens);
    }

    #[test]
    fn create_context_opts_out_of_optimization() {
        let manager = ContextManager::default();
        let mut document = doc("shop", &["R1", "R2"], &["S1"]);
        document.tags = vec!["billing".into(); 40];
        let options = ContextOptions {
            optimize: false,
            optimization: OptimizationOptions {
                max_tokens: Some(60),
                ..OptimizationOptions::default()
            },
            ..ContextOptions::default()
        };
        let context = manager.create_context(&document, &options).unwrap();

        assert!(context.optimization.is_none());
        assert_eq!(context.document, document);
    }

    #[test]
    fn create_context_optimizes_when_asked() {
        let manager = ContextManager::default();
        let mut document = doc("shop", &["R1", "R2"], &["S1"]);
        document.tags = vec!["billing".into(); 40];
        let options = ContextOptions {
            optimization: OptimizationOptions {
                max_tokens: Some(60),
                ..OptimizationOptions::default()
            },
            ..ContextOptions::default()
        };
        let context = manager.create_context(&document, &options).unwrap();

        assert!(context.is_optimized());
        assert!(context.document.tags.is_empty());
        assert!(context.metrics.final_tokens < context.metrics.original_tokens);
    }

    #[test]
    fn cache_stats_skip_expired_entries() {
        let mut settings = SpecweaveSettings::default();
        settings.cache.ttl_secs = 0;
        let manager = ContextManager::new(&settings, ModelRegistry::with_builtin());
        let document = doc("shop", &["R1"], &[]);
        let _ = manager.create_context(&document, &ContextOptions::default()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));

        let stats = manager.get_cache_stats();
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.approximate_memory_bytes, 0);
        assert_eq!(stats.misses, 1);
    }

    // -- merge_contexts --

    #[test]
    fn merge_deduplicates_first_wins() {
        let manager = ContextManager::default();
        let mut a = doc("a", &["R1", "R2"], &["S1"]);
        a.business_rules[0].name = "from a".into();
        let mut b = doc("b", &["R1", "R3"], &["S2"]);
        b.business_rules[0].name = "from b".into();
        let contexts = [
            manager.create_context(&a, &ContextOptions::default()).unwrap(),
            manager.create_context(&b, &ContextOptions::default()).unwrap(),
        ];

        let merged = manager.merge_contexts(&contexts, &MergeOptions::default()).unwrap();
        assert_eq!(merged.document.name, "a+b");
        assert_eq!(
            merged.document.element_ids(ElementKind::BusinessRules),
            ["R1", "R2", "R3"]
        );
        assert_eq!(merged.document.business_rules[0].name, "from a");
        assert_eq!(merged.document.element_ids(ElementKind::DataStructures), ["S1", "S2"]);
    }

    #[test]
    fn merge_keeps_duplicates_when_asked() {
        let manager = ContextManager::default();
        let contexts = [
            manager.create_context(&doc("a", &["R1"], &[]), &ContextOptions::default()).unwrap(),
            manager.create_context(&doc("b", &["R1"], &[]), &ContextOptions::default()).unwrap(),
        ];
        let options = MergeOptions {
            deduplicate: false,
            ..MergeOptions::default()
        };
        let merged = manager.merge_contexts(&contexts, &options).unwrap();
        assert_eq!(merged.document.business_rules.len(), 2);
    }

    #[test]
    fn merge_recomputes_relationships() {
        let manager = ContextManager::default();
        let step = |id: &str, deps: &[&str]| WorkflowStep {
            id: id.into(),
            depends_on: deps.iter().map(|d| (*d).to_string()).collect(),
            ..WorkflowStep::default()
        };
        let mut a = SpecDocument::new("a");
        a.workflow_steps = vec![step("W1", &[])];
        let mut b = SpecDocument::new("b");
        b.workflow_steps = vec![step("W2", &["W1"])];
        let contexts = [
            manager.create_context(&a, &ContextOptions::default()).unwrap(),
            manager.create_context(&b, &ContextOptions::default()).unwrap(),
        ];
        assert!(contexts[1].relationships.is_empty());

        let merged = manager.merge_contexts(&contexts, &MergeOptions::default()).unwrap();
        assert!(merged.relationships["W2"].contains("W1"));
    }

    #[test]
    fn merge_reoptimizes_above_budget() {
        let manager = ContextManager::default();
        let mut a = doc("a", &["R1"], &["S1"]);
        a.tags = vec!["billing".into(); 40];
        let contexts = [manager.create_context(&a, &ContextOptions::default()).unwrap()];
        let options = MergeOptions {
            max_tokens: Some(40),
            ..MergeOptions::default()
        };
        let merged = manager.merge_contexts(&contexts, &options).unwrap();
        assert!(merged.optimization.is_some());
        assert!(merged.document.tags.is_empty());
    }

    #[test]
    fn merging_nothing_is_invalid() {
        let (logs, _guard) = capture_logs();
        let manager = ContextManager::default();
        let err = manager.merge_contexts(&[], &MergeOptions::default()).unwrap_err();
        assert_matches!(err, ContextError::InvalidInput(_));
        assert!(logs.has_event(Level::ERROR, "context operation failed"));
    }

    // -- chunk_document --

    #[test]
    fn chunk_document_is_cached() {
        let manager = ContextManager::default();
        let document = doc("shop", &["R1", "R2", "R3"], &["S1"]);
        let first = manager.chunk_document(&document, 2).unwrap();
        let second = manager.chunk_document(&document, 2).unwrap();

        assert_eq!(first, second);
        assert_eq!(manager.get_cache_stats().hits, 1);
        let covered: usize = first.iter().map(ContextFragment::element_count).sum();
        assert_eq!(covered, 4);
    }

    #[test]
    fn chunk_document_rejects_zero() {
        let manager = ContextManager::default();
        let err = manager.chunk_document(&doc("shop", &["R1"], &[]), 0).unwrap_err();
        assert_matches!(err, ContextError::InvalidStrategy(_));
    }

    // -- analysis & cache --

    #[test]
    fn analyze_unchanged_context() {
        let manager = ContextManager::default();
        let context = manager
            .create_context(&doc("shop", &["R1"], &["S1"]), &ContextOptions::default())
            .unwrap();
        let analysis = manager.analyze_context(&context);
        assert!((analysis.quality_score - 1.0).abs() < f64::EPSILON);
        assert!(analysis.suggestions.is_empty());
    }

    #[test]
    fn clear_cache_resets() {
        let manager = ContextManager::default();
        let _ = manager
            .create_context(&doc("shop", &["R1"], &[]), &ContextOptions::default())
            .unwrap();
        manager.clear_cache();
        assert_eq!(manager.get_cache_stats(), CacheStats::default());
    }

    #[test]
    fn model_profile_lookup() {
        let manager = ContextManager::default();
        assert_eq!(manager.model_profile("claude-3").name, "claude-3");
        assert_eq!(manager.model_profile("nope").name, manager.optimizer().registry().fallback().name);
    }
}
