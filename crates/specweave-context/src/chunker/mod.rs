//! Semantic chunker: splits a document into token-budgeted fragments that keep
//! related elements together.
//!
//! ## Pipeline
//!
//! 1. Build a [`RelationshipGraph`] for the document (once per call).
//! 2. Group the elements of each kind (`grouping`): dependency clusters,
//!    composition hierarchies, path domains, workflow sequences.
//! 3. Re-pack groups so each fits the token budget, then pack small groups up
//!    to the element cap (`fragments`).
//! 4. Optionally merge adjacent plans that reference the same outside
//!    elements, then build fragments with ids, relationships and quality.
//!
//! The chunker holds configuration only, so one instance can serve any number
//! of concurrent calls.

mod fragments;
mod grouping;
mod stream;
mod validation;

pub use stream::FragmentStream;
pub use validation::{IssueKind, IssueSeverity, ValidationIssue, ValidationReport};

use specweave_core::{ElementKind, SpecDocument};
use specweave_settings::{AdaptiveThresholds, ChunkingSettings, SpecweaveSettings};
use specweave_tokens::TokenEstimator;
use tracing::{debug, instrument};

use self::fragments::{FragmentFactory, Plan};
use self::grouping::plan_kind;
use crate::errors::Result;
use crate::quality::QualityAssessor;
use crate::relationships::RelationshipGraph;
use crate::types::{ChunkingStrategy, ContextFragment, StrategyName, StreamingOptions};

/// Splits documents into relationship-preserving fragments.
#[derive(Clone, Debug)]
pub struct SemanticChunker {
    chunking: ChunkingSettings,
    adaptive: AdaptiveThresholds,
    assessor: QualityAssessor,
    estimator: TokenEstimator,
}

impl Default for SemanticChunker {
    fn default() -> Self {
        Self::new(&SpecweaveSettings::default())
    }
}

impl SemanticChunker {
    /// Chunker configured from `settings`.
    pub fn new(settings: &SpecweaveSettings) -> Self {
        Self {
            chunking: settings.chunking.clone(),
            adaptive: settings.adaptive.clone(),
            assessor: QualityAssessor::new(settings.scoring.clone()),
            estimator: TokenEstimator::default(),
        }
    }

    /// Use a different token estimator (e.g. one derived from a model profile).
    #[must_use]
    pub fn with_estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Chunking defaults in use.
    pub fn chunking(&self) -> &ChunkingSettings {
        &self.chunking
    }

    /// Strategy `name` with the configured defaults.
    pub fn strategy(&self, name: StrategyName) -> ChunkingStrategy {
        ChunkingStrategy::from_settings(name, &self.chunking)
    }

    // ── Per-kind strategies ─────────────────────────────────────────────────

    /// Dependency clusters of business rules.
    pub fn by_business_rules(
        &self,
        document: &SpecDocument,
        max_chunk_size: usize,
    ) -> Result<Vec<ContextFragment>> {
        let strategy = self.strategy(StrategyName::BusinessRules).with_chunk_size(max_chunk_size);
        self.by_kind(document, &strategy, ElementKind::BusinessRules)
    }

    /// Composition hierarchies of data structures.
    pub fn by_data_structures(
        &self,
        document: &SpecDocument,
        max_chunk_size: usize,
    ) -> Result<Vec<ContextFragment>> {
        let strategy = self.strategy(StrategyName::DataStructures).with_chunk_size(max_chunk_size);
        self.by_kind(document, &strategy, ElementKind::DataStructures)
    }

    /// Endpoints grouped by path domain; domains are never mixed.
    pub fn by_api_endpoints(
        &self,
        document: &SpecDocument,
        max_chunk_size: usize,
    ) -> Result<Vec<ContextFragment>> {
        let strategy = self.strategy(StrategyName::ApiEndpoints).with_chunk_size(max_chunk_size);
        self.by_kind(document, &strategy, ElementKind::ApiEndpoints)
    }

    /// Execution-ordered workflow sequences.
    ///
    /// Fails with [`ContextError::CyclicWorkflow`](crate::ContextError::CyclicWorkflow)
    /// when the steps depend on each other in a loop.
    pub fn by_workflow(
        &self,
        document: &SpecDocument,
        max_chunk_size: usize,
    ) -> Result<Vec<ContextFragment>> {
        let strategy = self.strategy(StrategyName::Workflow).with_chunk_size(max_chunk_size);
        self.by_kind(document, &strategy, ElementKind::WorkflowSteps)
    }

    // ── Dispatch ────────────────────────────────────────────────────────────

    /// Run the strategy named by `strategy.name`.
    pub fn by_strategy(
        &self,
        document: &SpecDocument,
        strategy: &ChunkingStrategy,
    ) -> Result<Vec<ContextFragment>> {
        match strategy.name {
            StrategyName::BusinessRules => self.by_kind(document, strategy, ElementKind::BusinessRules),
            StrategyName::DataStructures => {
                self.by_kind(document, strategy, ElementKind::DataStructures)
            }
            StrategyName::ApiEndpoints => self.by_kind(document, strategy, ElementKind::ApiEndpoints),
            StrategyName::Workflow => self.by_kind(document, strategy, ElementKind::WorkflowSteps),
            StrategyName::Semantic => self.semantic(document, strategy),
            StrategyName::Adaptive => self.adaptive(document, strategy),
        }
    }

    /// Parse `name` and run it with the configured defaults and `max_chunk_size`.
    pub fn by_strategy_name(
        &self,
        document: &SpecDocument,
        name: &str,
        max_chunk_size: usize,
    ) -> Result<Vec<ContextFragment>> {
        let strategy = self.strategy(name.parse()?).with_chunk_size(max_chunk_size);
        self.by_strategy(document, &strategy)
    }

    // ── Composite strategies ────────────────────────────────────────────────

    /// Every kind in `priority_fields` order, related neighbours merged when
    /// `preserve_relationships` is set.
    #[instrument(skip_all, fields(document = %document.name, max_chunk_size = strategy.max_chunk_size))]
    pub fn semantic(
        &self,
        document: &SpecDocument,
        strategy: &ChunkingStrategy,
    ) -> Result<Vec<ContextFragment>> {
        strategy.validate()?;
        let graph = RelationshipGraph::for_document(document);
        let factory = self.factory(document, &graph, strategy);
        let plans = semantic_plans(document, &factory, strategy)?;
        debug!(fragments = plans.len(), budget = factory.budget(), "semantic chunking planned");
        factory.build_all(&plans)
    }

    /// Pick one strategy from element counts and run it.
    pub fn adaptive(
        &self,
        document: &SpecDocument,
        strategy: &ChunkingStrategy,
    ) -> Result<Vec<ContextFragment>> {
        let selected = self.select_adaptive_strategy(document);
        debug!(document = %document.name, strategy = %selected, "adaptive strategy selected");
        let strategy = ChunkingStrategy {
            name: selected,
            ..strategy.clone()
        };
        self.by_strategy(document, &strategy)
    }

    /// Strategy the adaptive mode would run for `document`.
    ///
    /// Thresholds are checked in order: workflow steps, data structures, API
    /// endpoints, business rules; `Semantic` when none is exceeded.
    pub fn select_adaptive_strategy(&self, document: &SpecDocument) -> StrategyName {
        let t = &self.adaptive;
        let checks = [
            (ElementKind::WorkflowSteps, t.workflow_steps),
            (ElementKind::DataStructures, t.data_structures),
            (ElementKind::ApiEndpoints, t.api_endpoints),
            (ElementKind::BusinessRules, t.business_rules),
        ];
        checks
            .into_iter()
            .find(|(kind, threshold)| document.element_count(*kind) > *threshold)
            .map_or(StrategyName::Semantic, |(kind, _)| StrategyName::for_kind(kind))
    }

    // ── Streaming ───────────────────────────────────────────────────────────

    /// Semantic fragments with the tail of each fragment repeated at the head
    /// of the next.
    pub fn for_streaming(
        &self,
        document: &SpecDocument,
        options: &StreamingOptions,
    ) -> Result<Vec<ContextFragment>> {
        let strategy = options.to_strategy(&self.chunking);
        strategy.validate()?;
        let graph = RelationshipGraph::for_document(document);
        let factory = self.factory(document, &graph, &strategy);
        let plans = semantic_plans(document, &factory, &strategy)?;
        let fragments = factory.build_all(&plans)?;
        factory.apply_overlap(&plans, fragments, strategy.overlap_size)
    }

    /// Lazy equivalent of [`Self::for_streaming`]; fragments carry no `total`.
    pub fn stream<'a>(
        &'a self,
        document: &'a SpecDocument,
        options: &StreamingOptions,
    ) -> Result<FragmentStream<'a>> {
        let strategy = options.to_strategy(&self.chunking);
        strategy.validate()?;
        Ok(FragmentStream::new(self, document, strategy))
    }

    // ── Validation ──────────────────────────────────────────────────────────

    /// Reference, dependency and quality checks over `fragments`.
    pub fn validate_relationships(&self, fragments: &[ContextFragment]) -> ValidationReport {
        validation::validate_relationships(fragments, self.assessor.scoring().min_average_quality)
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn by_kind(
        &self,
        document: &SpecDocument,
        strategy: &ChunkingStrategy,
        kind: ElementKind,
    ) -> Result<Vec<ContextFragment>> {
        strategy.validate()?;
        let graph = RelationshipGraph::for_document(document);
        let factory = self.factory(document, &graph, strategy);
        let plans = plan_kind(kind, document, &factory, strategy)?;
        factory.build_all(&plans)
    }

    fn budget(&self, strategy: &ChunkingStrategy) -> usize {
        strategy.max_tokens.unwrap_or(self.chunking.fragment_token_budget)
    }

    fn factory<'a>(
        &'a self,
        document: &'a SpecDocument,
        graph: &'a RelationshipGraph,
        strategy: &ChunkingStrategy,
    ) -> FragmentFactory<'a> {
        FragmentFactory::new(document, graph, &self.assessor, self.estimator, self.budget(strategy))
    }
}

/// `priority_fields` with repeats dropped.
fn priority_kinds(strategy: &ChunkingStrategy) -> Vec<ElementKind> {
    let mut kinds = Vec::with_capacity(ElementKind::ALL.len());
    for kind in &strategy.priority_fields {
        if !kinds.contains(kind) {
            kinds.push(*kind);
        }
    }
    kinds
}

fn semantic_plans(
    document: &SpecDocument,
    factory: &FragmentFactory<'_>,
    strategy: &ChunkingStrategy,
) -> Result<Vec<Plan>> {
    let mut plans = Vec::new();
    for kind in priority_kinds(strategy) {
        plans.extend(plan_kind(kind, document, factory, strategy)?);
    }
    if strategy.preserve_relationships {
        plans = factory.merge_related(plans, strategy.max_chunk_size)?;
    }
    Ok(plans)
}

// =============================================================================
// Tests
// =============================================================================
