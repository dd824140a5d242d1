#![allow(missing_docs)]

use assert_matches::assert_matches;
use proptest::prelude::*;
use specweave_context::{
    ContextError, ContextFragment, ContextManager, ContextOptimizer, ContextOptions, FragmentType,
    OptimizationOptions, SemanticChunker, StrategyName, StreamingOptions,
};
use specweave_core::logging::capture_logs;
use specweave_core::{
    ApiEndpoint, BusinessRule, CompressionLevel, DataStructure, ElementKind, Field, SpecDocument,
    WorkflowStep,
};
use specweave_settings::SpecweaveSettings;
use specweave_tokens::ModelRegistry;
use tracing::Level;

// ── Fixtures ────────────────────────────────────────────────────────────────

fn rule(id: &str, condition: &str) -> BusinessRule {
    BusinessRule {
        id: id.into(),
        name: id.into(),
        condition: condition.into(),
        action: "apply".into(),
        ..BusinessRule::default()
    }
}

fn structure(id: &str) -> DataStructure {
    DataStructure {
        id: id.into(),
        name: format!("Thing{id}"),
        ..DataStructure::default()
    }
}

fn endpoint(i: usize) -> ApiEndpoint {
    let domain = if i % 2 == 0 { "orders" } else { "users" };
    ApiEndpoint {
        id: format!("E{i}"),
        path: format!("/{domain}/{i}"),
        ..ApiEndpoint::default()
    }
}

fn step(id: &str, depends_on: &str) -> WorkflowStep {
    WorkflowStep {
        id: id.into(),
        name: id.into(),
        depends_on: vec![depends_on.into()],
        ..WorkflowStep::default()
    }
}

fn sorted_ids(fragments: &[ContextFragment]) -> Vec<String> {
    let mut ids: Vec<String> = fragments
        .iter()
        .flat_map(ContextFragment::own_element_ids)
        .map(str::to_string)
        .collect();
    ids.sort();
    ids
}

// ── Chunking scenarios ──────────────────────────────────────────────────────

#[test]
fn rule_chain_is_clustered() {
    let doc = SpecDocument {
        business_rules: vec![
            rule("R1", "order total > 0"),
            rule("R2", "R1 holds"),
            rule("R3", "R2 holds"),
            rule("R4", "country is set"),
            rule("R5", "coupon is valid"),
            rule("R6", "stock available"),
        ],
        ..SpecDocument::new("checkout")
    };
    let fragments = SemanticChunker::default().by_business_rules(&doc, 4).unwrap();

    assert_eq!(fragments.len(), 2);
    let holding_chain: Vec<&ContextFragment> = fragments
        .iter()
        .filter(|f| f.element_ids().iter().any(|id| ["R1", "R2", "R3"].contains(id)))
        .collect();
    assert_eq!(holding_chain.len(), 1);
    let chain = holding_chain[0].element_ids();
    assert!(["R1", "R2", "R3"].iter().all(|id| chain.contains(id)));
    assert!(fragments.iter().all(|f| f.element_count() <= 4));
}

#[test]
fn streaming_overlap_carries_previous_tail() {
    let doc = SpecDocument {
        data_structures: (1..=10).map(|i| structure(&format!("S{i}"))).collect(),
        ..SpecDocument::new("catalog")
    };
    let manager = ContextManager::default();
    let fragments: Vec<ContextFragment> = manager
        .stream_context(&doc, &StreamingOptions::new(3, 1))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(fragments.len(), 4);
    let second = &fragments[1];
    assert_eq!(second.element_ids(), vec!["S3", "S4", "S5", "S6"]);
    assert_eq!(second.own_element_ids(), vec!["S4", "S5", "S6"]);
    assert_eq!(second.boundaries.overlap_with.as_ref(), Some(&fragments[0].id));
    assert_eq!(second.boundaries.overlap_element_ids, vec!["S3".to_string()]);
}

#[test]
fn eager_streaming_matches_lazy_overlap() {
    let doc = SpecDocument {
        data_structures: (1..=10).map(|i| structure(&format!("S{i}"))).collect(),
        ..SpecDocument::new("catalog")
    };
    let chunker = SemanticChunker::default();
    let eager = chunker.for_streaming(&doc, &StreamingOptions::new(3, 1)).unwrap();
    assert_eq!(eager[1].element_ids(), vec!["S3", "S4", "S5", "S6"]);
    assert_eq!(eager[1].boundaries.overlap_with.as_ref(), Some(&eager[0].id));
}

#[test]
fn adaptive_selects_endpoints() {
    let doc = SpecDocument {
        api_endpoints: (1..=25).map(endpoint).collect(),
        business_rules: vec![rule("R1", "a"), rule("R2", "b")],
        data_structures: vec![structure("S1")],
        ..SpecDocument::new("api")
    };
    let chunker = SemanticChunker::default();
    assert_eq!(chunker.select_adaptive_strategy(&doc), StrategyName::ApiEndpoints);

    let fragments = chunker
        .adaptive(&doc, &chunker.strategy(StrategyName::Adaptive))
        .unwrap();
    assert!(!fragments.is_empty());
    assert!(fragments
        .iter()
        .all(|f| f.metadata.fragment_type == FragmentType::ApiEndpoints));
    let covered: usize = fragments.iter().map(ContextFragment::element_count).sum();
    assert_eq!(covered, 25);
}

#[test]
fn oversized_rule_is_flagged_not_rejected() {
    let (logs, _guard) = capture_logs();
    let mut big = rule("R1", &"customer is eligible and ".repeat(40));
    big.examples = vec!["a long worked example".repeat(10)];
    let doc = SpecDocument {
        business_rules: vec![big],
        ..SpecDocument::new("big")
    };
    let chunker = SemanticChunker::default();
    let strategy = chunker
        .strategy(StrategyName::BusinessRules)
        .with_chunk_size(4)
        .with_max_tokens(10);

    let fragments = chunker.by_strategy(&doc, &strategy).unwrap();
    assert_eq!(fragments.len(), 1);
    assert!(fragments[0].metadata.exceeds_budget);
    assert!(fragments[0].token_count > 10);
    assert!(logs.has_event(Level::WARN, "single element exceeds fragment token budget"));
}

#[test]
fn workflow_cycle_names_members() {
    let doc = SpecDocument {
        workflow_steps: vec![step("A", "C"), step("B", "A"), step("C", "B")],
        ..SpecDocument::new("flow")
    };
    let err = SemanticChunker::default().by_workflow(&doc, 8).unwrap_err();
    assert_matches!(&err, ContextError::CyclicWorkflow { step_ids } if step_ids == &["A", "B", "C"]);
    assert!(err.is_structural());
    insta::assert_snapshot!(err.to_string(), @"cyclic workflow dependency between steps: A, B, C");
}

#[test]
fn validation_is_idempotent() {
    let mut r2 = rule("R2", "R1 holds");
    r2.exceptions = vec!["R9".into()];
    let doc = SpecDocument {
        business_rules: vec![rule("R1", "a"), r2, rule("R3", "b")],
        ..SpecDocument::new("rules")
    };
    let chunker = SemanticChunker::default();
    let fragments = chunker.by_business_rules(&doc, 1).unwrap();

    let first = chunker.validate_relationships(&fragments);
    let second = chunker.validate_relationships(&fragments);
    assert_eq!(first, second);
    assert!(first.errors.iter().any(|i| i.element_id.as_deref() == Some("R9")));
    assert!(!first.valid);
}

#[test]
fn stream_stops_before_failing_kind() {
    let doc = SpecDocument {
        data_structures: vec![structure("S1")],
        workflow_steps: vec![step("A", "B"), step("B", "A")],
        ..SpecDocument::new("lazy")
    };
    let manager = ContextManager::default();
    let taken: Vec<_> = manager
        .stream_context(&doc, &StreamingOptions::new(4, 0))
        .unwrap()
        .take(1)
        .collect();
    assert_eq!(taken.len(), 1);
    assert_matches!(&taken[0], Ok(f) if f.element_ids() == vec!["S1"]);

    let all: Vec<_> = manager
        .stream_context(&doc, &StreamingOptions::new(4, 0))
        .unwrap()
        .collect();
    assert_matches!(all.last(), Some(Err(ContextError::CyclicWorkflow { .. })));
}

// ── Manager scenarios ───────────────────────────────────────────────────────

#[test]
fn concurrent_create_context_shares_cache() {
    let manager = ContextManager::default();
    let docs: Vec<SpecDocument> = (0..4)
        .map(|i| SpecDocument {
            business_rules: vec![rule(&format!("R{i}"), "a")],
            ..SpecDocument::new(format!("doc{i}"))
        })
        .collect();

    std::thread::scope(|scope| {
        for doc in &docs {
            for _ in 0..3 {
                let manager = &manager;
                let _ = scope.spawn(move || {
                    let context = manager.create_context(doc, &ContextOptions::default()).unwrap();
                    assert_eq!(context.document.name, doc.name);
                });
            }
        }
    });

    let stats = manager.get_cache_stats();
    assert_eq!(stats.entry_count, 4);
    assert_eq!(stats.hits + stats.misses, 12);
    assert!(stats.misses >= 4);
}

#[test]
fn cache_evicts_least_recently_used() {
    let mut settings = SpecweaveSettings::default();
    settings.cache.max_entries = 2;
    let manager = ContextManager::new(&settings, ModelRegistry::with_builtin());
    let docs: Vec<SpecDocument> = ["a", "b", "c"]
        .iter()
        .map(|name| SpecDocument {
            business_rules: vec![rule("R1", name)],
            ..SpecDocument::new(*name)
        })
        .collect();
    let options = ContextOptions::default();

    let first_a = manager.create_context(&docs[0], &options).unwrap();
    let _ = manager.create_context(&docs[1], &options).unwrap();
    let _ = manager.create_context(&docs[2], &options).unwrap();
    assert_eq!(manager.get_cache_stats().entry_count, 2);

    let again_a = manager.create_context(&docs[0], &options).unwrap();
    assert_ne!(first_a.id, again_a.id);
    let stats = manager.get_cache_stats();
    assert_eq!((stats.hits, stats.misses), (0, 4));
    assert!(stats.approximate_memory_bytes > 0);
}

#[test]
fn optimized_context_analysis() {
    let manager = ContextManager::default();
    let mut doc = SpecDocument {
        business_rules: vec![rule("R1", "a"), rule("R2", "R1 holds")],
        data_structures: vec![DataStructure {
            fields: vec![Field {
                name: "id".into(),
                field_type: "string".into(),
                required: true,
                ..Field::default()
            }],
            ..structure("S1")
        }],
        ..SpecDocument::new("shop")
    };
    doc.tags = vec!["commerce".into(); 50];
    let options = ContextOptions {
        optimize: true,
        optimization: OptimizationOptions {
            max_tokens: Some(80),
            compression_level: Some(CompressionLevel::Low),
            model: None,
        },
        ..ContextOptions::default()
    };
    let context = manager.create_context(&doc, &options).unwrap();
    let analysis = manager.analyze_context(&context);

    assert!(context.is_optimized());
    assert!((analysis.quality_score - 1.0).abs() < f64::EPSILON);
    assert!(analysis.token_efficiency > 0.0);
    assert!((analysis.relationship_preservation - 1.0).abs() < f64::EPSILON);
}

// ── Properties ──────────────────────────────────────────────────────────────

fn arb_document() -> impl Strategy<Value = SpecDocument> {
    (
        proptest::collection::vec(proptest::option::of(0usize..16), 0..16),
        proptest::collection::vec(proptest::option::of(0usize..10), 0..10),
        proptest::collection::vec(0usize..3, 0..10),
        proptest::collection::vec(proptest::option::of(0usize..12), 0..12),
        0usize..30,
    )
        .prop_map(|(rule_links, structure_links, domains, step_links, tags)| {
            let business_rules = rule_links
                .iter()
                .enumerate()
                .map(|(i, link)| {
                    let condition = link
                        .filter(|j| *j < i)
                        .map_or_else(|| format!("value {i} is set"), |j| format!("R{j} holds"));
                    rule(&format!("R{i}"), &condition)
                })
                .collect();
            let data_structures = structure_links
                .iter()
                .enumerate()
                .map(|(i, link)| DataStructure {
                    fields: link
                        .filter(|j| *j != i && *j < structure_links.len())
                        .map(|j| Field {
                            name: format!("link{j}"),
                            field_type: "reference".into(),
                            reference: Some(format!("S{j}")),
                            ..Field::default()
                        })
                        .into_iter()
                        .collect(),
                    ..structure(&format!("S{i}"))
                })
                .collect();
            let api_endpoints = domains
                .iter()
                .enumerate()
                .map(|(i, d)| ApiEndpoint {
                    id: format!("E{i}"),
                    path: format!("/{}/{i}", ["orders", "users", "items"][*d]),
                    ..ApiEndpoint::default()
                })
                .collect();
            // Each step depends only on an earlier one, so the graph is acyclic.
            let workflow_steps = step_links
                .iter()
                .enumerate()
                .map(|(i, link)| WorkflowStep {
                    id: format!("W{i}"),
                    name: format!("step {i}"),
                    depends_on: link.filter(|j| *j < i).map(|j| format!("W{j}")).into_iter().collect(),
                    ..WorkflowStep::default()
                })
                .collect();
            SpecDocument {
                business_rules,
                data_structures,
                api_endpoints,
                workflow_steps,
                tags: vec!["tag".into(); tags],
                ..SpecDocument::new("prop")
            }
        })
}

proptest! {
    #[test]
    fn semantic_chunking_covers_every_element_once(
        doc in arb_document(),
        chunk in 1usize..8,
    ) {
        let chunker = SemanticChunker::default();
        let strategy = chunker.strategy(StrategyName::Semantic).with_chunk_size(chunk);
        let fragments = chunker.semantic(&doc, &strategy).unwrap();

        let mut expected: Vec<String> = doc.all_element_ids().into_iter().map(str::to_string).collect();
        expected.sort();
        prop_assert_eq!(sorted_ids(&fragments), expected);
        prop_assert!(fragments.iter().all(|f| f.element_count() <= chunk));
    }

    #[test]
    fn kind_chunking_covers_its_kind_once(
        doc in arb_document(),
        chunk in 1usize..8,
    ) {
        let chunker = SemanticChunker::default();
        let runs = [
            (ElementKind::BusinessRules, chunker.by_business_rules(&doc, chunk).unwrap()),
            (ElementKind::DataStructures, chunker.by_data_structures(&doc, chunk).unwrap()),
            (ElementKind::ApiEndpoints, chunker.by_api_endpoints(&doc, chunk).unwrap()),
            (ElementKind::WorkflowSteps, chunker.by_workflow(&doc, chunk).unwrap()),
        ];

        for (kind, fragments) in &runs {
            let mut expected: Vec<String> =
                doc.element_ids(*kind).into_iter().map(str::to_string).collect();
            expected.sort();
            prop_assert_eq!(sorted_ids(fragments), expected);
            prop_assert!(fragments.iter().all(|f| f.element_count() <= chunk));
        }
    }

    #[test]
    fn only_single_elements_exceed_budget(
        doc in arb_document(),
        chunk in 1usize..8,
        budget in 20usize..300,
    ) {
        let chunker = SemanticChunker::default();
        let strategy = chunker
            .strategy(StrategyName::Semantic)
            .with_chunk_size(chunk)
            .with_max_tokens(budget);
        let fragments = chunker.semantic(&doc, &strategy).unwrap();

        for fragment in &fragments {
            prop_assert_eq!(fragment.metadata.exceeds_budget, fragment.token_count > budget);
            if fragment.metadata.exceeds_budget {
                prop_assert_eq!(fragment.element_count(), 1);
            }
        }
    }

    #[test]
    fn optimization_never_grows(
        doc in arb_document(),
        budget in 1usize..400,
        level in prop_oneof![
            Just(CompressionLevel::Low),
            Just(CompressionLevel::Medium),
            Just(CompressionLevel::High),
        ],
    ) {
        let manager = ContextManager::default();
        let options = ContextOptions { use_cache: false, ..ContextOptions::default() };
        let context = manager.create_context(&doc, &options).unwrap();
        let optimizer = ContextOptimizer::default();
        let optimized = optimizer
            .optimize_context(&context, &OptimizationOptions {
                max_tokens: Some(budget),
                model: None,
                compression_level: Some(level),
            })
            .unwrap();

        let record = optimized.optimization.as_ref().unwrap();
        prop_assert!(record.final_tokens <= record.original_tokens);
        prop_assert!(optimized.metrics.final_tokens <= optimized.metrics.original_tokens);
        prop_assert_eq!(record.exceeds_budget, record.final_tokens > budget);
        for kind in ElementKind::ALL {
            prop_assert!(
                optimized.document.element_count(kind) <= context.document.element_count(kind)
            );
        }
        let mut previous = record.original_tokens;
        for step in &record.steps {
            prop_assert!(step.tokens_after <= previous);
            previous = step.tokens_after;
        }
    }
}
