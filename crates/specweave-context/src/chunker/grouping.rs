//! Per-kind grouping: which elements travel together.
//!
//! Every function here returns ordered id groups of at most `max_chunk_size`
//! elements; token budgeting and packing happen in [`super::fragments`].

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use specweave_core::{BoundaryDetection, ElementKind, SpecDocument};
use tracing::debug;

use super::fragments::{FragmentFactory, Plan};
use crate::errors::{ContextError, Result};
use crate::quality::{fixed_split_points, recommend_split_points, split_at};
use crate::relationships::{EdgeKind, RelationshipGraph};
use crate::types::ChunkingStrategy;

/// Fragment plans for every element of `kind`, in output order.
pub(crate) fn plan_kind(
    kind: ElementKind,
    document: &SpecDocument,
    factory: &FragmentFactory<'_>,
    strategy: &ChunkingStrategy,
) -> Result<Vec<Plan>> {
    let max = strategy.max_chunk_size;
    let graph = factory.graph();
    let cut = |group: Vec<String>| cut_group(group, max, strategy.boundary_detection, graph);

    let groups = match kind {
        ElementKind::BusinessRules => {
            let clusters = rule_clusters(document, graph, max);
            factory.pack(factory.fit_all(clusters)?, max)?
        }
        ElementKind::DataStructures => {
            let slices = structure_hierarchies(document, graph)
                .into_iter()
                .flat_map(cut)
                .collect();
            factory.pack(factory.fit_all(slices)?, max)?
        }
        ElementKind::ApiEndpoints => {
            let slices = endpoint_domains(document).into_iter().flat_map(cut).collect();
            factory.fit_all(slices)?
        }
        ElementKind::WorkflowSteps => {
            let slices = workflow_sequences(document)?.into_iter().flat_map(cut).collect();
            factory.fit_all(slices)?
        }
    };

    debug!(kind = %kind, groups = groups.len(), max_chunk_size = max, "planned fragments");
    Ok(groups
        .into_iter()
        .filter(|ids| !ids.is_empty())
        .map(|ids| Plan::new(ids, kind.into()))
        .collect())
}

/// Cut an ordered group into runs of at most `max` elements.
fn cut_group(
    group: Vec<String>,
    max: usize,
    boundary: BoundaryDetection,
    graph: &RelationshipGraph,
) -> Vec<Vec<String>> {
    if group.len() <= max {
        return vec![group];
    }
    let cuts = match boundary {
        BoundaryDetection::Semantic => recommend_split_points(&group, max, graph),
        BoundaryDetection::Structural | BoundaryDetection::Size => {
            fixed_split_points(group.len(), max)
        }
    };
    split_at(&group, &cuts)
}

// =============================================================================
// Business rules
// =============================================================================

/// Breadth-first clusters over undirected rule dependencies, capped at `max`.
///
/// Rules left in the queue when a cluster fills start later clusters, in
/// document order.
pub(crate) fn rule_clusters(
    document: &SpecDocument,
    graph: &RelationshipGraph,
    max: usize,
) -> Vec<Vec<String>> {
    let ids = document.element_ids(ElementKind::BusinessRules);
    let rules: HashSet<&str> = ids.iter().copied().collect();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut clusters = Vec::new();

    for start in &ids {
        if visited.contains(start) {
            continue;
        }
        let mut cluster = Vec::new();
        let mut queue = VecDeque::from([*start]);
        while cluster.len() < max {
            let Some(id) = queue.pop_front() else { break };
            if !visited.insert(id) {
                continue;
            }
            cluster.push(id.to_owned());
            queue.extend(
                graph
                    .neighbors(id)
                    .into_iter()
                    .filter(|n| rules.contains(n) && !visited.contains(n)),
            );
        }
        clusters.push(cluster);
    }
    clusters
}

// =============================================================================
// Data structures
// =============================================================================

/// Composition/reference hierarchies, rooted at structures nothing composes.
pub(crate) fn structure_hierarchies(
    document: &SpecDocument,
    graph: &RelationshipGraph,
) -> Vec<Vec<String>> {
    const FOLLOW: [EdgeKind; 2] = [EdgeKind::Composition, EdgeKind::Reference];

    let ids = document.element_ids(ElementKind::DataStructures);
    let structures: HashSet<&str> = ids.iter().copied().collect();
    let is_root = |id: &&str| {
        !graph
            .incoming(id)
            .any(|e| e.kind == EdgeKind::Composition && structures.contains(e.source_id.as_str()))
    };
    // Roots first, then anything only reachable through a composition cycle.
    let order = ids
        .iter()
        .filter(|id| is_root(*id))
        .chain(ids.iter().filter(|id| !is_root(*id)))
        .copied();

    let mut visited: HashSet<&str> = HashSet::new();
    let mut hierarchies = Vec::new();
    for start in order {
        if !visited.insert(start) {
            continue;
        }
        let mut hierarchy = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            hierarchy.push(id.to_owned());
            for child in graph.successors(id, &FOLLOW) {
                if structures.contains(child) && visited.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        hierarchies.push(hierarchy);
    }
    hierarchies
}

// =============================================================================
// API endpoints
// =============================================================================

/// Endpoints grouped by first path segment, domains in first-seen order.
pub(crate) fn endpoint_domains(document: &SpecDocument) -> Vec<Vec<String>> {
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut domains: Vec<Vec<String>> = Vec::new();
    for endpoint in &document.api_endpoints {
        let slot = *position.entry(endpoint.domain()).or_insert_with(|| {
            domains.push(Vec::new());
            domains.len() - 1
        });
        domains[slot].push(endpoint.id.clone());
    }
    domains
}

// =============================================================================
// Workflow
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Execution-ordered sequences, one per weakly connected group of steps.
///
/// Fails with [`ContextError::CyclicWorkflow`] before any sequence is built.
/// Dependencies on unknown steps are ignored here.
pub(crate) fn workflow_sequences(document: &SpecDocument) -> Result<Vec<Vec<String>>> {
    let steps = &document.workflow_steps;
    let index: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();
    let deps: Vec<Vec<usize>> = steps
        .iter()
        .map(|step| {
            let known: BTreeSet<usize> = step
                .depends_on
                .iter()
                .filter_map(|d| index.get(d.as_str()).copied())
                .collect();
            known.into_iter().collect()
        })
        .collect();

    if let Some(cycle) = find_cycle(&deps) {
        let mut step_ids: Vec<String> = cycle.into_iter().map(|i| steps[i].id.clone()).collect();
        step_ids.sort();
        return Err(ContextError::CyclicWorkflow { step_ids });
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for (step, step_deps) in deps.iter().enumerate() {
        for &dep in step_deps {
            dependents[dep].push(step);
        }
    }

    let mut seen = vec![false; steps.len()];
    let mut sequences = Vec::new();
    for start in 0..steps.len() {
        if seen[start] {
            continue;
        }
        seen[start] = true;
        let mut members = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for &next in deps[node].iter().chain(&dependents[node]) {
                if !seen[next] {
                    seen[next] = true;
                    members.push(next);
                    queue.push_back(next);
                }
            }
        }
        let order = topological_order(&members, &deps, &dependents);
        sequences.push(order.into_iter().map(|i| steps[i].id.clone()).collect());
    }
    Ok(sequences)
}

/// Members of the first dependency cycle found, walking with an explicit stack.
fn find_cycle(deps: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut marks = vec![Mark::Unvisited; deps.len()];
    for root in 0..deps.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::OnStack;
        // (node, next dependency to visit)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let Some(&child) = deps[node].get(frame.1) else {
                marks[node] = Mark::Done;
                let _ = stack.pop();
                continue;
            };
            frame.1 += 1;
            match marks[child] {
                Mark::Unvisited => {
                    marks[child] = Mark::OnStack;
                    stack.push((child, 0));
                }
                Mark::OnStack => {
                    let from = stack.iter().position(|(n, _)| *n == child).unwrap_or(0);
                    return Some(stack[from..].iter().map(|(n, _)| *n).collect());
                }
                Mark::Done => {}
            }
        }
    }
    None
}

/// Kahn's algorithm over `members`; ties resolve in document order.
fn topological_order(members: &[usize], deps: &[Vec<usize>], dependents: &[Vec<usize>]) -> Vec<usize> {
    let mut remaining: HashMap<usize, usize> = members.iter().map(|&m| (m, deps[m].len())).collect();
    let mut ready: BTreeSet<usize> = remaining
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(m, _)| *m)
        .collect();
    let mut order = Vec::with_capacity(members.len());
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for next in &dependents[node] {
            if let Some(count) = remaining.get_mut(next) {
                *count -= 1;
                if *count == 0 {
                    let _ = ready.insert(*next);
                }
            }
        }
    }
    order
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use specweave_core::{ApiEndpoint, BusinessRule, DataStructure, Field, WorkflowStep};

    fn step(id: &str, deps: &[&str]) -> WorkflowStep {
        WorkflowStep {
            id: id.into(),
            name: id.into(),
            depends_on: deps.iter().map(|d| (*d).to_string()).collect(),
            ..WorkflowStep::default()
        }
    }

    fn workflow(steps: Vec<WorkflowStep>) -> SpecDocument {
        SpecDocument {
            workflow_steps: steps,
            ..SpecDocument::new("flow")
        }
    }

    // -- rules --

    #[test]
    fn rule_clusters_follow_dependencies_and_cap() {
        let rule = |id: &str, condition: &str| BusinessRule {
            id: id.into(),
            condition: condition.into(),
            ..BusinessRule::default()
        };
        let doc = SpecDocument {
            business_rules: vec![
                rule("R1", "x"),
                rule("R2", "R1"),
                rule("R3", "R2"),
                rule("R4", "y"),
                rule("R5", "R4"),
            ],
            ..SpecDocument::new("rules")
        };
        let graph = RelationshipGraph::for_document(&doc);
        assert_eq!(
            rule_clusters(&doc, &graph, 8),
            vec![vec!["R1", "R2", "R3"], vec!["R4", "R5"]]
        );
        assert_eq!(
            rule_clusters(&doc, &graph, 2),
            vec![vec!["R1", "R2"], vec!["R3"], vec!["R4", "R5"]]
        );
    }

    // -- structures --

    #[test]
    fn hierarchies_start_at_roots() {
        let field = |ty: &str| Field {
            name: "f".into(),
            field_type: ty.into(),
            ..Field::default()
        };
        let doc = SpecDocument {
            data_structures: vec![
                DataStructure {
                    id: "S1".into(),
                    name: "Line".into(),
                    ..DataStructure::default()
                },
                DataStructure {
                    id: "S2".into(),
                    name: "Order".into(),
                    fields: vec![field("Line[]")],
                    ..DataStructure::default()
                },
                DataStructure {
                    id: "S3".into(),
                    name: "User".into(),
                    ..DataStructure::default()
                },
            ],
            ..SpecDocument::new("model")
        };
        let graph = RelationshipGraph::for_document(&doc);
        assert_eq!(
            structure_hierarchies(&doc, &graph),
            vec![vec!["S2", "S1"], vec!["S3"]]
        );
    }

    // -- endpoints --

    #[test]
    fn endpoints_group_by_first_segment() {
        let endpoint = |id: &str, path: &str| ApiEndpoint {
            id: id.into(),
            path: path.into(),
            ..ApiEndpoint::default()
        };
        let doc = SpecDocument {
            api_endpoints: vec![
                endpoint("E1", "/orders"),
                endpoint("E2", "/users/{id}"),
                endpoint("E3", "/orders/{id}"),
            ],
            ..SpecDocument::new("api")
        };
        assert_eq!(endpoint_domains(&doc), vec![vec!["E1", "E3"], vec!["E2"]]);
    }

    // -- workflow --

    #[test]
    fn sequences_are_topologically_ordered_components() {
        let doc = workflow(vec![
            step("ship", &["pay"]),
            step("pay", &["validate"]),
            step("validate", &[]),
            step("audit", &["ghost"]),
        ]);
        assert_eq!(
            workflow_sequences(&doc).unwrap(),
            vec![vec!["validate", "pay", "ship"], vec!["audit"]]
        );
    }

    #[test]
    fn cycle_names_members_only() {
        let doc = workflow(vec![
            step("start", &[]),
            step("A", &["C", "start"]),
            step("B", &["A"]),
            step("C", &["B"]),
        ]);
        assert_matches!(
            workflow_sequences(&doc),
            Err(ContextError::CyclicWorkflow { step_ids }) if step_ids == ["A", "B", "C"]
        );
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let doc = workflow(vec![step("loop", &["loop"])]);
        assert_matches!(
            workflow_sequences(&doc),
            Err(ContextError::CyclicWorkflow { step_ids }) if step_ids == ["loop"]
        );
    }

    // -- cutting --

    #[test]
    fn size_boundaries_cut_at_fixed_positions() {
        let ids: Vec<String> = (1..=7).map(|i| format!("E{i}")).collect();
        let runs = cut_group(ids, 3, BoundaryDetection::Size, &RelationshipGraph::default());
        let lens: Vec<usize> = runs.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![3, 3, 1]);
    }
}
