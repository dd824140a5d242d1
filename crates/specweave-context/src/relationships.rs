//! Relationship extraction between document elements.
//!
//! Edges are derived per element kind (rules only look at rules, structures at
//! structures, and so on), with one cross-kind exception: endpoint bodies link
//! to the data structure they name. Extraction is a pure function of its input
//! and is O(n²) within a kind.
//!
//! Edge targets may name ids that do not exist (a declared exception to a
//! missing rule, a `depends_on` typo). The [`RelationshipGraph`] keeps such
//! edges so callers can report them as unresolved dependencies.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use specweave_core::{
    ApiEndpoint, BusinessRule, DataStructure, ElementKind, ElementRef, SpecDocument, WorkflowStep,
};

use crate::constants::{
    STRENGTH_COMPOSITION, STRENGTH_DEPENDENCY, STRENGTH_EXCEPTION, STRENGTH_REFERENCE,
    STRENGTH_SHARED_PATH,
};

// =============================================================================
// Edges
// =============================================================================

/// Kind of link between two elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// The source needs the target (rule mentions, exceptions, workflow order).
    Dependency,
    /// The source points at the target (reference fields, endpoint bodies, shared paths).
    Reference,
    /// The source contains the target (field typed as another structure).
    Composition,
}

/// A typed, weighted, directed edge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Element the edge starts from.
    pub source_id: String,
    /// Element the edge points to (may be absent from the document).
    pub target_id: String,
    /// Edge kind.
    pub kind: EdgeKind,
    /// Strength in `[0, 1]`.
    pub strength: f64,
}

impl Relationship {
    fn new(source: &str, target: &str, kind: EdgeKind, strength: f64) -> Self {
        Self {
            source_id: source.to_owned(),
            target_id: target.to_owned(),
            kind,
            strength,
        }
    }
}

/// Derive edges between `elements`, in element order.
///
/// At most one edge is kept per `(source, target)` pair; the first rule that
/// produces it wins.
pub fn extract(elements: &[ElementRef<'_>]) -> Vec<Relationship> {
    let mut rules = Vec::new();
    let mut structures = Vec::new();
    let mut endpoints = Vec::new();
    let mut steps = Vec::new();
    for element in elements {
        match element {
            ElementRef::Rule(r) => rules.push(*r),
            ElementRef::Structure(s) => structures.push(*s),
            ElementRef::Endpoint(e) => endpoints.push(*e),
            ElementRef::Step(s) => steps.push(*s),
        }
    }

    let mut edges = EdgeSet::default();
    for element in elements {
        match element {
            ElementRef::Rule(rule) => rule_edges(rule, &rules, &mut edges),
            ElementRef::Structure(structure) => structure_edges(structure, &structures, &mut edges),
            ElementRef::Endpoint(endpoint) => {
                endpoint_edges(endpoint, &endpoints, &structures, &mut edges);
            }
            ElementRef::Step(step) => step_edges(step, &mut edges),
        }
    }
    edges.into_vec()
}

#[derive(Default)]
struct EdgeSet {
    edges: Vec<Relationship>,
    seen: HashSet<(String, String)>,
}

impl EdgeSet {
    fn push(&mut self, source: &str, target: &str, kind: EdgeKind, strength: f64) {
        if source == target {
            return;
        }
        if self.seen.insert((source.to_owned(), target.to_owned())) {
            self.edges.push(Relationship::new(source, target, kind, strength));
        }
    }

    fn into_vec(self) -> Vec<Relationship> {
        self.edges
    }
}

fn rule_edges(rule: &BusinessRule, rules: &[&BusinessRule], edges: &mut EdgeSet) {
    for other in rules {
        if mentions(&rule.condition, &other.id) || mentions(&rule.action, &other.id) {
            edges.push(&rule.id, &other.id, EdgeKind::Dependency, STRENGTH_DEPENDENCY);
        }
    }
    for exception in &rule.exceptions {
        edges.push(&rule.id, exception, EdgeKind::Dependency, STRENGTH_EXCEPTION);
    }
}

fn structure_edges(structure: &DataStructure, structures: &[&DataStructure], edges: &mut EdgeSet) {
    for field in &structure.fields {
        if field.field_type == "reference" {
            if let Some(target) = &field.reference {
                edges.push(&structure.id, target, EdgeKind::Reference, STRENGTH_REFERENCE);
            }
            continue;
        }
        for other in structures {
            if type_names(&field.field_type).any(|name| name == other.name) {
                edges.push(&structure.id, &other.id, EdgeKind::Composition, STRENGTH_COMPOSITION);
            }
        }
    }
}

fn endpoint_edges(
    endpoint: &ApiEndpoint,
    endpoints: &[&ApiEndpoint],
    structures: &[&DataStructure],
    edges: &mut EdgeSet,
) {
    for body in [&endpoint.request_body, &endpoint.response_body].into_iter().flatten() {
        for structure in structures {
            if structure.id == *body || type_names(body).any(|name| name == structure.name) {
                edges.push(&endpoint.id, &structure.id, EdgeKind::Reference, STRENGTH_REFERENCE);
            }
        }
    }
    let domain = endpoint.domain();
    if domain.is_empty() {
        return;
    }
    for other in endpoints {
        if other.domain() == domain {
            edges.push(&endpoint.id, &other.id, EdgeKind::Reference, STRENGTH_SHARED_PATH);
        }
    }
}

fn step_edges(step: &WorkflowStep, edges: &mut EdgeSet) {
    for dependency in &step.depends_on {
        edges.push(&step.id, dependency, EdgeKind::Dependency, STRENGTH_DEPENDENCY);
    }
}

/// Whether `text` contains `id` as a whole token (`R1` does not match `R10`).
fn mentions(text: &str, id: &str) -> bool {
    if id.is_empty() {
        return false;
    }
    text.match_indices(id).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + id.len()..].chars().next();
        !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char)
    })
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Identifier tokens of a declared type: `List<Address>` yields `List`, `Address`.
fn type_names(declared: &str) -> impl Iterator<Item = &str> {
    declared.split(|c: char| !is_ident_char(c)).filter(|s| !s.is_empty())
}

// =============================================================================
// RelationshipGraph
// =============================================================================

/// Adjacency view over extracted edges, built once per call.
#[derive(Clone, Debug, Default)]
pub struct RelationshipGraph {
    nodes: Vec<String>,
    position: HashMap<String, usize>,
    edges: Vec<Relationship>,
    /// Index: node → outgoing edges
    outgoing: HashMap<String, Vec<usize>>,
    /// Index: node → incoming edges
    incoming: HashMap<String, Vec<usize>>,
}

impl RelationshipGraph {
    /// Graph over `elements`; node order follows the slice.
    pub fn build(elements: &[ElementRef<'_>]) -> Self {
        let nodes = elements.iter().map(|e| e.id().to_owned());
        Self::from_edges(nodes, extract(elements))
    }

    /// Graph over every element of `document`.
    pub fn for_document(document: &SpecDocument) -> Self {
        Self::build(&document.all_elements())
    }

    /// Graph over the elements of one kind.
    pub fn for_kind(document: &SpecDocument, kind: ElementKind) -> Self {
        Self::build(&document.elements(kind))
    }

    /// Graph from explicit nodes and edges.
    pub fn from_edges(nodes: impl IntoIterator<Item = String>, edges: Vec<Relationship>) -> Self {
        let mut graph = Self::default();
        for node in nodes {
            if !graph.position.contains_key(&node) {
                let _ = graph.position.insert(node.clone(), graph.nodes.len());
                graph.nodes.push(node);
            }
        }
        for (i, edge) in edges.iter().enumerate() {
            graph.outgoing.entry(edge.source_id.clone()).or_default().push(i);
            graph.incoming.entry(edge.target_id.clone()).or_default().push(i);
        }
        graph.edges = edges;
        graph
    }

    /// Node ids in insertion order.
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Whether `id` is a node.
    pub fn contains(&self, id: &str) -> bool {
        self.position.contains_key(id)
    }

    /// Insertion position of `id`.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.position.get(id).copied()
    }

    /// Every edge.
    pub fn edges(&self) -> &[Relationship] {
        &self.edges
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges leaving `id`.
    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &Relationship> {
        self.indexed(self.outgoing.get(id))
    }

    /// Edges arriving at `id`.
    pub fn incoming(&self, id: &str) -> impl Iterator<Item = &Relationship> {
        self.indexed(self.incoming.get(id))
    }

    fn indexed<'a>(&'a self, index: Option<&'a Vec<usize>>) -> impl Iterator<Item = &'a Relationship> {
        index
            .into_iter()
            .flatten()
            .filter_map(|i| self.edges.get(*i))
    }

    /// Nodes linked to `id` in either direction, in node order.
    pub fn neighbors(&self, id: &str) -> Vec<&str> {
        let mut linked: Vec<&str> = self
            .outgoing(id)
            .map(|e| e.target_id.as_str())
            .chain(self.incoming(id).map(|e| e.source_id.as_str()))
            .filter(|other| self.contains(other))
            .collect();
        linked.sort_by_key(|other| self.position(other));
        linked.dedup();
        linked
    }

    /// Nodes linked to `id` through edges of `kinds`, following direction.
    pub fn successors(&self, id: &str, kinds: &[EdgeKind]) -> Vec<&str> {
        let mut next: Vec<&str> = self
            .outgoing(id)
            .filter(|e| kinds.contains(&e.kind) && self.contains(&e.target_id))
            .map(|e| e.target_id.as_str())
            .collect();
        next.sort_by_key(|other| self.position(other));
        next.dedup();
        next
    }
}

// =============================================================================
// Tests
// =============================================================================
