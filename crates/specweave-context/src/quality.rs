//! Cohesion scoring and split-point recommendation.
//!
//! The score is a heuristic, not a proof of optimal partitioning: a cluster
//! earns a base score, a bonus when none of its edges leave it, and a bonus
//! when its size is in the balanced range for its kind.

use std::collections::HashSet;

use specweave_core::ElementKind;
use specweave_settings::{BalancedRange, ScoringSettings};

use crate::relationships::RelationshipGraph;

/// Scores candidate groups of elements.
#[derive(Clone, Debug, Default)]
pub struct QualityAssessor {
    scoring: ScoringSettings,
}

impl QualityAssessor {
    /// Assessor with the given weights and ranges.
    pub fn new(scoring: ScoringSettings) -> Self {
        Self { scoring }
    }

    /// Weights and ranges in use.
    pub fn scoring(&self) -> &ScoringSettings {
        &self.scoring
    }

    /// Cohesion score of `ids`, clamped to `[0, 1]`.
    ///
    /// `kind` selects the balanced range; `None` (a mixed fragment) uses the
    /// widest range any kind accepts.
    pub fn score_cluster<S: AsRef<str>>(
        &self,
        ids: &[S],
        graph: &RelationshipGraph,
        kind: Option<ElementKind>,
    ) -> f64 {
        let members: HashSet<&str> = ids.iter().map(AsRef::as_ref).collect();
        let mut score = self.scoring.base_score;
        let self_contained = members
            .iter()
            .all(|id| graph.outgoing(id).all(|edge| members.contains(edge.target_id.as_str())));
        if self_contained {
            score += self.scoring.self_contained_bonus;
        }
        if self.balanced_range(kind).contains(members.len()) {
            score += self.scoring.balanced_bonus;
        }
        score.clamp(0.0, 1.0)
    }

    fn balanced_range(&self, kind: Option<ElementKind>) -> BalancedRange {
        let ranges = &self.scoring.balanced_ranges;
        match kind {
            Some(kind) => ranges.for_kind(kind),
            None => ElementKind::ALL.iter().map(|k| ranges.for_kind(*k)).fold(
                BalancedRange {
                    min: usize::MAX,
                    max: 0,
                },
                |acc, r| BalancedRange {
                    min: acc.min.min(r.min),
                    max: acc.max.max(r.max),
                },
            ),
        }
    }
}

/// Edges (either direction) between `ids[..cut]` and `ids[cut..]`.
pub fn crossing_edges<S: AsRef<str>>(ids: &[S], cut: usize, graph: &RelationshipGraph) -> usize {
    let cut = cut.min(ids.len());
    let head: HashSet<&str> = ids[..cut].iter().map(AsRef::as_ref).collect();
    let tail: HashSet<&str> = ids[cut..].iter().map(AsRef::as_ref).collect();
    graph
        .edges()
        .iter()
        .filter(|e| {
            let (s, t) = (e.source_id.as_str(), e.target_id.as_str());
            (head.contains(s) && tail.contains(t)) || (tail.contains(s) && head.contains(t))
        })
        .count()
}

/// Cut positions splitting `ids` into runs of at most `max` elements.
///
/// Each cut is placed within reach of the previous one where the fewest
/// edges cross; ties go to the later position so runs stay full.
pub fn recommend_split_points<S: AsRef<str>>(
    ids: &[S],
    max: usize,
    graph: &RelationshipGraph,
) -> Vec<usize> {
    let max = max.max(1);
    let mut cuts = Vec::new();
    let mut start = 0;
    while ids.len() - start > max {
        let mut best = start + max;
        let mut best_crossing = usize::MAX;
        for cut in (start + 1..=start + max).rev() {
            let crossing = crossing_edges(ids, cut, graph);
            if crossing < best_crossing {
                best = cut;
                best_crossing = crossing;
            }
        }
        cuts.push(best);
        start = best;
    }
    cuts
}

/// Cut positions every `max` elements.
pub fn fixed_split_points(len: usize, max: usize) -> Vec<usize> {
    let max = max.max(1);
    (1..len.div_ceil(max)).map(|i| i * max).collect()
}

/// Split `ids` at `cuts`.
pub fn split_at<T: Clone>(ids: &[T], cuts: &[usize]) -> Vec<Vec<T>> {
    let mut runs = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for &cut in cuts {
        runs.push(ids[start..cut].to_vec());
        start = cut;
    }
    if start < ids.len() || runs.is_empty() {
        runs.push(ids[start..].to_vec());
    }
    runs
}

// =============================================================================
// Tests
// =============================================================================
