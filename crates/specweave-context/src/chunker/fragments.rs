//! Fragment construction from planned id groups.

use std::collections::{BTreeSet, HashSet};

use chrono::Utc;
use specweave_core::{ElementRef, FragmentId, SpecDocument};
use specweave_tokens::TokenEstimator;
use tracing::warn;

use crate::errors::Result;
use crate::quality::QualityAssessor;
use crate::relationships::{EdgeKind, RelationshipGraph};
use crate::types::{ContextFragment, FragmentBoundaries, FragmentMetadata, FragmentType};

/// Ordered ids that will become one fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Plan {
    pub(crate) ids: Vec<String>,
    pub(crate) fragment_type: FragmentType,
}

impl Plan {
    pub(crate) fn new(ids: Vec<String>, fragment_type: FragmentType) -> Self {
        Self { ids, fragment_type }
    }
}

/// Trailing elements copied from the previous fragment.
#[derive(Clone, Debug)]
pub(crate) struct Overlap {
    pub(crate) with: FragmentId,
    pub(crate) ids: Vec<String>,
}

/// Builds fragments for one document and budget.
pub(crate) struct FragmentFactory<'a> {
    document: &'a SpecDocument,
    graph: &'a RelationshipGraph,
    assessor: &'a QualityAssessor,
    estimator: TokenEstimator,
    budget: usize,
}

impl<'a> FragmentFactory<'a> {
    pub(crate) fn new(
        document: &'a SpecDocument,
        graph: &'a RelationshipGraph,
        assessor: &'a QualityAssessor,
        estimator: TokenEstimator,
        budget: usize,
    ) -> Self {
        Self {
            document,
            graph,
            assessor,
            estimator,
            budget,
        }
    }

    pub(crate) fn graph(&self) -> &'a RelationshipGraph {
        self.graph
    }

    pub(crate) fn budget(&self) -> usize {
        self.budget
    }

    // ── Estimation ──────────────────────────────────────────────────────────

    /// Tokens of the partial document holding `ids`.
    pub(crate) fn tokens(&self, ids: &[String]) -> Result<usize> {
        let content = self.document.restrict(ids.iter().map(String::as_str));
        Ok(self.estimator.estimate(&content)?)
    }

    /// Tokens of one element on its own.
    pub(crate) fn element_tokens(&self, id: &str) -> Result<usize> {
        let len = match self.document.element(id) {
            Some(element) => element.serialized_len()?,
            None => 0,
        };
        Ok(self.estimator.estimate_len(len))
    }

    // ── Budgeting ───────────────────────────────────────────────────────────

    /// Split `group` greedily, in order, so each part fits the budget.
    ///
    /// An element too large on its own keeps a part to itself.
    pub(crate) fn fit_budget(&self, group: Vec<String>) -> Result<Vec<Vec<String>>> {
        if group.len() <= 1 || self.tokens(&group)? <= self.budget {
            return Ok(vec![group]);
        }
        let mut parts = Vec::new();
        let mut current: Vec<String> = Vec::new();
        for id in group {
            current.push(id);
            if current.len() > 1 && self.tokens(&current)? > self.budget {
                if let Some(overflow) = current.pop() {
                    parts.push(std::mem::replace(&mut current, vec![overflow]));
                }
            }
        }
        if !current.is_empty() {
            parts.push(current);
        }
        Ok(parts)
    }

    /// [`Self::fit_budget`] over every group.
    pub(crate) fn fit_all(&self, groups: Vec<Vec<String>>) -> Result<Vec<Vec<String>>> {
        let mut fitted = Vec::with_capacity(groups.len());
        for group in groups {
            fitted.extend(self.fit_budget(group)?);
        }
        Ok(fitted)
    }

    /// Join consecutive whole units while both the element cap and the budget hold.
    pub(crate) fn pack(&self, units: Vec<Vec<String>>, max: usize) -> Result<Vec<Vec<String>>> {
        let mut packed = Vec::new();
        let mut current: Vec<String> = Vec::new();
        for unit in units {
            if current.is_empty() {
                current = unit;
                continue;
            }
            if current.len() + unit.len() <= max {
                let mut candidate = current.clone();
                candidate.extend(unit.iter().cloned());
                if self.tokens(&candidate)? <= self.budget {
                    current = candidate;
                    continue;
                }
            }
            packed.push(std::mem::replace(&mut current, unit));
        }
        if !current.is_empty() {
            packed.push(current);
        }
        Ok(packed)
    }

    /// Merge adjacent plans whose outside references intersect.
    pub(crate) fn merge_related(&self, plans: Vec<Plan>, max: usize) -> Result<Vec<Plan>> {
        let mut merged: Vec<Plan> = Vec::with_capacity(plans.len());
        for plan in plans {
            if let Some(last) = merged.last_mut() {
                if self.try_absorb(last, &plan, max)? {
                    continue;
                }
            }
            merged.push(plan);
        }
        Ok(merged)
    }

    /// Append `next` to `plan` when both reference a common outside element
    /// and the union stays within `max` elements and the token budget.
    pub(crate) fn try_absorb(&self, plan: &mut Plan, next: &Plan, max: usize) -> Result<bool> {
        if plan.ids.len() + next.ids.len() > max
            || self
                .outside_references(&plan.ids)
                .is_disjoint(&self.outside_references(&next.ids))
        {
            return Ok(false);
        }
        let mut ids = plan.ids.clone();
        ids.extend(next.ids.iter().cloned());
        if self.tokens(&ids)? > self.budget {
            return Ok(false);
        }
        plan.ids = ids;
        plan.fragment_type = plan.fragment_type.combine(next.fragment_type);
        Ok(true)
    }

    /// Trailing ids of `ids` whose token estimates sum to at least `overlap_tokens`.
    pub(crate) fn overlap_tail(&self, ids: &[String], overlap_tokens: usize) -> Result<Vec<String>> {
        let mut tail = Vec::new();
        if overlap_tokens == 0 {
            return Ok(tail);
        }
        let mut covered = 0;
        for id in ids.iter().rev() {
            tail.push(id.clone());
            covered += self.element_tokens(id)?;
            if covered >= overlap_tokens {
                break;
            }
        }
        tail.reverse();
        Ok(tail)
    }

    // ── Relationships ───────────────────────────────────────────────────────

    /// Existing ids outside `ids` that the members point at.
    pub(crate) fn outside_references(&self, ids: &[String]) -> BTreeSet<String> {
        let members: HashSet<&str> = ids.iter().map(String::as_str).collect();
        ids.iter()
            .flat_map(|id| self.graph.outgoing(id))
            .filter(|e| !members.contains(e.target_id.as_str()) && self.graph.contains(&e.target_id))
            .map(|e| e.target_id.clone())
            .collect()
    }

    /// Dependency targets outside `ids`, plus every target missing from the document.
    pub(crate) fn outside_dependencies(&self, ids: &[String]) -> BTreeSet<String> {
        let members: HashSet<&str> = ids.iter().map(String::as_str).collect();
        ids.iter()
            .flat_map(|id| self.graph.outgoing(id))
            .filter(|e| {
                !members.contains(e.target_id.as_str())
                    && (e.kind == EdgeKind::Dependency || !self.graph.contains(&e.target_id))
            })
            .map(|e| e.target_id.clone())
            .collect()
    }

    // ── Construction ────────────────────────────────────────────────────────

    /// Build the fragment for `plan` at `index`.
    pub(crate) fn build(
        &self,
        plan: &Plan,
        index: usize,
        total: Option<usize>,
        overlap: Option<Overlap>,
    ) -> Result<ContextFragment> {
        let (overlap_with, overlap_ids) = match overlap {
            Some(Overlap { with, ids }) => (Some(with), ids),
            None => (None, Vec::new()),
        };
        let own: HashSet<&str> = plan.ids.iter().map(String::as_str).collect();
        let overlap_ids: Vec<String> = overlap_ids
            .into_iter()
            .filter(|id| !own.contains(id.as_str()))
            .collect();
        let ids: Vec<String> = overlap_ids.iter().chain(&plan.ids).cloned().collect();

        let content = self.document.restrict(ids.iter().map(String::as_str));
        let token_count = self.estimator.estimate(&content)?;
        let elements = content.all_elements();
        let fragment_type = elements
            .iter()
            .map(|e| FragmentType::from(e.kind()))
            .reduce(FragmentType::combine)
            .unwrap_or(plan.fragment_type);
        let id = FragmentId::for_position(&self.document.name, fragment_type.as_str(), index);
        let exceeds_budget = token_count > self.budget;
        if exceeds_budget && plan.ids.len() == 1 {
            warn!(
                fragment = %id,
                element = %plan.ids[0],
                tokens = token_count,
                budget = self.budget,
                "single element exceeds fragment token budget"
            );
        }

        Ok(ContextFragment {
            priority: priority(&elements),
            relationships: self.outside_references(&ids),
            metadata: FragmentMetadata {
                index,
                total,
                source_document_id: self.document.name.clone(),
                fragment_type,
                created_at: Utc::now(),
                dependencies: self.outside_dependencies(&ids),
                quality_score: self.assessor.score_cluster(&ids, self.graph, fragment_type.kind()),
                exceeds_budget,
            },
            boundaries: FragmentBoundaries {
                first_element_id: ids.first().cloned(),
                last_element_id: ids.last().cloned(),
                overlap_with,
                overlap_element_ids: overlap_ids,
            },
            id,
            content,
            token_count,
        })
    }

    /// Build every plan with its final position.
    pub(crate) fn build_all(&self, plans: &[Plan]) -> Result<Vec<ContextFragment>> {
        let total = plans.len();
        plans
            .iter()
            .enumerate()
            .map(|(index, plan)| self.build(plan, index, Some(total), None))
            .collect()
    }

    /// Rebuild fragments `1..` with the tail of their predecessor prepended.
    pub(crate) fn apply_overlap(
        &self,
        plans: &[Plan],
        mut fragments: Vec<ContextFragment>,
        overlap_tokens: usize,
    ) -> Result<Vec<ContextFragment>> {
        if overlap_tokens == 0 {
            return Ok(fragments);
        }
        let total = fragments.len();
        for index in 1..total {
            let ids = self.overlap_tail(&plans[index - 1].ids, overlap_tokens)?;
            let overlap = Overlap {
                with: fragments[index - 1].id.clone(),
                ids,
            };
            fragments[index] = self.build(&plans[index], index, Some(total), Some(overlap))?;
        }
        Ok(fragments)
    }
}

/// Element count plus the bonus of every high or critical rule.
fn priority(elements: &[ElementRef<'_>]) -> u32 {
    let bonus: u32 = elements
        .iter()
        .map(|e| match e {
            ElementRef::Rule(rule) => rule.priority.fragment_bonus(),
            _ => 0,
        })
        .sum();
    u32::try_from(elements.len()).unwrap_or(u32::MAX).saturating_add(bonus)
}

// =============================================================================
// Tests
// =============================================================================
