//! Relationship integrity checks over a fragment list.
//!
//! Issues are collected, never raised: the fragments stay usable and the
//! caller decides what to do with the report. Output order follows fragment
//! order and sorted ids, so repeated calls produce identical reports.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use specweave_core::FragmentId;

use crate::types::ContextFragment;

/// How serious an issue is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Worth reporting; the fragments are still consistent.
    Warning,
    /// A fragment depends on something no fragment holds.
    Error,
}

/// What an issue is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A referenced id that no other fragment mentions.
    OrphanedReference,
    /// A dependency no fragment contains.
    MissingDependency,
    /// Mean fragment quality below the configured minimum.
    LowQuality,
}

/// One finding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// Severity.
    pub severity: IssueSeverity,
    /// Category.
    pub kind: IssueKind,
    /// Fragment the issue was found in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment_id: Option<FragmentId>,
    /// Element id involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    /// Human-readable description.
    pub message: String,
}

/// Result of [`validate_relationships`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// No errors were found (warnings allowed).
    pub valid: bool,
    /// Non-fatal findings.
    pub warnings: Vec<ValidationIssue>,
    /// Missing dependencies.
    pub errors: Vec<ValidationIssue>,
    /// Mean quality score; 0 for an empty list.
    pub average_quality: f64,
}

/// Check references, dependencies and mean quality of `fragments`.
pub fn validate_relationships(
    fragments: &[ContextFragment],
    min_average_quality: f64,
) -> ValidationReport {
    let present: BTreeSet<&str> = fragments.iter().flat_map(ContextFragment::element_ids).collect();
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    for (position, fragment) in fragments.iter().enumerate() {
        for referenced in &fragment.relationships {
            let mentioned_elsewhere = fragments.iter().enumerate().any(|(other, f)| {
                other != position
                    && (f.relationships.contains(referenced)
                        || f.metadata.dependencies.contains(referenced))
            });
            if !mentioned_elsewhere {
                warnings.push(ValidationIssue {
                    severity: IssueSeverity::Warning,
                    kind: IssueKind::OrphanedReference,
                    fragment_id: Some(fragment.id.clone()),
                    element_id: Some(referenced.clone()),
                    message: format!(
                        "orphaned reference: {referenced} in {} is not named by any other fragment",
                        fragment.id
                    ),
                });
            }
        }
        for dependency in &fragment.metadata.dependencies {
            if !present.contains(dependency.as_str()) {
                errors.push(ValidationIssue {
                    severity: IssueSeverity::Error,
                    kind: IssueKind::MissingDependency,
                    fragment_id: Some(fragment.id.clone()),
                    element_id: Some(dependency.clone()),
                    message: format!(
                        "missing dependency: {} depends on {dependency}, which no fragment contains",
                        fragment.id
                    ),
                });
            }
        }
    }

    let average_quality = if fragments.is_empty() {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let count = fragments.len() as f64;
        fragments.iter().map(|f| f.metadata.quality_score).sum::<f64>() / count
    };
    if !fragments.is_empty() && average_quality < min_average_quality {
        warnings.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            kind: IssueKind::LowQuality,
            fragment_id: None,
            element_id: None,
            message: format!(
                "low quality: average fragment quality {average_quality:.2} is below {min_average_quality:.2}"
            ),
        });
    }

    ValidationReport {
        valid: errors.is_empty(),
        warnings,
        errors,
        average_quality,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use specweave_core::{BusinessRule, SpecDocument};

    use crate::types::{FragmentBoundaries, FragmentMetadata, FragmentType};

    fn fragment(index: usize, elements: &[&str], refs: &[&str], deps: &[&str], quality: f64) -> ContextFragment {
        let content = SpecDocument {
            business_rules: elements
                .iter()
                .map(|id| BusinessRule {
                    id: (*id).into(),
                    ..BusinessRule::default()
                })
                .collect(),
            ..SpecDocument::new("doc")
        };
        ContextFragment {
            id: FragmentId::for_position("doc", "business_rules", index),
            content,
            token_count: 10,
            relationships: refs.iter().map(|s| (*s).to_string()).collect(),
            priority: 1,
            metadata: FragmentMetadata {
                index,
                total: None,
                source_document_id: "doc".into(),
                fragment_type: FragmentType::BusinessRules,
                created_at: Utc::now(),
                dependencies: deps.iter().map(|s| (*s).to_string()).collect(),
                quality_score: quality,
                exceeds_budget: false,
            },
            boundaries: FragmentBoundaries::default(),
        }
    }

    #[test]
    fn empty_list_is_valid_without_quality_warning() {
        let report = validate_relationships(&[], 0.7);
        assert!(report.valid);
        assert!(report.warnings.is_empty());
        assert!(report.average_quality.abs() < f64::EPSILON);
    }

    #[test]
    fn reference_named_elsewhere_is_not_orphaned() {
        let fragments = [
            fragment(0, &["R1"], &["R9"], &[], 1.0),
            fragment(1, &["R2", "R9"], &[], &["R9"], 1.0),
        ];
        let report = validate_relationships(&fragments, 0.7);
        assert!(report.warnings.is_empty());
        assert!(report.valid);
    }

    #[test]
    fn orphan_missing_dependency_and_low_quality() {
        let fragments = [
            fragment(0, &["R1"], &["R2"], &["R7"], 0.5),
            fragment(1, &["R2"], &[], &[], 0.6),
        ];
        let report = validate_relationships(&fragments, 0.7);
        assert!(!report.valid);
        let kinds: Vec<IssueKind> = report.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![IssueKind::OrphanedReference, IssueKind::LowQuality]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].element_id.as_deref(), Some("R7"));
        assert!(report.errors[0].message.starts_with("missing dependency"));
        assert!((report.average_quality - 0.55).abs() < 1e-9);
    }

    #[test]
    fn report_is_deterministic() {
        let fragments = [
            fragment(0, &["R1"], &["R3", "R2"], &["R8", "R2"], 0.9),
            fragment(1, &["R2", "R3"], &["R1"], &[], 0.9),
        ];
        assert_eq!(
            validate_relationships(&fragments, 0.7),
            validate_relationships(&fragments, 0.7)
        );
    }
}
