//! Compression techniques as pure document transforms.
//!
//! Every technique only removes or reorders content, so the serialized length
//! (and with it the token estimate) never grows. Element text that is kept is
//! kept whole.

use std::collections::HashSet;

use specweave_core::{CompressionLevel, Density, SpecDocument};
use specweave_settings::OptimizerSettings;
use specweave_tokens::CompressionTechnique;

/// A transformed document and what the transform stripped.
#[derive(Debug)]
pub(crate) struct Outcome {
    pub(crate) document: SpecDocument,
    pub(crate) removed: Vec<String>,
}

/// Techniques run at `level`, in order.
pub fn techniques_for(level: CompressionLevel) -> &'static [CompressionTechnique] {
    use CompressionTechnique as T;
    match level {
        CompressionLevel::Low => &[T::FieldPruning],
        CompressionLevel::Medium => &[T::FieldPruning, T::AnnotationPruning, T::RedundancyRemoval],
        CompressionLevel::High => &[
            T::FieldPruning,
            T::AnnotationPruning,
            T::RedundancyRemoval,
            T::PriorityFiltering,
            T::StructuralOptimization,
        ],
    }
}

/// Apply one technique to a copy of `document`.
pub(crate) fn apply(
    technique: CompressionTechnique,
    document: &SpecDocument,
    settings: &OptimizerSettings,
) -> Outcome {
    let mut doc = document.clone();
    let removed = match technique {
        CompressionTechnique::FieldPruning => prune_tags_and_metadata(&mut doc),
        CompressionTechnique::AnnotationPruning => prune_annotations(&mut doc),
        CompressionTechnique::RedundancyRemoval => remove_redundancy(&mut doc),
        CompressionTechnique::PriorityFiltering => filter_priority(&mut doc, settings),
        CompressionTechnique::StructuralOptimization => {
            cap_elements(&mut doc, settings.max_elements_per_kind)
        }
        CompressionTechnique::SemanticCompression => {
            let mut removed = prune_tags_and_metadata(&mut doc);
            removed.extend(prune_annotations(&mut doc));
            removed.extend(strip_descriptions(&mut doc));
            removed
        }
        CompressionTechnique::FieldPrioritization => {
            let mut removed = prune_tags_and_metadata(&mut doc);
            removed.extend(prioritize_fields(&mut doc));
            removed
        }
    };
    Outcome {
        document: doc,
        removed,
    }
}

/// Re-shape `document` for a model's preferred density.
///
/// Element counts never change.
pub(crate) fn reshape(document: &SpecDocument, density: Density) -> SpecDocument {
    let mut doc = document.clone();
    match density {
        Density::Verbose => {}
        Density::Compact => {
            let _ = strip_descriptions(&mut doc);
        }
        Density::Structured => {
            doc.business_rules.sort_by(|a, b| a.id.cmp(&b.id));
            doc.data_structures.sort_by(|a, b| a.id.cmp(&b.id));
            doc.api_endpoints.sort_by(|a, b| a.id.cmp(&b.id));
            doc.workflow_steps.sort_by(|a, b| a.id.cmp(&b.id));
            for structure in &mut doc.data_structures {
                structure.fields.sort_by(|a, b| a.name.cmp(&b.name));
                structure.tags.sort();
            }
            for rule in &mut doc.business_rules {
                rule.tags.sort();
            }
            for endpoint in &mut doc.api_endpoints {
                endpoint.tags.sort();
            }
            for step in &mut doc.workflow_steps {
                step.tags.sort();
            }
            doc.tags.sort();
        }
    }
    doc
}

/// Non-empty top-level groups of `document`.
pub(crate) fn present_groups(document: &SpecDocument) -> Vec<String> {
    let groups = [
        ("description", document.description.is_some()),
        ("business_rules", !document.business_rules.is_empty()),
        ("data_structures", !document.data_structures.is_empty()),
        ("api_endpoints", !document.api_endpoints.is_empty()),
        ("workflow_steps", !document.workflow_steps.is_empty()),
        ("tags", !document.tags.is_empty()),
        ("metadata", !document.metadata.is_empty()),
    ];
    groups
        .into_iter()
        .filter(|(_, present)| *present)
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Top-level groups present in `after`, and those present only in `before`.
pub(crate) fn group_delta(before: &SpecDocument, after: &SpecDocument) -> (Vec<String>, Vec<String>) {
    let preserved = present_groups(after);
    let removed = present_groups(before)
        .into_iter()
        .filter(|group| !preserved.contains(group))
        .collect();
    (preserved, removed)
}

// =============================================================================
// Techniques
// =============================================================================

fn prune_tags_and_metadata(doc: &mut SpecDocument) -> Vec<String> {
    let mut had_tags = !doc.tags.is_empty();
    doc.tags.clear();
    for rule in &mut doc.business_rules {
        had_tags |= !rule.tags.is_empty();
        rule.tags.clear();
    }
    for structure in &mut doc.data_structures {
        had_tags |= !structure.tags.is_empty();
        structure.tags.clear();
    }
    for endpoint in &mut doc.api_endpoints {
        had_tags |= !endpoint.tags.is_empty();
        endpoint.tags.clear();
    }
    for step in &mut doc.workflow_steps {
        had_tags |= !step.tags.is_empty();
        step.tags.clear();
    }
    let had_metadata = !doc.metadata.is_empty();
    doc.metadata.clear();

    labels([("tags", had_tags), ("metadata", had_metadata)])
}

fn prune_annotations(doc: &mut SpecDocument) -> Vec<String> {
    let mut had_examples = false;
    let mut had_notes = false;
    for rule in &mut doc.business_rules {
        had_examples |= !rule.examples.is_empty();
        had_notes |= rule.notes.take().is_some();
        rule.examples.clear();
    }
    for structure in &mut doc.data_structures {
        had_examples |= !structure.examples.is_empty();
        structure.examples.clear();
        for field in &mut structure.fields {
            had_examples |= !field.examples.is_empty();
            field.examples.clear();
        }
    }
    for endpoint in &mut doc.api_endpoints {
        had_examples |= !endpoint.examples.is_empty();
        endpoint.examples.clear();
    }
    labels([("examples", had_examples), ("notes", had_notes)])
}

fn remove_redundancy(doc: &mut SpecDocument) -> Vec<String> {
    let mut removed = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut first = |id: &str, removed: &mut Vec<String>| {
        if seen.insert(id.to_owned()) {
            true
        } else {
            removed.push(id.to_owned());
            false
        }
    };
    doc.business_rules.retain(|r| first(&r.id, &mut removed));
    doc.data_structures.retain(|s| first(&s.id, &mut removed));
    doc.api_endpoints.retain(|e| first(&e.id, &mut removed));
    doc.workflow_steps.retain(|s| first(&s.id, &mut removed));

    let mut repeated = false;
    for rule in &mut doc.business_rules {
        repeated |= drop_if_repeats(&mut rule.description, &rule.name);
    }
    for structure in &mut doc.data_structures {
        repeated |= drop_if_repeats(&mut structure.description, &structure.name);
        for field in &mut structure.fields {
            repeated |= drop_if_repeats(&mut field.description, &field.name);
        }
    }
    for endpoint in &mut doc.api_endpoints {
        repeated |= drop_if_repeats(&mut endpoint.description, &endpoint.path);
    }
    for step in &mut doc.workflow_steps {
        repeated |= drop_if_repeats(&mut step.description, &step.name);
    }
    if repeated {
        removed.push("redundant_descriptions".to_string());
    }
    removed
}

fn drop_if_repeats(description: &mut Option<String>, name: &str) -> bool {
    let repeats = description
        .as_deref()
        .is_some_and(|d| d.trim().eq_ignore_ascii_case(name.trim()));
    if repeats {
        *description = None;
    }
    repeats
}

fn filter_priority(doc: &mut SpecDocument, settings: &OptimizerSettings) -> Vec<String> {
    let mut removed = Vec::new();
    doc.business_rules.retain(|rule| {
        let keep = rule.priority >= settings.min_rule_priority;
        if !keep {
            removed.push(rule.id.clone());
        }
        keep
    });
    removed
}

fn cap_elements(doc: &mut SpecDocument, max: usize) -> Vec<String> {
    // Highest priority first; ties keep document order.
    doc.business_rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    let mut removed: Vec<String> = Vec::new();
    removed.extend(doc.business_rules.drain(max.min(doc.business_rules.len())..).map(|r| r.id));
    removed.extend(doc.data_structures.drain(max.min(doc.data_structures.len())..).map(|s| s.id));
    removed.extend(doc.api_endpoints.drain(max.min(doc.api_endpoints.len())..).map(|e| e.id));
    removed.extend(doc.workflow_steps.drain(max.min(doc.workflow_steps.len())..).map(|s| s.id));
    removed
}

fn strip_descriptions(doc: &mut SpecDocument) -> Vec<String> {
    let mut had = doc.description.take().is_some();
    for rule in &mut doc.business_rules {
        had |= rule.description.take().is_some();
    }
    for structure in &mut doc.data_structures {
        had |= structure.description.take().is_some();
        for field in &mut structure.fields {
            had |= field.description.take().is_some();
        }
    }
    for endpoint in &mut doc.api_endpoints {
        had |= endpoint.description.take().is_some();
    }
    for step in &mut doc.workflow_steps {
        had |= step.description.take().is_some();
    }
    labels([("descriptions", had)])
}

fn prioritize_fields(doc: &mut SpecDocument) -> Vec<String> {
    let mut had = false;
    for structure in &mut doc.data_structures {
        // Stable: required fields first, declaration order otherwise.
        structure.fields.sort_by_key(|f| !f.required);
        for field in structure.fields.iter_mut().filter(|f| !f.required) {
            had |= field.description.take().is_some();
            had |= !field.examples.is_empty();
            field.examples.clear();
        }
    }
    labels([("optional_field_annotations", had)])
}

fn labels<const N: usize>(flags: [(&str, bool); N]) -> Vec<String> {
    flags
        .into_iter()
        .filter(|(_, present)| *present)
        .map(|(label, _)| label.to_string())
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
