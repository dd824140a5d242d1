//! Specification document model.
//!
//! A [`SpecDocument`] is the already-validated output of the upstream parser:
//! a named collection of business rules, data structures, API endpoints and
//! workflow steps. Element ids are unique across the whole document. Nothing in
//! specweave mutates a document in place; helpers return new values.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kinds::ElementKind;

// =============================================================================
// Elements
// =============================================================================

/// Importance of a business rule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Nice-to-have rule.
    Low,
    /// Regular rule.
    #[default]
    Medium,
    /// Important rule.
    High,
    /// Rule that must never be dropped by compression.
    Critical,
}

impl Priority {
    /// Extra fragment priority contributed by a rule of this priority.
    pub fn fragment_bonus(self) -> u32 {
        match self {
            Self::Low | Self::Medium => 0,
            Self::High => 1,
            Self::Critical => 2,
        }
    }
}

/// A business rule: when `condition` holds, do `action`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusinessRule {
    /// Unique id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Free-text description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Condition expression (may mention other rule ids).
    pub condition: String,
    /// Action expression (may mention other rule ids).
    pub action: String,
    /// Rule importance.
    pub priority: Priority,
    /// Ids of rules this rule is an exception to.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exceptions: Vec<String>,
    /// Free-form tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Worked examples.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
    /// Free-text annotation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One field of a data structure.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Declared type (`string`, `reference`, or another structure's name).
    #[serde(rename = "type")]
    pub field_type: String,
    /// Whether the field is mandatory.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    /// Target structure id when `field_type` is `reference`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Free-text description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Example values.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

/// A named data structure.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataStructure {
    /// Unique id.
    pub id: String,
    /// Structure name, matched against other structures' field types.
    pub name: String,
    /// Free-text description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Fields in declaration order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    /// Free-form tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Example payloads.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

/// HTTP method of an endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[allow(missing_docs)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

/// An API endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiEndpoint {
    /// Unique id.
    pub id: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Request path, e.g. `/orders/{id}`.
    pub path: String,
    /// Free-text description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Data structure (id or name) accepted as request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    /// Data structure (id or name) returned as response body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    /// Free-form tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Example calls.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

impl ApiEndpoint {
    /// First non-empty path segment, used as the endpoint's domain.
    pub fn domain(&self) -> &str {
        self.path
            .split('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("")
    }
}

/// A workflow step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowStep {
    /// Unique id.
    pub id: String,
    /// Step name.
    pub name: String,
    /// Free-text description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ids of steps that must run before this one.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Actions performed by the step.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    /// Free-form tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Borrowed view of any document element.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(untagged)]
pub enum ElementRef<'a> {
    /// A business rule.
    Rule(&'a BusinessRule),
    /// A data structure.
    Structure(&'a DataStructure),
    /// An API endpoint.
    Endpoint(&'a ApiEndpoint),
    /// A workflow step.
    Step(&'a WorkflowStep),
}

impl<'a> ElementRef<'a> {
    /// Element id, borrowed from the document rather than from this view.
    pub fn id(&self) -> &'a str {
        match *self {
            Self::Rule(r) => &r.id,
            Self::Structure(s) => &s.id,
            Self::Endpoint(e) => &e.id,
            Self::Step(s) => &s.id,
        }
    }

    /// Element kind.
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Rule(_) => ElementKind::BusinessRules,
            Self::Structure(_) => ElementKind::DataStructures,
            Self::Endpoint(_) => ElementKind::ApiEndpoints,
            Self::Step(_) => ElementKind::WorkflowSteps,
        }
    }

    /// Length of the compact JSON serialization.
    pub fn serialized_len(&self) -> serde_json::Result<usize> {
        serde_json::to_string(self).map(|s| s.len())
    }
}

// =============================================================================
// SpecDocument
// =============================================================================

/// A structured specification document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpecDocument {
    /// Document name; doubles as its identity in fragment ids.
    pub name: String,
    /// Document version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Free-text description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Business rules.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub business_rules: Vec<BusinessRule>,
    /// Data structures.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub data_structures: Vec<DataStructure>,
    /// API endpoints.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub api_endpoints: Vec<ApiEndpoint>,
    /// Workflow steps.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub workflow_steps: Vec<WorkflowStep>,
    /// Free-form document tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Free-form document metadata.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl SpecDocument {
    /// Create an empty document with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Number of elements of `kind`.
    pub fn element_count(&self, kind: ElementKind) -> usize {
        match kind {
            ElementKind::BusinessRules => self.business_rules.len(),
            ElementKind::DataStructures => self.data_structures.len(),
            ElementKind::ApiEndpoints => self.api_endpoints.len(),
            ElementKind::WorkflowSteps => self.workflow_steps.len(),
        }
    }

    /// Element counts for every kind, keyed by kind.
    pub fn element_counts(&self) -> BTreeMap<ElementKind, usize> {
        ElementKind::ALL
            .iter()
            .map(|kind| (*kind, self.element_count(*kind)))
            .collect()
    }

    /// Total number of elements across all kinds.
    pub fn total_elements(&self) -> usize {
        ElementKind::ALL.iter().map(|k| self.element_count(*k)).sum()
    }

    /// Whether the document has no elements at all.
    pub fn is_empty(&self) -> bool {
        self.total_elements() == 0
    }

    /// Elements of `kind` in document order.
    pub fn elements(&self, kind: ElementKind) -> Vec<ElementRef<'_>> {
        match kind {
            ElementKind::BusinessRules => self.business_rules.iter().map(ElementRef::Rule).collect(),
            ElementKind::DataStructures => {
                self.data_structures.iter().map(ElementRef::Structure).collect()
            }
            ElementKind::ApiEndpoints => self.api_endpoints.iter().map(ElementRef::Endpoint).collect(),
            ElementKind::WorkflowSteps => self.workflow_steps.iter().map(ElementRef::Step).collect(),
        }
    }

    /// Every element in document order (rules, structures, endpoints, steps).
    pub fn all_elements(&self) -> Vec<ElementRef<'_>> {
        ElementKind::ALL
            .iter()
            .flat_map(|kind| self.elements(*kind))
            .collect()
    }

    /// Ids of the elements of `kind` in document order.
    pub fn element_ids(&self, kind: ElementKind) -> Vec<&str> {
        self.elements(kind).iter().map(|e| e.id()).collect()
    }

    /// Ids of every element in document order.
    pub fn all_element_ids(&self) -> Vec<&str> {
        self.all_elements().iter().map(|e| e.id()).collect()
    }

    /// Look up an element by id.
    pub fn element(&self, id: &str) -> Option<ElementRef<'_>> {
        self.all_elements().into_iter().find(|e| e.id() == id)
    }

    /// Whether any element has this id.
    pub fn contains_id(&self, id: &str) -> bool {
        self.element(id).is_some()
    }

    /// Partial document holding only the elements whose id is in `ids`.
    ///
    /// Keeps the document name and version; document-level description, tags
    /// and metadata are left out. Within each kind, elements appear in the
    /// order of `ids`; unknown and repeated ids are skipped.
    #[must_use]
    pub fn restrict<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Self {
        let mut restricted = Self {
            name: self.name.clone(),
            version: self.version.clone(),
            ..Self::default()
        };
        let mut seen: HashSet<&str> = HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            match self.element(id) {
                Some(ElementRef::Rule(r)) => restricted.business_rules.push(r.clone()),
                Some(ElementRef::Structure(s)) => restricted.data_structures.push(s.clone()),
                Some(ElementRef::Endpoint(e)) => restricted.api_endpoints.push(e.clone()),
                Some(ElementRef::Step(s)) => restricted.workflow_steps.push(s.clone()),
                None => {}
            }
        }
        restricted
    }
}

// =============================================================================
// Tests
// =============================================================================
