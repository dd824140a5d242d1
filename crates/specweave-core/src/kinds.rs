//! Element kinds and the small policy enums shared by settings and the pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The four element kinds of a specification document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// Business rules (condition → action).
    BusinessRules,
    /// Data structures (named field lists).
    DataStructures,
    /// API endpoints (method + path).
    ApiEndpoints,
    /// Workflow steps (with declared dependencies).
    WorkflowSteps,
}

impl ElementKind {
    /// All kinds in the default priority order.
    pub const ALL: [Self; 4] = [
        Self::BusinessRules,
        Self::DataStructures,
        Self::ApiEndpoints,
        Self::WorkflowSteps,
    ];

    /// Wire label, also used as the fragment type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BusinessRules => "business_rules",
            Self::DataStructures => "data_structures",
            Self::ApiEndpoints => "api_endpoints",
            Self::WorkflowSteps => "workflow_steps",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "business_rules" | "businessRules" | "rules" => Ok(Self::BusinessRules),
            "data_structures" | "dataStructures" | "structures" => Ok(Self::DataStructures),
            "api_endpoints" | "apiEndpoints" | "endpoints" => Ok(Self::ApiEndpoints),
            "workflow_steps" | "workflowSteps" | "workflow" => Ok(Self::WorkflowSteps),
            other => Err(format!("unknown element kind: {other}")),
        }
    }
}

/// How an oversized ordered group is cut into fragments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryDetection {
    /// Cut where the fewest relationship edges cross the boundary.
    #[default]
    Semantic,
    /// Cut at fixed positions inside an already-grouped hierarchy or domain.
    Structural,
    /// Cut purely by element count.
    Size,
}

/// How aggressive the optimizer's compression pipeline is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    /// Only clearly-optional metadata is removed.
    Low,
    /// Per-element annotations are dropped as well.
    #[default]
    Medium,
    /// Low-priority rules are dropped and each kind is capped.
    High,
}

impl FromStr for CompressionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown compression level: {other}")),
        }
    }
}

/// Preferred serialization density of a target model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Density {
    /// Keep full descriptions.
    Verbose,
    /// Drop descriptions.
    Compact,
    /// Keep content, canonical key ordering.
    #[default]
    Structured,
}
