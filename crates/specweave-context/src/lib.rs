//! # specweave-context
//!
//! Relationship-preserving context management for specification documents.
//!
//! - **Relationships**: [`RelationshipGraph`] of typed, weighted edges between
//!   rules, structures, endpoints and workflow steps
//! - **Quality**: [`QualityAssessor`] scores fragment cohesion and picks split points
//! - **Chunking**: [`SemanticChunker`] splits documents into token-budgeted
//!   [`ContextFragment`]s, eagerly or through a lazy [`FragmentStream`]
//! - **Optimization**: [`ContextOptimizer`] fits contexts into model budgets
//!   with a staged compression pipeline
//! - **Management**: [`ContextManager`] creates, merges, chunks and analyzes
//!   contexts behind a per-instance LRU + TTL cache
//!
//! All operations are synchronous. A budget that cannot be met is reported as
//! a flag (`exceeds_budget`), never as an error.

#![deny(unsafe_code)]

pub mod cache;
pub mod chunker;
pub mod constants;
pub mod context;
pub mod errors;
pub mod manager;
pub mod optimizer;
pub mod quality;
pub mod relationships;
pub mod types;

pub use cache::{CacheStats, ContextCache};
pub use chunker::{
    FragmentStream, IssueKind, IssueSeverity, SemanticChunker, ValidationIssue, ValidationReport,
};
pub use context::{ContextAnalysis, ContextMetrics, OptimizationRecord, ProcessingContext};
pub use errors::{ContextError, Result};
pub use manager::{ContextManager, ContextOptions, MergeOptions};
pub use optimizer::{
    CompressionResult, ContextOptimizer, OptimizationMetrics, OptimizationOptions,
};
pub use quality::QualityAssessor;
pub use relationships::{EdgeKind, Relationship, RelationshipGraph};
pub use types::{
    ChunkingStrategy, ContextFragment, FragmentType, StrategyName, StreamingOptions,
};
