//! # specweave-core
//!
//! Foundation types shared by every specweave crate.
//!
//! - **Document model**: [`SpecDocument`] with business rules, data structures,
//!   API endpoints and workflow steps. Produced by an upstream parser; read-only here.
//! - **Kinds & policies**: [`ElementKind`], [`BoundaryDetection`], [`CompressionLevel`],
//!   [`Density`]: small enums used by configuration and the context pipeline
//! - **Branded IDs**: [`ContextId`] and [`FragmentId`] newtypes
//! - **Logging**: `tracing` subscriber setup and in-memory log capture for tests

#![deny(unsafe_code)]

pub mod document;
pub mod ids;
pub mod kinds;
pub mod logging;

pub use document::{
    ApiEndpoint, BusinessRule, DataStructure, ElementRef, Field, HttpMethod, Priority,
    SpecDocument, WorkflowStep,
};
pub use ids::{ContextId, FragmentId};
pub use kinds::{BoundaryDetection, CompressionLevel, Density, ElementKind};
