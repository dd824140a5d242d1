//! # specweave-tokens
//!
//! Token budgeting primitives for the context pipeline.
//!
//! - [`ModelProfile`] / [`ModelRegistry`]: per-model token budget, chars-per-token
//!   ratio and preferred serialization density
//! - [`TokenEstimator`]: `ceil(serialized_len / ratio)`, never rounded down
//!
//! Estimates are a policy approximation, not a replica of any vendor tokenizer.

#![deny(unsafe_code)]

pub mod errors;
pub mod estimator;
pub mod profiles;

pub use errors::{Result, TokenError};
pub use estimator::{DEFAULT_CHARS_PER_TOKEN, TokenEstimator};
pub use profiles::{CompressionTechnique, DEFAULT_PROFILE_NAME, ModelProfile, ModelRegistry};
