//! Core request/result types.

pub mod request;
pub mod result;

pub use request::{
    GenerationParams, GenerationRequest, Prompt, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE,
};
pub use result::{AttemptFailure, GenerationResult, ResultSource, PROVIDER_CACHE, PROVIDER_NONE};
