//! License plate recognition core: pattern catalog, scoring, validation,
//! candidate extraction, and the per-session decision pipeline.

pub mod catalog;
pub mod extractor;
pub mod memory;
pub mod pipeline;
pub mod scorer;
pub mod validator;

pub use extractor::{extract, Candidate, Extraction};
pub use memory::{DetectionMemory, MAX_RECENT};
pub use pipeline::{PipelineConfig, PipelineState, PlateOutcome, PlatePipeline, RegionSource};
pub use scorer::{ConfidenceScorer, ScorerConfig, NEUTRAL_CONFIDENCE};
pub use validator::PlateValidator;
