//! Services
//!
//! Business logic: bounded fan-out, chunking, response parsing, the
//! provider-backed operation set, retrieval and the coding pipeline.

pub mod analysis;
pub mod batch;
pub mod coding;
pub mod knowledge;
pub mod parsing;
pub mod retrieval;

pub use analysis::{Analyst, AnalysisBackend, BackendFactory, ProviderRegistry};
pub use batch::{map_bounded, map_bounded_infallible};
pub use coding::{CodedCorpus, CodingPipeline, PipelineReport, StageOutcome, StageStatus};
pub use retrieval::{CorpusIndex, RankingService};
