//! Coding Pipeline
//!
//! Stage orchestration, stage outcomes and the diagram reader.

pub mod diagram;
pub mod outcome;
pub mod pipeline;

pub use diagram::{DiagramEdge, DiagramError, DiagramNode, EdgeStrength, FlowchartDiagram};
pub use outcome::{
    NoticeKind, PipelineReport, StageNotice, StageOutcome, StageReport, StageStatus,
};
pub use pipeline::*;
