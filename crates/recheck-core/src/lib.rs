pub mod analyzer;
pub mod cache;
pub mod changeset;
pub mod classify;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod types;

pub use analyzer::{
    CallKind, CallPhase, ConstraintAnalyzer, MultiUnitResult, SingleUnitResult, UnitOutcome,
};
pub use cache::AnalysisCache;
pub use changeset::{AnalysisInput, AnalysisRequestBatch, Expectation};
pub use config::Config;
pub use diagnostics::{Diagnostics, DiagnosticsBuilder};
pub use engine::{engine_fn, AnalysisEngine};
pub use error::{AnalyzeError, EngineError, ProtocolViolation};
pub use protocol::{Change, EngineRequest, Outcome};
pub use types::*;
