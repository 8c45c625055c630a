use crate::analyzer::{CallKind, CallPhase};
use crate::types::UnitId;

/// The engine answered in a way that cannot be reconciled with the cache's
/// bookkeeping. Always a bug in the engine integration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("malformed engine response: {0}")]
    MalformedResponse(String),

    #[error("engine returned a result for unregistered unit '{identity}'")]
    UnknownUnit { identity: String },

    #[error("engine returned a result for unit '{unit}' that was not part of the request")]
    UnexpectedResult { unit: UnitId },
}

/// Failure of the engine round trip, before the caller's call context is attached.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine invocation failed: {0:#}")]
    Invocation(anyhow::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
}

/// Error returned by [`crate::ConstraintAnalyzer`] when a call aborts.
/// Per-unit problems never show up here; they become diagnostics.
///
/// The cache is left as the steps before the failure point left it:
/// removals and optimistic clears made while building the change set stay
/// applied.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("{call} failed: engine invocation failed: {cause:#}")]
    Invocation {
        call: CallKind,
        phase: CallPhase,
        cause: anyhow::Error,
    },

    #[error("{call} failed after {phase}: {violation}")]
    Protocol {
        call: CallKind,
        phase: CallPhase,
        #[source]
        violation: ProtocolViolation,
    },
}

impl AnalyzeError {
    pub(crate) fn from_engine(call: CallKind, phase: CallPhase, error: EngineError) -> Self {
        match error {
            EngineError::Invocation(cause) => AnalyzeError::Invocation { call, phase, cause },
            EngineError::Protocol(violation) => AnalyzeError::Protocol {
                call,
                phase,
                violation,
            },
        }
    }

    pub fn call(&self) -> &CallKind {
        match self {
            AnalyzeError::Invocation { call, .. } | AnalyzeError::Protocol { call, .. } => call,
        }
    }

    pub fn phase(&self) -> CallPhase {
        match self {
            AnalyzeError::Invocation { phase, .. } | AnalyzeError::Protocol { phase, .. } => *phase,
        }
    }

    pub fn violation(&self) -> Option<&ProtocolViolation> {
        match self {
            AnalyzeError::Invocation { .. } => None,
            AnalyzeError::Protocol { violation, .. } => Some(violation),
        }
    }
}
