use std::collections::HashMap;
use std::fmt;

use tracing::{debug, error, warn};

use crate::cache::AnalysisCache;
use crate::changeset::{build_change_set, AnalysisInput, Expectation};
use crate::classify::{apply, classify, missing_result};
use crate::diagnostics::{Diagnostics, DiagnosticsBuilder};
use crate::engine::{invoke, AnalysisEngine};
use crate::error::{AnalyzeError, ProtocolViolation};
use crate::types::{CacheEntry, Diagnostic, Syntax, UnitId};

/// Which kind of call failed, for error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    Single { unit: UnitId },
    Multi { units: usize },
    Rooted { root: UnitId, units: usize },
}

impl CallKind {
    fn of(input: &AnalysisInput) -> Self {
        match &input.root {
            Some(root) => CallKind::Rooted {
                root: root.clone(),
                units: input.updated.len(),
            },
            None => {
                let mut units = input.updated.keys();
                match (units.next(), units.next()) {
                    (Some(unit), None) if input.removed.is_empty() => CallKind::Single {
                        unit: unit.clone(),
                    },
                    _ => CallKind::Multi {
                        units: input.updated.len(),
                    },
                }
            }
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKind::Single { unit } => write!(f, "analysis of '{unit}'"),
            CallKind::Multi { units } => write!(f, "analysis of {units} units"),
            CallKind::Rooted { root, units } => {
                write!(f, "rooted analysis of '{root}' with {units} updated units")
            }
        }
    }
}

/// Progress of one call. A fatal error stops the call at the phase it reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CallPhase {
    Idle,
    ChangeSetBuilt,
    EngineInvoked,
    ResultsClassified,
    Done,
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallPhase::Idle => write!(f, "idle"),
            CallPhase::ChangeSetBuilt => write!(f, "building the change set"),
            CallPhase::EngineInvoked => write!(f, "invoking the engine"),
            CallPhase::ResultsClassified => write!(f, "classifying results"),
            CallPhase::Done => write!(f, "done"),
        }
    }
}

/// Result of [`ConstraintAnalyzer::analyze_single`].
#[derive(Debug, Clone, PartialEq)]
pub struct SingleUnitResult {
    /// Cache entry of the unit after the call, `None` when analysis failed.
    pub entry: Option<CacheEntry>,
    /// Every diagnostic raised by the call.
    pub diagnostics: Diagnostics,
}

/// Result of [`ConstraintAnalyzer::analyze_multi`].
#[derive(Debug, Clone, PartialEq)]
pub struct MultiUnitResult {
    /// One slot per unit of the input map; empty when nothing is cached for it.
    pub results: HashMap<UnitId, Option<CacheEntry>>,
    pub diagnostics: Diagnostics,
}

/// Cache entry and diagnostics of a single unit after a call.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitOutcome {
    pub unit: UnitId,
    pub entry: Option<CacheEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

impl MultiUnitResult {
    pub fn entry(&self, unit: &UnitId) -> Option<&CacheEntry> {
        self.results.get(unit).and_then(Option::as_ref)
    }

    pub fn outcome(&self, unit: &UnitId) -> UnitOutcome {
        UnitOutcome {
            unit: unit.clone(),
            entry: self.entry(unit).cloned(),
            diagnostics: self.diagnostics.for_unit(unit).to_vec(),
        }
    }
}

/// Runs incremental analysis calls against one engine.
///
/// The cache is passed into every call and mutated in place. Calls against
/// the same cache must not overlap.
pub struct ConstraintAnalyzer<E> {
    engine: E,
}

impl<E: AnalysisEngine> ConstraintAnalyzer<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    /// Analyze one unit on its own. Every other registered unit is treated
    /// as removed from the workspace.
    pub fn analyze_single(
        &mut self,
        unit: UnitId,
        syntax: Syntax,
        cache: &mut AnalysisCache,
    ) -> Result<SingleUnitResult, AnalyzeError> {
        let mut result = self.analyze(AnalysisInput::single(unit.clone(), syntax), cache)?;
        Ok(SingleUnitResult {
            entry: result.results.remove(&unit).flatten(),
            diagnostics: result.diagnostics,
        })
    }

    /// Analyze a batch of updated units, optionally under a root.
    pub fn analyze_multi(
        &mut self,
        root: Option<UnitId>,
        updated: HashMap<UnitId, Syntax>,
        cache: &mut AnalysisCache,
    ) -> Result<MultiUnitResult, AnalyzeError> {
        let input = AnalysisInput {
            root,
            updated,
            ..AnalysisInput::default()
        };
        self.analyze(input, cache)
    }

    /// Run the full pipeline: build the change set, invoke the engine once,
    /// classify its results into the cache.
    pub fn analyze(
        &mut self,
        input: AnalysisInput,
        cache: &mut AnalysisCache,
    ) -> Result<MultiUnitResult, AnalyzeError> {
        let call = CallKind::of(&input);
        let requested: Vec<UnitId> = input.updated.keys().cloned().collect();

        let batch = build_change_set(cache, input);
        let mut phase = CallPhase::ChangeSetBuilt;
        debug!(
            %call,
            engine = self.engine.name(),
            changes = batch.changes.len(),
            expected = batch.len(),
            "change set built"
        );
        if batch.is_empty() {
            debug!(%call, "no results expected, engine only learns about removals");
        }

        let (request, expectations) = batch.into_request();
        let mut results = invoke(&mut self.engine, &request, cache).map_err(|e| {
            error!(%call, error = %e, "engine round trip failed");
            AnalyzeError::from_engine(call.clone(), phase, e)
        })?;
        phase = CallPhase::EngineInvoked;

        if let Some(unit) = results.keys().find(|unit| !expectations.contains_key(*unit)) {
            let violation = ProtocolViolation::UnexpectedResult { unit: unit.clone() };
            error!(%call, %violation, "engine answered for a unit it was not asked about");
            return Err(AnalyzeError::Protocol {
                call,
                phase,
                violation,
            });
        }

        let mut diagnostics = DiagnosticsBuilder::new();
        for (unit, &expectation) in &expectations {
            match results.remove(unit) {
                Some(result) => {
                    let classification = classify(unit, expectation, result, cache);
                    if !classification.is_accepted() {
                        warn!(unit = %unit, %expectation, "analysis result rejected");
                    }
                    apply(cache, unit, classification.mutation);
                    diagnostics.extend(classification.diagnostics);
                }
                None if expectation == Expectation::Full => {
                    warn!(unit = %unit, "engine returned no result for changed unit");
                    diagnostics.push(missing_result(unit));
                }
                None => {}
            }
        }
        phase = CallPhase::ResultsClassified;
        debug!(%call, %phase, "results classified");

        let results = requested
            .into_iter()
            .map(|unit| {
                let entry = cache.entry(&unit).cloned();
                (unit, entry)
            })
            .collect();
        let diagnostics = diagnostics.build();
        phase = CallPhase::Done;
        debug!(%call, %phase, diagnostics = diagnostics.len(), "analysis finished");
        Ok(MultiUnitResult {
            results,
            diagnostics,
        })
    }
}
