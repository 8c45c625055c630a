use serde_json::Value;

use crate::cache::AnalysisCache;
use crate::changeset::Expectation;
use crate::protocol::{EngineMessage, Outcome};
use crate::types::{Analysis, Diagnostic, Severity, Syntax, UnitId};

pub const ANALYSIS_FAILED: &str = "Analysis failed";
pub const INCORRECT_RESULT: &str = "Analysis returned incorrect result";
pub const MISSING_RESULT: &str = "Missing analysis result";

/// What happens to the syntax stored alongside an accepted analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxUpdate {
    Replace(Syntax),
    Retain,
    Clear,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheMutation {
    Store {
        analysis: Analysis,
        syntax: SyntaxUpdate,
    },
    Drop,
    Keep,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub mutation: CacheMutation,
    pub diagnostics: Vec<Diagnostic>,
}

impl Classification {
    fn failure(unit: &UnitId, mutation: CacheMutation, text: &str) -> Self {
        Self {
            mutation,
            diagnostics: vec![error(unit, text)],
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.mutation, CacheMutation::Store { .. })
    }
}

/// Decide what a unit's raw result means under `expectation`.
///
/// Pure: the decision is carried out by [`apply`]. Engine messages naming
/// another registered unit are attributed to that unit; everything else
/// lands on `unit`.
pub fn classify(
    unit: &UnitId,
    expectation: Expectation,
    result: Value,
    cache: &AnalysisCache,
) -> Classification {
    let outcome = Outcome::from_value(result);
    match (expectation, outcome) {
        (Expectation::Full, Some(Outcome::Full(syntax, analysis, errors, warnings, notes))) => {
            accepted(unit, analysis, SyntaxUpdate::Replace(syntax), [errors, warnings, notes], cache)
        }
        (Expectation::Project, Some(Outcome::Full(_, analysis, errors, warnings, notes))) => {
            accepted(unit, analysis, SyntaxUpdate::Clear, [errors, warnings, notes], cache)
        }
        (Expectation::Update, Some(Outcome::Update(analysis, errors, warnings, notes))) => {
            accepted(unit, analysis, SyntaxUpdate::Retain, [errors, warnings, notes], cache)
        }
        (_, Some(Outcome::Failed)) => {
            Classification::failure(unit, CacheMutation::Drop, ANALYSIS_FAILED)
        }
        _ => Classification::failure(unit, CacheMutation::Keep, INCORRECT_RESULT),
    }
}

fn accepted(
    unit: &UnitId,
    analysis: Analysis,
    syntax: SyntaxUpdate,
    [errors, warnings, notes]: [Vec<Value>; 3],
    cache: &AnalysisCache,
) -> Classification {
    let mut diagnostics = Vec::with_capacity(errors.len() + warnings.len() + notes.len());
    for (messages, severity) in [
        (errors, Severity::Error),
        (warnings, Severity::Warning),
        (notes, Severity::Info),
    ] {
        diagnostics.extend(
            messages
                .into_iter()
                .map(|message| to_diagnostic(unit, message, severity, cache)),
        );
    }
    Classification {
        mutation: CacheMutation::Store { analysis, syntax },
        diagnostics,
    }
}

fn to_diagnostic(
    unit: &UnitId,
    entry: Value,
    severity: Severity,
    cache: &AnalysisCache,
) -> Diagnostic {
    let message = EngineMessage::from_value(entry);
    let target = message
        .unit()
        .and_then(|identity| cache.resolve(identity))
        .unwrap_or(unit)
        .clone();
    let region = message.region();
    let text = match message {
        EngineMessage::Text(text) => text,
        EngineMessage::Detailed { message, .. } => message,
    };
    Diagnostic {
        unit: target,
        text,
        severity,
        region,
    }
}

/// Carry out a classification's cache mutation for `unit`.
pub fn apply(cache: &mut AnalysisCache, unit: &UnitId, mutation: CacheMutation) {
    match mutation {
        CacheMutation::Store { analysis, syntax } => match syntax {
            SyntaxUpdate::Replace(syntax) => cache.put_with_syntax(unit.clone(), analysis, syntax),
            SyntaxUpdate::Retain => cache.update_analysis(unit.clone(), analysis),
            SyntaxUpdate::Clear => cache.put(unit.clone(), analysis),
        },
        CacheMutation::Drop => {
            cache.remove(unit);
        }
        CacheMutation::Keep => {}
    }
}

/// Diagnostic for a freshly changed unit the engine said nothing about.
pub fn missing_result(unit: &UnitId) -> Diagnostic {
    error(unit, MISSING_RESULT)
}

fn error(unit: &UnitId, text: &str) -> Diagnostic {
    Diagnostic {
        unit: unit.clone(),
        text: text.to_string(),
        severity: Severity::Error,
        region: None,
    }
}
