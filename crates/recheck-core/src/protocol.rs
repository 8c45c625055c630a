use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolViolation;
use crate::types::{Analysis, Region, Syntax, UnitId};

/// How a unit changed since the engine last saw it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change {
    Added(Syntax),
    Changed(Syntax, Analysis),
    Removed(Analysis),
    Cached(Analysis),
}

/// `(identity, change)` pair as it appears in a change list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry(pub UnitId, pub Change);

/// The single action handed to the engine per call.
///
/// Encoded the way serde encodes enums by default: the constructor name is
/// the single key of an object, its arguments the value.
///
/// ```json
/// {"AnalyzeMulti": [["root", {"Cached": {..}}], [["a.tig", {"Added": [..]}]]]}
/// ```
///
/// The engine answers `{"AnalysisResult": [["a.tig", {"Full": [..]}], ...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineRequest {
    AnalyzeSingle(Vec<ChangeEntry>),
    AnalyzeMulti(ChangeEntry, Vec<ChangeEntry>),
}

impl EngineRequest {
    pub fn root(&self) -> Option<&ChangeEntry> {
        match self {
            EngineRequest::AnalyzeSingle(_) => None,
            EngineRequest::AnalyzeMulti(root, _) => Some(root),
        }
    }

    pub fn changes(&self) -> &[ChangeEntry] {
        match self {
            EngineRequest::AnalyzeSingle(changes) => changes,
            EngineRequest::AnalyzeMulti(_, changes) => changes,
        }
    }

    /// Look up the change sent for `identity`, root included.
    pub fn change(&self, identity: &str) -> Option<&Change> {
        self.root()
            .into_iter()
            .chain(self.changes())
            .find(|entry| entry.0.as_str() == identity)
            .map(|entry| &entry.1)
    }
}

/// One entry of an outcome's error, warning or note list.
///
/// Entries are decoded leniently with [`EngineMessage::from_value`], so an
/// unrecognised entry never turns an outcome into a shape mismatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineMessage {
    Text(String),
    Detailed {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<Region>,
    },
}

impl EngineMessage {
    /// Accepts a bare string, a `{message, unit, region}` object or an
    /// `[origin, text]` pair. Anything else becomes its JSON text.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => EngineMessage::Text(text),
            Value::Array(mut pair) if pair.len() == 2 => {
                let text = pair.pop().unwrap_or(Value::Null);
                let origin = pair.pop().unwrap_or(Value::Null);
                EngineMessage::Detailed {
                    message: match text {
                        Value::String(text) => text,
                        other => other.to_string(),
                    },
                    unit: origin.as_str().map(str::to_string),
                    region: None,
                }
            }
            Value::Object(fields) => {
                let value = Value::Object(fields);
                match serde_json::from_value::<EngineMessage>(value.clone()) {
                    Ok(message @ EngineMessage::Detailed { .. }) => message,
                    _ => EngineMessage::Text(value.to_string()),
                }
            }
            other => EngineMessage::Text(other.to_string()),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            EngineMessage::Text(text) => text,
            EngineMessage::Detailed { message, .. } => message,
        }
    }

    pub fn unit(&self) -> Option<&str> {
        match self {
            EngineMessage::Text(_) => None,
            EngineMessage::Detailed { unit, .. } => unit.as_deref(),
        }
    }

    pub fn region(&self) -> Option<Region> {
        match self {
            EngineMessage::Text(_) => None,
            EngineMessage::Detailed { region, .. } => *region,
        }
    }
}

/// Per-unit verdict of the engine. Only the tag and the arity decide the
/// shape; message lists hold raw entries for [`EngineMessage::from_value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    Full(Syntax, Analysis, Vec<Value>, Vec<Value>, Vec<Value>),
    Update(Analysis, Vec<Value>, Vec<Value>, Vec<Value>),
    Failed,
}

impl Outcome {
    /// Decode an outcome; `None` when the value has none of the known shapes.
    pub fn from_value(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// `(identity, outcome)` pair in the engine's response. The outcome stays
/// raw so that a malformed one only affects its own unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry(pub String, pub Value);

/// Top-level envelope of the engine's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineResponse {
    AnalysisResult(Vec<ResultEntry>),
}

impl EngineResponse {
    pub fn from_value(value: Value) -> Result<Self, ProtocolViolation> {
        if value.is_null() {
            return Err(ProtocolViolation::MalformedResponse(
                "engine produced no result".to_string(),
            ));
        }
        let shown = abbreviate(&value);
        serde_json::from_value(value)
            .map_err(|e| ProtocolViolation::MalformedResponse(format!("{e}, got {shown}")))
    }

    pub fn into_entries(self) -> Vec<ResultEntry> {
        match self {
            EngineResponse::AnalysisResult(entries) => entries,
        }
    }
}

/// Build a well-formed response from typed outcomes.
pub fn response<I, S>(outcomes: I) -> Value
where
    I: IntoIterator<Item = (S, Outcome)>,
    S: Into<String>,
{
    let entries = outcomes
        .into_iter()
        .map(|(identity, outcome)| ResultEntry(identity.into(), outcome.to_value()))
        .collect();
    serde_json::to_value(EngineResponse::AnalysisResult(entries)).unwrap_or(Value::Null)
}

fn abbreviate(value: &Value) -> String {
    const LIMIT: usize = 200;
    let text = value.to_string();
    if text.len() <= LIMIT {
        return text;
    }
    let mut end = LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
