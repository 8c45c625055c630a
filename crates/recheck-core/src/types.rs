use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::fmt;

/// Unique identifier for a source unit. The wrapped string is the identity
/// the engine sees on the wire.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub String);

impl UnitId {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Identity of the form "qualifier:name".
    pub fn qualified(qualifier: &str, name: &str) -> Self {
        Self(format!("{qualifier}:{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for UnitId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UnitId {
    fn from(identity: &str) -> Self {
        Self::new(identity)
    }
}

/// Syntax tree of one unit, produced by the parser. Never inspected here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Syntax(pub Value);

impl Syntax {
    /// The empty tuple handed to the engine for a root seen for the first time.
    pub fn empty() -> Self {
        Self(Value::Array(Vec::new()))
    }
}

impl From<Value> for Syntax {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Analysis produced by the engine for one unit. Never inspected here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Analysis(pub Value);

impl From<Value> for Analysis {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Last accepted analysis of a unit, plus the syntax the engine returned
/// with it when the unit was analyzed in full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub analysis: Analysis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syntax: Option<Syntax>,
}

impl CacheEntry {
    pub fn new(analysis: Analysis) -> Self {
        Self {
            analysis,
            syntax: None,
        }
    }

    pub fn with_syntax(analysis: Analysis, syntax: Syntax) -> Self {
        Self {
            analysis,
            syntax: Some(syntax),
        }
    }
}

/// Byte span inside a unit, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub start: usize,
    pub end: usize,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            _ => Err(anyhow::anyhow!("unknown severity: {s}")),
        }
    }
}

/// A message about one unit, either reported by the engine or raised
/// while interpreting the engine's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub unit: UnitId,
    pub text: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.region {
            Some(region) => write!(f, "{}@{}: {}: {}", self.unit, region, self.severity, self.text),
            None => write!(f, "{}: {}: {}", self.unit, self.severity, self.text),
        }
    }
}
