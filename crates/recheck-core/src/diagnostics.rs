use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::{Diagnostic, Severity, UnitId};

/// Collects diagnostics for one call.
#[derive(Debug, Default)]
pub struct DiagnosticsBuilder {
    by_unit: BTreeMap<UnitId, Vec<Diagnostic>>,
}

impl DiagnosticsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.by_unit
            .entry(diagnostic.unit.clone())
            .or_default()
            .push(diagnostic);
    }

    pub fn build(self) -> Diagnostics {
        Diagnostics {
            by_unit: self.by_unit,
        }
    }
}

impl Extend<Diagnostic> for DiagnosticsBuilder {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        for diagnostic in iter {
            self.push(diagnostic);
        }
    }
}

/// Diagnostics of one call, keyed by the unit they are about.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    by_unit: BTreeMap<UnitId, Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn is_empty(&self) -> bool {
        self.by_unit.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_unit.values().map(Vec::len).sum()
    }

    pub fn contains_error(&self) -> bool {
        self.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.iter().filter(|d| d.severity == severity).count()
    }

    pub fn for_unit(&self, unit: &UnitId) -> &[Diagnostic] {
        self.by_unit.get(unit).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn units(&self) -> impl Iterator<Item = &UnitId> {
        self.by_unit.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.by_unit.values().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Region;

    fn diagnostic(
        unit: &UnitId,
        text: &str,
        severity: Severity,
        region: Option<Region>,
    ) -> Diagnostic {
        Diagnostic {
            unit: unit.clone(),
            text: text.to_string(),
            severity,
            region,
        }
    }

    #[test]
    fn test_builder_keys_by_unit() {
        let a = UnitId::new("a.tig");
        let b = UnitId::new("b.tig");
        let mut builder = DiagnosticsBuilder::new();
        builder.push(diagnostic(&b, "unused", Severity::Warning, None));
        builder.extend([
            diagnostic(&a, "type mismatch", Severity::Error, None),
            diagnostic(&a, "shadowed", Severity::Info, Some(Region { start: 0, end: 3 })),
        ]);
        let diagnostics = builder.build();

        assert_eq!(diagnostics.len(), 3);
        assert!(diagnostics.contains_error());
        assert_eq!(diagnostics.count(Severity::Warning), 1);
        assert_eq!(diagnostics.for_unit(&a).len(), 2);
        assert_eq!(diagnostics.for_unit(&a)[1].region, Some(Region { start: 0, end: 3 }));
        assert!(diagnostics.for_unit(&UnitId::new("c.tig")).is_empty());

        let units: Vec<_> = diagnostics.units().map(UnitId::as_str).collect();
        assert_eq!(units, vec!["a.tig", "b.tig"]);
    }

    #[test]
    fn test_empty() {
        let diagnostics = DiagnosticsBuilder::new().build();
        assert!(diagnostics.is_empty());
        assert!(!diagnostics.contains_error());
        assert_eq!(diagnostics.len(), 0);
    }
}
