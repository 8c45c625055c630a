use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::cache::AnalysisCache;
use crate::protocol::{Change, ChangeEntry, EngineRequest};
use crate::types::{Syntax, UnitId};

/// Result shape a unit must come back with in the current call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expectation {
    /// Freshly analyzed unit: syntax and analysis come back.
    Full,
    /// Unit sent as cached context: only analysis comes back.
    Update,
    /// Root seen for the first time: full shape, but only analysis is kept.
    Project,
}

impl std::fmt::Display for Expectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expectation::Full => write!(f, "full"),
            Expectation::Update => write!(f, "update"),
            Expectation::Project => write!(f, "project"),
        }
    }
}

/// Everything the engine is told in one call, and what each unit is
/// expected to come back as.
///
/// `expectations` has one key per unit in `changes` that is not removed,
/// plus the root. Removed units have nothing to come back with.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequestBatch {
    pub root: Option<ChangeEntry>,
    pub changes: BTreeMap<UnitId, Change>,
    pub expectations: BTreeMap<UnitId, Expectation>,
}

impl AnalysisRequestBatch {
    pub fn root_id(&self) -> Option<&UnitId> {
        self.root.as_ref().map(|entry| &entry.0)
    }

    /// Change sent for `unit`, root included.
    pub fn change(&self, unit: &UnitId) -> Option<&Change> {
        match &self.root {
            Some(ChangeEntry(id, change)) if id == unit => Some(change),
            _ => self.changes.get(unit),
        }
    }

    pub fn expectation(&self, unit: &UnitId) -> Option<Expectation> {
        self.expectations.get(unit).copied()
    }

    /// Number of units a result is expected for, root included.
    pub fn len(&self) -> usize {
        self.expectations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expectations.is_empty()
    }

    /// Split into the wire request and the expectations kept for classification.
    pub fn into_request(self) -> (EngineRequest, BTreeMap<UnitId, Expectation>) {
        let changes: Vec<ChangeEntry> = self
            .changes
            .into_iter()
            .map(|(unit, change)| ChangeEntry(unit, change))
            .collect();
        let request = match self.root {
            Some(root) => EngineRequest::AnalyzeMulti(root, changes),
            None => EngineRequest::AnalyzeSingle(changes),
        };
        (request, self.expectations)
    }
}

/// Units handed to one analysis call.
///
/// Without a root, every registered unit missing from `updated` is taken to
/// be gone from the workspace. With a root, units missing from `updated` are
/// unchanged context, and only the units listed in `removed` are gone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisInput {
    pub root: Option<UnitId>,
    pub updated: HashMap<UnitId, Syntax>,
    pub removed: BTreeSet<UnitId>,
}

impl AnalysisInput {
    pub fn single(unit: UnitId, syntax: Syntax) -> Self {
        Self {
            updated: HashMap::from([(unit, syntax)]),
            ..Self::default()
        }
    }

    pub fn multi(updated: HashMap<UnitId, Syntax>) -> Self {
        Self {
            updated,
            ..Self::default()
        }
    }

    pub fn rooted(root: UnitId, updated: HashMap<UnitId, Syntax>) -> Self {
        Self {
            root: Some(root),
            updated,
            removed: BTreeSet::new(),
        }
    }

    /// Declare units as gone from the workspace.
    pub fn with_removed(mut self, removed: impl IntoIterator<Item = UnitId>) -> Self {
        self.removed.extend(removed);
        self
    }
}

/// Work out what the engine must be told, and commit the bookkeeping that
/// goes with it.
///
/// Removed units lose their entry and registration right here, whatever the
/// engine later says. Updated units (and a cached root) have their entry
/// cleared so that only an accepted result puts one back.
pub fn build_change_set(cache: &mut AnalysisCache, input: AnalysisInput) -> AnalysisRequestBatch {
    let AnalysisInput {
        root,
        updated,
        mut removed,
    } = input;

    if root.is_none() {
        removed.extend(cache.all_registered().iter().cloned());
    }
    removed.retain(|id| !updated.contains_key(id) && Some(id) != root.as_ref());

    let mut changes = BTreeMap::new();
    let mut expectations = BTreeMap::new();

    let root_entry = root.as_ref().map(|root| {
        cache.register(root.clone());
        let (change, expectation) = match cache.remove(root) {
            Some(cached) => (Change::Cached(cached.analysis), Expectation::Update),
            None => (Change::Added(Syntax::empty()), Expectation::Project),
        };
        expectations.insert(root.clone(), expectation);
        ChangeEntry(root.clone(), change)
    });

    for id in removed {
        if let Some(cached) = cache.remove(&id) {
            cache.unregister(&id);
            changes.insert(id, Change::Removed(cached.analysis));
        }
    }

    let mut updated: Vec<(UnitId, Syntax)> = updated.into_iter().collect();
    updated.sort_by(|a, b| a.0.cmp(&b.0));
    for (id, syntax) in updated {
        if Some(&id) == root.as_ref() {
            debug!(unit = %id, "updated unit is the root, analyzing it as root only");
            continue;
        }
        cache.register(id.clone());
        let change = match cache.remove(&id) {
            Some(cached) => Change::Changed(syntax, cached.analysis),
            None => Change::Added(syntax),
        };
        expectations.insert(id.clone(), Expectation::Full);
        changes.insert(id, change);
    }

    if root.is_some() {
        let context: Vec<(UnitId, Change)> = cache
            .all_entries()
            .filter(|(id, _)| !changes.contains_key(*id))
            .map(|(id, analysis)| (id.clone(), Change::Cached(analysis.clone())))
            .collect();
        debug!(count = context.len(), "sending cached context units");
        for (id, change) in context {
            expectations.insert(id.clone(), Expectation::Update);
            changes.insert(id, change);
        }
    }

    AnalysisRequestBatch {
        root: root_entry,
        changes,
        expectations,
    }
}
