use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::{Analysis, CacheEntry, Syntax, UnitId};

/// Last-known analysis of every unit in a workspace, plus the set of units
/// the engine has been told about.
///
/// Every unit with an entry is registered; a registered unit may lack an
/// entry when its analysis failed. Mutations are immediate and there is no
/// rollback, so a single cache must only ever serve one call at a time.
/// `Clone` is a cheap way to take a snapshot before a call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisCache {
    #[serde(default)]
    entries: HashMap<UnitId, CacheEntry>,
    #[serde(default)]
    registered: HashSet<UnitId>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            registered: HashSet::new(),
        }
    }

    /// Load a cache previously written by [`AnalysisCache::save`]. A missing
    /// file yields an empty cache.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read analysis cache '{}'", path.display()))?;
        let mut cache: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse analysis cache '{}'", path.display()))?;
        // Hand-edited files may list entries without registering them.
        let unregistered: Vec<UnitId> = cache
            .entries
            .keys()
            .filter(|id| !cache.registered.contains(*id))
            .cloned()
            .collect();
        cache.registered.extend(unregistered);
        Ok(cache)
    }

    /// Save the cache as JSON, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create '{}'", dir.display()))?;
        }
        let content =
            serde_json::to_string_pretty(self).context("failed to serialize analysis cache")?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write analysis cache '{}'", path.display()))?;
        Ok(())
    }

    pub fn get(&self, id: &UnitId) -> Option<&Analysis> {
        self.entries.get(id).map(|entry| &entry.analysis)
    }

    pub fn entry(&self, id: &UnitId) -> Option<&CacheEntry> {
        self.entries.get(id)
    }

    /// Store `analysis` for `id`, replacing any prior entry. Registers the unit.
    pub fn put(&mut self, id: UnitId, analysis: Analysis) {
        self.put_entry(id, CacheEntry::new(analysis));
    }

    /// Store `analysis` together with the syntax it was computed from.
    pub fn put_with_syntax(&mut self, id: UnitId, analysis: Analysis, syntax: Syntax) {
        self.put_entry(id, CacheEntry::with_syntax(analysis, syntax));
    }

    /// Replace the analysis of `id`, keeping whatever syntax is stored with it.
    pub fn update_analysis(&mut self, id: UnitId, analysis: Analysis) {
        let syntax = self.entries.remove(&id).and_then(|entry| entry.syntax);
        self.put_entry(id, CacheEntry { analysis, syntax });
    }

    fn put_entry(&mut self, id: UnitId, entry: CacheEntry) {
        self.registered.insert(id.clone());
        self.entries.insert(id, entry);
    }

    pub fn remove(&mut self, id: &UnitId) -> Option<CacheEntry> {
        self.entries.remove(id)
    }

    pub fn is_registered(&self, id: &UnitId) -> bool {
        self.registered.contains(id)
    }

    pub fn register(&mut self, id: UnitId) {
        self.registered.insert(id);
    }

    /// Forget a unit. Its entry, if any, goes with it.
    pub fn unregister(&mut self, id: &UnitId) {
        self.entries.remove(id);
        self.registered.remove(id);
    }

    /// Resolve an identity string received from the engine back to a
    /// registered unit.
    pub fn resolve(&self, identity: &str) -> Option<&UnitId> {
        self.registered.get(identity)
    }

    pub fn all_registered(&self) -> &HashSet<UnitId> {
        &self.registered
    }

    pub fn all_entries(&self) -> impl Iterator<Item = (&UnitId, &Analysis)> {
        self.entries.iter().map(|(id, entry)| (id, &entry.analysis))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.registered.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn analysis(v: i64) -> Analysis {
        Analysis(json!({ "scope": v }))
    }

    #[test]
    fn test_put_registers_and_overwrites() {
        let mut cache = AnalysisCache::new();
        let id = UnitId::new("a.tig");
        cache.put(id.clone(), analysis(1));
        assert!(cache.is_registered(&id));
        assert_eq!(cache.get(&id), Some(&analysis(1)));

        cache.put(id.clone(), analysis(2));
        assert_eq!(cache.get(&id), Some(&analysis(2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_then_get_is_empty() {
        let mut cache = AnalysisCache::new();
        let id = UnitId::new("a.tig");
        cache.put(id.clone(), analysis(1));
        assert!(cache.remove(&id).is_some());
        assert!(cache.get(&id).is_none());
        // Registration survives a plain remove.
        assert!(cache.is_registered(&id));
    }

    #[test]
    fn test_unregister_drops_entry() {
        let mut cache = AnalysisCache::new();
        let id = UnitId::new("a.tig");
        cache.put(id.clone(), analysis(1));
        cache.unregister(&id);
        assert!(!cache.is_registered(&id));
        assert!(cache.get(&id).is_none());
    }

    #[test]
    fn test_update_analysis_keeps_syntax() {
        let mut cache = AnalysisCache::new();
        let id = UnitId::new("a.tig");
        cache.put_with_syntax(id.clone(), analysis(1), Syntax(json!(["Mod"])));
        cache.update_analysis(id.clone(), analysis(2));

        let entry = cache.entry(&id).unwrap();
        assert_eq!(entry.analysis, analysis(2));
        assert_eq!(entry.syntax, Some(Syntax(json!(["Mod"]))));
    }

    #[test]
    fn test_put_clears_syntax() {
        let mut cache = AnalysisCache::new();
        let id = UnitId::new("a.tig");
        cache.put_with_syntax(id.clone(), analysis(1), Syntax(json!(["Mod"])));
        cache.put(id.clone(), analysis(2));
        assert!(cache.entry(&id).unwrap().syntax.is_none());
    }

    #[test]
    fn test_resolve_only_registered() {
        let mut cache = AnalysisCache::new();
        cache.register(UnitId::new("a.tig"));
        assert_eq!(cache.resolve("a.tig"), Some(&UnitId::new("a.tig")));
        assert!(cache.resolve("b.tig").is_none());
    }

    #[test]
    fn test_every_entry_is_registered() {
        let mut cache = AnalysisCache::new();
        cache.put(UnitId::new("a"), analysis(1));
        cache.update_analysis(UnitId::new("b"), analysis(2));
        cache.register(UnitId::new("c"));
        for (id, _) in cache.all_entries() {
            assert!(cache.is_registered(id), "{id} has an entry but is not registered");
        }
        assert_eq!(cache.all_registered().len(), 3);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".recheck").join("cache.json");
        let mut cache = AnalysisCache::new();
        cache.put_with_syntax(UnitId::new("a.tig"), analysis(1), Syntax(json!(["Mod"])));
        cache.register(UnitId::new("failed.tig"));

        cache.save(&path).unwrap();
        let loaded = AnalysisCache::load(&path).unwrap();
        assert_eq!(loaded, cache);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = AnalysisCache::load(&dir.path().join("nope.json")).unwrap();
        assert!(loaded.is_empty());
        assert!(loaded.all_registered().is_empty());
    }

    #[test]
    fn test_load_registers_orphan_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, r#"{"entries": {"a.tig": {"analysis": 1}}}"#).unwrap();
        let loaded = AnalysisCache::load(&path).unwrap();
        assert!(loaded.is_registered(&UnitId::new("a.tig")));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json").unwrap();
        let err = AnalysisCache::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse analysis cache"));
    }
}
