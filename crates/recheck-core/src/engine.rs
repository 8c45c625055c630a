use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::Value;

use crate::cache::AnalysisCache;
use crate::error::{EngineError, ProtocolViolation};
use crate::protocol::{EngineRequest, EngineResponse};
use crate::types::UnitId;

/// The external analysis engine, invoked exactly once per analysis call.
pub trait AnalysisEngine {
    /// Short name used in logs (e.g., the strategy or executable name).
    fn name(&self) -> &str {
        "engine"
    }

    /// Run the engine on `request` and return its raw response.
    fn invoke(&mut self, request: &EngineRequest) -> Result<Value>;
}

impl<F> AnalysisEngine for F
where
    F: FnMut(&EngineRequest) -> Result<Value>,
{
    fn invoke(&mut self, request: &EngineRequest) -> Result<Value> {
        self(request)
    }
}

/// Pin a closure to the engine signature so its argument type is inferred.
pub fn engine_fn<F>(f: F) -> F
where
    F: FnMut(&EngineRequest) -> Result<Value>,
{
    f
}

/// Invoke `engine` and resolve every result back to a registered unit.
///
/// Later entries for the same unit replace earlier ones.
pub fn invoke<E>(
    engine: &mut E,
    request: &EngineRequest,
    cache: &AnalysisCache,
) -> Result<BTreeMap<UnitId, Value>, EngineError>
where
    E: AnalysisEngine + ?Sized,
{
    let raw = engine.invoke(request).map_err(EngineError::Invocation)?;
    let response = EngineResponse::from_value(raw)?;

    let mut results = BTreeMap::new();
    for entry in response.into_entries() {
        let unit = cache
            .resolve(&entry.0)
            .cloned()
            .ok_or(ProtocolViolation::UnknownUnit { identity: entry.0 })?;
        results.insert(unit, entry.1);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{response, Outcome};
    use serde_json::json;

    fn request() -> EngineRequest {
        EngineRequest::AnalyzeSingle(Vec::new())
    }

    #[test]
    fn test_resolves_registered_units() {
        let mut cache = AnalysisCache::new();
        cache.register(UnitId::new("a.tig"));
        let mut engine = engine_fn(|_| Ok(response([("a.tig", Outcome::Failed)])));

        let results = invoke(&mut engine, &request(), &cache).unwrap();
        assert_eq!(results.get(&UnitId::new("a.tig")), Some(&json!("Failed")));
    }

    #[test]
    fn test_unregistered_identity_is_fatal() {
        let cache = AnalysisCache::new();
        let mut engine = engine_fn(|_| Ok(response([("ghost.tig", Outcome::Failed)])));

        let err = invoke(&mut engine, &request(), &cache).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Protocol(ProtocolViolation::UnknownUnit { ref identity }) if identity == "ghost.tig"
        ));
    }

    #[test]
    fn test_invocation_error_is_fatal() {
        let cache = AnalysisCache::new();
        let mut engine = engine_fn(|_| Err(anyhow::anyhow!("strategy crashed")));

        let err = invoke(&mut engine, &request(), &cache).unwrap_err();
        assert!(matches!(err, EngineError::Invocation(_)));
        assert!(err.to_string().contains("strategy crashed"));
    }

    #[test]
    fn test_duplicate_results_last_wins() {
        let mut cache = AnalysisCache::new();
        cache.register(UnitId::new("a.tig"));
        let mut engine = engine_fn(|_| {
            Ok(json!({"AnalysisResult": [["a.tig", "Failed"], ["a.tig", {"Update": [1, [], [], []]}]]}))
        });

        let results = invoke(&mut engine, &request(), &cache).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results.get(&UnitId::new("a.tig")),
            Some(&json!({"Update": [1, [], [], []]}))
        );
    }

    #[test]
    fn test_engine_sees_request() {
        let cache = AnalysisCache::new();
        let mut seen = None;
        let mut engine = engine_fn(|req| {
            seen = Some(req.clone());
            Ok(response(Vec::<(String, Outcome)>::new()))
        });
        invoke(&mut engine, &request(), &cache).unwrap();
        drop(engine);
        assert_eq!(seen, Some(request()));
    }
}
