#![cfg(unix)]

use std::collections::HashMap;
use std::fs;

use serde_json::{json, Value};

use recheck_core::protocol::{response, Outcome};
use recheck_core::{
    Analysis, AnalysisCache, AnalysisEngine, AnalyzeError, ConstraintAnalyzer, EngineRequest,
    Syntax, UnitId,
};
use recheck_process::ProcessEngine;

/// `sh -c <script>` engine.
fn script_engine(script: &str) -> ProcessEngine {
    ProcessEngine::new("sh").arg("-c").arg(script)
}

/// Engine that discards its input and prints `output`.
fn replying(output: &Value) -> ProcessEngine {
    script_engine(r#"cat > /dev/null; printf '%s' "$RECHECK_REPLY""#)
        .env("RECHECK_REPLY", output.to_string())
}

fn empty_request() -> EngineRequest {
    EngineRequest::AnalyzeSingle(Vec::new())
}

#[test]
fn test_engine_output_is_parsed() {
    let reply = response([("a.tig", Outcome::Failed)]);
    let mut engine = replying(&reply);

    let value = engine.invoke(&empty_request()).unwrap();
    assert_eq!(value, reply);
}

#[test]
fn test_engine_receives_strategy_and_request() {
    let dir = tempfile::tempdir().unwrap();
    let captured = dir.path().join("input.json");
    let mut engine = script_engine(r#"cat > "$RECHECK_CAPTURE"; printf '{"AnalysisResult": []}'"#)
        .env("RECHECK_CAPTURE", captured.display().to_string())
        .strategy("analyze-multi");

    engine.invoke(&empty_request()).unwrap();

    let input: Value = serde_json::from_str(&fs::read_to_string(&captured).unwrap()).unwrap();
    assert_eq!(
        input,
        json!({"strategy": "analyze-multi", "request": {"AnalyzeSingle": []}})
    );
}

#[test]
fn test_nonzero_exit_reports_status_and_stderr() {
    let mut engine = script_engine("cat > /dev/null; echo 'strategy table not found' >&2; exit 3");

    let err = engine.invoke(&empty_request()).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("exited with"), "{message}");
    assert!(message.contains("strategy table not found"), "{message}");
}

#[test]
fn test_empty_output_is_an_error() {
    let mut engine = script_engine("cat > /dev/null");

    let err = engine.invoke(&empty_request()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "engine strategy 'editor-analyze' produced no result"
    );
}

#[test]
fn test_non_json_output_is_an_error() {
    let mut engine = script_engine("cat > /dev/null; echo 'Stack trace:'");

    let err = engine.invoke(&empty_request()).unwrap_err();
    assert!(err.to_string().contains("not JSON"));
}

#[test]
fn test_engine_runs_in_current_dir() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("reply.json"), r#"{"AnalysisResult": []}"#).unwrap();
    let mut engine = script_engine("cat > /dev/null; cat reply.json").current_dir(dir.path());

    let value = engine.invoke(&empty_request()).unwrap();
    assert_eq!(value, json!({"AnalysisResult": []}));
}

#[test]
fn test_analyzer_with_process_engine() {
    let reply = response([(
        "a.tig",
        Outcome::Full(
            Syntax(json!(["Module", "a"])),
            Analysis(json!({"scope": ["x"]})),
            vec![],
            vec![json!("unused variable x")],
            vec![],
        ),
    )]);
    let mut analyzer = ConstraintAnalyzer::new(replying(&reply));
    let mut cache = AnalysisCache::new();

    let result = analyzer
        .analyze_single(
            UnitId::new("a.tig"),
            Syntax(json!(["Module", "a"])),
            &mut cache,
        )
        .unwrap();

    assert_eq!(
        cache.get(&UnitId::new("a.tig")),
        Some(&Analysis(json!({"scope": ["x"]})))
    );
    assert!(result.entry.is_some());
    assert_eq!(result.diagnostics.len(), 1);
    assert!(!result.diagnostics.contains_error());
}

#[test]
fn test_analyzer_surfaces_engine_crash() {
    let mut analyzer = ConstraintAnalyzer::new(script_engine("cat > /dev/null; exit 1"));
    let mut cache = AnalysisCache::new();
    cache.put(UnitId::new("gone.tig"), Analysis(json!(1)));

    let err = analyzer
        .analyze_multi(None, HashMap::new(), &mut cache)
        .unwrap_err();

    assert!(matches!(err, AnalyzeError::Invocation { .. }));
    assert!(err.to_string().contains("exited with"));
    assert!(!cache.is_registered(&UnitId::new("gone.tig")));
}
