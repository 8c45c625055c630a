use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use recheck_core::config::EngineConfig;
use recheck_core::engine::AnalysisEngine;
use recheck_core::protocol::EngineRequest;

/// What the engine process reads from stdin.
#[derive(Debug, Serialize)]
struct Invocation<'a> {
    strategy: &'a str,
    request: &'a EngineRequest,
}

/// Analysis engine running as an external executable.
///
/// Each call spawns the command, writes `{"strategy": .., "request": ..}` to
/// its stdin and parses its stdout as the response.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    strategy: String,
    current_dir: Option<PathBuf>,
}

impl ProcessEngine {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            strategy: EngineConfig::default().strategy,
            current_dir: None,
        }
    }

    /// Build from the `[engine]` section of `.recheck.toml`.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let command = config
            .command
            .clone()
            .context("no engine command configured; set [engine] command in .recheck.toml")?;
        Ok(Self {
            command,
            args: config.args.clone(),
            env: config.env.clone(),
            strategy: config.strategy.clone(),
            current_dir: None,
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn strategy_name(&self) -> &str {
        &self.strategy
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        command
    }
}

impl AnalysisEngine for ProcessEngine {
    fn name(&self) -> &str {
        &self.command
    }

    fn invoke(&mut self, request: &EngineRequest) -> Result<Value> {
        let input = serde_json::to_vec(&Invocation {
            strategy: &self.strategy,
            request,
        })
        .context("failed to encode engine request")?;

        let mut child = self
            .command()
            .spawn()
            .with_context(|| format!("failed to start engine '{}'", self.command))?;
        debug!(
            command = %self.command,
            strategy = %self.strategy,
            bytes = input.len(),
            "engine started"
        );

        // stdin is fed from its own thread while stdout is drained here.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("engine stdin was not captured"))?;
        let writer = std::thread::spawn(move || stdin.write_all(&input));

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for engine '{}'", self.command))?;
        let written = writer
            .join()
            .map_err(|_| anyhow!("engine stdin writer panicked"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "engine '{}' exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            );
        }
        // An engine may stop reading once it has what it needs.
        if let Err(e) = written {
            debug!(error = %e, "engine closed stdin early");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            bail!("engine strategy '{}' produced no result", self.strategy);
        }
        debug!(bytes = output.stdout.len(), "engine finished");

        serde_json::from_str(stdout.trim()).with_context(|| {
            format!(
                "engine strategy '{}' wrote output that is not JSON",
                self.strategy
            )
        })
    }
}
