//! Process-backed metric engines.
//!
//! [`ProcessEngines`] runs one external executable per engine call:
//!
//! ```text
//! <exec> threshold-geometry  < request.json  > result.json
//! ```
//!
//! The request is the engine's input struct as JSON on stdin; the engine
//! answers with a single JSON document on stdout. A non-zero exit fails the
//! run with the engine's stderr as the message.
//!
//! Leading arguments can be placed before the engine name, for engines
//! packaged as interpreter modules (`python -m core3dmetrics.engine`).

use crate::config::ExecutablesConfig;
use crate::metrics::{
    EngineError, EngineKind, MaterialInput, MetricEngines, RelativeAccuracyInput,
    TerrainAccuracyInput, ThresholdGeometryInput,
};
use serde::Serialize;
use serde_json::Value;
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::process::{ChildStdin, Command, Stdio};
use std::thread;

/// Engine executable looked up on `PATH` when `REGEXEPATH.MetricsPath` is unset.
pub const DEFAULT_ENGINE: &str = "core3dmetrics-engine";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEngines {
    pub program: PathBuf,
    pub leading_args: Vec<String>,
}

impl ProcessEngines {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Resolve the engine executable once, at start-up.
    pub fn resolve(executables: &ExecutablesConfig) -> Self {
        let program = executables
            .metrics
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ENGINE));
        tracing::debug!(program = %program.display(), "resolved metrics engine");
        Self::new(program)
    }

    fn invoke<T: Serialize>(&self, kind: EngineKind, request: &T) -> Result<Value, EngineError> {
        let payload = serde_json::to_vec(request)?;
        tracing::debug!(engine = kind.name(), bytes = payload.len(), "invoking engine process");

        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .arg(kind.name())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // The request is written on its own thread while stdout and stderr are
        // drained here, so an engine that logs before reading stdin cannot
        // fill a pipe and stall both processes.
        let stdin = child.stdin.take();
        let output = thread::scope(|scope| -> io::Result<_> {
            let writer =
                stdin.map(|stdin| scope.spawn(|| write_request(stdin, &payload, kind.name())));
            let output = child.wait_with_output();
            if let Some(writer) = writer {
                writer
                    .join()
                    .map_err(|_| io::Error::other("engine request writer panicked"))??;
            }
            output
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Failed {
                engine: kind.name(),
                message: format!("{} ({})", stderr.trim(), output.status),
            });
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// Write the whole request, then close stdin. An engine that exits without
/// reading its request is judged by its exit status.
fn write_request(mut stdin: ChildStdin, payload: &[u8], engine: &str) -> io::Result<()> {
    match stdin.write_all(payload).and_then(|()| stdin.flush()) {
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            tracing::debug!(engine, "engine closed stdin early");
            Ok(())
        }
        other => other,
    }
}

impl MetricEngines for ProcessEngines {
    fn threshold_geometry(&self, input: &ThresholdGeometryInput<'_>) -> Result<Value, EngineError> {
        self.invoke(EngineKind::ThresholdGeometry, input)
    }

    fn terrain_accuracy(&self, input: &TerrainAccuracyInput<'_>) -> Result<Value, EngineError> {
        self.invoke(EngineKind::TerrainAccuracy, input)
    }

    fn relative_accuracy(&self, input: &RelativeAccuracyInput<'_>) -> Result<Value, EngineError> {
        self.invoke(EngineKind::RelativeAccuracy, input)
    }

    fn material(&self, input: &MaterialInput<'_>) -> Result<Value, EngineError> {
        self.invoke(EngineKind::Material, input)
    }
}
