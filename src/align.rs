//! Registration of the test surface onto the reference surface.
//!
//! The pipeline only needs a translation `(dx, dy, dz)`; how it is found is
//! behind the [`Aligner`] trait.
//!
//! | Implementation | Use |
//! |---|---|
//! | [`Align3dProcess`] | runs the external `align3d` tool |
//! | [`FixedAligner`] | constant offset; identity when no tool is configured |
//!
//! `align3d` writes its results next to the test DSM it was given, as
//! `<test stem>_offsets.txt`: a header line followed by whitespace-separated
//! numbers, the first three of which are the translation.

use crate::config::ExecutablesConfig;
use crate::types::RegistrationOffset;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;

/// Largest translation, in metres, `align3d` is allowed to search.
pub const MAX_TRANSLATION: f64 = 10.0;

#[derive(Error, Debug)]
pub enum AlignError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("align3d failed ({status}): {stderr}")]
    ProcessFailed { status: ExitStatus, stderr: String },
    #[error("Malformed offsets file {path}: {reason}")]
    MalformedOffsets { path: PathBuf, reason: String },
}

/// Computes the translation registering `test_dsm` onto `reference_dsm`.
pub trait Aligner {
    fn align(&self, reference_dsm: &Path, test_dsm: &Path)
    -> Result<RegistrationOffset, AlignError>;
}

/// Runs the `align3d` executable and reads back its offsets file.
#[derive(Debug, Clone)]
pub struct Align3dProcess {
    pub exec_path: PathBuf,
    pub max_translation: f64,
}

impl Align3dProcess {
    pub fn new(exec_path: impl Into<PathBuf>) -> Self {
        Self {
            exec_path: exec_path.into(),
            max_translation: MAX_TRANSLATION,
        }
    }
}

impl Aligner for Align3dProcess {
    fn align(
        &self,
        reference_dsm: &Path,
        test_dsm: &Path,
    ) -> Result<RegistrationOffset, AlignError> {
        tracing::info!(
            exec = %self.exec_path.display(),
            reference = %reference_dsm.display(),
            test = %test_dsm.display(),
            "running align3d"
        );
        let output = Command::new(&self.exec_path)
            .arg(reference_dsm)
            .arg(test_dsm)
            .arg(format!("maxt={:.1}", self.max_translation))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .output()?;
        if !output.status.success() {
            return Err(AlignError::ProcessFailed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let path = offsets_path(test_dsm);
        let text = fs::read_to_string(&path)?;
        let offset = parse_offsets(&text).map_err(|reason| AlignError::MalformedOffsets {
            path: path.clone(),
            reason,
        })?;
        tracing::debug!(path = %path.display(), ?offset, "read align3d offsets");
        Ok(offset)
    }
}

/// Where `align3d` writes the offsets for `test_dsm`.
pub fn offsets_path(test_dsm: &Path) -> PathBuf {
    let stem = test_dsm
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    test_dsm.with_file_name(format!("{stem}_offsets.txt"))
}

/// Parse an offsets file: the first line holding at least three numbers wins.
///
/// Header lines (anything that does not start with three numbers) are skipped.
pub fn parse_offsets(text: &str) -> Result<RegistrationOffset, String> {
    text.lines()
        .find_map(|line| {
            let numbers: Vec<f64> = line
                .split_whitespace()
                .map_while(|token| token.parse().ok())
                .take(3)
                .collect();
            match numbers[..] {
                [dx, dy, dz] => Some(RegistrationOffset::new(dx, dy, dz)),
                _ => None,
            }
        })
        .ok_or_else(|| "no line with three numeric offsets".to_string())
}

/// Returns a constant offset without looking at the rasters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FixedAligner {
    pub offset: RegistrationOffset,
}

impl FixedAligner {
    pub fn new(offset: RegistrationOffset) -> Self {
        Self { offset }
    }

    /// Zero translation. Used when no `align3d` executable is configured.
    pub fn identity() -> Self {
        Self::default()
    }
}

impl Aligner for FixedAligner {
    fn align(&self, _: &Path, _: &Path) -> Result<RegistrationOffset, AlignError> {
        Ok(self.offset)
    }
}

/// The `align3d` process for the configured executables, if one is set.
///
/// `None` means the caller falls back to [`FixedAligner::identity`].
pub fn from_config(executables: &ExecutablesConfig) -> Option<Align3dProcess> {
    executables.align3d.as_ref().map(Align3dProcess::new)
}
