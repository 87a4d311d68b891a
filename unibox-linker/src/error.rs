// Merge errors
// Every variant names the pipeline phase it came from; unit-level errors
// also name the unit.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use unibox_diagnostics::{error_codes, Diagnostic, Span};
use unibox_parser::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Load,
    Detect,
    Plan,
    Reconcile,
    Synthesize,
    Verify,
    Write,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Phase::Load => "load",
            Phase::Detect => "detect",
            Phase::Plan => "plan",
            Phase::Reconcile => "reconcile",
            Phase::Synthesize => "synthesize",
            Phase::Verify => "verify",
            Phase::Write => "write",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("{phase}: unit `{unit}`: {source}")]
    Parse {
        phase: Phase,
        unit: String,
        #[source]
        source: ParseError,
    },

    #[error("{phase}: unit `{unit}`: {message}{}", more_suffix(.diagnostics.len()))]
    ContractViolation {
        phase: Phase,
        unit: String,
        message: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("{phase}: internal invariant violated: {message}")]
    InternalInvariant { phase: Phase, message: String },

    #[error("{phase}: unit name `{name}` is given to more than one unit")]
    DuplicateUnit { phase: Phase, name: String },

    #[error("{phase}: invalid unit name `{name}` (use letters, digits, `_`, `.` or `-`)")]
    InvalidUnitName { phase: Phase, name: String },

    #[error("{phase}: unit `{unit}` has no .ub files in {}", .dir.display())]
    EmptyUnit {
        phase: Phase,
        unit: String,
        dir: PathBuf,
    },

    #[error("{phase}: output directory {} is not empty", .path.display())]
    OutputNotEmpty { phase: Phase, path: PathBuf },

    #[error("{phase}: {}: {source}", .path.display())]
    Io {
        phase: Phase,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{phase}: dependency index {}: {message}", .path.display())]
    DependencyIndex {
        phase: Phase,
        path: PathBuf,
        message: String,
    },
}

fn more_suffix(count: usize) -> String {
    if count > 1 {
        format!(" (and {} more)", count - 1)
    } else {
        String::new()
    }
}

pub type MergeResult<T> = Result<T, MergeError>;

impl MergeError {
    pub fn phase(&self) -> Phase {
        match self {
            MergeError::Parse { phase, .. }
            | MergeError::ContractViolation { phase, .. }
            | MergeError::InternalInvariant { phase, .. }
            | MergeError::DuplicateUnit { phase, .. }
            | MergeError::InvalidUnitName { phase, .. }
            | MergeError::EmptyUnit { phase, .. }
            | MergeError::OutputNotEmpty { phase, .. }
            | MergeError::Io { phase, .. }
            | MergeError::DependencyIndex { phase, .. } => *phase,
        }
    }

    /// Unit the error is attributed to, if any
    pub fn unit(&self) -> Option<&str> {
        match self {
            MergeError::Parse { unit, .. }
            | MergeError::ContractViolation { unit, .. }
            | MergeError::EmptyUnit { unit, .. } => Some(unit),
            MergeError::DuplicateUnit { name, .. } | MergeError::InvalidUnitName { name, .. } => {
                Some(name)
            }
            _ => None,
        }
    }

    pub(crate) fn internal(phase: Phase, message: impl Into<String>) -> Self {
        MergeError::InternalInvariant {
            phase,
            message: message.into(),
        }
    }

    pub(crate) fn io(phase: Phase, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MergeError::Io {
            phase,
            path: path.into(),
            source,
        }
    }

    /// Builds a contract violation from collected diagnostics; `None` when empty
    pub(crate) fn from_diagnostics(unit: &str, diagnostics: Vec<Diagnostic>) -> Option<Self> {
        let message = diagnostics.first()?.message.clone();
        Some(MergeError::ContractViolation {
            phase: Phase::Load,
            unit: unit.to_string(),
            message,
            diagnostics,
        })
    }

    /// Primary diagnostic for this error
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            MergeError::Parse { unit, source, .. } => {
                let loc = source.location();
                let code = match source {
                    ParseError::SyntaxError { .. } => error_codes::SYNTAX_ERROR,
                    ParseError::LexerError { .. } => error_codes::INVALID_TOKEN,
                };
                Diagnostic::error(
                    code,
                    source.message(),
                    Span::new(loc.file.clone(), loc.line, loc.column, loc.length.max(1)),
                )
                .with_note(format!("while loading unit `{}`", unit))
            }
            MergeError::ContractViolation {
                diagnostics,
                message,
                ..
            } => diagnostics.first().cloned().unwrap_or_else(|| {
                Diagnostic::error(
                    error_codes::MISSING_ENTRY,
                    message.clone(),
                    Span::unknown(),
                )
            }),
            MergeError::InternalInvariant { message, phase } => Diagnostic::error(
                error_codes::INTERNAL_INVARIANT,
                format!("internal invariant violated during {}: {}", phase, message),
                Span::unknown(),
            )
            .with_note("this is a bug in the merger, not in the units".to_string()),
            MergeError::DuplicateUnit { name, .. } => Diagnostic::error(
                error_codes::DUPLICATE_UNIT,
                self.to_string(),
                Span::new(name.clone(), 0, 0, 0),
            ),
            MergeError::InvalidUnitName { name, .. } => Diagnostic::error(
                error_codes::INVALID_UNIT_NAME,
                self.to_string(),
                Span::new(name.clone(), 0, 0, 0),
            ),
            MergeError::EmptyUnit { dir, .. } => Diagnostic::error(
                error_codes::EMPTY_UNIT,
                self.to_string(),
                Span::from_path(dir),
            ),
            MergeError::OutputNotEmpty { path, .. } => Diagnostic::error(
                error_codes::OUTPUT_NOT_EMPTY,
                self.to_string(),
                Span::from_path(path),
            ),
            MergeError::Io { path, .. } => {
                Diagnostic::error(error_codes::IO_ERROR, self.to_string(), Span::from_path(path))
            }
            MergeError::DependencyIndex { path, .. } => Diagnostic::error(
                error_codes::DEPENDENCY_INDEX,
                self.to_string(),
                Span::from_path(path),
            ),
        }
    }

    /// All diagnostics carried by this error
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            MergeError::ContractViolation { diagnostics, .. } if !diagnostics.is_empty() => {
                diagnostics.clone()
            }
            _ => vec![self.to_diagnostic()],
        }
    }
}
