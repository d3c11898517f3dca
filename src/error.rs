use std::io;

use thiserror::Error;

/// Exit status for bad flags or a wrong number of operands (clap's default).
pub const EXIT_USAGE: u8 = 2;

/// Exit status for local failures: protocol breaks, I/O, spawn and editor errors.
pub const EXIT_TROUBLE: u8 = 3;

pub type Result<T, E = SdiffError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SdiffError {
    #[error("invalid diff header: {0}")]
    InvalidHeader(String),

    #[error("expected `{expected}` in diff output, got: {line}")]
    BadPrefix { expected: &'static str, line: String },

    #[error("missing `---` separator in change hunk, got: {0}")]
    MissingSeparator(String),

    #[error("diff output does not match {side} file at line {line_no}: {line}")]
    ContentMismatch {
        side: &'static str,
        line_no: usize,
        line: String,
    },

    #[error("diff output ended inside hunk {0}")]
    TruncatedHunk(String),

    #[error("line counters out of sync at hunk {0}")]
    CursorMismatch(String),

    #[error("{op}")]
    Io {
        op: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot execute {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("editor terminated abnormally: {0}")]
    EditorAbnormal(String),

    /// The engine's output broke and the engine itself reported trouble.
    #[error("diff exited with status {status}")]
    DiffFailed {
        status: i32,
        #[source]
        source: Box<SdiffError>,
    },
}

impl SdiffError {
    pub fn io(op: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            op: op.into(),
            source,
        }
    }

    /// Exit status for this error: the engine's own status when it was the
    /// source, otherwise [`EXIT_TROUBLE`].
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::DiffFailed { status, .. } => u8::try_from(*status).unwrap_or(EXIT_TROUBLE),
            _ => EXIT_TROUBLE,
        }
    }

    /// True when the differencing engine's output broke its own grammar.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::InvalidHeader(_)
                | Self::BadPrefix { .. }
                | Self::MissingSeparator(_)
                | Self::ContentMismatch { .. }
                | Self::TruncatedHunk(_)
                | Self::CursorMismatch(_)
        )
    }
}

pub trait IoResultExt<T> {
    fn op(self, op: &str) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn op(self, op: &str) -> Result<T> {
        self.map_err(|source| SdiffError::io(op, source))
    }
}
