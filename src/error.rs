// src/error.rs

use crate::synth::Format;
use thiserror::Error;

/// Core error types for pippack
#[derive(Error, Debug)]
pub enum Error {
    /// Installed tree missing or empty
    #[error("Collection error: {0}")]
    Collection(String),

    /// Package metadata rejected before any synthesizer ran
    #[error("Invalid package spec: {field} {value:?}: {reason}")]
    InvalidSpec {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// Recipe generation or build-root staging failed
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Native builder exited non-zero (or was killed on deadline)
    #[error("{format} build failed (exit {code:?}):\n{output}")]
    BuildFailed {
        format: Format,
        code: Option<i32>,
        output: String,
    },

    /// Signing key unreadable or rejected by the signing tool
    #[error("Signing error: {0}")]
    Signing(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code for this error class, so calling automation can
    /// branch on the failure kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidSpec { .. } => 2,
            Error::Collection(_) => 3,
            Error::Synthesis(_) => 4,
            Error::BuildFailed { .. } => 5,
            Error::Signing(_) => 6,
            Error::Io(_) => 7,
        }
    }
}

/// Result type alias using pippack's Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            Error::InvalidSpec {
                field: "name",
                value: "a b".into(),
                reason: "whitespace".into(),
            },
            Error::Collection("empty".into()),
            Error::Synthesis("escape".into()),
            Error::BuildFailed {
                format: Format::Deb,
                code: Some(2),
                output: String::new(),
            },
            Error::Signing("unreadable key".into()),
            Error::Io(std::io::Error::other("io")),
        ];

        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len(), "exit codes must not collide");
    }

    #[test]
    fn test_build_failed_message_includes_output() {
        let err = Error::BuildFailed {
            format: Format::Rpm,
            code: Some(1),
            output: "error: line 12: bad %files entry".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("rpm"));
        assert!(msg.contains("bad %files entry"));
    }
}
