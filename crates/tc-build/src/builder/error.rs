//! Failure taxonomy and the process exit codes derived from it.
//!
//! Everything propagates as `anyhow::Error`; the variants below are the
//! failures whose kind decides the exit status.

use std::path::PathBuf;
use thiserror::Error;

/// Exit status for fatal errors without a more specific code.
pub const EXIT_FATAL: u8 = 1;

/// Exit status for invalid parameters, distinct from build failures.
pub const EXIT_USAGE: u8 = 33;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad flag or value, reported before any side effect.
    #[error("invalid parameter: {0}")]
    Usage(String),

    /// A required host tool is not installed.
    #[error("{tool} could not be found, please install it")]
    MissingTool { tool: String },

    /// Downloaded artifact disagrees with its recorded digest.
    #[error(
        "computed checksum of {} ('{computed}') differs from expected checksum ('{expected}'), remove it and try again",
        path.display()
    )]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        computed: String,
    },

    /// A child process exited with a non-zero status.
    #[error("`{command}` failed with exit code {code}")]
    CommandFailed { command: String, code: i32 },

    /// A child process was killed before it could exit.
    #[error("`{command}` was terminated by a signal")]
    CommandKilled { command: String },
}

impl Error {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => EXIT_USAGE,
            Self::CommandFailed { code, .. } => u8::try_from(*code)
                .ok()
                .filter(|c| *c != 0)
                .unwrap_or(EXIT_FATAL),
            Self::MissingTool { .. } | Self::ChecksumMismatch { .. } | Self::CommandKilled { .. } => {
                EXIT_FATAL
            }
        }
    }
}

/// Exit status for an error that reached `main`.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|e| e.downcast_ref::<Error>())
        .map_or(EXIT_FATAL, Error::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_usage_error_exit_code() {
        let err = anyhow::Error::new(Error::usage("unknown target 'Foo'"));
        assert_eq!(exit_code(&err), EXIT_USAGE);
    }

    #[test]
    fn test_child_exit_code_propagated_through_context() {
        let res: anyhow::Result<()> = Err(Error::CommandFailed {
            command: "make".into(),
            code: 2,
        }
        .into());
        let err = res.context("building arm kernel").unwrap_err();
        assert_eq!(exit_code(&err), 2);
    }

    #[test]
    fn test_plain_errors_are_fatal() {
        let err = anyhow::anyhow!("no build folder set");
        assert_eq!(exit_code(&err), EXIT_FATAL);

        let err = anyhow::Error::new(Error::MissingTool {
            tool: "ninja".into(),
        });
        assert_eq!(exit_code(&err), EXIT_FATAL);
    }

    #[test]
    fn test_out_of_range_child_code_is_fatal() {
        let err = Error::CommandFailed {
            command: "make".into(),
            code: 300,
        };
        assert_eq!(err.exit_code(), EXIT_FATAL);
    }
}
