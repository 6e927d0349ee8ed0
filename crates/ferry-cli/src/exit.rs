use ferry_core::{ErrorKind, FerryError};
use thiserror::Error;

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    CommandLineError = 1,
    ConfigurationError = 2,
    RepositoryError = 3,
    /// Nothing was migrated.
    NoOp = 4,
    EnvironmentError = 30,
    InternalError = 31,
}

/// Failures raised by the command line layer itself.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    CommandLine(String),
    #[error("{0}")]
    Environment(String),
}

impl ExitCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Classify by the first recognizable error in the chain.
    pub fn for_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(e) = cause.downcast_ref::<CliError>() {
                return match e {
                    CliError::CommandLine(_) => ExitCode::CommandLineError,
                    CliError::Environment(_) => ExitCode::EnvironmentError,
                };
            }
            if let Some(e) = cause.downcast_ref::<FerryError>() {
                return match e.kind() {
                    ErrorKind::Validation => ExitCode::ConfigurationError,
                    ErrorKind::Repository => ExitCode::RepositoryError,
                    ErrorKind::NoOp => ExitCode::NoOp,
                    ErrorKind::Environment => ExitCode::EnvironmentError,
                };
            }
            if cause.downcast_ref::<std::io::Error>().is_some() {
                return ExitCode::EnvironmentError;
            }
        }
        ExitCode::InternalError
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn ferry_errors_map_by_kind() {
        let cases = [
            (FerryError::validation("x"), ExitCode::ConfigurationError, 2),
            (FerryError::repo("x"), ExitCode::RepositoryError, 3),
            (FerryError::empty_change("x"), ExitCode::NoOp, 4),
            (FerryError::RedundantChange("x".into()), ExitCode::NoOp, 4),
        ];
        for (err, expected, code) in cases {
            let exit = ExitCode::for_error(&anyhow::Error::new(err));
            assert_eq!(exit, expected);
            assert_eq!(exit.code(), code);
        }
    }

    #[test]
    fn context_does_not_hide_the_cause() {
        let err = Err::<(), _>(FerryError::repo("gone"))
            .context("running migration")
            .unwrap_err();
        assert_eq!(ExitCode::for_error(&err), ExitCode::RepositoryError);
    }

    #[test]
    fn cli_and_unknown_errors() {
        let cmd = anyhow::Error::new(CliError::CommandLine("bad".into()));
        assert_eq!(ExitCode::for_error(&cmd).code(), 1);
        let env = anyhow::Error::new(CliError::Environment("locked".into()));
        assert_eq!(ExitCode::for_error(&env).code(), 30);
        let io = anyhow::Error::new(std::io::Error::other("disk"));
        assert_eq!(ExitCode::for_error(&io), ExitCode::EnvironmentError);
        assert_eq!(ExitCode::for_error(&anyhow::anyhow!("boom")).code(), 31);
    }
}
