use std::process::{ExitCode, Termination};

/// Errors raised by the score access engine and the annotation pipeline.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Broken pipeline or score file definition.
    #[error("configuration error: {0}")]
    Config(String),
    /// Malformed value in an input line or score row.
    #[error("could not parse {column} value {value:?}: {reason}")]
    Parse {
        column: String,
        value: String,
        reason: String,
    },
    /// Score file content that violates the sorted/indexed file contract.
    #[error("data contract violation: {0}")]
    Contract(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn contract(msg: impl Into<String>) -> Self {
        Error::Contract(msg.into())
    }

    pub fn parse(column: impl Into<String>, value: impl Into<String>, reason: impl ToString) -> Self {
        Error::Parse {
            column: column.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config(_) => 78,
            Error::Parse { .. } => 65,
            Error::Contract(_) => 70,
            Error::Io(_) => 74,
        }
    }
}

/// Top-level failure of a sub command, carrying the exit code to report.
#[derive(thiserror::Error, Debug)]
#[error("{message}")]
pub struct AppError {
    pub message: String,
    pub code: u8,
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let code = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<Error>())
            .map(Error::exit_code)
            .unwrap_or(1);
        AppError {
            message: format!("{:#}", err),
            code,
        }
    }
}

impl Termination for AppError {
    fn report(self) -> ExitCode {
        ExitCode::from(self.code)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{AppError, Error};

    #[rstest::rstest]
    #[case(Error::config("x"), 78)]
    #[case(Error::parse("pos", "x", "invalid digit"), 65)]
    #[case(Error::contract("x"), 70)]
    fn exit_code_by_category(#[case] err: Error, #[case] expected: u8) {
        assert_eq!(err.exit_code(), expected);
    }

    #[test]
    fn app_error_from_anyhow_finds_root_cause() {
        let err = anyhow::Error::new(Error::config("missing annotator"))
            .context("while building pipeline");
        let app_err = AppError::from(err);

        assert_eq!(app_err.code, 78);
        assert!(app_err.message.contains("missing annotator"));
    }

    #[test]
    fn app_error_defaults_to_one() {
        let app_err = AppError::from(anyhow::anyhow!("something else"));

        assert_eq!(app_err.code, 1);
    }
}
