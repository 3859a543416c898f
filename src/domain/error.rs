//! Domain error types.

use crate::domain::currency::Currency;

/// Top-level error type for backflow.
#[derive(Debug, thiserror::Error)]
pub enum BackflowError {
    #[error("unknown currency: {0}")]
    UnknownCurrency(Currency),

    #[error("unknown asset: {0}")]
    UnknownAsset(String),

    #[error("invalid rate {rate} for {currency}: rates must be positive and finite")]
    InvalidRate { currency: Currency, rate: f64 },

    #[error("cannot combine a calendar period with an exact duration: {left} and {right}")]
    IncompatiblePeriodKind { left: String, right: String },

    #[error("run label already registered: {0}")]
    DuplicateRun(String),

    #[error("parameter already declared: {0}")]
    DuplicateParameter(String),

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("metric not found in snapshot: {0}")]
    MetricNotFound(String),

    #[error("trial {run} failed: {reason}")]
    TrialFailed { run: String, reason: String },

    #[error("feed has no events in {0}")]
    EmptyFeed(String),

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BackflowError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        BackflowError::InvalidArgument {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackflowError>;

impl From<&BackflowError> for std::process::ExitCode {
    fn from(err: &BackflowError) -> Self {
        let code: u8 = match err {
            BackflowError::Io(_) => 1,
            BackflowError::ConfigParse { .. }
            | BackflowError::ConfigMissing { .. }
            | BackflowError::ConfigInvalid { .. } => 2,
            BackflowError::Data { .. } | BackflowError::Csv(_) | BackflowError::EmptyFeed(_) => 3,
            BackflowError::UnknownCurrency(_)
            | BackflowError::UnknownAsset(_)
            | BackflowError::InvalidRate { .. }
            | BackflowError::IncompatiblePeriodKind { .. }
            | BackflowError::InvalidArgument { .. } => 4,
            BackflowError::DuplicateRun(_)
            | BackflowError::DuplicateParameter(_)
            | BackflowError::MetricNotFound(_)
            | BackflowError::TrialFailed { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_currency_message() {
        let err = BackflowError::UnknownCurrency(Currency::new("JPY"));
        assert_eq!(err.to_string(), "unknown currency: JPY");
    }

    #[test]
    fn config_error_messages() {
        let missing = BackflowError::ConfigMissing {
            section: "optimizer".into(),
            key: "score".into(),
        };
        let invalid = BackflowError::ConfigInvalid {
            section: "channel".into(),
            key: "capacity".into(),
            reason: "must be positive".into(),
        };
        assert_eq!(missing.to_string(), "missing config key [optimizer] score");
        assert_eq!(
            invalid.to_string(),
            "invalid config value [channel] capacity: must be positive"
        );
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BackflowError = io.into();
        assert!(matches!(err, BackflowError::Io(_)));
    }
}
