//! Domain error types.

use chrono::NaiveDateTime;

/// Top-level error type for tradelab.
#[derive(Debug, thiserror::Error)]
pub enum TradelabError {
    #[error("no bar with time {time}")]
    BarNotFound { time: NaiveDateTime },

    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("degenerate input: {reason}")]
    DegenerateInput { reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

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

    #[error("strategy {strategy} failed with parameters [{params}]: {source}")]
    StrategyFailed {
        strategy: String,
        params: String,
        #[source]
        source: Box<TradelabError>,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TradelabError {
    pub(crate) fn invalid_state(reason: impl Into<String>) -> Self {
        TradelabError::InvalidState {
            reason: reason.into(),
        }
    }

    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        TradelabError::Configuration {
            reason: reason.into(),
        }
    }

    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        TradelabError::DegenerateInput {
            reason: reason.into(),
        }
    }

    /// The innermost error, looking through strategy context wrappers.
    pub fn root(&self) -> &TradelabError {
        match self {
            TradelabError::StrategyFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<&TradelabError> for std::process::ExitCode {
    fn from(err: &TradelabError) -> Self {
        let code: u8 = match err.root() {
            TradelabError::Io(_) => 1,
            TradelabError::ConfigParse { .. }
            | TradelabError::ConfigMissing { .. }
            | TradelabError::ConfigInvalid { .. } => 2,
            TradelabError::Data { .. } | TradelabError::DegenerateInput { .. } => 3,
            TradelabError::BarNotFound { .. } | TradelabError::InvalidState { .. } => 4,
            TradelabError::Configuration { .. } => 5,
            TradelabError::Cancelled => 6,
            TradelabError::StrategyFailed { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn bar_not_found_message_names_time() {
        let time = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let err = TradelabError::BarNotFound { time };
        assert_eq!(err.to_string(), "no bar with time 2024-03-01 09:30:00");
    }

    #[test]
    fn strategy_failure_reports_combination() {
        let err = TradelabError::StrategyFailed {
            strategy: "three_bar".into(),
            params: "high_bars=3, low_bars=2".into(),
            source: Box::new(TradelabError::invalid_state("position 1 is already closed")),
        };
        let msg = err.to_string();
        assert!(msg.contains("three_bar"));
        assert!(msg.contains("high_bars=3, low_bars=2"));
        assert!(msg.contains("already closed"));
    }

    #[test]
    fn root_unwraps_nested_context() {
        let err = TradelabError::StrategyFailed {
            strategy: "s".into(),
            params: String::new(),
            source: Box::new(TradelabError::Cancelled),
        };
        assert!(matches!(err.root(), TradelabError::Cancelled));
    }
}
