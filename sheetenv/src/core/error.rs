//! Failure taxonomy for a dispatched command.
//!
//! Every variant is turned into a `success=false` observation at the dispatch
//! boundary; none of them ever escapes `step`, `reset` or `close`.

use thiserror::Error;

use crate::core::types::Observation;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// A command arrived before a successful reset (or after close).
    #[error("spreadsheet engine not initialized (call reset first)")]
    NotInitialized,

    #[error("command '{0}' not supported")]
    UnsupportedCommand(String),

    #[error("{}", required_message(.0))]
    MissingParameter(Vec<&'static str>),

    /// Present but unusable, e.g. a non-string `cell` or a malformed colour.
    #[error("invalid {name} parameter: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// A sheet, cell or range reference the engine cannot resolve.
    #[error("{0}")]
    Address(String),

    /// The engine capability call itself failed.
    #[error("{0}")]
    Engine(String),
}

fn required_message(names: &[&'static str]) -> String {
    match names {
        [single] => format!("{single} parameter is required"),
        many => format!("{} parameters are required", many.join(" and ")),
    }
}

impl EnvError {
    /// Stable machine label, used for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EnvError::NotInitialized => "not_initialized",
            EnvError::UnsupportedCommand(_) => "unsupported_command",
            EnvError::MissingParameter(_) => "missing_parameter",
            EnvError::InvalidParameter { .. } => "invalid_parameter",
            EnvError::Address(_) => "address_error",
            EnvError::Engine(_) => "engine_failure",
        }
    }

    pub fn missing(name: &'static str) -> Self {
        EnvError::MissingParameter(vec![name])
    }

    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        EnvError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Shape the error as a failed observation for `command`.
    pub fn into_observation(self, command: &str) -> Observation {
        let result = match &self {
            EnvError::NotInitialized => "Spreadsheet engine not initialized".to_string(),
            EnvError::UnsupportedCommand(name) => format!("Unknown command: {name}"),
            EnvError::MissingParameter(names) => {
                format!("Missing required parameter: {}", names.join(", "))
            }
            EnvError::InvalidParameter { name, .. } => format!("Invalid {name} parameter"),
            EnvError::Address(msg) | EnvError::Engine(msg) => {
                format!("Error executing {command}: {msg}")
            }
        };
        Observation::failure(result, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_parameter_names_every_parameter() {
        assert_eq!(
            EnvError::missing("cell").to_string(),
            "cell parameter is required"
        );
        assert_eq!(
            EnvError::MissingParameter(vec!["range", "values"]).to_string(),
            "range and values parameters are required"
        );
    }

    #[test]
    fn unsupported_command_observation_mentions_the_name() {
        let obs = EnvError::UnsupportedCommand("sort_range".into()).into_observation("sort_range");
        assert!(!obs.success);
        assert!(obs.result.contains("sort_range"));
        assert!(
            obs.error_message
                .as_deref()
                .is_some_and(|msg| msg.contains("sort_range"))
        );
    }
}
