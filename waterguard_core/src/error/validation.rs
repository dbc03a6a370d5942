//! Validation related error types

use thiserror::Error;

/// Validation and configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Invalid input parameter
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter { parameter: String, reason: String },

    /// Valve action outside open/close/n/a
    #[error("Invalid valve action '{action}', expected one of: open, close, n/a")]
    InvalidValveAction { action: String },
}

impl ValidationError {
    /// Create an invalid configuration error
    pub fn invalid_configuration(message: &str) -> Self {
        Self::InvalidConfiguration {
            message: message.to_string(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: &str, reason: &str) -> Self {
        Self::InvalidParameter {
            parameter: parameter.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid valve action error
    pub fn invalid_valve_action(action: &str) -> Self {
        Self::InvalidValveAction {
            action: action.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_configuration_error() {
        let error = ValidationError::invalid_configuration("Bad config");
        assert!(error.to_string().contains("Invalid configuration"));
        assert!(error.to_string().contains("Bad config"));
    }

    #[test]
    fn test_invalid_parameter_error() {
        let error = ValidationError::invalid_parameter("scan_interval", "must be positive");
        assert!(error.to_string().contains("Invalid parameter"));
        assert!(error.to_string().contains("scan_interval"));
        assert!(error.to_string().contains("must be positive"));
    }

    #[test]
    fn test_invalid_valve_action_error() {
        let error = ValidationError::invalid_valve_action("toggle");
        assert!(error.to_string().contains("'toggle'"));
        assert!(error.to_string().contains("open, close, n/a"));
    }
}
