//! Error taxonomy for AMT requests and the power toggle.

use thiserror::Error;

use crate::power::state::{describe_all, PowerState};

pub type Result<T> = std::result::Result<T, AmtError>;

#[derive(Debug, Error)]
pub enum AmtError {
    /// HTTP 401 from the management controller
    #[error("Invalid username, password, or insufficient permissions.")]
    Auth,

    /// Any other non-success response, body kept for diagnostics
    #[error("Request failed with status code {status} ({body})")]
    Protocol { status: u16, body: String },

    #[error("The desired power state {target} is not currently available. Only these are: {}.", describe_all(.available))]
    TargetUnavailable {
        target: PowerState,
        available: Vec<PowerState>,
    },

    #[error("Failed to set power state to {target} ({response})")]
    TransitionRejected {
        target: PowerState,
        response: String,
    },

    #[error("Malformed {class} response: {reason}")]
    Malformed { class: String, reason: String },

    #[error("Failed to run the WS-Management client: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Timed out waiting for the power state to become {desired} (last observed {})", describe_observed(.last_observed))]
    WaitTimedOut {
        desired: PowerState,
        /// None when the first read never answered
        last_observed: Option<PowerState>,
    },

    #[error("Failed to write the {method} input document: {source}")]
    InputDocument {
        method: &'static str,
        source: std::io::Error,
    },

    #[error("Cancelled while waiting for the power state to change")]
    Cancelled,
}

fn describe_observed(state: &Option<PowerState>) -> String {
    match state {
        Some(state) => state.to_string(),
        None => "nothing".to_string(),
    }
}

impl AmtError {
    pub fn malformed(class: &str, reason: impl Into<String>) -> Self {
        AmtError::Malformed {
            class: class.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_unavailable_lists_available_states() {
        let err = AmtError::TargetUnavailable {
            target: PowerState::OFF_SOFT,
            available: vec![PowerState::ON, PowerState(42)],
        };
        assert_eq!(
            err.to_string(),
            "The desired power state #8 (Off - Soft) is not currently available. Only these are: [\"#2 (On)\",\"#42\"]."
        );
    }

    #[test]
    fn transition_rejected_embeds_code_and_response() {
        let err = AmtError::TransitionRejected {
            target: PowerState::OFF_SOFT_GRACEFUL,
            response: r#"{"ReturnValue":1}"#.to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("#12 (Off - Soft Graceful)"));
        assert!(msg.contains(r#"{"ReturnValue":1}"#));
    }

    #[test]
    fn timeout_without_any_reading() {
        let err = AmtError::WaitTimedOut {
            desired: PowerState::ON,
            last_observed: None,
        };
        assert_eq!(
            err.to_string(),
            "Timed out waiting for the power state to become #2 (On) (last observed nothing)"
        );
    }
}
