// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// No suitable nodes found
    #[error("No suitable nodes found for pod {pod_name}")]
    #[diagnostic(
        code(scheduler::no_suitable_nodes),
        help("{reason}")
    )]
    NoSuitableNodes {
        pod_name: String,
        reason: String,
    },

    /// Plugin configuration is invalid
    #[error("Invalid configuration: {message}")]
    #[diagnostic(
        code(scheduler::invalid_config),
        help("{suggestion}")
    )]
    InvalidConfig {
        message: String,
        suggestion: String,
    },

    /// Cycle state expected from an earlier stage is missing
    #[error("Reading {key} from cycle state: not found")]
    #[diagnostic(
        code(scheduler::missing_cycle_state),
        help("The {key} stage must run before the stage that reads it in the same attempt")
    )]
    MissingCycleState {
        key: String,
    },

    /// Node named by the caller is not in the snapshot
    #[error("Getting node {node_name} from snapshot: not found")]
    #[diagnostic(
        code(scheduler::node_not_found),
        help("The node may have been removed since the snapshot was taken")
    )]
    NodeNotFound {
        node_name: String,
    },

    /// A queueing hint received an event it was not registered for
    #[error("Unexpected event {got} for {expected} hint")]
    #[diagnostic(
        code(scheduler::unexpected_event),
        help("Check the event registrations of the plugin")
    )]
    UnexpectedEvent {
        expected: String,
        got: String,
    },

    /// Core error
    #[error("Core error: {0}")]
    #[diagnostic(
        code(scheduler::core_error),
        help("Check the pod and node objects handed to the scheduler")
    )]
    CoreError(#[from] nodefit_core::NodefitError),

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(scheduler::internal_error),
        help("This is likely a bug. Please report it")
    )]
    InternalError {
        message: String,
    },
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Create a NoSuitableNodes error
    pub fn no_suitable_nodes(pod_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NoSuitableNodes {
            pod_name: pod_name.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidConfig error
    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a MissingCycleState error
    pub fn missing_cycle_state(key: impl Into<String>) -> Self {
        Self::MissingCycleState { key: key.into() }
    }

    /// Create a NodeNotFound error
    pub fn node_not_found(node_name: impl Into<String>) -> Self {
        Self::NodeNotFound {
            node_name: node_name.into(),
        }
    }

    /// Create an UnexpectedEvent error
    pub fn unexpected_event(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::UnexpectedEvent {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create an InternalError
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}
