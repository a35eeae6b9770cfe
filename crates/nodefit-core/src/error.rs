// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for nodefit operations
#[derive(Error, Debug, Diagnostic)]
pub enum NodefitError {
    /// A resource quantity string could not be parsed
    #[error("Invalid quantity for {resource}: {value}")]
    #[diagnostic(
        code(nodefit::invalid_quantity),
        help("Use a Kubernetes quantity such as '500m', '2', '128Mi' or '1G'")
    )]
    InvalidQuantity {
        #[allow(unused)]
        resource: String,
        #[allow(unused)]
        value: String,
    },

    /// A required field is missing from an object
    #[error("Missing required field: {field}")]
    #[diagnostic(
        code(nodefit::missing_field),
        help("The object must set {field} before it can be evaluated")
    )]
    MissingField {
        #[allow(unused)]
        field: String,
    },

    /// A watch payload did not have the shape its event kind requires
    #[error("Malformed {kind} event: {details}")]
    #[diagnostic(
        code(nodefit::malformed_event),
        help("Check that the watch delivered the old/new objects expected for this event type")
    )]
    MalformedEvent {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        details: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(nodefit::serialization_error),
        help("Ensure the resource format is valid JSON or YAML")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for nodefit core operations
pub type Result<T> = std::result::Result<T, NodefitError>;

impl NodefitError {
    /// Create an InvalidQuantity error
    pub fn invalid_quantity(resource: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidQuantity {
            resource: resource.into(),
            value: value.into(),
        }
    }

    /// Create a MissingField error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create a MalformedEvent error
    pub fn malformed_event(kind: impl Into<String>, details: impl Into<String>) -> Self {
        Self::MalformedEvent {
            kind: kind.into(),
            details: details.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = NodefitError::invalid_quantity("cpu", "lots");
        assert!(matches!(err, NodefitError::InvalidQuantity { .. }));
        assert_eq!(err.to_string(), "Invalid quantity for cpu: lots");

        let err = NodefitError::malformed_event("Pod/Update", "missing new object");
        assert!(matches!(err, NodefitError::MalformedEvent { .. }));
    }
}
