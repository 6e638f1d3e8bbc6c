//! Error taxonomy for the lifecycle handlers.
//!
//! AWS SDK failures are classified through `ProvideErrorMetadata::code()`
//! rather than by matching on their `Debug` output.

use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata};
use cfn_lifecycle_core::error::{PollRegistrationError, StackFailure, ValidationError};
use thiserror::Error;

use crate::config::ConfigError;

/// Error codes meaning the resource is already gone.
const NOT_FOUND_CODES: &[&str] = &["ResourceNotFoundException", "NotFoundException"];

/// Error codes meaning the resource already exists.
const CONFLICT_CODES: &[&str] = &["ResourceConflictException", "AlreadyExistsException"];

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("{service} {operation} failed: {message}")]
    Sdk {
        service: &'static str,
        operation: &'static str,
        code: Option<String>,
        message: String,
    },

    #[error("{service} {operation} response is missing {field}")]
    MissingField {
        service: &'static str,
        operation: &'static str,
        field: &'static str,
    },

    #[error("{service} {operation} request could not be built: {message}")]
    InvalidRequest {
        service: &'static str,
        operation: &'static str,
        message: String,
    },
}

impl ServiceError {
    pub fn from_sdk<E>(service: &'static str, operation: &'static str, error: &E) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error,
    {
        let message = error
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| DisplayErrorContext(error).to_string());
        Self::Sdk {
            service,
            operation,
            code: error.code().map(str::to_string),
            message,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Sdk { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn sdk_message(&self) -> Option<&str> {
        match self {
            Self::Sdk { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code()
            .is_some_and(|code| NOT_FOUND_CODES.contains(&code))
    }

    pub fn is_conflict(&self) -> bool {
        self.code()
            .is_some_and(|code| CONFLICT_CODES.contains(&code))
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Registration(#[from] PollRegistrationError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("failed to encode poll payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Failure raised by a provider operation; reported to CloudFormation as FAILED.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    StackFailed(#[from] StackFailure),

    #[error(transparent)]
    Scheduling(#[from] SchedulerError),

    #[error("Invalid RequestType: Create, Update, Delete")]
    UnsupportedRequestType,

    #[error("{0}")]
    Unsupported(&'static str),
}

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("failed to encode callback body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("callback PUT failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("callback PUT rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Cold-start failure recorded once and reported on every invocation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct InitializationError(String);

impl InitializationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<ConfigError> for InitializationError {
    fn from(error: ConfigError) -> Self {
        Self(error.to_string())
    }
}

/// Errors surfaced to the Lambda runtime.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("initialization failed: {0}")]
    Initialization(InitializationError),

    #[error(transparent)]
    CallbackDelivery(#[from] CallbackError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sdk_error(code: Option<&str>) -> ServiceError {
        ServiceError::Sdk {
            service: "events",
            operation: "RemoveTargets",
            code: code.map(str::to_string),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn classifies_by_error_code() {
        assert!(sdk_error(Some("ResourceNotFoundException")).is_not_found());
        assert!(sdk_error(Some("ResourceConflictException")).is_conflict());
        assert!(!sdk_error(Some("ThrottlingException")).is_not_found());
        assert!(!sdk_error(None).is_conflict());
    }

    #[test]
    fn handler_error_messages_pass_through() {
        let error = HandlerError::from(StackFailure::new("Stack Failed: nope"));
        assert_eq!(error.to_string(), "Stack Failed: nope");

        let error = HandlerError::from(ValidationError::RoleArnChanged);
        assert_eq!(
            error.to_string(),
            "Changing the role ARN for stack updates is not supported"
        );
    }

    #[test]
    fn service_error_names_operation() {
        assert_eq!(
            sdk_error(None).to_string(),
            "events RemoveTargets failed: boom"
        );
    }
}
