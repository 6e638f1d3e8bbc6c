use thiserror::Error;

/// Problems with the inbound event or its resource properties.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required resource property '{0}'")]
    MissingProperty(String),

    #[error("resource property '{key}' {reason}")]
    InvalidProperty { key: String, reason: String },

    #[error("event does not carry a physical resource id")]
    MissingPhysicalResourceId,

    #[error("malformed ARN '{0}'")]
    MalformedArn(String),

    #[error("malformed stack id '{0}'")]
    MalformedStackId(String),

    #[error("malformed response URL '{0}'")]
    MalformedResponseUrl(String),

    #[error("Changing the role ARN for stack updates is not supported")]
    RoleArnChanged,

    #[error("Changing the region for stack updates is not supported")]
    RegionChanged,
}

impl ValidationError {
    pub fn invalid_property(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProperty {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// A polled stack landed in a terminal failure status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StackFailure {
    message: String,
}

impl StackFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollRegistrationError {
    #[error("rule ARN '{0}' does not name an EventBridge rule")]
    MalformedRuleArn(String),

    #[error(transparent)]
    Arn(#[from] ValidationError),
}
