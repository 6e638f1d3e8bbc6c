use std::time::{Duration, SystemTime};

use cfn_lifecycle_core::arn::region_of;
use cfn_lifecycle_core::deadline::remaining_until;
use cfn_lifecycle_core::error::ValidationError;

/// The parts of the Lambda invocation context the coordinator relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    pub aws_request_id: String,
    pub function_name: String,
    pub invoked_function_arn: String,
    pub log_stream_name: String,
    pub remaining_time: Duration,
}

impl InvocationContext {
    pub fn from_lambda(context: &lambda_runtime::Context) -> Self {
        let deadline = SystemTime::UNIX_EPOCH + Duration::from_millis(context.deadline);
        Self {
            aws_request_id: context.request_id.clone(),
            function_name: context.env_config.function_name.clone(),
            invoked_function_arn: context.invoked_function_arn.clone(),
            log_stream_name: context.env_config.log_stream.clone(),
            remaining_time: remaining_until(deadline, SystemTime::now()),
        }
    }

    pub fn function_region(&self) -> Result<&str, ValidationError> {
        region_of(&self.invoked_function_arn)
    }
}

#[cfg(test)]
pub(crate) fn test_context(remaining_time: Duration) -> InvocationContext {
    InvocationContext {
        aws_request_id: "lambda-req-1".to_string(),
        function_name: "provider".to_string(),
        invoked_function_arn: "arn:aws:lambda:us-east-1:123456789012:function:provider"
            .to_string(),
        log_stream_name: "2024/05/01/[$LATEST]0123456789abcdef".to_string(),
        remaining_time,
    }
}
