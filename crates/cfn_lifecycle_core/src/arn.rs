use crate::error::ValidationError;

/// Borrowed view over the colon-separated segments of an ARN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arn<'a> {
    pub partition: &'a str,
    pub service: &'a str,
    pub region: &'a str,
    pub account_id: &'a str,
    pub resource: &'a str,
}

impl<'a> Arn<'a> {
    pub fn parse(value: &'a str) -> Result<Self, ValidationError> {
        let mut parts = value.splitn(6, ':');
        let malformed = || ValidationError::MalformedArn(value.to_string());

        if parts.next() != Some("arn") {
            return Err(malformed());
        }
        let partition = parts.next().ok_or_else(malformed)?;
        let service = parts.next().ok_or_else(malformed)?;
        let region = parts.next().ok_or_else(malformed)?;
        let account_id = parts.next().ok_or_else(malformed)?;
        let resource = parts.next().ok_or_else(malformed)?;

        if partition.is_empty() || service.is_empty() || resource.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            partition,
            service,
            region,
            account_id,
            resource,
        })
    }

    /// Resource path segments after the resource type, e.g. `stack/<name>/<guid>`.
    pub fn resource_segment(&self, index: usize) -> Option<&'a str> {
        self.resource
            .split('/')
            .nth(index)
            .filter(|segment| !segment.is_empty())
    }
}

/// Region of the Lambda function handling the invocation.
pub fn region_of(function_arn: &str) -> Result<&str, ValidationError> {
    let arn = Arn::parse(function_arn)?;
    if arn.region.is_empty() {
        return Err(ValidationError::MalformedArn(function_arn.to_string()));
    }
    Ok(arn.region)
}
