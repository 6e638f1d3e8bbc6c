use async_trait::async_trait;
use aws_sdk_codebuild::operation::start_build::StartBuildOutput;
use aws_sdk_codebuild::types::{EnvironmentVariable, EnvironmentVariableType};

use crate::error::ServiceError;

const CODEBUILD: &str = "codebuild";

#[async_trait]
pub trait BuildService: Send + Sync {
    /// Starts `project` with plaintext environment overrides and returns the
    /// build id.
    async fn start_build(
        &self,
        project: &str,
        environment: &[(String, String)],
    ) -> Result<String, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct CodeBuildService {
    client: aws_sdk_codebuild::Client,
}

impl CodeBuildService {
    pub fn new(client: aws_sdk_codebuild::Client) -> Self {
        Self { client }
    }
}

fn environment_overrides(
    environment: &[(String, String)],
) -> Result<Vec<EnvironmentVariable>, ServiceError> {
    environment
        .iter()
        .map(|(name, value)| {
            EnvironmentVariable::builder()
                .name(name)
                .value(value)
                .r#type(EnvironmentVariableType::Plaintext)
                .build()
                .map_err(|error| ServiceError::InvalidRequest {
                    service: CODEBUILD,
                    operation: "StartBuild",
                    message: error.to_string(),
                })
        })
        .collect()
}

#[async_trait]
impl BuildService for CodeBuildService {
    async fn start_build(
        &self,
        project: &str,
        environment: &[(String, String)],
    ) -> Result<String, ServiceError> {
        let output = self
            .client
            .start_build()
            .project_name(project)
            .set_environment_variables_override(Some(environment_overrides(environment)?))
            .send()
            .await
            .map_err(|error| ServiceError::from_sdk(CODEBUILD, "StartBuild", &error))?;

        started_build_id(&output)
    }
}

fn started_build_id(output: &StartBuildOutput) -> Result<String, ServiceError> {
    output
        .build_value()
        .and_then(|build| build.id())
        .map(str::to_string)
        .ok_or(ServiceError::MissingField {
            service: CODEBUILD,
            operation: "StartBuild",
            field: "build.id",
        })
}

#[cfg(test)]
mod tests {
    use aws_sdk_codebuild::types::Build;

    use super::*;

    #[test]
    fn build_id_comes_from_the_started_build() {
        let output = StartBuildOutput::builder()
            .build_value(Build::builder().id("deploy:0f1e2d").build())
            .build();
        assert_eq!(started_build_id(&output).expect("build id"), "deploy:0f1e2d");

        let missing = StartBuildOutput::builder().build();
        assert!(matches!(
            started_build_id(&missing),
            Err(ServiceError::MissingField { field: "build.id", .. })
        ));
    }

    #[test]
    fn overrides_are_plaintext() {
        let variables = environment_overrides(&[(
            "cfn_request_id".to_string(),
            "req-1".to_string(),
        )])
        .expect("variables should build");

        assert_eq!(variables.len(), 1);
        assert_eq!(variables[0].name(), "cfn_request_id");
        assert_eq!(variables[0].value(), "req-1");
        assert_eq!(variables[0].r#type(), Some(&EnvironmentVariableType::Plaintext));
    }
}
