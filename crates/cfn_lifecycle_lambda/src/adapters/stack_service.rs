use std::sync::Arc;

use async_trait::async_trait;
use aws_config::sts::AssumeRoleProvider;
use aws_config::{Region, SdkConfig};
use aws_sdk_cloudformation::types::{
    Capability, Parameter, RollbackConfiguration, Stack, StackStatus, Tag,
};
use cfn_lifecycle_core::stack::{
    is_no_op_update, NestedStackRequest, StackOutput, StackSnapshot, StackTarget,
    StackUpdateRequest, PARENT_STACK_TAG,
};

use crate::error::ServiceError;

const CLOUDFORMATION: &str = "cloudformation";
pub const ASSUME_ROLE_SESSION_NAME: &str = "CfnLifecycleNestedStack";

/// Settings a nested stack inherits from the stack that declares it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParentStackSettings {
    pub capabilities: Vec<Capability>,
    pub disable_rollback: bool,
    pub notification_arns: Vec<String>,
    pub rollback_configuration: Option<RollbackConfiguration>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Started,
    NoChanges,
}

#[async_trait]
pub trait StackService: Send + Sync {
    async fn describe_stack(&self, stack_id: &str) -> Result<StackSnapshot, ServiceError>;

    async fn describe_parent(&self, stack_id: &str) -> Result<ParentStackSettings, ServiceError>;

    /// Returns the id of the created stack.
    async fn create_stack(
        &self,
        request: &NestedStackRequest,
        parent: &ParentStackSettings,
    ) -> Result<String, ServiceError>;

    async fn update_stack(&self, request: &StackUpdateRequest)
        -> Result<UpdateOutcome, ServiceError>;

    async fn delete_stack(&self, stack_id: &str) -> Result<(), ServiceError>;
}

/// Hands out stack services for the function's own account or for the
/// account and region a nested stack targets.
#[async_trait]
pub trait StackServiceFactory: Send + Sync {
    fn local(&self) -> Arc<dyn StackService>;

    async fn for_target(&self, target: &StackTarget) -> Arc<dyn StackService>;
}

#[derive(Debug, Clone)]
pub struct CloudFormationStackService {
    client: aws_sdk_cloudformation::Client,
}

impl CloudFormationStackService {
    pub fn new(client: aws_sdk_cloudformation::Client) -> Self {
        Self { client }
    }

    async fn describe(&self, stack_id: &str) -> Result<Stack, ServiceError> {
        let output = self
            .client
            .describe_stacks()
            .stack_name(stack_id)
            .send()
            .await
            .map_err(|error| ServiceError::from_sdk(CLOUDFORMATION, "DescribeStacks", &error))?;

        output
            .stacks()
            .first()
            .cloned()
            .ok_or(ServiceError::MissingField {
                service: CLOUDFORMATION,
                operation: "DescribeStacks",
                field: "Stacks",
            })
    }
}

fn parent_tag(parent_stack_id: &str) -> Tag {
    Tag::builder()
        .key(PARENT_STACK_TAG)
        .value(parent_stack_id)
        .build()
}

/// The parent tag first, then the parent's own tags minus any stale parent tag.
fn nested_stack_tags(parent_stack_id: &str, inherited: &[Tag]) -> Vec<Tag> {
    let mut tags = vec![parent_tag(parent_stack_id)];
    tags.extend(
        inherited
            .iter()
            .filter(|tag| tag.key() != Some(PARENT_STACK_TAG))
            .cloned(),
    );
    tags
}

fn sdk_parameters(parameters: &[(String, String)]) -> Vec<Parameter> {
    parameters
        .iter()
        .map(|(key, value)| {
            Parameter::builder()
                .parameter_key(key)
                .parameter_value(value)
                .build()
        })
        .collect()
}

#[async_trait]
impl StackService for CloudFormationStackService {
    async fn describe_stack(&self, stack_id: &str) -> Result<StackSnapshot, ServiceError> {
        let stack = self.describe(stack_id).await?;
        let status: Option<&StackStatus> = stack.stack_status().into();
        let status = status.ok_or(ServiceError::MissingField {
            service: CLOUDFORMATION,
            operation: "DescribeStacks",
            field: "StackStatus",
        })?;

        Ok(StackSnapshot {
            status: status.as_str().to_string(),
            status_reason: stack.stack_status_reason().map(str::to_string),
            outputs: stack
                .outputs()
                .iter()
                .filter_map(|output| {
                    Some(StackOutput {
                        key: output.output_key()?.to_string(),
                        value: output.output_value().unwrap_or_default().to_string(),
                    })
                })
                .collect(),
        })
    }

    async fn describe_parent(&self, stack_id: &str) -> Result<ParentStackSettings, ServiceError> {
        let stack = self.describe(stack_id).await?;
        let disable_rollback: Option<bool> = stack.disable_rollback().into();
        Ok(ParentStackSettings {
            capabilities: stack.capabilities().to_vec(),
            disable_rollback: disable_rollback.unwrap_or(false),
            notification_arns: stack.notification_arns().to_vec(),
            rollback_configuration: stack.rollback_configuration().cloned(),
            tags: stack.tags().to_vec(),
        })
    }

    async fn create_stack(
        &self,
        request: &NestedStackRequest,
        parent: &ParentStackSettings,
    ) -> Result<String, ServiceError> {
        let tags = nested_stack_tags(&request.parent_stack_id, &parent.tags);

        let output = self
            .client
            .create_stack()
            .stack_name(&request.stack_name)
            .template_url(&request.template_url)
            .set_parameters(Some(sdk_parameters(&request.parameters)))
            .set_capabilities(Some(parent.capabilities.clone()))
            .disable_rollback(parent.disable_rollback)
            .set_notification_arns(Some(parent.notification_arns.clone()))
            .set_rollback_configuration(parent.rollback_configuration.clone())
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|error| ServiceError::from_sdk(CLOUDFORMATION, "CreateStack", &error))?;

        output
            .stack_id()
            .map(str::to_string)
            .ok_or(ServiceError::MissingField {
                service: CLOUDFORMATION,
                operation: "CreateStack",
                field: "StackId",
            })
    }

    async fn update_stack(
        &self,
        request: &StackUpdateRequest,
    ) -> Result<UpdateOutcome, ServiceError> {
        let capabilities = request
            .capabilities
            .iter()
            .map(|capability| Capability::from(capability.as_str()))
            .collect();

        let result = self
            .client
            .update_stack()
            .stack_name(&request.stack_id)
            .template_url(&request.template_url)
            .set_parameters(Some(sdk_parameters(&request.parameters)))
            .set_capabilities(Some(capabilities))
            .tags(parent_tag(&request.parent_stack_id))
            .send()
            .await
            .map_err(|error| ServiceError::from_sdk(CLOUDFORMATION, "UpdateStack", &error));

        match result {
            Ok(_) => Ok(UpdateOutcome::Started),
            Err(error) if is_no_op_update(error.code(), error.sdk_message()) => {
                tracing::info!(stack_id = %request.stack_id, "stack is already up to date");
                Ok(UpdateOutcome::NoChanges)
            }
            Err(error) => Err(error),
        }
    }

    async fn delete_stack(&self, stack_id: &str) -> Result<(), ServiceError> {
        self.client
            .delete_stack()
            .stack_name(stack_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| ServiceError::from_sdk(CLOUDFORMATION, "DeleteStack", &error))
    }
}

/// Builds CloudFormation clients from the cold-start SDK config, assuming
/// `RoleArn` when a target names one.
#[derive(Debug, Clone)]
pub struct CloudFormationStackServiceFactory {
    sdk_config: SdkConfig,
    local: Arc<CloudFormationStackService>,
}

impl CloudFormationStackServiceFactory {
    pub fn new(sdk_config: SdkConfig) -> Self {
        let local = Arc::new(CloudFormationStackService::new(
            aws_sdk_cloudformation::Client::new(&sdk_config),
        ));
        Self { sdk_config, local }
    }
}

fn is_local_target(local_region: Option<&str>, target: &StackTarget) -> bool {
    target.role_arn.is_none() && local_region == Some(target.region.as_str())
}

#[async_trait]
impl StackServiceFactory for CloudFormationStackServiceFactory {
    fn local(&self) -> Arc<dyn StackService> {
        self.local.clone()
    }

    async fn for_target(&self, target: &StackTarget) -> Arc<dyn StackService> {
        let local_region = self.sdk_config.region().map(|region| region.as_ref());
        if is_local_target(local_region, target) {
            return self.local.clone();
        }

        let region = Region::new(target.region.clone());
        let mut config = aws_sdk_cloudformation::config::Builder::from(&self.sdk_config)
            .region(region.clone());
        if let Some(role_arn) = &target.role_arn {
            tracing::debug!(%role_arn, region = %target.region, "assuming role for nested stack");
            let provider = AssumeRoleProvider::builder(role_arn)
                .session_name(ASSUME_ROLE_SESSION_NAME)
                .region(region)
                .configure(&self.sdk_config)
                .build()
                .await;
            config = config.credentials_provider(provider);
        }

        Arc::new(CloudFormationStackService::new(
            aws_sdk_cloudformation::Client::from_conf(config.build()),
        ))
    }
}
