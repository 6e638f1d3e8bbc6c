use std::sync::Arc;

use async_trait::async_trait;
use cfn_lifecycle_core::event::{is_placeholder_physical_id, LifecycleEvent, Properties};
use cfn_lifecycle_core::result::OperationResult;
use cfn_lifecycle_core::stack::{
    evaluate_stack, plan_nested_stack, plan_stack_update, random_suffix, resolve_stack_target,
    STACK_NAME_SUFFIX_LEN,
};

use crate::adapters::stack_service::{StackService, StackServiceFactory, UpdateOutcome};
use crate::context::InvocationContext;
use crate::error::HandlerError;
use crate::handlers::coordinator::ResourceProvider;

/// Manages a CloudFormation stack, optionally in another account or region,
/// as a custom resource of its parent stack.
pub struct NestedStackProvider {
    stacks: Arc<dyn StackServiceFactory>,
}

impl NestedStackProvider {
    pub fn new(stacks: Arc<dyn StackServiceFactory>) -> Self {
        Self { stacks }
    }

    async fn target_service(
        &self,
        event: &LifecycleEvent,
        context: &InvocationContext,
    ) -> Result<Arc<dyn StackService>, HandlerError> {
        let target = resolve_stack_target(event, context.function_region()?)?;
        Ok(self.stacks.for_target(&target).await)
    }
}

#[async_trait]
impl ResourceProvider for NestedStackProvider {
    async fn create(
        &self,
        event: &LifecycleEvent,
        context: &InvocationContext,
    ) -> Result<OperationResult, HandlerError> {
        let suffix = random_suffix(STACK_NAME_SUFFIX_LEN, &mut rand::thread_rng());
        let request = plan_nested_stack(event, &suffix)?;
        let service = self.target_service(event, context).await?;

        let parent = self
            .stacks
            .local()
            .describe_parent(&request.parent_stack_id)
            .await?;
        let stack_id = service.create_stack(&request, &parent).await?;

        tracing::info!(
            %stack_id,
            stack_name = %request.stack_name,
            "nested stack creation started"
        );
        Ok(OperationResult::pending(stack_id))
    }

    async fn update(
        &self,
        event: &LifecycleEvent,
        context: &InvocationContext,
    ) -> Result<OperationResult, HandlerError> {
        let service = self.target_service(event, context).await?;
        let request = plan_stack_update(event)?;

        match service.update_stack(&request).await? {
            UpdateOutcome::Started => {
                tracing::info!(stack_id = %request.stack_id, "nested stack update started");
            }
            UpdateOutcome::NoChanges => {
                tracing::info!(stack_id = %request.stack_id, "nested stack has no changes");
            }
        }
        Ok(OperationResult::pending(request.stack_id))
    }

    async fn delete(
        &self,
        event: &LifecycleEvent,
        context: &InvocationContext,
    ) -> Result<OperationResult, HandlerError> {
        let stack_id = event.required_physical_resource_id()?;
        if is_placeholder_physical_id(stack_id) {
            tracing::info!(
                physical_resource_id = %stack_id,
                "no stack was ever created; nothing to delete"
            );
            return Ok(OperationResult::complete(stack_id, Properties::new()));
        }

        let service = self.target_service(event, context).await?;
        service.delete_stack(stack_id).await?;
        tracing::info!(%stack_id, "nested stack deletion started");
        Ok(OperationResult::pending(stack_id))
    }

    async fn poll(
        &self,
        event: &LifecycleEvent,
        context: &InvocationContext,
    ) -> Result<OperationResult, HandlerError> {
        let stack_id = event.required_physical_resource_id()?;
        let service = self.target_service(event, context).await?;
        let snapshot = service.describe_stack(stack_id).await?;

        tracing::info!(
            %stack_id,
            status = %snapshot.status,
            "polled nested stack"
        );
        Ok(evaluate_stack(stack_id, &snapshot)?)
    }
}
