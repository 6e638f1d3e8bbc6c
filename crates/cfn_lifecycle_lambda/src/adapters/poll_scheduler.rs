//! The EventBridge schedule that re-invokes a provider while an operation is
//! pending.
//!
//! Rule names derive from the CloudFormation request id, so a retried
//! registration finds the rule and permission it created earlier.

use async_trait::async_trait;
use aws_sdk_eventbridge::types::{RuleState, Target};
use cfn_lifecycle_core::event::LifecycleEvent;
use cfn_lifecycle_core::poll::{
    rule_name_for_request, target_function_arn, PollRegistration, EVENTS_PRINCIPAL,
    INVOKE_ACTION, POLL_TARGET_ID,
};

use crate::config::PollSettings;
use crate::context::InvocationContext;
use crate::error::{SchedulerError, ServiceError};

const EVENTS: &str = "events";
const LAMBDA: &str = "lambda";

#[async_trait]
pub trait PollScheduler: Send + Sync {
    /// Creates the trigger re-delivering `event` (already marked as polling)
    /// to this function. The delivered payload carries the registration.
    async fn register(
        &self,
        event: &LifecycleEvent,
        context: &InvocationContext,
    ) -> Result<PollRegistration, SchedulerError>;

    /// Removes the trigger. Parts that are already gone count as removed.
    async fn deregister(
        &self,
        registration: &PollRegistration,
        context: &InvocationContext,
    ) -> Result<(), SchedulerError>;

    /// Removes whatever an interrupted `register` left behind for
    /// `request_id`, finished or not.
    async fn deregister_request(
        &self,
        request_id: &str,
        context: &InvocationContext,
    ) -> Result<(), SchedulerError>;
}

/// The individual EventBridge and Lambda calls a registration is made of.
#[async_trait]
pub trait ScheduleApi: Send + Sync {
    /// Returns the rule ARN.
    async fn put_rule(
        &self,
        rule_name: &str,
        schedule_expression: &str,
        description: &str,
    ) -> Result<String, ServiceError>;

    async fn add_permission(
        &self,
        function_name: &str,
        statement_id: &str,
        rule_arn: &str,
    ) -> Result<(), ServiceError>;

    async fn put_target(
        &self,
        rule_name: &str,
        function_arn: &str,
        input: String,
    ) -> Result<(), ServiceError>;

    async fn remove_target(&self, rule_name: &str) -> Result<(), ServiceError>;

    async fn remove_permission(
        &self,
        function_name: &str,
        statement_id: &str,
    ) -> Result<(), ServiceError>;

    async fn delete_rule(&self, rule_name: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone)]
pub struct AwsScheduleApi {
    events: aws_sdk_eventbridge::Client,
    lambda: aws_sdk_lambda::Client,
}

#[async_trait]
impl ScheduleApi for AwsScheduleApi {
    async fn put_rule(
        &self,
        rule_name: &str,
        schedule_expression: &str,
        description: &str,
    ) -> Result<String, ServiceError> {
        let output = self
            .events
            .put_rule()
            .name(rule_name)
            .schedule_expression(schedule_expression)
            .state(RuleState::Enabled)
            .description(description)
            .send()
            .await
            .map_err(|error| ServiceError::from_sdk(EVENTS, "PutRule", &error))?;

        output
            .rule_arn()
            .map(str::to_string)
            .ok_or(ServiceError::MissingField {
                service: EVENTS,
                operation: "PutRule",
                field: "RuleArn",
            })
    }

    async fn add_permission(
        &self,
        function_name: &str,
        statement_id: &str,
        rule_arn: &str,
    ) -> Result<(), ServiceError> {
        self.lambda
            .add_permission()
            .function_name(function_name)
            .statement_id(statement_id)
            .action(INVOKE_ACTION)
            .principal(EVENTS_PRINCIPAL)
            .source_arn(rule_arn)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| ServiceError::from_sdk(LAMBDA, "AddPermission", &error))
    }

    async fn put_target(
        &self,
        rule_name: &str,
        function_arn: &str,
        input: String,
    ) -> Result<(), ServiceError> {
        let target = Target::builder()
            .id(POLL_TARGET_ID)
            .arn(function_arn)
            .input(input)
            .build()
            .map_err(|error| ServiceError::InvalidRequest {
                service: EVENTS,
                operation: "PutTargets",
                message: error.to_string(),
            })?;

        let output = self
            .events
            .put_targets()
            .rule(rule_name)
            .targets(target)
            .send()
            .await
            .map_err(|error| ServiceError::from_sdk(EVENTS, "PutTargets", &error))?;

        match output.failed_entries().first() {
            Some(entry) => Err(ServiceError::Sdk {
                service: EVENTS,
                operation: "PutTargets",
                code: entry.error_code().map(str::to_string),
                message: entry
                    .error_message()
                    .unwrap_or("target was rejected")
                    .to_string(),
            }),
            None => Ok(()),
        }
    }

    async fn remove_target(&self, rule_name: &str) -> Result<(), ServiceError> {
        self.events
            .remove_targets()
            .rule(rule_name)
            .ids(POLL_TARGET_ID)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| ServiceError::from_sdk(EVENTS, "RemoveTargets", &error))
    }

    async fn remove_permission(
        &self,
        function_name: &str,
        statement_id: &str,
    ) -> Result<(), ServiceError> {
        self.lambda
            .remove_permission()
            .function_name(function_name)
            .statement_id(statement_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| ServiceError::from_sdk(LAMBDA, "RemovePermission", &error))
    }

    async fn delete_rule(&self, rule_name: &str) -> Result<(), ServiceError> {
        self.events
            .delete_rule()
            .name(rule_name)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| ServiceError::from_sdk(EVENTS, "DeleteRule", &error))
    }
}

#[derive(Debug, Clone)]
pub struct EventBridgePollScheduler<A = AwsScheduleApi> {
    api: A,
    settings: PollSettings,
}

impl EventBridgePollScheduler {
    pub fn new(
        events: aws_sdk_eventbridge::Client,
        lambda: aws_sdk_lambda::Client,
        settings: PollSettings,
    ) -> Self {
        Self::with_api(AwsScheduleApi { events, lambda }, settings)
    }
}

impl<A: ScheduleApi> EventBridgePollScheduler<A> {
    pub fn with_api(api: A, settings: PollSettings) -> Self {
        Self { api, settings }
    }

    async fn grant_invoke(
        &self,
        registration: &PollRegistration,
        context: &InvocationContext,
    ) -> Result<(), ServiceError> {
        let result = self
            .api
            .add_permission(
                &context.function_name,
                &registration.permission_id,
                &registration.rule_arn,
            )
            .await;

        match result {
            Err(error) if error.is_conflict() => {
                tracing::debug!(
                    statement_id = %registration.permission_id,
                    "invoke permission already present"
                );
                Ok(())
            }
            other => other,
        }
    }

    async fn attach_target(
        &self,
        rule_name: &str,
        event: &LifecycleEvent,
        registration: &PollRegistration,
        context: &InvocationContext,
    ) -> Result<(), SchedulerError> {
        let mut payload = event.clone();
        payload.attach_poll_registration(registration);
        let input = serde_json::to_string(&payload)?;
        let function_arn = target_function_arn(&registration.rule_arn, &context.function_name)?;

        self.api
            .put_target(rule_name, &function_arn, input)
            .await?;
        Ok(())
    }

    async fn remove_parts(
        &self,
        rule_name: &str,
        permission_id: &str,
        context: &InvocationContext,
    ) -> Result<(), ServiceError> {
        tolerate_not_found(self.api.remove_target(rule_name).await)?;
        tolerate_not_found(
            self.api
                .remove_permission(&context.function_name, permission_id)
                .await,
        )?;
        tolerate_not_found(self.api.delete_rule(rule_name).await)
    }

    /// Undoes a partial registration. Failures are only logged; the original
    /// error is what the caller reports.
    async fn roll_back(
        &self,
        rule_name: &str,
        registration: &PollRegistration,
        context: &InvocationContext,
    ) {
        if let Err(error) = self
            .remove_parts(rule_name, &registration.permission_id, context)
            .await
        {
            tracing::warn!(%error, rule_arn = %registration.rule_arn, "poll registration rollback failed");
        }
    }
}

#[async_trait]
impl<A: ScheduleApi> PollScheduler for EventBridgePollScheduler<A> {
    async fn register(
        &self,
        event: &LifecycleEvent,
        context: &InvocationContext,
    ) -> Result<PollRegistration, SchedulerError> {
        let rule_name = rule_name_for_request(&self.settings.rule_prefix, &event.request_id);
        let rule_arn = self
            .api
            .put_rule(
                &rule_name,
                &self.settings.schedule_expression,
                &format!("Polls custom resource request {}", event.request_id),
            )
            .await?;
        let registration = PollRegistration {
            rule_arn,
            permission_id: rule_name.clone(),
        };

        if let Err(error) = self.grant_invoke(&registration, context).await {
            self.roll_back(&rule_name, &registration, context).await;
            return Err(error.into());
        }
        if let Err(error) = self
            .attach_target(&rule_name, event, &registration, context)
            .await
        {
            self.roll_back(&rule_name, &registration, context).await;
            return Err(error);
        }

        tracing::info!(
            rule_arn = %registration.rule_arn,
            schedule = %self.settings.schedule_expression,
            "poll registration created"
        );
        Ok(registration)
    }

    async fn deregister(
        &self,
        registration: &PollRegistration,
        context: &InvocationContext,
    ) -> Result<(), SchedulerError> {
        let rule_name = registration.rule_name()?;
        self.remove_parts(rule_name, &registration.permission_id, context)
            .await?;

        tracing::info!(rule_arn = %registration.rule_arn, "poll registration removed");
        Ok(())
    }

    async fn deregister_request(
        &self,
        request_id: &str,
        context: &InvocationContext,
    ) -> Result<(), SchedulerError> {
        let rule_name = rule_name_for_request(&self.settings.rule_prefix, request_id);
        self.remove_parts(&rule_name, &rule_name, context).await?;

        tracing::info!(%rule_name, "interrupted poll registration removed");
        Ok(())
    }
}

fn tolerate_not_found(result: Result<(), ServiceError>) -> Result<(), ServiceError> {
    match result {
        Err(error) if error.is_not_found() => {
            tracing::debug!(%error, "already removed");
            Ok(())
        }
        other => other,
    }
}
