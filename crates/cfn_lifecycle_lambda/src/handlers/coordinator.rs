//! Drives one custom resource invocation: dispatch to the provider, arrange
//! polling for pending work, and send exactly one callback for settled work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cfn_lifecycle_core::deadline::{watchdog_delay, TIMEOUT_REASON};
use cfn_lifecycle_core::event::{LifecycleEvent, Properties, RequestType};
use cfn_lifecycle_core::response::CallbackStatus;
use cfn_lifecycle_core::result::{Completion, OperationResult};
use serde::Serialize;

use crate::adapters::callback::CallbackReporter;
use crate::adapters::poll_scheduler::PollScheduler;
use crate::context::InvocationContext;
use crate::error::{HandlerError, InitializationError, LifecycleError};

#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn create(
        &self,
        event: &LifecycleEvent,
        context: &InvocationContext,
    ) -> Result<OperationResult, HandlerError>;

    async fn update(
        &self,
        event: &LifecycleEvent,
        context: &InvocationContext,
    ) -> Result<OperationResult, HandlerError>;

    async fn delete(
        &self,
        event: &LifecycleEvent,
        context: &InvocationContext,
    ) -> Result<OperationResult, HandlerError>;

    /// Re-checks pending work on a poll tick.
    async fn poll(
        &self,
        _event: &LifecycleEvent,
        _context: &InvocationContext,
    ) -> Result<OperationResult, HandlerError> {
        Err(HandlerError::Unsupported(
            "this resource does not support polling",
        ))
    }
}

/// What an invocation did, returned to the Lambda runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvocationOutcome {
    Succeeded,
    Failed { reason: String },
    Pending,
    Delegated,
    TimedOut,
}

pub struct LifecycleCoordinator {
    reporter: CallbackReporter,
    scheduler: Arc<dyn PollScheduler>,
    init_failure: Option<InitializationError>,
}

impl LifecycleCoordinator {
    pub fn new(reporter: CallbackReporter, scheduler: Arc<dyn PollScheduler>) -> Self {
        Self {
            reporter,
            scheduler,
            init_failure: None,
        }
    }

    /// Records a cold-start failure; every invocation then reports it.
    pub fn with_initialization_failure(mut self, failure: Option<InitializationError>) -> Self {
        self.init_failure = failure;
        self
    }

    pub async fn handle(
        &self,
        event: &LifecycleEvent,
        context: &InvocationContext,
        provider: &dyn ResourceProvider,
    ) -> Result<InvocationOutcome, LifecycleError> {
        if let Some(failure) = &self.init_failure {
            tracing::error!(%failure, "initialization failed; reporting FAILED");
            let reason = failure.to_string();
            self.report_failure(event, context, &reason).await?;
            return Err(LifecycleError::Initialization(failure.clone()));
        }

        let delay = watchdog_delay(context.remaining_time);
        tracing::debug!(
            request_type = ?event.request_type,
            poll = event.poll,
            watchdog_ms = delay.as_millis() as u64,
            "dispatching"
        );

        let registering = AtomicBool::new(false);
        let settled = tokio::select! {
            biased;
            result = self.run_operation(event, context, provider, &registering) => Some(result),
            () = tokio::time::sleep(delay) => None,
        };

        match settled {
            None => {
                tracing::error!("execution timed out before the operation settled");
                self.report_failure(event, context, TIMEOUT_REASON).await?;
                if registering.load(Ordering::SeqCst) {
                    self.release_interrupted_registration(event, context).await;
                } else {
                    self.release_registration(event, context).await;
                }
                Ok(InvocationOutcome::TimedOut)
            }
            Some(Ok(result)) => self.settle(event, context, result).await,
            Some(Err(error)) => {
                tracing::error!(%error, "operation failed");
                self.release_registration(event, context).await;
                let reason = error.to_string();
                self.report_failure(event, context, &reason).await?;
                Ok(InvocationOutcome::Failed { reason })
            }
        }
    }

    async fn run_operation(
        &self,
        event: &LifecycleEvent,
        context: &InvocationContext,
        provider: &dyn ResourceProvider,
        registering: &AtomicBool,
    ) -> Result<OperationResult, HandlerError> {
        let result = if event.poll {
            provider.poll(event, context).await?
        } else {
            match event.request_type {
                RequestType::Create => provider.create(event, context).await?,
                RequestType::Update => provider.update(event, context).await?,
                RequestType::Delete => provider.delete(event, context).await?,
                RequestType::Unsupported => return Err(HandlerError::UnsupportedRequestType),
            }
        };

        if result.completion == Completion::Pending && event.poll_registration().is_none() {
            let mut payload = event.clone();
            payload.mark_polling(&result.physical_resource_id);
            registering.store(true, Ordering::SeqCst);
            self.scheduler.register(&payload, context).await?;
        }
        Ok(result)
    }

    async fn settle(
        &self,
        event: &LifecycleEvent,
        context: &InvocationContext,
        result: OperationResult,
    ) -> Result<InvocationOutcome, LifecycleError> {
        match result.completion {
            Completion::Pending => {
                tracing::info!(
                    physical_resource_id = %result.physical_resource_id,
                    "operation in progress; waiting for the next poll"
                );
                Ok(InvocationOutcome::Pending)
            }
            Completion::Delegated => {
                tracing::info!(
                    physical_resource_id = %result.physical_resource_id,
                    "operation handed off; the delegate signals CloudFormation"
                );
                Ok(InvocationOutcome::Delegated)
            }
            Completion::Complete => {
                self.release_registration(event, context).await;
                let physical_resource_id = result.physical_resource_id.clone();
                self.reporter
                    .report(
                        event,
                        context,
                        CallbackStatus::Success,
                        result.into_reportable_data(),
                        Some(&physical_resource_id),
                        None,
                    )
                    .await?;
                Ok(InvocationOutcome::Succeeded)
            }
        }
    }

    async fn report_failure(
        &self,
        event: &LifecycleEvent,
        context: &InvocationContext,
        reason: &str,
    ) -> Result<(), LifecycleError> {
        self.reporter
            .report(
                event,
                context,
                CallbackStatus::Failed,
                Properties::new(),
                None,
                Some(reason),
            )
            .await?;
        Ok(())
    }

    /// Best effort: a leftover rule only re-delivers an event whose
    /// CloudFormation request is already settled.
    async fn release_registration(&self, event: &LifecycleEvent, context: &InvocationContext) {
        let Some(registration) = event.poll_registration() else {
            return;
        };
        if let Err(error) = self.scheduler.deregister(&registration, context).await {
            tracing::warn!(
                %error,
                rule_arn = %registration.rule_arn,
                "failed to remove poll registration"
            );
        }
    }

    /// A registration cut off by the watchdog may have created a rule without
    /// a target, which no poll tick would ever remove.
    async fn release_interrupted_registration(
        &self,
        event: &LifecycleEvent,
        context: &InvocationContext,
    ) {
        if let Err(error) = self
            .scheduler
            .deregister_request(&event.request_id, context)
            .await
        {
            tracing::warn!(
                %error,
                request_id = %event.request_id,
                "failed to remove interrupted poll registration"
            );
        }
    }
}
