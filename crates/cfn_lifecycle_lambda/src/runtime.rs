//! Cold-start wiring shared by the Lambda binaries.

use std::sync::Arc;

use aws_config::{BehaviorVersion, SdkConfig};
use cfn_lifecycle_core::event::LifecycleEvent;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use tracing::Instrument;

use crate::adapters::callback::{CallbackReporter, HttpCallbackSender};
use crate::adapters::poll_scheduler::EventBridgePollScheduler;
use crate::config::RuntimeConfig;
use crate::context::InvocationContext;
use crate::error::InitializationError;
use crate::handlers::coordinator::{LifecycleCoordinator, ResourceProvider};
use crate::observability::{init_logging, invocation_span, LogLevelHandle};

/// State built once per execution environment.
pub struct ColdStart {
    pub config: RuntimeConfig,
    pub sdk_config: SdkConfig,
    pub log_handle: LogLevelHandle,
    init_failure: Option<InitializationError>,
}

impl ColdStart {
    /// Loads configuration and AWS settings. An invalid configuration is kept
    /// as the failure every invocation reports, not a crash.
    pub async fn load() -> Self {
        let (config, init_failure) = match RuntimeConfig::from_env() {
            Ok(config) => (config, None),
            Err(error) => (RuntimeConfig::default(), Some(InitializationError::from(error))),
        };
        let log_handle = init_logging(config.log_format, &config.log_level);
        if let Some(failure) = &init_failure {
            tracing::error!(%failure, "invalid configuration; invocations will report FAILED");
        }

        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self {
            config,
            sdk_config,
            log_handle,
            init_failure,
        }
    }

    pub fn coordinator(&self) -> Result<LifecycleCoordinator, Error> {
        let scheduler = EventBridgePollScheduler::new(
            aws_sdk_eventbridge::Client::new(&self.sdk_config),
            aws_sdk_lambda::Client::new(&self.sdk_config),
            self.config.poll.clone(),
        );
        let reporter = CallbackReporter::new(Arc::new(HttpCallbackSender::new()?));

        Ok(LifecycleCoordinator::new(reporter, Arc::new(scheduler))
            .with_initialization_failure(self.init_failure.clone()))
    }
}

/// Runs the Lambda event loop, one coordinated invocation per event.
pub async fn serve(
    cold_start: ColdStart,
    provider: impl ResourceProvider,
) -> Result<(), Error> {
    let coordinator = cold_start.coordinator()?;
    let coordinator = &coordinator;
    let provider = &provider;
    let log_handle = &cold_start.log_handle;

    lambda_runtime::run(service_fn(
        move |event: LambdaEvent<LifecycleEvent>| async move {
            let context = InvocationContext::from_lambda(&event.context);
            let request = event.payload;
            log_handle.apply_resource_override(&request.resource_properties);

            let span = invocation_span(&request.request_id, &context.aws_request_id);
            coordinator
                .handle(&request, &context, provider)
                .instrument(span)
                .await
                .map_err(Error::from)
        },
    ))
    .await
}
