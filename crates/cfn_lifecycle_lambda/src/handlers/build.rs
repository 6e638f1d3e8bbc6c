use std::sync::Arc;

use async_trait::async_trait;
use cfn_lifecycle_core::error::ValidationError;
use cfn_lifecycle_core::event::{LifecycleEvent, Properties};
use cfn_lifecycle_core::result::OperationResult;
use reqwest::Url;

use crate::adapters::build_service::BuildService;
use crate::context::InvocationContext;
use crate::error::HandlerError;
use crate::handlers::coordinator::ResourceProvider;

pub const BUILD_PROJECT_PROPERTY: &str = "BuildProjectName";

/// Starts a build that signals CloudFormation itself through the response
/// URL passed in its environment.
pub struct BuildProvider {
    builds: Arc<dyn BuildService>,
}

impl BuildProvider {
    pub fn new(builds: Arc<dyn BuildService>) -> Self {
        Self { builds }
    }

    async fn start(&self, event: &LifecycleEvent) -> Result<OperationResult, HandlerError> {
        let project = event.required_property(BUILD_PROJECT_PROPERTY)?;
        let environment = signal_environment(event)?;
        let build_id = self.builds.start_build(project, &environment).await?;

        tracing::info!(%project, %build_id, "build started; it will signal CloudFormation");
        Ok(OperationResult::delegated(build_id))
    }
}

/// Everything the build needs to PUT its own callback.
pub fn signal_environment(event: &LifecycleEvent) -> Result<Vec<(String, String)>, HandlerError> {
    let url = Url::parse(&event.response_url)
        .map_err(|_| ValidationError::MalformedResponseUrl(event.response_url.clone()))?;

    Ok([
        ("url_path", url.path()),
        ("url_query", url.query().unwrap_or_default()),
        ("cfn_signal_url", event.response_url.as_str()),
        ("cfn_stack_id", event.stack_id.as_str()),
        ("cfn_request_id", event.request_id.as_str()),
        ("cfn_logical_resource_id", event.logical_resource_id.as_str()),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect())
}

#[async_trait]
impl ResourceProvider for BuildProvider {
    async fn create(
        &self,
        event: &LifecycleEvent,
        _context: &InvocationContext,
    ) -> Result<OperationResult, HandlerError> {
        self.start(event).await
    }

    async fn update(
        &self,
        event: &LifecycleEvent,
        _context: &InvocationContext,
    ) -> Result<OperationResult, HandlerError> {
        self.start(event).await
    }

    async fn delete(
        &self,
        event: &LifecycleEvent,
        context: &InvocationContext,
    ) -> Result<OperationResult, HandlerError> {
        let physical_resource_id = event
            .physical_resource_id
            .clone()
            .unwrap_or_else(|| context.log_stream_name.clone());
        tracing::info!("nothing to clean up for build resources");
        Ok(OperationResult::complete(
            physical_resource_id,
            Properties::new(),
        ))
    }
}
