use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cfn_lifecycle_core::event::{LifecycleEvent, Properties};
use cfn_lifecycle_core::response::{build_callback_response, CallbackResponse, CallbackStatus};
use reqwest::header::CONTENT_TYPE;

use crate::context::InvocationContext;
use crate::error::CallbackError;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait CallbackSender: Send + Sync {
    async fn send(&self, response_url: &str, response: &CallbackResponse)
        -> Result<(), CallbackError>;
}

/// PUTs the response to the pre-signed S3 URL CloudFormation supplied.
#[derive(Debug, Clone)]
pub struct HttpCallbackSender {
    client: reqwest::Client,
}

impl HttpCallbackSender {
    pub fn new() -> Result<Self, CallbackError> {
        let client = client_builder().build()?;
        Ok(Self { client })
    }
}

fn client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder().timeout(CALLBACK_TIMEOUT)
}

#[async_trait]
impl CallbackSender for HttpCallbackSender {
    async fn send(
        &self,
        response_url: &str,
        response: &CallbackResponse,
    ) -> Result<(), CallbackError> {
        let body = serde_json::to_vec(response)?;
        // The URL is signed without a content type, so the header must be empty.
        let reply = self
            .client
            .put(response_url)
            .header(CONTENT_TYPE, "")
            .body(body)
            .send()
            .await?;

        let status = reply.status();
        if status.is_success() {
            return Ok(());
        }
        let body = reply.text().await.unwrap_or_default();
        Err(CallbackError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Formats and delivers the single status callback of an invocation.
#[derive(Clone)]
pub struct CallbackReporter {
    sender: Arc<dyn CallbackSender>,
}

impl CallbackReporter {
    pub fn new(sender: Arc<dyn CallbackSender>) -> Self {
        Self { sender }
    }

    pub async fn report(
        &self,
        event: &LifecycleEvent,
        context: &InvocationContext,
        status: CallbackStatus,
        data: Properties,
        physical_resource_id: Option<&str>,
        reason: Option<&str>,
    ) -> Result<(), CallbackError> {
        let response = build_callback_response(
            event,
            &context.log_stream_name,
            status,
            data,
            physical_resource_id,
            reason,
        );
        tracing::info!(
            status = ?response.status,
            physical_resource_id = %response.physical_resource_id,
            reason = %response.reason,
            "sending callback"
        );

        match self.sender.send(&event.response_url, &response).await {
            Ok(()) => {
                tracing::debug!("callback delivered");
                Ok(())
            }
            Err(error) => {
                tracing::error!(%error, "callback delivery failed");
                Err(error)
            }
        }
    }
}
