//! In-memory adapters shared by the handler tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use cfn_lifecycle_core::event::LifecycleEvent;
use cfn_lifecycle_core::poll::{rule_name_for_request, PollRegistration, DEFAULT_RULE_PREFIX};
use cfn_lifecycle_core::response::CallbackResponse;
use serde_json::{json, Value};

use super::callback::CallbackSender;
use super::poll_scheduler::PollScheduler;
use crate::context::InvocationContext;
use crate::error::{CallbackError, SchedulerError, ServiceError};

pub const PARENT_STACK_ID: &str =
    "arn:aws:cloudformation:us-east-1:123456789012:stack/parent-stack/6a1b2c3d";

/// A Create request against `PARENT_STACK_ID`; keys in `overrides` replace
/// the defaults.
pub fn sample_event(overrides: Value) -> LifecycleEvent {
    let mut raw = json!({
        "RequestType": "Create",
        "ServiceToken": "arn:aws:lambda:us-east-1:123456789012:function:provider",
        "ResponseURL": "https://cloudformation-custom-resource-response-useast1.s3.amazonaws.com/arn%3Aaws%3Acloudformation/req-1?X-Amz-Signature=abc",
        "StackId": PARENT_STACK_ID,
        "RequestId": "req-1",
        "LogicalResourceId": "Child",
        "ResourceType": "Custom::NestedStack",
        "ResourceProperties": {
            "ParentStackId": PARENT_STACK_ID,
            "TemplateURL": "https://bucket.s3.amazonaws.com/child.yaml"
        }
    });
    if let (Value::Object(base), Value::Object(overrides)) = (&mut raw, overrides) {
        base.extend(overrides);
    }
    serde_json::from_value(raw).expect("sample event should parse")
}

pub fn sample_registration(request_id: &str) -> PollRegistration {
    let rule_name = rule_name_for_request(DEFAULT_RULE_PREFIX, request_id);
    PollRegistration {
        rule_arn: format!("arn:aws:events:us-east-1:123456789012:rule/{rule_name}"),
        permission_id: rule_name,
    }
}

#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, CallbackResponse)>>,
    reject: bool,
}

impl RecordingSender {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, CallbackResponse)> {
        self.sent.lock().expect("poisoned mutex").clone()
    }

    pub fn responses(&self) -> Vec<CallbackResponse> {
        self.sent().into_iter().map(|(_, response)| response).collect()
    }
}

#[async_trait]
impl CallbackSender for RecordingSender {
    async fn send(
        &self,
        response_url: &str,
        response: &CallbackResponse,
    ) -> Result<(), CallbackError> {
        self.sent
            .lock()
            .expect("poisoned mutex")
            .push((response_url.to_string(), response.clone()));
        if self.reject {
            return Err(CallbackError::Rejected {
                status: 403,
                body: "SignatureDoesNotMatch".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingScheduler {
    registered: Mutex<Vec<LifecycleEvent>>,
    deregistered: Mutex<Vec<PollRegistration>>,
    deregistered_requests: Mutex<Vec<String>>,
    fail_register: bool,
    stall_register: bool,
    fail_deregister: bool,
}

impl RecordingScheduler {
    pub fn failing_register() -> Self {
        Self {
            fail_register: true,
            ..Self::default()
        }
    }

    /// Records the registration as started, then never finishes it.
    pub fn stalling_register() -> Self {
        Self {
            stall_register: true,
            ..Self::default()
        }
    }

    pub fn failing_deregister() -> Self {
        Self {
            fail_deregister: true,
            ..Self::default()
        }
    }

    pub fn registered(&self) -> Vec<LifecycleEvent> {
        self.registered.lock().expect("poisoned mutex").clone()
    }

    pub fn deregistered(&self) -> Vec<PollRegistration> {
        self.deregistered.lock().expect("poisoned mutex").clone()
    }

    pub fn deregistered_requests(&self) -> Vec<String> {
        self.deregistered_requests
            .lock()
            .expect("poisoned mutex")
            .clone()
    }
}

fn throttled(operation: &'static str) -> ServiceError {
    ServiceError::Sdk {
        service: "events",
        operation,
        code: Some("ThrottlingException".to_string()),
        message: "Rate exceeded".to_string(),
    }
}

#[async_trait]
impl PollScheduler for RecordingScheduler {
    async fn register(
        &self,
        event: &LifecycleEvent,
        _context: &InvocationContext,
    ) -> Result<PollRegistration, SchedulerError> {
        if self.fail_register {
            return Err(throttled("PutRule").into());
        }
        self.registered
            .lock()
            .expect("poisoned mutex")
            .push(event.clone());
        if self.stall_register {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(sample_registration(&event.request_id))
    }

    async fn deregister(
        &self,
        registration: &PollRegistration,
        _context: &InvocationContext,
    ) -> Result<(), SchedulerError> {
        self.deregistered
            .lock()
            .expect("poisoned mutex")
            .push(registration.clone());
        if self.fail_deregister {
            return Err(throttled("RemoveTargets").into());
        }
        Ok(())
    }

    async fn deregister_request(
        &self,
        request_id: &str,
        _context: &InvocationContext,
    ) -> Result<(), SchedulerError> {
        self.deregistered_requests
            .lock()
            .expect("poisoned mutex")
            .push(request_id.to_string());
        Ok(())
    }
}
