use serde::{Deserialize, Serialize};

use crate::event::{LifecycleEvent, Properties};

/// CloudFormation keeps only a short reason; the rest lives in the logs.
pub const MAX_REASON_CHARS: usize = 255;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackStatus {
    Success,
    Failed,
}

/// Body PUT to the pre-signed `ResponseURL`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackResponse {
    pub status: CallbackStatus,
    pub reason: String,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Properties>,
}

pub fn log_pointer(log_stream_name: &str) -> String {
    format!("See details in CloudWatch Log Stream: {log_stream_name}")
}

pub fn format_reason(reason: Option<&str>, log_stream_name: &str) -> String {
    let pointer = log_pointer(log_stream_name);
    match reason {
        Some(reason) if !reason.is_empty() => {
            let truncated: String = reason.chars().take(MAX_REASON_CHARS).collect();
            format!("{truncated}... {pointer}")
        }
        _ => pointer,
    }
}

pub fn build_callback_response(
    event: &LifecycleEvent,
    log_stream_name: &str,
    status: CallbackStatus,
    data: Properties,
    physical_resource_id: Option<&str>,
    reason: Option<&str>,
) -> CallbackResponse {
    let physical_resource_id = physical_resource_id
        .filter(|value| !value.is_empty())
        .or_else(|| {
            event
                .physical_resource_id
                .as_deref()
                .filter(|value| !value.is_empty())
        })
        .unwrap_or(log_stream_name)
        .to_string();

    CallbackResponse {
        status,
        reason: format_reason(reason, log_stream_name),
        physical_resource_id,
        stack_id: event.stack_id.clone(),
        request_id: event.request_id.clone(),
        logical_resource_id: event.logical_resource_id.clone(),
        data: (!data.is_empty()).then_some(data),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::event::RequestType;

    const LOG_STREAM: &str = "2024/05/01/[$LATEST]0123456789abcdef";

    fn sample_event(physical_resource_id: Option<&str>) -> LifecycleEvent {
        LifecycleEvent {
            request_type: RequestType::Update,
            stack_id: "arn:aws:cloudformation:us-east-1:1:stack/parent/guid".to_string(),
            request_id: "req-7".to_string(),
            logical_resource_id: "Nested".to_string(),
            physical_resource_id: physical_resource_id.map(str::to_string),
            resource_type: None,
            response_url: "https://example.com/callback".to_string(),
            resource_properties: Properties::new(),
            old_resource_properties: None,
            poll: false,
            poll_rule_arn: None,
            poll_permission_id: None,
            extra: Properties::new(),
        }
    }

    #[test]
    fn reason_defaults_to_log_pointer() {
        assert_eq!(
            format_reason(None, "stream"),
            "See details in CloudWatch Log Stream: stream"
        );
    }

    #[test]
    fn reason_is_truncated_by_characters() {
        let long = "é".repeat(400);
        let reason = format_reason(Some(&long), "stream");

        let (head, tail) = reason.split_once("... ").expect("separator present");
        assert_eq!(head.chars().count(), MAX_REASON_CHARS);
        assert_eq!(tail, "See details in CloudWatch Log Stream: stream");
    }

    #[test]
    fn physical_id_prefers_explicit_then_event_then_log_stream() {
        let with_event_id = sample_event(Some("stack-id"));
        let without_id = sample_event(None);

        let explicit = build_callback_response(
            &with_event_id,
            LOG_STREAM,
            CallbackStatus::Success,
            Properties::new(),
            Some("new-id"),
            None,
        );
        let inherited = build_callback_response(
            &with_event_id,
            LOG_STREAM,
            CallbackStatus::Success,
            Properties::new(),
            Some(""),
            None,
        );
        let fallback = build_callback_response(
            &without_id,
            LOG_STREAM,
            CallbackStatus::Failed,
            Properties::new(),
            None,
            Some("boom"),
        );

        assert_eq!(explicit.physical_resource_id, "new-id");
        assert_eq!(inherited.physical_resource_id, "stack-id");
        assert_eq!(fallback.physical_resource_id, LOG_STREAM);
    }

    #[test]
    fn wire_shape_matches_cloudformation_schema() {
        let mut data = Properties::new();
        data.insert("Url".to_string(), json!("http://x"));
        let response = build_callback_response(
            &sample_event(Some("stack-id")),
            "stream",
            CallbackStatus::Success,
            data,
            None,
            None,
        );

        let encoded = serde_json::to_value(&response).expect("response should encode");
        assert_eq!(
            encoded,
            json!({
                "Status": "SUCCESS",
                "Reason": "See details in CloudWatch Log Stream: stream",
                "PhysicalResourceId": "stack-id",
                "StackId": "arn:aws:cloudformation:us-east-1:1:stack/parent/guid",
                "RequestId": "req-7",
                "LogicalResourceId": "Nested",
                "Data": {"Url": "http://x"}
            })
        );
    }

    #[test]
    fn empty_data_is_omitted() {
        let response = build_callback_response(
            &sample_event(None),
            "stream",
            CallbackStatus::Failed,
            Properties::new(),
            None,
            Some("Execution timed out"),
        );

        let encoded = serde_json::to_value(&response).expect("response should encode");
        assert_eq!(encoded.get("Data"), None::<&Value>);
        assert_eq!(encoded["Status"], json!("FAILED"));
    }
}
