use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::poll::PollRegistration;

pub type Properties = Map<String, Value>;

/// Marker CloudFormation embeds in log-stream-derived placeholder ids.
pub const PLACEHOLDER_ID_MARKER: &str = "[$LATEST]";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestType {
    Create,
    Update,
    Delete,
    #[serde(other)]
    Unsupported,
}

/// A CloudFormation custom resource request, optionally augmented with the
/// identifiers of the poll trigger that re-delivers it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleEvent {
    pub request_type: RequestType,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    #[serde(default)]
    pub resource_properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_resource_properties: Option<Properties>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub poll: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_rule_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_permission_id: Option<String>,
    /// Keys the coordinator does not interpret (e.g. `ServiceToken`).
    #[serde(flatten)]
    pub extra: Properties,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl LifecycleEvent {
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.resource_properties.get(key)
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.property(key).and_then(Value::as_str)
    }

    pub fn required_property(&self, key: &str) -> Result<&str, ValidationError> {
        match self.property(key) {
            None | Some(Value::Null) => Err(ValidationError::MissingProperty(key.to_string())),
            Some(Value::String(value)) if !value.trim().is_empty() => Ok(value),
            Some(_) => Err(ValidationError::invalid_property(
                key,
                "must be a non-empty string",
            )),
        }
    }

    pub fn old_property_str(&self, key: &str) -> Option<&str> {
        self.old_resource_properties
            .as_ref()
            .and_then(|properties| properties.get(key))
            .and_then(Value::as_str)
    }

    pub fn required_physical_resource_id(&self) -> Result<&str, ValidationError> {
        self.physical_resource_id
            .as_deref()
            .filter(|value| !value.is_empty())
            .ok_or(ValidationError::MissingPhysicalResourceId)
    }

    /// Registration attached by a previous invocation, when both identifiers
    /// are present.
    pub fn poll_registration(&self) -> Option<PollRegistration> {
        match (&self.poll_rule_arn, &self.poll_permission_id) {
            (Some(rule_arn), Some(permission_id)) => Some(PollRegistration {
                rule_arn: rule_arn.clone(),
                permission_id: permission_id.clone(),
            }),
            _ => None,
        }
    }

    /// Turns the event into the payload future poll ticks re-deliver.
    pub fn mark_polling(&mut self, physical_resource_id: &str) {
        self.poll = true;
        self.physical_resource_id = Some(physical_resource_id.to_string());
    }

    pub fn attach_poll_registration(&mut self, registration: &PollRegistration) {
        self.poll_rule_arn = Some(registration.rule_arn.clone());
        self.poll_permission_id = Some(registration.permission_id.clone());
    }
}

/// True for ids CloudFormation received when a create failed before any
/// resource existed (the reporter falls back to the log stream name).
pub fn is_placeholder_physical_id(physical_resource_id: &str) -> bool {
    physical_resource_id.contains(PLACEHOLDER_ID_MARKER)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn create_event_json() -> Value {
        json!({
            "RequestType": "Create",
            "ServiceToken": "arn:aws:lambda:us-east-1:123456789012:function:provider",
            "ResponseURL": "https://cloudformation-custom-resource-response.s3.amazonaws.com/path?sig=abc",
            "StackId": "arn:aws:cloudformation:us-east-1:123456789012:stack/parent/guid",
            "RequestId": "req-1",
            "LogicalResourceId": "Nested",
            "ResourceType": "Custom::NestedStack",
            "ResourceProperties": {
                "ServiceToken": "arn:aws:lambda:us-east-1:123456789012:function:provider",
                "TemplateURL": "https://bucket.s3.amazonaws.com/child.yaml",
                "CfnParameters": {"Env": "prod"}
            }
        })
    }

    #[test]
    fn decodes_cloudformation_request() {
        let event: LifecycleEvent =
            serde_json::from_value(create_event_json()).expect("event should parse");

        assert_eq!(event.request_type, RequestType::Create);
        assert_eq!(event.request_id, "req-1");
        assert!(event.physical_resource_id.is_none());
        assert!(!event.poll);
        assert_eq!(
            event.property_str("TemplateURL"),
            Some("https://bucket.s3.amazonaws.com/child.yaml")
        );
        assert!(event.extra.contains_key("ServiceToken"));
    }

    #[test]
    fn unknown_request_type_is_unsupported() {
        let mut raw = create_event_json();
        raw["RequestType"] = json!("Rollback");

        let event: LifecycleEvent = serde_json::from_value(raw).expect("event should parse");
        assert_eq!(event.request_type, RequestType::Unsupported);
    }

    #[test]
    fn poll_payload_round_trips_with_registration() {
        let mut event: LifecycleEvent =
            serde_json::from_value(create_event_json()).expect("event should parse");
        event.mark_polling("arn:aws:cloudformation:us-east-1:123456789012:stack/child/guid");
        event.attach_poll_registration(&PollRegistration {
            rule_arn: "arn:aws:events:us-east-1:123456789012:rule/CfnLifecyclePoll-abc".to_string(),
            permission_id: "CfnLifecyclePoll-abc".to_string(),
        });

        let encoded = serde_json::to_value(&event).expect("event should encode");
        assert_eq!(encoded["Poll"], json!(true));
        assert_eq!(encoded["PollPermissionId"], json!("CfnLifecyclePoll-abc"));
        assert_eq!(encoded["ServiceToken"], create_event_json()["ServiceToken"]);

        let decoded: LifecycleEvent = serde_json::from_value(encoded).expect("event should parse");
        assert_eq!(decoded, event);
        assert!(decoded.poll_registration().is_some());
    }

    #[test]
    fn fresh_event_omits_poll_keys() {
        let event: LifecycleEvent =
            serde_json::from_value(create_event_json()).expect("event should parse");
        let encoded = serde_json::to_value(&event).expect("event should encode");

        assert!(encoded.get("Poll").is_none());
        assert!(encoded.get("PollRuleArn").is_none());
    }

    #[test]
    fn required_property_rejects_missing_and_blank_values() {
        let mut event: LifecycleEvent =
            serde_json::from_value(create_event_json()).expect("event should parse");
        event
            .resource_properties
            .insert("Blank".to_string(), json!("  "));

        assert_eq!(
            event.required_property("ParentStackId"),
            Err(ValidationError::MissingProperty("ParentStackId".to_string()))
        );
        assert!(matches!(
            event.required_property("Blank"),
            Err(ValidationError::InvalidProperty { .. })
        ));
    }

    #[test]
    fn detects_log_stream_placeholder_ids() {
        assert!(is_placeholder_physical_id(
            "2024/05/01/[$LATEST]0123456789abcdef"
        ));
        assert!(!is_placeholder_physical_id(
            "arn:aws:cloudformation:us-east-1:1:stack/child/guid"
        ));
    }
}
