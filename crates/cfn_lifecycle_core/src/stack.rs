//! Decisions for the nested stack provider: how a stack is named, which
//! account and region it lives in, and what its status means.

use rand::Rng;
use serde_json::Value;

use crate::arn::Arn;
use crate::error::{StackFailure, ValidationError};
use crate::event::{LifecycleEvent, Properties, RequestType};
use crate::result::OperationResult;

pub const PARENT_STACK_ID_PROPERTY: &str = "ParentStackId";
pub const TEMPLATE_URL_PROPERTY: &str = "TemplateURL";
pub const PARAMETERS_PROPERTY: &str = "CfnParameters";
pub const CAPABILITIES_PROPERTY: &str = "Capabilities";
pub const ROLE_ARN_PROPERTY: &str = "RoleArn";
pub const REGION_PROPERTY: &str = "Region";

/// Tag linking a nested stack back to the stack that owns it.
pub const PARENT_STACK_TAG: &str = "ParentStackId";

pub const MAX_STACK_NAME_LEN: usize = 128;
pub const STACK_NAME_SUFFIX_LEN: usize = 13;

const FAILED_STATUSES: &[&str] = &[
    "CREATE_FAILED",
    "ROLLBACK_IN_PROGRESS",
    "ROLLBACK_FAILED",
    "ROLLBACK_COMPLETE",
    "DELETE_FAILED",
    "UPDATE_ROLLBACK_IN_PROGRESS",
    "UPDATE_ROLLBACK_FAILED",
    "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS",
    "UPDATE_ROLLBACK_COMPLETE",
];

const IN_PROGRESS_STATUSES: &[&str] = &[
    "CREATE_IN_PROGRESS",
    "DELETE_IN_PROGRESS",
    "UPDATE_IN_PROGRESS",
    "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
];

const SUCCESS_STATUSES: &[&str] = &["CREATE_COMPLETE", "DELETE_COMPLETE", "UPDATE_COMPLETE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStatusBucket {
    Failed,
    InProgress,
    Success,
}

/// `None` for statuses outside the known buckets (e.g. `REVIEW_IN_PROGRESS`).
pub fn classify_stack_status(status: &str) -> Option<StackStatusBucket> {
    if FAILED_STATUSES.contains(&status) {
        Some(StackStatusBucket::Failed)
    } else if IN_PROGRESS_STATUSES.contains(&status) {
        Some(StackStatusBucket::InProgress)
    } else if SUCCESS_STATUSES.contains(&status) {
        Some(StackStatusBucket::Success)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackOutput {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSnapshot {
    pub status: String,
    pub status_reason: Option<String>,
    pub outputs: Vec<StackOutput>,
}

/// Maps a described stack onto the lifecycle: failure, pending or complete
/// with the stack outputs as result data. Unknown statuses keep polling.
pub fn evaluate_stack(
    stack_id: &str,
    snapshot: &StackSnapshot,
) -> Result<OperationResult, StackFailure> {
    let bucket =
        classify_stack_status(&snapshot.status).unwrap_or(StackStatusBucket::InProgress);
    match bucket {
        StackStatusBucket::Failed => Err(match &snapshot.status_reason {
            Some(reason) => StackFailure::new(format!("Stack Failed: {reason}")),
            None => StackFailure::new(format!(
                "Stack launch failed, status is {}",
                snapshot.status
            )),
        }),
        StackStatusBucket::InProgress => Ok(OperationResult::pending(stack_id)),
        StackStatusBucket::Success => {
            let data: Properties = snapshot
                .outputs
                .iter()
                .map(|output| (output.key.clone(), Value::String(output.value.clone())))
                .collect();
            Ok(OperationResult::complete(stack_id, data))
        }
    }
}

/// Stack name segment of a stack id (`arn:...:stack/<name>/<guid>`).
pub fn stack_name_from_id(stack_id: &str) -> Result<&str, ValidationError> {
    Arn::parse(stack_id)
        .ok()
        .filter(|arn| arn.service == "cloudformation" && arn.resource_segment(0) == Some("stack"))
        .and_then(|arn| arn.resource_segment(1))
        .ok_or_else(|| ValidationError::MalformedStackId(stack_id.to_string()))
}

pub fn random_suffix(len: usize, rng: &mut impl Rng) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    (0..len)
        .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
        .collect()
}

/// `<parent>-<logical id>-<suffix>`, trimming the parent name so the result
/// fits CloudFormation's length limit.
pub fn nested_stack_name(parent_name: &str, logical_resource_id: &str, suffix: &str) -> String {
    let tail = format!("-{logical_resource_id}-{suffix}");
    let budget = MAX_STACK_NAME_LEN.saturating_sub(tail.chars().count());
    let prefix: String = parent_name.chars().take(budget).collect();
    format!("{prefix}{tail}")
}

/// `CfnParameters` as ordered key/value pairs. Scalars are stringified since
/// CloudFormation parameters are always strings.
pub fn stack_parameters(event: &LifecycleEvent) -> Result<Vec<(String, String)>, ValidationError> {
    let Some(raw) = event.property(PARAMETERS_PROPERTY) else {
        return Ok(Vec::new());
    };
    let Value::Object(parameters) = raw else {
        return Err(ValidationError::invalid_property(
            PARAMETERS_PROPERTY,
            "must be an object of parameter names to values",
        ));
    };

    parameters
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(text) => text.clone(),
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                Value::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(","),
                Value::Null | Value::Object(_) => {
                    return Err(ValidationError::invalid_property(
                        format!("{PARAMETERS_PROPERTY}.{key}"),
                        "must be a string, number, boolean or list",
                    ))
                }
            };
            Ok((key.clone(), value))
        })
        .collect()
}

pub fn capabilities(event: &LifecycleEvent) -> Result<Vec<String>, ValidationError> {
    match event.property(CAPABILITIES_PROPERTY) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ValidationError::invalid_property(
                        CAPABILITIES_PROPERTY,
                        "must be a list of strings",
                    )
                })
            })
            .collect(),
        Some(_) => Err(ValidationError::invalid_property(
            CAPABILITIES_PROPERTY,
            "must be a list of strings",
        )),
    }
}

/// Account (through an optional role) and region the nested stack lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackTarget {
    pub role_arn: Option<String>,
    pub region: String,
}

/// Resolves the target from the properties, defaulting to the function's
/// region. Updates may not move a stack to another role or region.
pub fn resolve_stack_target(
    event: &LifecycleEvent,
    function_region: &str,
) -> Result<StackTarget, ValidationError> {
    let role_arn = event.property_str(ROLE_ARN_PROPERTY).map(str::to_string);
    let region = event
        .property_str(REGION_PROPERTY)
        .unwrap_or(function_region)
        .to_string();

    if event.request_type == RequestType::Update {
        let old_role_arn = event.old_property_str(ROLE_ARN_PROPERTY);
        if role_arn.as_deref() != old_role_arn {
            return Err(ValidationError::RoleArnChanged);
        }
        let old_region = event
            .old_property_str(REGION_PROPERTY)
            .unwrap_or(function_region);
        if region != old_region {
            return Err(ValidationError::RegionChanged);
        }
    }

    Ok(StackTarget { role_arn, region })
}

/// CreateStack inputs derived from the event; inherited parent settings are
/// applied by the CloudFormation adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedStackRequest {
    pub stack_name: String,
    pub template_url: String,
    pub parameters: Vec<(String, String)>,
    pub parent_stack_id: String,
}

pub fn plan_nested_stack(
    event: &LifecycleEvent,
    suffix: &str,
) -> Result<NestedStackRequest, ValidationError> {
    let parent_stack_id = event.required_property(PARENT_STACK_ID_PROPERTY)?;
    let parent_name = stack_name_from_id(parent_stack_id)?;

    Ok(NestedStackRequest {
        stack_name: nested_stack_name(parent_name, &event.logical_resource_id, suffix),
        template_url: event.required_property(TEMPLATE_URL_PROPERTY)?.to_string(),
        parameters: stack_parameters(event)?,
        parent_stack_id: parent_stack_id.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackUpdateRequest {
    pub stack_id: String,
    pub template_url: String,
    pub parameters: Vec<(String, String)>,
    pub capabilities: Vec<String>,
    pub parent_stack_id: String,
}

pub fn plan_stack_update(event: &LifecycleEvent) -> Result<StackUpdateRequest, ValidationError> {
    Ok(StackUpdateRequest {
        stack_id: event.required_physical_resource_id()?.to_string(),
        template_url: event.required_property(TEMPLATE_URL_PROPERTY)?.to_string(),
        parameters: stack_parameters(event)?,
        capabilities: capabilities(event)?,
        parent_stack_id: event.required_property(PARENT_STACK_ID_PROPERTY)?.to_string(),
    })
}

/// CloudFormation reports an update without changes as a plain
/// `ValidationError`; only the message tells it apart.
pub fn is_no_op_update(code: Option<&str>, message: Option<&str>) -> bool {
    code == Some("ValidationError")
        && message.is_some_and(|message| message.contains("No updates are to be performed"))
}
