//! Naming and addressing for the scheduled trigger that re-invokes a provider
//! while a long-running operation is in flight.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::arn::Arn;
use crate::error::PollRegistrationError;

pub const DEFAULT_POLL_SCHEDULE: &str = "rate(2 minutes)";
pub const DEFAULT_RULE_PREFIX: &str = "CfnLifecyclePoll";
pub const POLL_TARGET_ID: &str = "1";
pub const EVENTS_PRINCIPAL: &str = "events.amazonaws.com";
pub const INVOKE_ACTION: &str = "lambda:InvokeFunction";

/// EventBridge caps rule names at 64 bytes.
pub const MAX_RULE_NAME_LEN: usize = 64;
const REQUEST_HASH_HEX_LEN: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollRegistration {
    pub rule_arn: String,
    pub permission_id: String,
}

impl PollRegistration {
    pub fn rule_name(&self) -> Result<&str, PollRegistrationError> {
        rule_name_from_arn(&self.rule_arn)
    }
}

pub fn rule_name_from_arn(rule_arn: &str) -> Result<&str, PollRegistrationError> {
    let arn = Arn::parse(rule_arn)?;
    if arn.service != "events" || arn.resource_segment(0) != Some("rule") {
        return Err(PollRegistrationError::MalformedRuleArn(rule_arn.to_string()));
    }
    arn.resource
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && *name != "rule")
        .ok_or_else(|| PollRegistrationError::MalformedRuleArn(rule_arn.to_string()))
}

/// Rule name for a request. Deterministic, so a retried invocation reuses the
/// rule instead of leaking a second one.
pub fn rule_name_for_request(prefix: &str, request_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request_id.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    let budget = MAX_RULE_NAME_LEN - REQUEST_HASH_HEX_LEN - 1;
    let mut end = prefix.len().min(budget);
    while !prefix.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}-{}", &prefix[..end], &digest[..REQUEST_HASH_HEX_LEN])
}

/// ARN of the function `function_name` in the rule's account and region.
pub fn target_function_arn(
    rule_arn: &str,
    function_name: &str,
) -> Result<String, PollRegistrationError> {
    let arn = Arn::parse(rule_arn)?;
    Ok(format!(
        "arn:{}:lambda:{}:{}:function:{function_name}",
        arn.partition, arn.region, arn.account_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE_ARN: &str = "arn:aws:events:us-west-2:123456789012:rule/CfnLifecyclePoll-0123";

    #[test]
    fn extracts_rule_name() {
        assert_eq!(
            rule_name_from_arn(RULE_ARN).expect("rule name"),
            "CfnLifecyclePoll-0123"
        );
        assert_eq!(
            rule_name_from_arn("arn:aws:events:us-west-2:1:rule/custom-bus/poller")
                .expect("rule name"),
            "poller"
        );
    }

    #[test]
    fn rejects_non_rule_arns() {
        assert!(matches!(
            rule_name_from_arn("arn:aws:lambda:us-west-2:1:function:f"),
            Err(PollRegistrationError::MalformedRuleArn(_))
        ));
        assert!(matches!(
            rule_name_from_arn("garbage"),
            Err(PollRegistrationError::Arn(_))
        ));
    }

    #[test]
    fn rule_names_are_stable_and_bounded() {
        let first = rule_name_for_request(DEFAULT_RULE_PREFIX, "req-1");
        let again = rule_name_for_request(DEFAULT_RULE_PREFIX, "req-1");
        let other = rule_name_for_request(DEFAULT_RULE_PREFIX, "req-2");

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert!(first.starts_with("CfnLifecyclePoll-"));

        let long = rule_name_for_request(&"p".repeat(200), "req-1");
        assert_eq!(long.len(), MAX_RULE_NAME_LEN);
    }

    #[test]
    fn multibyte_prefix_is_cut_on_a_char_boundary() {
        let name = rule_name_for_request(&"é".repeat(40), "req-1");

        assert!(name.len() <= MAX_RULE_NAME_LEN);
        assert_eq!(name.len(), 63);
        assert!(name.starts_with(&"é".repeat(23)));
    }

    #[test]
    fn target_arn_uses_rule_account_and_region() {
        assert_eq!(
            target_function_arn(RULE_ARN, "provider").expect("target arn"),
            "arn:aws:lambda:us-west-2:123456789012:function:provider"
        );
    }
}
