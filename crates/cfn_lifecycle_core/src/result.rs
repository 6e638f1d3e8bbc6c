use crate::event::Properties;

pub const COMPLETE_KEY: &str = "Complete";

/// Keys used for coordinator bookkeeping that never reach CloudFormation.
pub const BOOKKEEPING_KEYS: [&str; 4] = [COMPLETE_KEY, "Poll", "PollRuleArn", "PollPermissionId"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Still running; a poll tick must re-invoke the provider.
    Pending,
    Complete,
    /// Handed to an external party that signals CloudFormation itself.
    Delegated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub physical_resource_id: String,
    pub data: Properties,
    pub completion: Completion,
}

impl OperationResult {
    pub fn pending(physical_resource_id: impl Into<String>) -> Self {
        Self {
            physical_resource_id: physical_resource_id.into(),
            data: Properties::new(),
            completion: Completion::Pending,
        }
    }

    pub fn complete(physical_resource_id: impl Into<String>, data: Properties) -> Self {
        Self {
            physical_resource_id: physical_resource_id.into(),
            data,
            completion: Completion::Complete,
        }
    }

    pub fn delegated(physical_resource_id: impl Into<String>) -> Self {
        Self {
            physical_resource_id: physical_resource_id.into(),
            data: Properties::new(),
            completion: Completion::Delegated,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Complete
    }

    /// Result data with bookkeeping keys removed, ready for the callback.
    pub fn into_reportable_data(self) -> Properties {
        let mut data = self.data;
        strip_bookkeeping(&mut data);
        data
    }
}

pub fn strip_bookkeeping(data: &mut Properties) {
    for key in BOOKKEEPING_KEYS {
        data.remove(key);
    }
}
