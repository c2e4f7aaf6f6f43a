/// Shared types used across the codebase

use serde::{Deserialize, Serialize};

/// Operations a dynamic endpoint can perform on a collection.
/// Used for permission checks and to pick the payload validation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Replace,
    Patch,
    Delete,
}

impl Operation {
    /// Permission verb guarding this operation
    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Create => "add",
            Operation::Read => "view",
            Operation::Replace | Operation::Patch => "edit",
            Operation::Delete => "delete",
        }
    }

    /// Whether the request body carries field values
    pub fn writes_fields(&self) -> bool {
        matches!(self, Operation::Create | Operation::Replace | Operation::Patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_share_the_edit_verb() {
        assert_eq!(Operation::Replace.verb(), "edit");
        assert_eq!(Operation::Patch.verb(), "edit");
        assert_eq!(Operation::Create.verb(), "add");
        assert!(!Operation::Delete.writes_fields());
    }
}
