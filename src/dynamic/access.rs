use serde::Serialize;

use crate::database::models::{FieldPermissions, PermissionRecord};
use crate::types::Operation;

const ALL_FIELDS: &str = "*";

/// Which fields a role may see or write
#[derive(Debug, Clone, PartialEq)]
pub enum FieldScope {
    All,
    Only(Vec<String>),
}

impl FieldScope {
    fn from_list(list: &[String]) -> Self {
        if list.is_empty() || list.iter().any(|f| f == ALL_FIELDS) {
            FieldScope::All
        } else {
            FieldScope::Only(list.to_vec())
        }
    }

    pub fn permits(&self, field: &str) -> bool {
        match self {
            FieldScope::All => true,
            FieldScope::Only(list) => list.iter().any(|f| f == field),
        }
    }
}

/// Effective permission for one collection of one project
#[derive(Debug, Clone, Serialize)]
pub struct AccessPolicy {
    pub role: String,
    pub view: bool,
    pub add: bool,
    pub edit: bool,
    pub delete: bool,
    pub fields: FieldPermissions,
}

impl AccessPolicy {
    /// Applied when the owner has not configured the collection
    pub fn admin() -> Self {
        let all = vec![ALL_FIELDS.to_string()];
        Self {
            role: "admin".to_string(),
            view: true,
            add: true,
            edit: true,
            delete: true,
            fields: FieldPermissions {
                view: all.clone(),
                add: all.clone(),
                edit: all,
            },
        }
    }

    pub fn allows(&self, operation: Operation) -> bool {
        match operation {
            Operation::Read => self.view,
            Operation::Create => self.add,
            Operation::Replace | Operation::Patch => self.edit,
            Operation::Delete => self.delete,
        }
    }

    pub fn scope(&self, operation: Operation) -> FieldScope {
        match operation {
            Operation::Read => FieldScope::from_list(&self.fields.view),
            Operation::Create => FieldScope::from_list(&self.fields.add),
            Operation::Replace | Operation::Patch => FieldScope::from_list(&self.fields.edit),
            Operation::Delete => FieldScope::All,
        }
    }

    /// Payload keys the role may not write for this operation, sorted.
    /// Empty for operations that carry no payload.
    pub fn denied_fields<'a>(&self, operation: Operation, keys: impl IntoIterator<Item = &'a String>) -> Vec<String> {
        if !operation.writes_fields() {
            return Vec::new();
        }
        let scope = self.scope(operation);
        let mut denied: Vec<String> = keys.into_iter().filter(|k| !scope.permits(k)).cloned().collect();
        denied.sort();
        denied
    }
}

impl From<&PermissionRecord> for AccessPolicy {
    fn from(record: &PermissionRecord) -> Self {
        Self {
            role: record.role.clone(),
            view: record.can_view,
            add: record.can_add,
            edit: record.can_edit,
            delete: record.can_delete,
            fields: record.fields.0.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewer() -> AccessPolicy {
        AccessPolicy {
            role: "viewer".to_string(),
            view: true,
            add: false,
            edit: true,
            delete: false,
            fields: FieldPermissions {
                view: vec!["name".to_string(), "email".to_string()],
                add: vec![],
                edit: vec!["name".to_string()],
            },
        }
    }

    #[test]
    fn admin_allows_everything() {
        let admin = AccessPolicy::admin();
        for op in [Operation::Create, Operation::Read, Operation::Replace, Operation::Patch, Operation::Delete] {
            assert!(admin.allows(op));
            assert_eq!(admin.scope(op), FieldScope::All);
        }
    }

    #[test]
    fn verbs_map_to_flags() {
        let policy = viewer();
        assert!(policy.allows(Operation::Read));
        assert!(!policy.allows(Operation::Create));
        assert!(policy.allows(Operation::Patch));
        assert!(!policy.allows(Operation::Delete));
    }

    #[test]
    fn field_lists_restrict_writes() {
        let policy = viewer();
        let keys = vec!["name".to_string(), "role".to_string(), "email".to_string()];
        assert_eq!(policy.denied_fields(Operation::Patch, &keys), vec!["email", "role"]);
        // An empty add list places no restriction
        assert!(policy.denied_fields(Operation::Create, &keys).is_empty());
        // Reads are scoped by projection, not rejected
        assert!(policy.denied_fields(Operation::Read, &keys).is_empty());
    }

    #[test]
    fn view_scope() {
        let scope = viewer().scope(Operation::Read);
        assert!(scope.permits("email"));
        assert!(!scope.permits("salary"));
    }
}
