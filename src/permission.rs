//! Permission checking contract.
//!
//! The executor asks before every dispatch: READ for object access and
//! field reads, UPDATE for field writes, and the method name itself for
//! method calls. Concrete checkers are injected; two simple
//! implementations ship for wiring and tests.

use std::collections::HashSet;

use async_trait::async_trait;

/// Decides whether a user may perform an action on an object.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn allow(&self, user_id: &str, object: &str, action: &str) -> bool;
}

/// Grants everything. The default when no checker is configured.
pub struct AllowAll;

#[async_trait]
impl PermissionChecker for AllowAll {
    async fn allow(&self, _user_id: &str, _object: &str, _action: &str) -> bool {
        true
    }
}

/// A fixed grant table keyed by `(user, object, action)`, with `*`
/// wildcards on object and action.
#[derive(Default)]
pub struct StaticPermissions {
    grants: HashSet<(String, String, String)>,
}

impl StaticPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(
        mut self,
        user: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        self.grants.insert((
            user.into(),
            object.into().to_uppercase(),
            action.into().to_uppercase(),
        ));
        self
    }
}

#[async_trait]
impl PermissionChecker for StaticPermissions {
    async fn allow(&self, user_id: &str, object: &str, action: &str) -> bool {
        let object = object.to_uppercase();
        let action = action.to_uppercase();
        let user = user_id.to_string();
        self.grants.contains(&(user.clone(), object.clone(), action.clone()))
            || self
                .grants
                .contains(&(user.clone(), object.clone(), "*".to_string()))
            || self
                .grants
                .contains(&(user.clone(), "*".to_string(), action))
            || self.grants.contains(&(user, "*".to_string(), "*".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allow_all_allows() {
        assert!(AllowAll.allow("anyone", "CUSTOMER", "LIST").await);
    }

    #[tokio::test]
    async fn static_grants_match_case_insensitively() {
        let perms = StaticPermissions::new().grant("alice", "customer", "list");
        assert!(perms.allow("alice", "CUSTOMER", "LIST").await);
        assert!(!perms.allow("alice", "CUSTOMER", "DELETE").await);
        assert!(!perms.allow("bob", "CUSTOMER", "LIST").await);
    }

    #[tokio::test]
    async fn wildcards_apply() {
        let perms = StaticPermissions::new()
            .grant("admin", "*", "*")
            .grant("reader", "*", "READ");
        assert!(perms.allow("admin", "ANYTHING", "DELETE").await);
        assert!(perms.allow("reader", "ORDER", "READ").await);
        assert!(!perms.allow("reader", "ORDER", "UPDATE").await);
    }
}
