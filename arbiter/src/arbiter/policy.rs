use std::collections::BTreeSet;
use std::sync::Arc;

use super::layout::ArbitrationEntry;

/// Decides whether `requester` may become the owner of a resource.
///
/// Policies run while the arbiter's table lock is held: keep them pure and
/// never call back into the arbiter from `decide`.
pub trait Policy: Send + Sync {
    fn decide(&self, resource_type: i32, resource_id: i32, current_owner: i32, requester: i32) -> bool;

    /// Label used in log output.
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> Policy for F
where
    F: Fn(i32, i32, i32, i32) -> bool + Send + Sync,
{
    fn decide(&self, resource_type: i32, resource_id: i32, current_owner: i32, requester: i32) -> bool {
        self(resource_type, resource_id, current_owner, requester)
    }
}

/// The default: free resources go to the first requester, owners may
/// re-request what they hold, everyone else is denied.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissivePolicy;

impl Policy for PermissivePolicy {
    fn decide(&self, _: i32, _: i32, current_owner: i32, requester: i32) -> bool {
        current_owner == ArbitrationEntry::FREE_OWNER || current_owner == requester
    }

    fn name(&self) -> &str {
        "permissive"
    }
}

/// Grants everything, transferring ownership on conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAllow;

impl Policy for AlwaysAllow {
    fn decide(&self, _: i32, _: i32, _: i32, _: i32) -> bool {
        true
    }

    fn name(&self) -> &str {
        "always_allow"
    }
}

/// Deny by default: only listed requesters may take free resources, and
/// never from another owner.
#[derive(Debug, Clone, Default)]
pub struct RestrictivePolicy {
    allowed: BTreeSet<i32>,
}

impl RestrictivePolicy {
    pub fn new(allowed: impl IntoIterator<Item = i32>) -> Self {
        Self { allowed: allowed.into_iter().collect() }
    }

    pub fn allow(&mut self, requester: i32) -> &mut Self {
        self.allowed.insert(requester);
        self
    }
}

impl Policy for RestrictivePolicy {
    fn decide(&self, _: i32, _: i32, current_owner: i32, requester: i32) -> bool {
        self.allowed.contains(&requester)
            && (current_owner == ArbitrationEntry::FREE_OWNER || current_owner == requester)
    }

    fn name(&self) -> &str {
        "restrictive"
    }
}

pub fn default_policy() -> Arc<dyn Policy> {
    Arc::new(PermissivePolicy)
}
