//! Tenant scoping for results and notifications.
//!
//! A tenant is the (user, organization) pair that scopes visibility and
//! deduplication of extracted records. Either side may be absent; job
//! variants carry them as plain strings where empty means absent.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
}

impl Tenant {
    /// Build a tenant from the owner/organization strings carried by jobs.
    /// Empty strings map to absent.
    pub fn from_owner(owner_id: &str, organization_id: &str) -> Self {
        Self {
            user_id: non_empty(owner_id),
            organization_id: non_empty(organization_id),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none() && self.organization_id.is_none()
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
