//! Identity published to the connection after a successful exchange

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The principal proven by a completed SASL exchange.
///
/// The group names are handed to whatever maps groups to per-address permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedIdentity {
    id: String,
    username: String,
    groups: BTreeSet<String>,
}

impl AuthenticatedIdentity {
    /// Creates a new identity
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        groups: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }

    /// Id of the user in the directory
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Names of the groups the user belongs to
    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    /// Whether the user is a member of `group`
    pub fn is_member_of(&self, group: &str) -> bool {
        self.groups.contains(group)
    }
}
