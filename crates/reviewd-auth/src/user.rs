//! Current-user capabilities.
//!
//! Every request runs on behalf of some user. Rather than a class hierarchy,
//! the different origins of a user are separate structs implementing the
//! [`CurrentUser`] capability trait.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::config::GroupConfig;

/// Identifier of an account group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the current request reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPath {
    /// Browser session.
    WebUi,
    /// SSH command.
    Ssh,
    /// Internal replication task.
    Replication,
    /// Not known.
    Unknown,
}

/// The kind of identity behind a [`CurrentUser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserKind {
    /// Nobody is signed in.
    Anonymous,
    /// A user bound to an account.
    Identified,
    /// The server acting on its own behalf for replication.
    Replication,
}

/// Capabilities shared by every kind of user.
pub trait CurrentUser: Send + Sync {
    /// How this user reached the server.
    fn access_path(&self) -> AccessPath;

    /// What kind of identity this is.
    fn kind(&self) -> UserKind;

    /// Groups whose permissions apply to this user.
    fn effective_groups(&self) -> &BTreeSet<GroupId>;

    /// The account behind this user, if any.
    fn account_id(&self) -> Option<AccountId> {
        None
    }

    /// Returns `true` if the user belongs to `group`.
    fn is_member_of(&self, group: GroupId) -> bool {
        self.effective_groups().contains(&group)
    }
}

/// A user who has not signed in.
#[derive(Debug, Clone)]
pub struct AnonymousUser {
    groups: BTreeSet<GroupId>,
}

impl AnonymousUser {
    /// Creates an anonymous user in the anonymous group.
    #[must_use]
    pub fn new(config: &GroupConfig) -> Self {
        Self {
            groups: BTreeSet::from([config.anonymous]),
        }
    }
}

impl CurrentUser for AnonymousUser {
    fn access_path(&self) -> AccessPath {
        AccessPath::Unknown
    }

    fn kind(&self) -> UserKind {
        UserKind::Anonymous
    }

    fn effective_groups(&self) -> &BTreeSet<GroupId> {
        &self.groups
    }
}

/// A signed-in user bound to an account.
#[derive(Debug, Clone)]
pub struct IdentifiedUser {
    account_id: AccountId,
    access_path: AccessPath,
    groups: BTreeSet<GroupId>,
}

impl IdentifiedUser {
    /// Creates an identified user.
    ///
    /// The anonymous and registered groups are always included in addition to
    /// `member_of`.
    #[must_use]
    pub fn new(
        account_id: AccountId,
        access_path: AccessPath,
        config: &GroupConfig,
        member_of: impl IntoIterator<Item = GroupId>,
    ) -> Self {
        let mut groups: BTreeSet<GroupId> = member_of.into_iter().collect();
        groups.insert(config.anonymous);
        groups.insert(config.registered);
        Self {
            account_id,
            access_path,
            groups,
        }
    }

    /// The signed-in account.
    #[must_use]
    pub fn id(&self) -> AccountId {
        self.account_id
    }
}

impl CurrentUser for IdentifiedUser {
    fn access_path(&self) -> AccessPath {
        self.access_path
    }

    fn kind(&self) -> UserKind {
        UserKind::Identified
    }

    fn effective_groups(&self) -> &BTreeSet<GroupId> {
        &self.groups
    }

    fn account_id(&self) -> Option<AccountId> {
        Some(self.account_id)
    }
}

/// The server itself, pushing changes to replicas.
#[derive(Debug, Clone)]
pub struct ReplicationUser {
    groups: BTreeSet<GroupId>,
}

impl ReplicationUser {
    /// Creates a replication user limited to `auth_groups`.
    ///
    /// An empty set means the replica sees what any registered user sees. A
    /// non-empty set allows a narrower view, e.g. when replicating from an
    /// internal server to a public mirror.
    #[must_use]
    pub fn new(config: &GroupConfig, auth_groups: impl IntoIterator<Item = GroupId>) -> Self {
        let mut groups: BTreeSet<GroupId> = auth_groups.into_iter().collect();
        if groups.is_empty() {
            groups.insert(config.anonymous);
            groups.insert(config.registered);
        }
        Self { groups }
    }
}

impl CurrentUser for ReplicationUser {
    fn access_path(&self) -> AccessPath {
        AccessPath::Replication
    }

    fn kind(&self) -> UserKind {
        UserKind::Replication
    }

    fn effective_groups(&self) -> &BTreeSet<GroupId> {
        &self.groups
    }
}
