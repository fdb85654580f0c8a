use crate::model::{Id, user::UserMarker};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct FollowMarker;

/// Directed subscription edge: `user` follows `author`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Follow {
    pub id: Id<FollowMarker>,
    pub user: Id<UserMarker>,
    pub author: Id<UserMarker>,
}

/// Result of a get-or-create on a follow edge.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum FollowOutcome {
    Created,
    Existing,
}
