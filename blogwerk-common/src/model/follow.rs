use crate::model::{Id, user::UserMarker};
use serde::{Deserialize, Serialize};

/// A directed edge from `user` to the `author` they follow.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
pub struct Follow {
    pub user: Id<UserMarker>,
    pub author: Id<UserMarker>,
}
