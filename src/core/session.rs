use chrono::{DateTime, Utc};

use crate::core::user::User;

/// An authenticated session. The token that keys it is an opaque random
/// string minted by the authentication workflow; the store only keeps the
/// mapping. A user present here is currently logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub created_at: DateTime<Utc>,
}
