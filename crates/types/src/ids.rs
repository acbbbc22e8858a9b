//! Identifiers for every entity in the progression engine
//!
//! All ids are opaque strings. `generate()` produces a fresh uuid-backed
//! id; `new()` wraps an externally supplied one (e.g. the chat platform's
//! stable user id).

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn short(&self) -> &str {
                &self.0[..8.min(self.0.len())]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// A user of the engagement platform
    UserId
);
string_id!(
    /// A single immutable currency movement
    TransactionId
);
string_id!(
    /// A level tier definition
    LevelId
);
string_id!(
    /// A mission definition
    MissionId
);
string_id!(
    /// A per-user mission instance
    MissionInstanceId
);
string_id!(
    /// A reward definition
    RewardId
);
string_id!(
    /// A reward grant held by a user
    GrantId
);
