//! Identifier newtypes.
//!
//! All IDs are UUID strings. They are kept as strings rather than
//! `Uuid` values because they cross the IPC boundary as JSON and are
//! frequently compared against client-supplied text.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Creates a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Creates an ID from an existing string.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a project.
    ProjectId
}

uuid_id! {
    /// Unique identifier for a repo location.
    LocationId
}

uuid_id! {
    /// Unique identifier for a thread.
    ThreadId
}

uuid_id! {
    /// Unique identifier for a session within a thread.
    SessionId
}

uuid_id! {
    /// Unique identifier for a message.
    MessageId
}

uuid_id! {
    /// Unique identifier for a project-level command.
    CommandId
}

uuid_id! {
    /// Unique identifier for a clarification question.
    QuestionId
}
