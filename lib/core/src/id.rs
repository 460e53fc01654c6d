//! Strongly-typed ID types for domain entities.
//!
//! Two families of IDs exist:
//!
//! - Keys assigned by someone else (the persistence server, or the user's own
//!   workflow file) are opaque strings. Node and edge keys generated locally
//!   embed a ULID so they stay unique and sort by creation time.
//! - IDs that only ever live inside this process (debug sessions) are plain
//!   ULIDs with a display prefix.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to generate a strongly-typed ID wrapper around ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// Returns the prefix used for display formatting.
            #[must_use]
            pub const fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let prefix_with_underscore = concat!($prefix, "_");
                let ulid_str = s.strip_prefix(prefix_with_underscore).unwrap_or(s);

                Ulid::from_str(ulid_str)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        reason: e.to_string(),
                    })
            }
        }
    };
}

/// Macro to generate a strongly-typed wrapper around an opaque string key.
macro_rules! define_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an existing key.
            #[must_use]
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            /// Returns the key as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.trim().is_empty() {
                    return Err(ParseIdError {
                        id_type: stringify!($name),
                        reason: "key is empty".to_string(),
                    });
                }
                Ok(Self(s.to_string()))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_key!(
    /// Identifier of a persisted workflow definition, assigned by the server.
    WorkflowId
);

define_key!(
    /// Identifier of one execution (or debug run) reported by the executor.
    ExecutionId
);

define_key!(
    /// Identifier of a node, unique within one workflow.
    NodeId
);

define_key!(
    /// Identifier of an edge, unique within one workflow.
    EdgeId
);

impl NodeId {
    /// Generates a fresh node key of the form `<node_type>_<ulid>`.
    #[must_use]
    pub fn generate(node_type: &str) -> Self {
        Self(format!("{node_type}_{}", Ulid::new().to_string().to_lowercase()))
    }
}

impl EdgeId {
    /// Generates a fresh edge key of the form `edge_<ulid>`.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("edge_{}", Ulid::new().to_string().to_lowercase()))
    }
}

define_id!(
    /// Identifier of one local debug session.
    ///
    /// A fresh value is minted on every start and reset, so responses that
    /// arrive for an older session can be recognised and dropped.
    DebugSessionId,
    "dbg"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_session_id_display_format() {
        let id = DebugSessionId::new();
        assert!(id.to_string().starts_with("dbg_"));
    }

    #[test]
    fn debug_session_id_parse_with_prefix() {
        let id = DebugSessionId::new();
        let parsed: DebugSessionId = id.to_string().parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn debug_session_id_parse_without_prefix() {
        let ulid = Ulid::new();
        let id: DebugSessionId = ulid.to_string().parse().expect("should parse");
        assert_eq!(id.as_ulid(), ulid);
    }

    #[test]
    fn debug_session_id_parse_invalid() {
        let err = "dbg_nope".parse::<DebugSessionId>().unwrap_err();
        assert_eq!(err.id_type, "DebugSessionId");
    }

    #[test]
    fn generated_node_ids_are_unique_and_prefixed() {
        let a = NodeId::generate("reply_message");
        let b = NodeId::generate("reply_message");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("reply_message_"));
    }

    #[test]
    fn generated_edge_ids_are_prefixed() {
        assert!(EdgeId::generate().as_str().starts_with("edge_"));
    }

    #[test]
    fn key_rejects_empty_string() {
        let err = "  ".parse::<WorkflowId>().unwrap_err();
        assert_eq!(err.id_type, "WorkflowId");
    }

    #[test]
    fn key_serializes_as_plain_string() {
        let id = NodeId::new("end_node_1");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"end_node_1\"");
        let parsed: NodeId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, id);
    }
}
