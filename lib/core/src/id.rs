//! Strongly-typed identifiers for persisted engine entities.
//!
//! Graphs and execution instances are keyed by ULIDs so ids sort by creation
//! time. Node and edge ids are authored by the graph editor and live in the
//! workflow crate as plain strings.

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

/// Generates a ULID-backed id type displayed as `<prefix>_<ulid>`.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new id from a freshly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Wraps an existing ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// Prefix used by `Display`.
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
                let raw = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ulid::from_str(raw).map(Self).map_err(|e| ParseIdError {
                    id_type: stringify!($name),
                    reason: e.to_string(),
                })
            }
        }

        impl From<Ulid> for $name {
            fn from(ulid: Ulid) -> Self {
                Self(ulid)
            }
        }
    };
}

define_id!(
    /// Identifier of a persisted workflow graph.
    GraphId,
    "graph"
);

define_id!(
    /// Identifier of one execution instance (run) of a workflow graph.
    InstanceId,
    "inst"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_prefix() {
        assert!(GraphId::new().to_string().starts_with("graph_"));
        assert!(InstanceId::new().to_string().starts_with("inst_"));
    }

    #[test]
    fn parses_prefixed_and_raw_forms() {
        let id = InstanceId::new();
        let prefixed: InstanceId = id.to_string().parse().expect("prefixed");
        let raw: InstanceId = id.as_ulid().to_string().parse().expect("raw");
        assert_eq!(prefixed, id);
        assert_eq!(raw, id);
    }

    #[test]
    fn rejects_garbage() {
        let err = "graph_nope".parse::<GraphId>().unwrap_err();
        assert_eq!(err.id_type, "GraphId");
    }

    #[test]
    fn ids_order_by_creation() {
        let first = InstanceId::from_ulid(Ulid::from_parts(1, 0));
        let second = InstanceId::from_ulid(Ulid::from_parts(2, 0));
        assert!(first < second);
    }

    #[test]
    fn serializes_as_bare_ulid() {
        let id = GraphId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id.as_ulid()));
    }
}
