//! Aggregate identifiers.
//!
//! Every aggregate is referred to by one of these newtypes. They serialize
//! as plain strings so wire payloads and storage keys stay readable.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Mint a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// The identifier as `&str`.
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
    };
}

string_id!(
    /// External user identity. The platform never mints these; they arrive
    /// in auth tokens.
    UserId
);
string_id!(
    /// A letter aggregate.
    LetterId
);
string_id!(
    /// A physical envelope.
    EnvelopeId
);
string_id!(
    /// A courier record (distinct from the courier's user identity).
    CourierId
);
string_id!(
    /// A courier delivery task.
    TaskId
);
string_id!(
    /// A scheduled or delayed task in the scheduler engine.
    ScheduledTaskId
);

/// The short opaque code printed on an envelope's barcode.
///
/// Not a UUID: generated from the barcode alphabet by `cp-02-barcode`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BarcodeCode(pub String);

impl BarcodeCode {
    /// The code as `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BarcodeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BarcodeCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
