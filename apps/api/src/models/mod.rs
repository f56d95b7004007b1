// Record types shared by the local and cloud backends.
// Each file also carries the `*Row` shape used by the cloud medium.

pub mod dates;
pub mod profile;
pub mod reflection;
pub mod win;

use thiserror::Error;

/// A stored string did not match any variant of a closed enumeration.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
