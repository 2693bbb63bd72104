use std::fmt;

use thiserror::Error;

/// Identifier linking an outbound request to its inbound reply.
///
/// Ids occupy 31 bits. `0` is reserved for envelopes that expect no
/// correlated reply.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "u32", into = "u32")]
pub struct CorrelationId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("correlation id {0} exceeds the 31-bit id space")]
pub struct CorrelationIdOutOfRange(pub u32);

impl CorrelationId {
    /// "No correlation expected."
    pub const NONE: Self = Self(0);

    /// Largest valid raw id value.
    pub const MAX: u32 = 0x7FFF_FFFF;

    pub fn new(id: u32) -> Result<Self, CorrelationIdOutOfRange> {
        if id > Self::MAX {
            Err(CorrelationIdOutOfRange(id))
        } else {
            Ok(Self(id))
        }
    }

    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::NONE
    }
}

impl TryFrom<u32> for CorrelationId {
    type Error = CorrelationIdOutOfRange;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CorrelationId> for u32 {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
