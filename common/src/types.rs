use serde::{Deserialize, Serialize};

/// Election epoch. Monotonically increasing; one leader per term.
pub type Term = u8;

/// Identifier of a cluster node. The wire encoding reserves `0` as the
/// null sentinel ("no node"), so configured ids live in `1..=255`; absence
/// is represented in memory as `Option<NodeId>`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(u8);

impl NodeId {
    pub const NULL_WIRE: u8 = 0;

    pub fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// Decode the wire byte, mapping the null sentinel to `None`.
    pub fn from_wire(raw: u8) -> Option<Self> {
        (raw != Self::NULL_WIRE).then_some(Self(raw))
    }

    /// Encode an optional id as its wire byte.
    pub fn to_wire(id: Option<NodeId>) -> u8 {
        id.map_or(Self::NULL_WIRE, |id| id.0)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
