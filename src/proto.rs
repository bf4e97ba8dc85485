//! Protocol-facing capability traits.
//!
//! The table never parses protocol messages itself. Messages come in through
//! [`FlowMod`] and stay opaque; the match and effects capabilities hanging
//! off it supply the few operations the table needs. `Clone` stands in for
//! the deep copy taken on add, `Drop` for the deep delete on removal.

/// 64-bit flow identifier, assigned by the caller. The table's primary key.
pub type FlowId = u64;

/// Marker for an unused entry slot; never a valid flow id.
pub const FLOW_ID_INVALID: FlowId = u64::MAX;

/// OpenFlow-style port number.
pub type PortNo = u32;

/// Why a flow entry left (or is leaving) the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovedReason {
    /// No traffic matched the entry within its idle timeout.
    IdleTimeout,
    /// The entry outlived its hard timeout.
    HardTimeout,
    /// An explicit delete request.
    Delete,
    /// The entry was evicted to make room.
    Eviction,
}

/// Match structure of a flow rule.
///
/// `as_bytes` must return a stable, padding-free encoding; two matches are
/// strictly equal iff their bytes are equal. The bytes also feed the
/// exact-match index hash.
pub trait FlowMatch: Clone {
    /// Raw bytes used for hashing and strict equality.
    fn as_bytes(&self) -> &[u8];

    /// True when every packet this match covers is also covered by `other`.
    fn more_specific_than(&self, other: &Self) -> bool;

    /// True when some packet is covered by both matches.
    fn overlaps(&self, other: &Self) -> bool;
}

/// Owned action or instruction payload attached to a flow entry.
pub trait EffectList: Clone {
    /// Invokes `f` for every port that packets may be output to.
    fn each_output_port<F: FnMut(PortNo)>(&self, f: F);
}

/// A flow add/modify message, as consumed by the table.
pub trait FlowMod: Clone {
    /// Match structure type.
    type Match: FlowMatch;
    /// Effects payload type (actions for v1.0, instructions for v1.1+).
    type Effects: EffectList;

    /// Extracts the match structure. `None` when the message is malformed.
    fn match_fields(&self) -> Option<Self::Match>;

    /// Extracts the owned effects payload. `None` when it cannot be produced.
    fn effects(&self) -> Option<Self::Effects>;

    /// Opaque 64-bit tag.
    fn cookie(&self) -> u64;

    /// Match priority.
    fn priority(&self) -> u16;

    /// Protocol flags, stored verbatim.
    fn flags(&self) -> u16;

    /// Idle timeout in seconds; 0 disables.
    fn idle_timeout(&self) -> u16;

    /// Hard timeout in seconds; 0 disables.
    fn hard_timeout(&self) -> u16;

    /// Table the rule addresses.
    fn table_id(&self) -> u8;
}
