use std::time::Instant;

use log::error;

use crate::error::FtError;
use crate::proto::{EffectList, FlowId, FlowMod, PortNo, RemovedReason, FLOW_ID_INVALID};

/// Lifecycle state of an entry slot.
///
/// `Free` slots live on the free list only; the other states are "live":
/// on the all-entries list and in all three indexes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    /// Unused slot, waiting on the free list.
    Free,
    /// Installed by an add.
    New,
    /// Still live, but a delete has started.
    DeleteMarked,
}

impl FlowState {
    /// True for every state in which a delete is underway.
    pub fn is_deleted(self) -> bool {
        matches!(self, FlowState::DeleteMarked)
    }
}

/// Nil sentinel for the intrusive all-entries list links.
pub(crate) const NIL: u32 = u32::MAX;

/// One flow rule in the table pool.
///
/// References handed to callers are read-only and valid until the next
/// mutating operation on the owning table.
pub struct FlowEntry<M: FlowMod> {
    pub(crate) id: FlowId,
    pub(crate) state: FlowState,
    pub(crate) match_fields: Option<M::Match>,
    pub(crate) priority: u16,
    pub(crate) cookie: u64,
    pub(crate) flags: u16,
    pub(crate) idle_timeout: u16,
    pub(crate) hard_timeout: u16,
    pub(crate) table_id: u8,
    /// Deep copy of the originating add message.
    pub(crate) flow_add: Option<M>,
    pub(crate) effects: Option<M::Effects>,
    /// Output ports distilled from the effects.
    pub(crate) output_ports: Vec<PortNo>,
    /// Requests deferred until the host drains them.
    pub(crate) queued_reqs: Vec<M>,
    pub(crate) packets: u64,
    pub(crate) bytes: u64,
    pub(crate) insert_time: Instant,
    pub(crate) last_counter_change: Instant,
    pub(crate) removed_reason: Option<RemovedReason>,
    /// All-entries list links; `NIL` when unlinked.
    pub(crate) prev: u32,
    pub(crate) next: u32,
}

impl<M: FlowMod> FlowEntry<M> {
    pub(crate) fn vacant(now: Instant) -> Self {
        Self {
            id: FLOW_ID_INVALID,
            state: FlowState::Free,
            match_fields: None,
            priority: 0,
            cookie: 0,
            flags: 0,
            idle_timeout: 0,
            hard_timeout: 0,
            table_id: 0,
            flow_add: None,
            effects: None,
            output_ports: Vec::new(),
            queued_reqs: Vec::new(),
            packets: 0,
            bytes: 0,
            insert_time: now,
            last_counter_change: now,
            removed_reason: None,
            prev: NIL,
            next: NIL,
        }
    }

    /// Rebuilds the effects payload and the derived output port list from a
    /// message, releasing the previous ones.
    pub(crate) fn set_effects(&mut self, flow_mod: &M) -> Result<(), FtError> {
        let effects = match flow_mod.effects() {
            Some(effects) => effects,
            None => {
                error!("could not get effects list");
                return Err(FtError::Resource);
            }
        };

        let mut ports = Vec::new();
        effects.each_output_port(|port| ports.push(port));
        self.output_ports = ports;
        self.effects = Some(effects);
        Ok(())
    }

    pub(crate) fn has_out_port(&self, port: PortNo) -> bool {
        self.output_ports.contains(&port)
    }

    /// Flow identifier; [`FLOW_ID_INVALID`] for free slots.
    pub fn id(&self) -> FlowId {
        self.id
    }

    /// Lifecycle state.
    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Match structure; `None` for free slots.
    pub fn match_fields(&self) -> Option<&M::Match> {
        self.match_fields.as_ref()
    }

    /// Match priority.
    pub fn priority(&self) -> u16 {
        self.priority
    }

    /// Opaque 64-bit tag.
    pub fn cookie(&self) -> u64 {
        self.cookie
    }

    /// Protocol flags, stored verbatim.
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Idle timeout in seconds; 0 disables.
    pub fn idle_timeout(&self) -> u16 {
        self.idle_timeout
    }

    /// Hard timeout in seconds; 0 disables.
    pub fn hard_timeout(&self) -> u16 {
        self.hard_timeout
    }

    /// Table the rule addresses.
    pub fn table_id(&self) -> u8 {
        self.table_id
    }

    /// Deep copy of the originating add message.
    pub fn flow_add(&self) -> Option<&M> {
        self.flow_add.as_ref()
    }

    /// Owned effects payload.
    pub fn effects(&self) -> Option<&M::Effects> {
        self.effects.as_ref()
    }

    /// Output ports distilled from the effects.
    pub fn output_ports(&self) -> &[PortNo] {
        &self.output_ports
    }

    /// Requests deferred against this flow.
    pub fn queued_requests(&self) -> &[M] {
        &self.queued_reqs
    }

    /// Packet counter.
    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Byte counter.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// When the entry was installed.
    pub fn insert_time(&self) -> Instant {
        self.insert_time
    }

    /// When the counters last changed.
    pub fn last_counter_change(&self) -> Instant {
        self.last_counter_change
    }

    /// Why the entry is being removed; set when the delete is marked.
    pub fn removed_reason(&self) -> Option<RemovedReason> {
        self.removed_reason
    }
}
