//! The flow table: a bounded entry pool with three Robin-Hood indexes.

use std::mem;
use std::time::Instant;

use log::{debug, error, trace};
use rivulet_map::RhMap;

use crate::entry::{FlowEntry, FlowState, NIL};
use crate::error::FtError;
use crate::proto::{FlowId, FlowMod, RemovedReason, FLOW_ID_INVALID};
use crate::query::{ExactMatchKey, MetaMatch, QueryMode};

/// Flow table sizing.
#[derive(Clone, Copy, Debug)]
pub struct TableConfig {
    /// Fixed number of entry slots.
    pub max_entries: usize,
}

/// Flow table status record.
#[derive(Clone, Copy, Debug, Default)]
pub struct TableStatus {
    /// Live entries, pending deletes included.
    pub current_count: usize,
    /// Entries in a deleting state.
    pub pending_deletes: usize,
    /// Adds that succeeded.
    pub adds: u64,
    /// Deletes that completed.
    pub deletes: u64,
    /// Entries marked deleted by a hard timeout.
    pub hard_expires: u64,
    /// Entries marked deleted by an idle timeout.
    pub idle_expires: u64,
    /// Calls that modified a flow entry's effects.
    pub updates: u64,
    /// Adds rejected because the pool was full.
    pub table_full_errors: u64,
    /// Adds the forwarding layer failed to install.
    pub forwarding_add_errors: u64,
}

/// Bounded pool of flow entries indexed by flow id, priority, and exact
/// match, with an insertion-ordered walk over everything live.
///
/// The table is the single owner of its entries; callers refer to flows by
/// id and receive read-only entry references valid until the next mutating
/// operation. The flow id index is unique; the priority and match indexes
/// are multimaps.
pub struct FlowTable<M: FlowMod> {
    config: TableConfig,
    status: TableStatus,
    /// All entry slots.
    slots: Vec<FlowEntry<M>>,
    /// Unused slot stack.
    free: Vec<u32>,
    /// Intrusive all-entries list, threaded through the entry links.
    all_head: u32,
    all_tail: u32,
    id_index: RhMap<FlowId, u32>,
    priority_index: RhMap<u16, u32>,
    match_index: RhMap<ExactMatchKey<M::Match>, u32>,
}

impl<M: FlowMod> FlowTable<M> {
    /// Creates a table with `config.max_entries` slots, all free.
    pub fn new(config: TableConfig) -> Result<Self, FtError> {
        if config.max_entries == 0 {
            error!("flow table requires a fixed, non-zero number of entries");
            return Err(FtError::Unknown);
        }

        let now = Instant::now();
        let slots = (0..config.max_entries)
            .map(|_| FlowEntry::vacant(now))
            .collect();
        let free = (0..config.max_entries as u32).rev().collect();

        Ok(Self {
            config,
            status: TableStatus::default(),
            slots,
            free,
            all_head: NIL,
            all_tail: NIL,
            id_index: RhMap::new(),
            priority_index: RhMap::new(),
            match_index: RhMap::new(),
        })
    }

    /// Table sizing, as configured at creation.
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Operation counters.
    pub fn status(&self) -> &TableStatus {
        &self.status
    }

    /// Number of unused slots.
    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    pub(crate) fn slot(&self, idx: usize) -> &FlowEntry<M> {
        &self.slots[idx]
    }

    /// Looks up a live flow by id.
    pub fn lookup(&self, id: FlowId) -> Option<&FlowEntry<M>> {
        self.id_index
            .get(&id)
            .map(|&slot| &self.slots[slot as usize])
    }

    /// Adds a flow entry under a caller-assigned id.
    ///
    /// Fails with [`FtError::Exists`] when the id is already present and
    /// [`FtError::Resource`] when the pool is full. A slot that fails
    /// mid-setup is handed back to the free list before the error surfaces.
    pub fn add(&mut self, id: FlowId, flow_add: &M) -> Result<&FlowEntry<M>, FtError> {
        trace!("adding flow {:#018x}", id);

        if self.id_index.get(&id).is_some() {
            return Err(FtError::Exists);
        }

        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.status.table_full_errors += 1;
                return Err(FtError::Resource);
            }
        };

        if let Err(err) = self.entry_setup(slot, id, flow_add) {
            self.entry_clear(slot);
            self.free.push(slot);
            return Err(err);
        }

        self.link(slot);
        self.status.adds += 1;
        self.status.current_count += 1;

        Ok(&self.slots[slot as usize])
    }

    /// Removes the flow with the given id from the table.
    ///
    /// Unlinks it from the indexes and the all-entries list, releases
    /// everything it owns, and recycles the slot.
    pub fn delete(&mut self, id: FlowId) -> Result<(), FtError> {
        let slot = match self.id_index.get(&id) {
            Some(&slot) => slot,
            None => {
                debug!("delete: failed to find flow {:#018x}", id);
                return Err(FtError::NotFound);
            }
        };
        trace!(
            "delete rsn {:?} flow {:#018x}",
            self.slots[slot as usize].removed_reason,
            id
        );

        self.unlink(slot);
        self.entry_clear(slot);
        self.free.push(slot);
        self.status.current_count -= 1;
        self.status.deletes += 1;

        Ok(())
    }

    /// Starts the delete process for a flow, recording the reason.
    ///
    /// A no-op when the flow is already marked. Timeout reasons count toward
    /// the expiration counters.
    pub fn mark_deleted(&mut self, id: FlowId, reason: RemovedReason) -> Result<(), FtError> {
        let slot = self.slot_of(id)?;
        let entry = &mut self.slots[slot as usize];
        if entry.state.is_deleted() {
            return Ok(());
        }

        entry.state = FlowState::DeleteMarked;
        entry.removed_reason = Some(reason);
        self.status.pending_deletes += 1;
        match reason {
            RemovedReason::HardTimeout => self.status.hard_expires += 1,
            RemovedReason::IdleTimeout => self.status.idle_expires += 1,
            _ => {}
        }
        Ok(())
    }

    /// Replaces the effects of a flow entry.
    ///
    /// Index membership is untouched: effects are not a key.
    pub fn modify_effects(&mut self, id: FlowId, flow_mod: &M) -> Result<(), FtError> {
        let slot = self.slot_of(id)?;
        trace!("modifying effects of flow {:#018x}", id);

        self.slots[slot as usize].set_effects(flow_mod)?;
        self.status.updates += 1;
        Ok(())
    }

    /// Overwrites the masked bits of a flow's cookie, leaving the rest.
    pub fn modify_cookie(
        &mut self,
        id: FlowId,
        cookie: u64,
        cookie_mask: u64,
    ) -> Result<(), FtError> {
        let slot = self.slot_of(id)?;
        let entry = &mut self.slots[slot as usize];
        entry.cookie = (entry.cookie & !cookie_mask) | (cookie & cookie_mask);
        Ok(())
    }

    /// Returns a flow's current counters and zeroes them.
    pub fn clear_counters(&mut self, id: FlowId) -> Result<(u64, u64), FtError> {
        let slot = self.slot_of(id)?;
        let entry = &mut self.slots[slot as usize];
        let counters = (entry.packets, entry.bytes);
        entry.packets = 0;
        entry.bytes = 0;
        Ok(counters)
    }

    /// Records the counters reported for a flow, stamping the change time
    /// when they moved.
    pub fn update_counters(
        &mut self,
        id: FlowId,
        packets: u64,
        bytes: u64,
    ) -> Result<(), FtError> {
        let slot = self.slot_of(id)?;
        let entry = &mut self.slots[slot as usize];
        if entry.packets != packets || entry.bytes != bytes {
            entry.last_counter_change = Instant::now();
        }
        entry.packets = packets;
        entry.bytes = bytes;
        Ok(())
    }

    /// Defers a request against a flow until the host drains it.
    pub fn queue_request(&mut self, id: FlowId, request: M) -> Result<(), FtError> {
        let slot = self.slot_of(id)?;
        self.slots[slot as usize].queued_reqs.push(request);
        Ok(())
    }

    /// Drains the requests queued against a flow.
    pub fn take_queued_requests(&mut self, id: FlowId) -> Result<Vec<M>, FtError> {
        let slot = self.slot_of(id)?;
        Ok(mem::take(&mut self.slots[slot as usize].queued_reqs))
    }

    /// Counts an add the forwarding layer failed to install.
    pub fn note_forwarding_add_error(&mut self) {
        self.status.forwarding_add_errors += 1;
    }

    /// Iterates over every live entry, in insertion order.
    pub fn iter(&self) -> Entries<'_, M> {
        Entries {
            table: self,
            cursor: self.all_head,
        }
    }

    /// Returns the first entry agreeing with the query, if any.
    ///
    /// Strict queries iterate the exact-match index, priority-checked
    /// queries the priority index; everything else walks the all-entries
    /// list.
    pub fn first_match(&self, query: &MetaMatch<M::Match>) -> Option<&FlowEntry<M>> {
        if query.mode == QueryMode::Strict {
            let key = ExactMatchKey(query.match_fields.clone());
            let mut cursor = 0;
            while let Some(&slot) = self.match_index.lookup(&key, &mut cursor) {
                let entry = &self.slots[slot as usize];
                if entry.meta_match(query) {
                    return Some(entry);
                }
            }
        } else if let Some(priority) = query.priority {
            let mut cursor = 0;
            while let Some(&slot) = self.priority_index.lookup(&priority, &mut cursor) {
                let entry = &self.slots[slot as usize];
                if entry.meta_match(query) {
                    return Some(entry);
                }
            }
        } else {
            for entry in self.iter() {
                if entry.meta_match(query) {
                    return Some(entry);
                }
            }
        }

        None
    }

    /// Returns every entry agreeing with the query. Order is unspecified.
    pub fn query_all(&self, query: &MetaMatch<M::Match>) -> Vec<&FlowEntry<M>> {
        let mut results = Vec::new();

        if query.mode == QueryMode::Strict {
            let key = ExactMatchKey(query.match_fields.clone());
            let mut cursor = 0;
            while let Some(&slot) = self.match_index.lookup(&key, &mut cursor) {
                let entry = &self.slots[slot as usize];
                if entry.meta_match(query) {
                    results.push(entry);
                }
            }
        } else if let Some(priority) = query.priority {
            let mut cursor = 0;
            while let Some(&slot) = self.priority_index.lookup(&priority, &mut cursor) {
                let entry = &self.slots[slot as usize];
                if entry.meta_match(query) {
                    results.push(entry);
                }
            }
        } else {
            for entry in self.iter() {
                if entry.meta_match(query) {
                    results.push(entry);
                }
            }
        }

        trace!("query generated {} entries", results.len());
        results
    }

    fn slot_of(&self, id: FlowId) -> Result<u32, FtError> {
        self.id_index.get(&id).copied().ok_or(FtError::NotFound)
    }

    /// Initializes a fresh slot from an add message. The list links are not
    /// touched here.
    fn entry_setup(&mut self, slot: u32, id: FlowId, flow_add: &M) -> Result<(), FtError> {
        let entry = &mut self.slots[slot as usize];
        debug_assert_eq!(entry.state, FlowState::Free);

        entry.id = id;
        entry.state = FlowState::New;
        entry.flow_add = Some(flow_add.clone());

        entry.match_fields = match flow_add.match_fields() {
            Some(match_fields) => Some(match_fields),
            None => {
                error!("could not extract match fields from flow add");
                return Err(FtError::Unknown);
            }
        };
        entry.cookie = flow_add.cookie();
        entry.priority = flow_add.priority();
        entry.flags = flow_add.flags();
        entry.idle_timeout = flow_add.idle_timeout();
        entry.hard_timeout = flow_add.hard_timeout();
        entry.table_id = flow_add.table_id();
        entry.packets = 0;
        entry.bytes = 0;

        entry.set_effects(flow_add)?;

        entry.insert_time = Instant::now();
        entry.last_counter_change = entry.insert_time;

        Ok(())
    }

    /// Releases everything an entry owns and returns it to the free state.
    /// The list links are not touched here.
    fn entry_clear(&mut self, slot: u32) {
        let entry = &mut self.slots[slot as usize];
        entry.output_ports.clear();
        entry.effects = None;
        entry.flow_add = None;
        entry.match_fields = None;
        entry.queued_reqs.clear();
        entry.removed_reason = None;
        entry.packets = 0;
        entry.bytes = 0;
        entry.id = FLOW_ID_INVALID;

        if entry.state.is_deleted() {
            self.status.pending_deletes -= 1;
        }
        entry.state = FlowState::Free;
    }

    /// Links an entry onto the all-entries list and into all three indexes.
    fn link(&mut self, slot: u32) {
        let tail = self.all_tail;
        {
            let entry = &mut self.slots[slot as usize];
            entry.prev = tail;
            entry.next = NIL;
        }
        if tail != NIL {
            self.slots[tail as usize].next = slot;
        } else {
            self.all_head = slot;
        }
        self.all_tail = slot;

        let entry = &self.slots[slot as usize];
        let id = entry.id;
        let priority = entry.priority;
        let match_key = match &entry.match_fields {
            Some(match_fields) => ExactMatchKey(match_fields.clone()),
            None => unreachable!("linking an entry without match fields"),
        };
        self.id_index.insert(id, slot);
        self.priority_index.insert(priority, slot);
        self.match_index.insert(match_key, slot);
    }

    /// Unlinks an entry from the all-entries list and all three indexes.
    fn unlink(&mut self, slot: u32) {
        let (prev, next, id, priority, match_key) = {
            let entry = &self.slots[slot as usize];
            let match_key = match &entry.match_fields {
                Some(match_fields) => ExactMatchKey(match_fields.clone()),
                None => unreachable!("unlinking an entry without match fields"),
            };
            (entry.prev, entry.next, entry.id, entry.priority, match_key)
        };

        if prev != NIL {
            self.slots[prev as usize].next = next;
        } else {
            self.all_head = next;
        }
        if next != NIL {
            self.slots[next as usize].prev = prev;
        } else {
            self.all_tail = prev;
        }
        {
            let entry = &mut self.slots[slot as usize];
            entry.prev = NIL;
            entry.next = NIL;
        }

        self.id_index.remove(&id, &slot);
        self.priority_index.remove(&priority, &slot);
        self.match_index.remove(&match_key, &slot);
    }
}

/// Iterator over the all-entries list, returned by [`FlowTable::iter`].
pub struct Entries<'a, M: FlowMod> {
    table: &'a FlowTable<M>,
    cursor: u32,
}

impl<'a, M: FlowMod> Iterator for Entries<'a, M> {
    type Item = &'a FlowEntry<M>;

    fn next(&mut self) -> Option<&'a FlowEntry<M>> {
        if self.cursor == NIL {
            return None;
        }
        let entry = &self.table.slots[self.cursor as usize];
        self.cursor = entry.next;
        Some(entry)
    }
}
