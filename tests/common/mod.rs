//! Shared test protocol: a value/mask match over a synthetic 64-bit header
//! and a message type implementing the capability traits.

#![allow(dead_code)]

use std::cell::Cell;

use rivulet::{
    EffectList, FlowMatch, FlowMod, FlowTable, FtError, IterTask, PortNo, Scheduler, TaskStatus,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestMatch {
    /// Canonical value (masked) followed by the mask, little endian.
    raw: [u8; 16],
}

impl TestMatch {
    pub fn exact(value: u64) -> Self {
        Self::masked(value, u64::MAX)
    }

    pub fn masked(value: u64, mask: u64) -> Self {
        let mut raw = [0u8; 16];
        raw[..8].copy_from_slice(&(value & mask).to_le_bytes());
        raw[8..].copy_from_slice(&mask.to_le_bytes());
        Self { raw }
    }

    fn value(&self) -> u64 {
        u64::from_le_bytes(self.raw[..8].try_into().unwrap())
    }

    fn mask(&self) -> u64 {
        u64::from_le_bytes(self.raw[8..].try_into().unwrap())
    }
}

impl FlowMatch for TestMatch {
    fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    fn more_specific_than(&self, other: &Self) -> bool {
        self.mask() & other.mask() == other.mask()
            && self.value() & other.mask() == other.value()
    }

    fn overlaps(&self, other: &Self) -> bool {
        let shared = self.mask() & other.mask();
        self.value() & shared == other.value() & shared
    }
}

#[derive(Clone, Debug)]
pub struct TestActions {
    pub ports: Vec<PortNo>,
}

impl EffectList for TestActions {
    fn each_output_port<F: FnMut(PortNo)>(&self, mut f: F) {
        for &port in &self.ports {
            f(port);
        }
    }
}

#[derive(Clone, Debug)]
pub struct TestMsg {
    pub match_fields: TestMatch,
    pub cookie: u64,
    pub priority: u16,
    pub flags: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub table_id: u8,
    pub ports: Vec<PortNo>,
    pub broken_match: bool,
    pub broken_effects: bool,
}

impl TestMsg {
    pub fn new(match_fields: TestMatch) -> Self {
        Self {
            match_fields,
            cookie: 0,
            priority: 100,
            flags: 0,
            idle_timeout: 0,
            hard_timeout: 0,
            table_id: 0,
            ports: vec![1],
            broken_match: false,
            broken_effects: false,
        }
    }

    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_cookie(mut self, cookie: u64) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_ports(mut self, ports: &[PortNo]) -> Self {
        self.ports = ports.to_vec();
        self
    }

    pub fn with_table(mut self, table_id: u8) -> Self {
        self.table_id = table_id;
        self
    }
}

impl FlowMod for TestMsg {
    type Match = TestMatch;
    type Effects = TestActions;

    fn match_fields(&self) -> Option<TestMatch> {
        (!self.broken_match).then(|| self.match_fields.clone())
    }

    fn effects(&self) -> Option<TestActions> {
        (!self.broken_effects).then(|| TestActions {
            ports: self.ports.clone(),
        })
    }

    fn cookie(&self) -> u64 {
        self.cookie
    }

    fn priority(&self) -> u16 {
        self.priority
    }

    fn flags(&self) -> u16 {
        self.flags
    }

    fn idle_timeout(&self) -> u16 {
        self.idle_timeout
    }

    fn hard_timeout(&self) -> u16 {
        self.hard_timeout
    }

    fn table_id(&self) -> u8 {
        self.table_id
    }
}

/// Scheduler stub: yields after every `yield_after` visited slots and holds
/// registered tasks for the test to drive.
pub struct TestScheduler {
    yield_after: usize,
    visited: Cell<usize>,
    pub tasks: Vec<(IterTask<TestMsg>, i32)>,
}

impl TestScheduler {
    /// `yield_after == 0` never yields.
    pub fn new(yield_after: usize) -> Self {
        Self {
            yield_after,
            visited: Cell::new(0),
            tasks: Vec::new(),
        }
    }
}

impl Scheduler<TestMsg> for TestScheduler {
    fn should_yield(&self) -> bool {
        let visited = self.visited.get() + 1;
        self.visited.set(visited);
        self.yield_after != 0 && visited % self.yield_after == 0
    }

    fn register(&mut self, task: IterTask<TestMsg>, priority: i32) -> Result<(), FtError> {
        self.tasks.push((task, priority));
        Ok(())
    }
}

/// Runs the most recently registered task to completion, returning how many
/// ticks it took.
pub fn drive(scheduler: &mut TestScheduler, table: &FlowTable<TestMsg>) -> usize {
    let (mut task, _priority) = scheduler.tasks.pop().expect("no task registered");
    let mut ticks = 0;
    loop {
        ticks += 1;
        if task.tick(table, scheduler) == TaskStatus::Finished {
            return ticks;
        }
    }
}
