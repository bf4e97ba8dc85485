//! Cooperative iteration over the whole entry pool.
//!
//! Operations that touch every flow can take long enough to starve the host
//! event loop. The iteration task breaks the walk into chunks: the host
//! scheduler ticks it repeatedly and the walk yields whenever the
//! scheduler's oracle says the slice is used up.

use crate::entry::{FlowEntry, FlowState};
use crate::error::FtError;
use crate::proto::FlowMod;
use crate::query::MetaMatch;
use crate::table::FlowTable;

/// Result of one cooperative tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// The walk is not done; tick again later.
    Continue,
    /// The walk finished and the end-of-stream callback ran.
    Finished,
}

/// Host event loop contract for cooperative iteration tasks.
pub trait Scheduler<M: FlowMod> {
    /// True when the current tick has used up its slice.
    fn should_yield(&self) -> bool;

    /// Queues a task for repeated ticking at the given priority.
    fn register(&mut self, task: IterTask<M>, priority: i32) -> Result<(), FtError>;
}

/// Chunked walk over the entire entry pool.
///
/// No snapshot is taken: entries added at indices not yet visited may be
/// observed, deleted entries are skipped, and no index is consulted. The
/// callback runs once per surviving entry and a final time with `None` when
/// the walk completes.
pub struct IterTask<M: FlowMod> {
    query: Option<MetaMatch<M::Match>>,
    callback: Box<dyn FnMut(Option<&FlowEntry<M>>)>,
    idx: usize,
}

impl<M: FlowMod> IterTask<M> {
    fn new(
        query: Option<MetaMatch<M::Match>>,
        callback: Box<dyn FnMut(Option<&FlowEntry<M>>)>,
    ) -> Self {
        Self {
            query,
            callback,
            idx: 0,
        }
    }

    /// Walks entries until the scheduler asks for a yield or the pool is
    /// exhausted.
    pub fn tick<S: Scheduler<M>>(&mut self, table: &FlowTable<M>, scheduler: &S) -> TaskStatus {
        loop {
            if self.idx == table.config().max_entries {
                (self.callback)(None);
                return TaskStatus::Finished;
            }

            let entry = table.slot(self.idx);
            self.idx += 1;

            let skip = entry.state() == FlowState::Free
                || entry.state().is_deleted()
                || self
                    .query
                    .as_ref()
                    .is_some_and(|query| !entry.meta_match(query));
            if !skip {
                (self.callback)(Some(entry));
            }

            if scheduler.should_yield() {
                return TaskStatus::Continue;
            }
        }
    }
}

impl<M: FlowMod> FlowTable<M> {
    /// Spawns a chunked iteration task over the whole pool and registers it
    /// with the scheduler at the given priority.
    ///
    /// `query` optionally filters the walked entries with the usual
    /// meta-match rules.
    pub fn spawn_iter_task<S, F>(
        &self,
        query: Option<MetaMatch<M::Match>>,
        callback: F,
        scheduler: &mut S,
        priority: i32,
    ) -> Result<(), FtError>
    where
        S: Scheduler<M>,
        F: FnMut(Option<&FlowEntry<M>>) + 'static,
    {
        scheduler.register(IterTask::new(query, Box::new(callback)), priority)
    }
}
