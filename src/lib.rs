//! Flow table storage engine for OpenFlow-style flow rules.
//!
//! # Features
//!
//! - **Bounded entry pool** with free-list recycling and a lifecycle state
//!   machine per entry.
//! - **Three Robin-Hood indexes** over [`rivulet_map::RhMap`]: unique flow
//!   id, priority (multi), and exact match (multi).
//! - **Meta-match query engine** with strict, non-strict, overlap, and
//!   cookie-only modes.
//! - **Cooperative iteration tasks** that walk the pool in chunks without
//!   starving the host event loop.
//!
//! The protocol object model stays outside: messages come in through the
//! [`FlowMod`] capability traits and are otherwise opaque. The table assumes
//! a single owner; it is not synchronized.

#![warn(missing_docs)]

mod entry;
mod error;
mod proto;
mod query;
mod table;
mod task;

pub use crate::entry::{FlowEntry, FlowState};
pub use crate::error::FtError;
pub use crate::proto::{
    EffectList, FlowId, FlowMatch, FlowMod, PortNo, RemovedReason, FLOW_ID_INVALID,
};
pub use crate::query::{MetaMatch, QueryMode};
pub use crate::table::{Entries, FlowTable, TableConfig, TableStatus};
pub use crate::task::{IterTask, Scheduler, TaskStatus};
