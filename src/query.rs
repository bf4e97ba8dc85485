//! Meta-match queries against the table.

use core::hash::{Hash, Hasher};

use crate::entry::FlowEntry;
use crate::proto::{FlowMatch, FlowMod, PortNo};

/// How a query's match is compared against entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryMode {
    /// Byte-exact match.
    Strict,
    /// Entries whose match is more specific than the query's.
    NonStrict,
    /// Entries whose match overlaps the query's.
    Overlap,
    /// Cookie filter only; the match structure is ignored.
    CookieOnly,
}

/// Meta-match query record.
///
/// Optional filters are `None` to match anything; the wire sentinels (the
/// any-table id and the wildcard destination port) map to `None`.
#[derive(Clone, Debug)]
pub struct MetaMatch<Mt> {
    /// Comparison mode.
    pub mode: QueryMode,
    /// The query's match structure.
    pub match_fields: Mt,
    /// Exact priority filter; also selects the priority index as the
    /// candidate source for non-strict queries.
    pub priority: Option<u16>,
    /// Cookie filter value, compared under `cookie_mask`.
    pub cookie: u64,
    /// Cookie mask; 0 disables the cookie filter.
    pub cookie_mask: u64,
    /// Table id filter.
    pub table_id: Option<u8>,
    /// Output port filter; applied in strict and non-strict modes.
    pub out_port: Option<PortNo>,
}

impl<Mt> MetaMatch<Mt> {
    /// A query with the given mode and match and no optional filters.
    pub fn new(mode: QueryMode, match_fields: Mt) -> Self {
        Self {
            mode,
            match_fields,
            priority: None,
            cookie: 0,
            cookie_mask: 0,
            table_id: None,
            out_port: None,
        }
    }
}

/// Key wrapper for the exact-match index: hashes and compares the raw match
/// bytes in one shot.
pub(crate) struct ExactMatchKey<Mt>(pub(crate) Mt);

impl<Mt: FlowMatch> Hash for ExactMatchKey<Mt> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(self.0.as_bytes());
    }
}

impl<Mt: FlowMatch> PartialEq for ExactMatchKey<Mt> {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes() == other.0.as_bytes()
    }
}

impl<Mt: FlowMatch> Eq for ExactMatchKey<Mt> {}

impl<M: FlowMod> FlowEntry<M> {
    /// Does this entry agree with the meta-match data?
    ///
    /// Deleted entries never match. The cookie, table-id, and priority
    /// filters apply in every mode; the output port filter only in the
    /// strict and non-strict modes.
    pub fn meta_match(&self, query: &MetaMatch<M::Match>) -> bool {
        if self.state.is_deleted() {
            return false;
        }

        if query.cookie_mask != 0
            && (query.cookie & query.cookie_mask) != (self.cookie & query.cookie_mask)
        {
            return false;
        }

        if let Some(table_id) = query.table_id {
            if table_id != self.table_id {
                return false;
            }
        }

        if let Some(priority) = query.priority {
            if self.priority != priority {
                return false;
            }
        }

        let entry_match = match &self.match_fields {
            Some(entry_match) => entry_match,
            None => return false,
        };

        match query.mode {
            QueryMode::NonStrict => {
                entry_match.more_specific_than(&query.match_fields)
                    && self.out_port_ok(query.out_port)
            }
            QueryMode::Strict => {
                entry_match.as_bytes() == query.match_fields.as_bytes()
                    && self.out_port_ok(query.out_port)
            }
            // Cookie already checked above.
            QueryMode::CookieOnly => true,
            QueryMode::Overlap => entry_match.overlaps(&query.match_fields),
        }
    }

    fn out_port_ok(&self, out_port: Option<PortNo>) -> bool {
        match out_port {
            None => true,
            Some(port) => self.has_out_port(port),
        }
    }
}
