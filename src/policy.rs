//! SRV target selection policies.
//!
//! A policy picks the one record of an [`SrvAnswer`](crate::SrvAnswer) whose
//! target a connection is redirected to. [`FirstRecord`] is the default and
//! takes records in the order the DNS server returned them. [`PriorityWeight`]
//! applies RFC 2782 ordering and has to be chosen explicitly, since it changes
//! how load spreads across targets for every caller.

use crate::{record::SrvTarget, SrvRecord};
use std::fmt::Debug;

/// Represents the ability to choose a SRV target from an answer.
pub trait Policy: Debug + Send + Sync {
    /// Selects the record to use, or `None` when there are no records.
    fn select<'a>(&self, records: &'a [SrvTarget]) -> Option<&'a SrvTarget>;
}

/// Uses the first record exactly as returned by the DNS primitive.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstRecord;

impl Policy for FirstRecord {
    fn select<'a>(&self, records: &'a [SrvTarget]) -> Option<&'a SrvTarget> {
        records.first()
    }
}

/// Picks the lowest-priority record, breaking ties by randomized weight.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorityWeight;

impl Policy for PriorityWeight {
    fn select<'a>(&self, records: &'a [SrvTarget]) -> Option<&'a SrvTarget> {
        let mut rng = rand::rng();
        records
            .iter()
            .min_by_key(|record| record.sort_key(&mut rng))
    }
}
