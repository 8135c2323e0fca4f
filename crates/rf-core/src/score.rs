//! # Score Aggregation
//!
//! A post's or comment's `votes` column is a cache of the ledger. The store
//! refreshes it by a full re-sum inside the transaction that mutated the
//! ledger; [`tally`] is that same sum, computed in memory. [`delta`] is the
//! incremental form, kept equal to the re-sum by the tests below.

use crate::models::{ContentRef, Vote, VoteValue};

/// Sum of `value` over every vote referencing `target`.
pub fn tally<'a, I>(votes: I, target: ContentRef) -> i64
where
    I: IntoIterator<Item = &'a Vote>,
{
    votes
        .into_iter()
        .filter(|vote| vote.target == target)
        .map(|vote| vote.value.as_i64())
        .sum()
}

/// Change in the tally when one voter's standing vote goes from `old` to
/// `new` (`None` meaning "no row").
pub fn delta(old: Option<VoteValue>, new: Option<VoteValue>) -> i64 {
    new.map_or(0, VoteValue::as_i64) - old.map_or(0, VoteValue::as_i64)
}
