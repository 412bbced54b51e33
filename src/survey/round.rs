//! Survey round state
//!
//! `expected` is fixed when the round starts. Each reply moves one id into
//! `seen` or `errored`; the round is complete once every expected id is in
//! one of the two.

use std::collections::{BTreeMap, BTreeSet};

use super::Reply;
use crate::error::{Error, Result};

/// Bookkeeping for one survey round
#[derive(Debug, Default)]
pub struct Round {
    expected: BTreeSet<u64>,
    seen: BTreeSet<u64>,
    errored: BTreeMap<u64, Error>,
}

impl Round {
    /// Start a round expecting replies from `expected`
    pub fn new(expected: BTreeSet<u64>) -> Self {
        Self {
            expected,
            ..Default::default()
        }
    }

    /// Record a reply
    ///
    /// Returns false for ids that were not expected or already answered.
    pub fn record(&mut self, reply: Reply) -> bool {
        let id = reply.id();
        if !self.expected.contains(&id) || self.is_resolved(id) {
            return false;
        }
        match reply {
            Reply::Ok(_) => {
                self.seen.insert(id);
            }
            Reply::Unknown(_) => {
                self.errored
                    .insert(id, Error::UnknownSurvey("respondent rejected survey".into()));
            }
        }
        true
    }

    /// Whether `id` has answered either way
    pub fn is_resolved(&self, id: u64) -> bool {
        self.seen.contains(&id) || self.errored.contains_key(&id)
    }

    /// Whether every expected id has answered
    pub fn is_complete(&self) -> bool {
        self.expected.iter().all(|id| self.is_resolved(*id))
    }

    /// Expected ids that have not answered yet, in order
    pub fn outstanding(&self) -> Vec<u64> {
        self.expected
            .iter()
            .copied()
            .filter(|id| !self.is_resolved(*id))
            .collect()
    }

    /// Ids that acknowledged
    pub fn seen(&self) -> &BTreeSet<u64> {
        &self.seen
    }

    /// Ids that rejected the survey
    pub fn errored(&self) -> impl Iterator<Item = u64> + '_ {
        self.errored.keys().copied()
    }

    /// Final outcome of a complete round
    ///
    /// Any rejection makes the whole round fail with every rejecting id.
    pub fn finish(self) -> Result<()> {
        if self.errored.is_empty() {
            Ok(())
        } else {
            Err(Error::Rejected(self.errored))
        }
    }

    /// Outcome of a round that ran out of attempts
    pub fn give_up(self) -> Error {
        Error::Missing(self.outstanding())
    }
}
