use std::collections::BTreeMap;
use std::fmt::Debug;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::Address;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VotingError {
    #[error("sender {0} already voted")]
    AlreadyVoted(Address),
}

pub type Result<T> = std::result::Result<T, VotingError>;

/// Equality used to group votes for the same candidate.
pub trait Equals<T> {
    fn equals(a: &T, b: &T) -> bool;
}

/// Plain `==` for candidates that have a meaningful `PartialEq`.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct PrimitiveEquals;

impl<T: PartialEq> Equals<T> for PrimitiveEquals {
    fn equals(a: &T, b: &T) -> bool {
        a == b
    }
}

/// One vote per address over a growing list of candidates.
///
/// Candidates keep the order in which they were first voted for, which makes
/// [`Voting::outcome`] a pure function of the recorded votes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voting<T, E> {
    votes: BTreeMap<Address, usize>,
    candidates: Vec<T>,
    #[serde(skip)]
    equals: PhantomData<E>,
}

impl<T, E> Default for Voting<T, E> {
    fn default() -> Self {
        Voting {
            votes: BTreeMap::new(),
            candidates: vec![],
            equals: PhantomData,
        }
    }
}

impl<T, E: Equals<T>> Voting<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the vote of `sender`, replacing any earlier vote.
    pub fn set_vote(&mut self, sender: Address, candidate: T) {
        let index = match self.candidates.iter().position(|c| E::equals(&candidate, c)) {
            Some(index) => index,
            None => {
                self.candidates.push(candidate);
                self.candidates.len() - 1
            }
        };
        self.votes.insert(sender, index);
    }

    /// Records the vote of `sender`, failing if it voted before.
    pub fn add_vote(&mut self, sender: Address, candidate: T) -> Result<()> {
        if self.votes.contains_key(&sender) {
            return Err(VotingError::AlreadyVoted(sender));
        }
        self.set_vote(sender, candidate);
        Ok(())
    }

    pub fn has_voted(&self, sender: &Address) -> bool {
        self.votes.contains_key(sender)
    }

    pub fn num_votes(&self) -> usize {
        self.votes.len()
    }

    /// First candidate, in order of first appearance, that reached `num_required_votes`.
    pub fn outcome(&self, num_required_votes: usize) -> Option<&T> {
        let mut counts = vec![0usize; self.candidates.len()];
        for index in self.votes.values() {
            counts[*index] += 1;
        }
        counts
            .iter()
            .position(|count| *count >= num_required_votes)
            .map(|index| &self.candidates[index])
    }
}
