//! Participant identity and session rosters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identity of one participant, as assigned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The live set of participants in a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSet(BTreeSet<ParticipantId>);

impl ParticipantSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant. Returns `false` if already present.
    pub fn insert(&mut self, id: ParticipantId) -> bool {
        self.0.insert(id)
    }

    /// Remove a participant. Returns `false` if absent.
    pub fn remove(&mut self, id: &ParticipantId) -> bool {
        self.0.remove(id)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParticipantId> {
        self.0.iter()
    }

    /// Participants present here but not in `previous`.
    pub fn joined_since<'a>(&'a self, previous: &'a ParticipantSet) -> impl Iterator<Item = &'a ParticipantId> {
        self.0.difference(&previous.0)
    }

    /// Participants present in `previous` but no longer here.
    pub fn left_since<'a>(&'a self, previous: &'a ParticipantSet) -> impl Iterator<Item = &'a ParticipantId> {
        previous.0.difference(&self.0)
    }
}

impl FromIterator<ParticipantId> for ParticipantSet {
    fn from_iter<I: IntoIterator<Item = ParticipantId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ParticipantSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(ParticipantId::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
