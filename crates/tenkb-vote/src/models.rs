//! Core value types: site and voter identifiers, votes, and per-site state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a listed site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(String);

impl SiteId {
    /// Wrap a site id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the id can be carried in the comma-joined `site_ids` field.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() || self.0.contains(',') {
            return Err(Error::InvalidSiteId(self.0.clone()));
        }
        Ok(())
    }
}

impl From<&str> for SiteId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SiteId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Anonymous voter token minted by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterId(String);

impl VoterId {
    /// Wrap a voter token, rejecting the empty string.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    /// Borrow the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Requested vote transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vote {
    /// Withdraw an upvote (`0` on the wire).
    Remove,
    /// Add an upvote (`1` on the wire).
    Add,
}

impl Vote {
    /// Form value sent to `/vote/`.
    pub fn as_form_value(self) -> &'static str {
        match self {
            Vote::Remove => "0",
            Vote::Add => "1",
        }
    }
}

impl TryFrom<i64> for Vote {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Vote::Remove),
            1 => Ok(Vote::Add),
            other => Err(Error::InvalidVote(other)),
        }
    }
}

impl From<Vote> for i64 {
    fn from(vote: Vote) -> Self {
        match vote {
            Vote::Remove => 0,
            Vote::Add => 1,
        }
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_form_value())
    }
}

/// Displayed vote state of one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteState {
    #[default]
    Unvoted,
    Upvoted,
}

impl VoteState {
    /// The transition a control showing this state requests when clicked.
    pub fn requested_vote(self) -> Vote {
        match self {
            VoteState::Unvoted => Vote::Add,
            VoteState::Upvoted => Vote::Remove,
        }
    }

    /// State after the server confirmed `vote`.
    pub fn after(vote: Vote) -> Self {
        match vote {
            Vote::Add => VoteState::Upvoted,
            Vote::Remove => VoteState::Unvoted,
        }
    }
}

impl fmt::Display for VoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteState::Unvoted => write!(f, "unvoted"),
            VoteState::Upvoted => write!(f, "upvoted"),
        }
    }
}
