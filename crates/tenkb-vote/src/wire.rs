//! Request and response shapes of the voting endpoints.
//!
//! Every response body is a JSON object `{code, status, ...payload}`. Bodies
//! are decoded here, once, into per-endpoint reply types so nothing downstream
//! looks at raw JSON.

use crate::error::{Error, Result};
use crate::models::{SiteId, Vote, VoterId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Endpoint that mints a new voter id.
pub const ID_PATH: &str = "id/";
/// Endpoint that records or withdraws a vote.
pub const VOTE_PATH: &str = "vote/";
/// Endpoint that reports which of a set of sites a voter upvoted.
pub const VOTES_PATH: &str = "votes/";

/// The only `code` that means success.
pub const CODE_OK: u16 = 200;

/// Form body of `/vote/`.
#[derive(Debug, Serialize)]
pub struct VoteForm<'a> {
    pub site_id: &'a str,
    pub voter_id: &'a str,
    pub vote: &'static str,
}

impl<'a> VoteForm<'a> {
    pub fn new(site_id: &'a SiteId, voter_id: &'a VoterId, vote: Vote) -> Self {
        Self {
            site_id: site_id.as_str(),
            voter_id: voter_id.as_str(),
            vote: vote.as_form_value(),
        }
    }
}

/// Form body of `/votes/`.
///
/// The server splits `site_ids` on `,`; an absent voter is sent as `""`.
#[derive(Debug, Serialize)]
pub struct VotesForm {
    pub site_ids: String,
    pub voter_id: String,
}

impl VotesForm {
    pub fn new<'a>(
        site_ids: impl IntoIterator<Item = &'a SiteId>,
        voter_id: Option<&VoterId>,
    ) -> Result<Self> {
        let mut joined = Vec::new();
        for id in site_ids {
            id.validate()?;
            joined.push(id.as_str());
        }

        Ok(Self {
            site_ids: joined.join(","),
            voter_id: voter_id.map(|v| v.as_str().to_string()).unwrap_or_default(),
        })
    }
}

/// The `{code, status}` part shared by every response.
#[derive(Debug, Deserialize)]
struct Header {
    code: u16,
    #[serde(default)]
    status: String,
}

/// Reply of `/id/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdReply {
    pub voter_id: VoterId,
}

#[derive(Debug, Deserialize)]
struct IdPayload {
    voter_id: String,
}

/// Reply of `/vote/`: success carries nothing beyond the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteReply;

/// Reply of `/votes/`: ids the voter has already upvoted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VotesReply {
    pub site_ids: BTreeSet<SiteId>,
}

#[derive(Debug, Deserialize)]
struct VotesPayload {
    #[serde(default)]
    site_ids: Vec<WireSiteId>,
}

/// The server stores site ids as integers and echoes them as JSON numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireSiteId {
    Text(String),
    Number(u64),
}

impl From<WireSiteId> for SiteId {
    fn from(id: WireSiteId) -> Self {
        match id {
            WireSiteId::Text(s) => SiteId::from(s),
            WireSiteId::Number(n) => SiteId::from(n.to_string()),
        }
    }
}

/// Split a body into its header and, on success, the endpoint payload.
fn decode_body<P: DeserializeOwned>(http_status: u16, body: &[u8]) -> Result<P> {
    let header: Header = serde_json::from_slice(body).map_err(|e| {
        Error::Transport(format!("malformed response (HTTP {http_status}): {e}"))
    })?;

    if header.code != CODE_OK {
        return Err(Error::Rejected {
            code: header.code,
            status: header.status,
        });
    }

    serde_json::from_slice(body)
        .map_err(|e| Error::Transport(format!("malformed response payload: {e}")))
}

/// Decode the body of an `/id/` response.
pub fn decode_id(http_status: u16, body: &[u8]) -> Result<IdReply> {
    let payload: IdPayload = decode_body(http_status, body)?;
    let voter_id = VoterId::new(payload.voter_id)
        .ok_or_else(|| Error::Transport("server issued an empty voter id".into()))?;
    Ok(IdReply { voter_id })
}

/// Decode the body of a `/vote/` response.
pub fn decode_vote(http_status: u16, body: &[u8]) -> Result<VoteReply> {
    let _: serde_json::Value = decode_body(http_status, body)?;
    Ok(VoteReply)
}

/// Decode the body of a `/votes/` response.
pub fn decode_votes(http_status: u16, body: &[u8]) -> Result<VotesReply> {
    let payload: VotesPayload = decode_body(http_status, body)?;
    Ok(VotesReply {
        site_ids: payload.site_ids.into_iter().map(SiteId::from).collect(),
    })
}
