//! Network operations against the voting server.
//!
//! Three single request/response exchanges:
//! - `POST id/` mints a voter id
//! - `POST vote/` records (`1`) or withdraws (`0`) an upvote
//! - `POST votes/` reports which of the given sites a voter already upvoted
//!
//! Each call returns `Ok` on success, [`Error::Rejected`] when the server
//! answered with a non-200 `code`, and [`Error::Transport`] for network
//! failures and bodies that could not be decoded.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::models::{SiteId, Vote, VoterId};
use crate::wire::{self, VoteForm, VotesForm};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;
use url::Url;

/// The three operations the client needs from the server.
#[async_trait]
pub trait VoteTransport: Send + Sync {
    /// Ask the server for a fresh voter id.
    async fn issue_identity(&self) -> Result<VoterId>;

    /// Record or withdraw `voter_id`'s upvote of `site_id`.
    async fn cast_vote(&self, site_id: &SiteId, voter_id: &VoterId, vote: Vote) -> Result<()>;

    /// Subset of `site_ids` already upvoted by `voter_id`.
    ///
    /// With no voter the server reports no prior votes.
    async fn fetch_votes(
        &self,
        site_ids: &BTreeSet<SiteId>,
        voter_id: Option<&VoterId>,
    ) -> Result<BTreeSet<SiteId>>;
}

/// [`VoteTransport`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    /// Build a transport from client configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Root URL the endpoints are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("cannot build url for '{path}': {e}")))
    }

    /// POST to `path` and hand back the HTTP status and raw body.
    async fn post<F>(&self, path: &str, form: Option<&F>) -> Result<(u16, Vec<u8>)>
    where
        F: Serialize + ?Sized + Sync,
    {
        let url = self.endpoint(path)?;
        debug!("POST {url}");

        let mut request = self.client.post(url);
        if let Some(form) = form {
            request = request.form(form);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok((status, body.to_vec()))
    }
}

#[async_trait]
impl VoteTransport for HttpTransport {
    async fn issue_identity(&self) -> Result<VoterId> {
        let (status, body) = self.post::<()>(wire::ID_PATH, None).await?;
        let reply = wire::decode_id(status, &body)?;
        Ok(reply.voter_id)
    }

    async fn cast_vote(&self, site_id: &SiteId, voter_id: &VoterId, vote: Vote) -> Result<()> {
        let form = VoteForm::new(site_id, voter_id, vote);
        let (status, body) = self.post(wire::VOTE_PATH, Some(&form)).await?;
        wire::decode_vote(status, &body)?;
        Ok(())
    }

    async fn fetch_votes(
        &self,
        site_ids: &BTreeSet<SiteId>,
        voter_id: Option<&VoterId>,
    ) -> Result<BTreeSet<SiteId>> {
        let form = VotesForm::new(site_ids, voter_id)?;
        let (status, body) = self.post(wire::VOTES_PATH, Some(&form)).await?;
        let reply = wire::decode_votes(status, &body)?;

        // Only ids we asked about can be marked.
        Ok(reply
            .site_ids
            .into_iter()
            .filter(|id| site_ids.contains(id))
            .collect())
    }
}
