//! Page-load hydration: one bulk request for every site on the page.

use crate::error::Result;
use crate::models::{SiteId, VoterId};
use crate::state::VoteBoard;
use crate::transport::VoteTransport;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of a hydration pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HydrationReport {
    /// Distinct site ids discovered on the page.
    pub discovered: BTreeSet<SiteId>,
    /// Sites the server reported as already upvoted.
    pub upvoted: BTreeSet<SiteId>,
    /// The bulk request failed; every site was left `unvoted`.
    pub degraded: bool,
}

impl HydrationReport {
    /// Write the result into `board`, whose revision was `since` when the
    /// fetch started.
    ///
    /// A degraded report still resets sites to `unvoted`, so the page always
    /// ends up in a defined state. Votes confirmed while the fetch was out
    /// are kept.
    pub fn apply(&self, board: &mut VoteBoard, since: u64) {
        board.apply_snapshot(&self.discovered, &self.upvoted, since);
    }
}

/// Deduplicate the site ids a host page lists.
pub fn discover<I, S>(site_ids: I) -> BTreeSet<SiteId>
where
    I: IntoIterator<Item = S>,
    S: Into<SiteId>,
{
    site_ids.into_iter().map(Into::into).collect()
}

/// Issues the bulk vote-status request.
pub struct Hydrator {
    transport: Arc<dyn VoteTransport>,
}

impl Hydrator {
    pub fn new(transport: Arc<dyn VoteTransport>) -> Self {
        Self { transport }
    }

    /// Fetch which of `discovered` the voter upvoted.
    ///
    /// Never fails: on any error the report is marked degraded and lists no
    /// upvotes. `voter` may be absent; no identity is issued just to hydrate.
    pub async fn hydrate(
        &self,
        discovered: BTreeSet<SiteId>,
        voter: Option<&VoterId>,
    ) -> HydrationReport {
        match self.fetch(&discovered, voter).await {
            Ok(upvoted) => HydrationReport {
                discovered,
                upvoted,
                degraded: false,
            },
            Err(e) => {
                warn!("hydration failed, showing all sites as unvoted: {e}");
                HydrationReport {
                    discovered,
                    upvoted: BTreeSet::new(),
                    degraded: true,
                }
            }
        }
    }

    async fn fetch(
        &self,
        discovered: &BTreeSet<SiteId>,
        voter: Option<&VoterId>,
    ) -> Result<BTreeSet<SiteId>> {
        let sendable: BTreeSet<SiteId> = discovered
            .iter()
            .filter(|site| match site.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!("not hydrating site: {e}");
                    false
                }
            })
            .cloned()
            .collect();

        if sendable.is_empty() {
            debug!("no sites to hydrate");
            return Ok(BTreeSet::new());
        }

        debug!(
            "hydrating {} sites (voter known: {})",
            sendable.len(),
            voter.is_some()
        );
        self.transport.fetch_votes(&sendable, voter).await
    }
}
