//! The voting client a host page embeds.
//!
//! Ties the pieces together:
//! - on load, [`VoteClient::hydrate`] registers the page's sites and fetches
//!   their vote state in one request
//! - on click, [`VoteClient::toggle`] reads the site's current state, requests
//!   the inverse transition, and flips the state once the server confirms
//!
//! Every failure of a user action is surfaced through the [`Notifier`] and
//! leaves the page able to retry.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::hydrate::{self, HydrationReport, Hydrator};
use crate::identity::{FileIdentityStore, IdentityProvider, IdentityStore};
use crate::models::{SiteId, Vote, VoteState, VoterId};
use crate::state::VoteBoard;
use crate::transport::{HttpTransport, VoteTransport};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Receives user-visible notices.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notifier that writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        warn!("{message}");
    }
}

/// Client-side voting state for one page.
pub struct VoteClient {
    transport: Arc<dyn VoteTransport>,
    identity: IdentityProvider,
    hydrator: Hydrator,
    board: Arc<RwLock<VoteBoard>>,
    notifier: Arc<dyn Notifier>,
}

impl VoteClient {
    /// Create a client from its collaborators.
    pub fn new(
        transport: Arc<dyn VoteTransport>,
        store: Arc<dyn IdentityStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            identity: IdentityProvider::new(store, transport.clone()),
            hydrator: Hydrator::new(transport.clone()),
            transport,
            board: Arc::new(RwLock::new(VoteBoard::new())),
            notifier,
        }
    }

    /// HTTP transport, file-backed identity, notices to the log.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config)?);
        let store = Arc::new(FileIdentityStore::new(&config.identity_path));
        Ok(Self::new(transport, store, Arc::new(LogNotifier)))
    }

    /// Register the page's sites and load their state from the server.
    ///
    /// Duplicates are ignored. Uses the stored voter id if there is one but
    /// never issues a new one. If the request fails every site shows
    /// `unvoted` and voting stays possible.
    pub async fn hydrate<I, S>(&self, site_ids: I) -> HydrationReport
    where
        I: IntoIterator<Item = S>,
        S: Into<SiteId>,
    {
        let discovered = hydrate::discover(site_ids);
        let voter = self.identity.current().await;
        let since = self.board.read().await.revision();

        let report = self.hydrator.hydrate(discovered, voter.as_ref()).await;

        let mut board = self.board.write().await;
        report.apply(&mut board, since);
        info!(
            "hydrated {} sites, {} upvoted{}",
            report.discovered.len(),
            report.upvoted.len(),
            if report.degraded { " (degraded)" } else { "" }
        );

        report
    }

    /// Click handler for a site's control.
    ///
    /// Requests `Add` when the site shows `unvoted` and `Remove` when it shows
    /// `upvoted`. Returns the state after the server's answer.
    pub async fn toggle(&self, site: &SiteId) -> Result<VoteState> {
        let vote = {
            let mut board = self.board.write().await;
            board.register(site.clone());
            board.begin(site)
        };

        match vote {
            Ok(vote) => self.complete(site, vote).await,
            Err(e) => Err(self.surface(e)),
        }
    }

    /// Request an explicit transition: `0` removes an upvote, `1` adds one.
    ///
    /// Values outside that range are refused before any request is made.
    pub async fn cast(&self, site: &SiteId, vote: i64) -> Result<VoteState> {
        let vote = match Vote::try_from(vote) {
            Ok(vote) => vote,
            Err(e) => return Err(self.surface(e)),
        };

        let begun = {
            let mut board = self.board.write().await;
            board.register(site.clone());
            board.begin_vote(site, vote)
        };

        match begun {
            Ok(vote) => self.complete(site, vote).await,
            Err(e) => Err(self.surface(e)),
        }
    }

    /// Displayed state of a site, if it is on the page.
    pub async fn state(&self, site: &SiteId) -> Option<VoteState> {
        self.board.read().await.state(site)
    }

    /// Whether a vote for `site` is waiting on the server.
    pub async fn is_pending(&self, site: &SiteId) -> bool {
        self.board
            .read()
            .await
            .get(site)
            .is_some_and(|control| control.is_pending())
    }

    /// Displayed state of every site on the page.
    pub async fn snapshot(&self) -> BTreeMap<SiteId, VoteState> {
        self.board.read().await.snapshot()
    }

    /// The voter id, issuing one if none is stored or `force` is set.
    pub async fn identity(&self, force: bool) -> Result<VoterId> {
        self.identity.get_identity(force).await
    }

    /// Forget the stored voter id. The next vote issues a new one.
    pub async fn clear_identity(&self) -> Result<()> {
        self.identity.clear().await
    }

    /// Second half of a transition: identity, request, then commit or roll back.
    async fn complete(&self, site: &SiteId, vote: Vote) -> Result<VoteState> {
        let mut guard = PendingGuard::new(self.board.clone(), site.clone());
        let outcome = self.send(site, vote).await;

        let mut board = self.board.write().await;
        guard.disarm();
        match outcome {
            Ok(()) => {
                let state = board.confirm(site, vote)?;
                drop(board);
                info!("vote {vote} on site {site} confirmed, now {state}");
                Ok(state)
            }
            Err(e) => {
                let state = board.abort(site)?;
                drop(board);
                debug!("vote {vote} on site {site} failed, still {state}");
                Err(self.surface(e))
            }
        }
    }

    async fn send(&self, site: &SiteId, vote: Vote) -> Result<()> {
        let voter = self.identity.get_identity(false).await?;
        debug!("casting vote {vote} on site {site} as {voter}");
        self.transport.cast_vote(site, &voter, vote).await
    }

    /// Show `e` to the user unless it is a swallowed double click.
    fn surface(&self, e: Error) -> Error {
        match &e {
            Error::InFlight(site) => debug!("ignoring click on {site}: vote in flight"),
            _ => self.notifier.notify(&e.notice()),
        }
        e
    }
}

/// Releases a site's pending vote if the transition is dropped before the
/// server answered.
struct PendingGuard {
    board: Arc<RwLock<VoteBoard>>,
    site: SiteId,
    armed: bool,
}

impl PendingGuard {
    fn new(board: Arc<RwLock<VoteBoard>>, site: SiteId) -> Self {
        Self {
            board,
            site,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("vote on site {} abandoned before the server answered", self.site);

        if let Ok(mut board) = self.board.try_write() {
            let _ = board.abort(&self.site);
            return;
        }
        // Board is busy; release the site once it is free.
        if let Ok(handle) = Handle::try_current() {
            let board = self.board.clone();
            let site = self.site.clone();
            handle.spawn(async move {
                let _ = board.write().await.abort(&site);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MemoryIdentityStore;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Records every call, in order.
    #[derive(Default)]
    struct ScriptedServer {
        calls: Mutex<Vec<String>>,
        issued: AtomicUsize,
        upvoted: Mutex<BTreeSet<(String, SiteId)>>,
        reject_votes: Mutex<Option<String>>,
        fail_identity: bool,
        stall_next_vote: AtomicBool,
    }

    impl ScriptedServer {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VoteTransport for ScriptedServer {
        async fn issue_identity(&self) -> Result<VoterId> {
            self.calls.lock().unwrap().push("id".into());
            if self.fail_identity {
                return Err(Error::Transport("connection reset".into()));
            }
            let n = self.issued.fetch_add(1, Ordering::SeqCst);
            Ok(VoterId::new(format!("v-{}", 123 + n)).unwrap())
        }

        async fn cast_vote(&self, site_id: &SiteId, voter_id: &VoterId, vote: Vote) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("vote {site_id} {voter_id} {vote}"));
            if self.stall_next_vote.swap(false, Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if let Some(status) = self.reject_votes.lock().unwrap().clone() {
                return Err(Error::Rejected { code: 500, status });
            }
            let key = (voter_id.to_string(), site_id.clone());
            let mut upvoted = self.upvoted.lock().unwrap();
            match vote {
                Vote::Add => upvoted.insert(key),
                Vote::Remove => upvoted.remove(&key),
            };
            Ok(())
        }

        async fn fetch_votes(
            &self,
            site_ids: &BTreeSet<SiteId>,
            voter_id: Option<&VoterId>,
        ) -> Result<BTreeSet<SiteId>> {
            self.calls.lock().unwrap().push("votes".into());
            let Some(voter) = voter_id else {
                return Ok(BTreeSet::new());
            };
            Ok(self
                .upvoted
                .lock()
                .unwrap()
                .iter()
                .filter(|(v, site)| v == voter.as_str() && site_ids.contains(site))
                .map(|(_, site)| site.clone())
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, message: &str) {
            self.notices.lock().unwrap().push(message.to_string());
        }
    }

    struct Harness {
        client: VoteClient,
        server: Arc<ScriptedServer>,
        notices: Arc<RecordingNotifier>,
        store: Arc<MemoryIdentityStore>,
    }

    fn harness(server: ScriptedServer, store: MemoryIdentityStore) -> Harness {
        let server = Arc::new(server);
        let notices = Arc::new(RecordingNotifier::default());
        let store = Arc::new(store);
        let client = VoteClient::new(server.clone(), store.clone(), notices.clone());
        Harness {
            client,
            server,
            notices,
            store,
        }
    }

    #[tokio::test]
    async fn first_vote_issues_identity_once() {
        let h = harness(ScriptedServer::default(), MemoryIdentityStore::new());
        h.client.hydrate(["a1", "b2"]).await;

        let state = h.client.toggle(&"a1".into()).await.unwrap();
        assert_eq!(state, VoteState::Upvoted);
        h.client.toggle(&"b2".into()).await.unwrap();

        assert_eq!(
            h.server.calls(),
            vec!["votes", "id", "vote a1 v-123 1", "vote b2 v-123 1"]
        );
        assert_eq!(h.store.load().unwrap().unwrap().as_str(), "v-123");
    }

    #[tokio::test]
    async fn toggle_is_symmetric() {
        let h = harness(ScriptedServer::default(), MemoryIdentityStore::new());
        h.client.hydrate(["a1"]).await;
        let site = SiteId::from("a1");

        assert_eq!(h.client.toggle(&site).await.unwrap(), VoteState::Upvoted);
        assert_eq!(h.client.toggle(&site).await.unwrap(), VoteState::Unvoted);
        assert_eq!(h.client.toggle(&site).await.unwrap(), VoteState::Upvoted);

        let calls = h.server.calls();
        assert_eq!(calls[2], "vote a1 v-123 1");
        assert_eq!(calls[3], "vote a1 v-123 0");
        assert_eq!(calls[4], "vote a1 v-123 1");
    }

    #[tokio::test]
    async fn rejection_leaves_state_and_binding() {
        let server = ScriptedServer {
            reject_votes: Mutex::new(Some("database is locked".into())),
            ..Default::default()
        };
        let h = harness(server, MemoryIdentityStore::new());
        h.client.hydrate(["a1"]).await;
        let site = SiteId::from("a1");

        let err = h.client.toggle(&site).await.unwrap_err();
        assert!(matches!(err, Error::Rejected { .. }));
        assert_eq!(h.client.state(&site).await, Some(VoteState::Unvoted));
        assert!(!h.client.is_pending(&site).await);
        assert_eq!(
            h.notices.notices.lock().unwrap().clone(),
            vec!["database is locked"]
        );

        // The next click still asks for an upvote.
        *h.server.reject_votes.lock().unwrap() = None;
        h.client.toggle(&site).await.unwrap();
        assert_eq!(h.server.calls().last().unwrap(), "vote a1 v-123 1");
    }

    #[tokio::test]
    async fn invalid_vote_never_reaches_network() {
        let h = harness(ScriptedServer::default(), MemoryIdentityStore::new());
        h.client.hydrate(["a1"]).await;

        let err = h.client.cast(&"a1".into(), 2).await.unwrap_err();
        assert!(matches!(err, Error::InvalidVote(2)));
        assert_eq!(h.server.calls(), vec!["votes"]);
        assert_eq!(h.notices.notices.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn identity_failure_aborts_vote() {
        let server = ScriptedServer {
            fail_identity: true,
            ..Default::default()
        };
        let h = harness(server, MemoryIdentityStore::new());
        h.client.hydrate(["a1"]).await;
        let site = SiteId::from("a1");

        let err = h.client.toggle(&site).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(h.server.calls(), vec!["votes", "id"]);
        assert_eq!(h.client.state(&site).await, Some(VoteState::Unvoted));
        assert_eq!(h.notices.notices.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn hydration_uses_stored_identity() {
        let h = harness(
            ScriptedServer::default(),
            MemoryIdentityStore::with_identity(VoterId::new("v-9").unwrap()),
        );
        h.server
            .upvoted
            .lock()
            .unwrap()
            .insert(("v-9".into(), "b2".into()));

        let report = h.client.hydrate(["a1", "b2"]).await;
        assert!(!report.degraded);

        let snapshot = h.client.snapshot().await;
        assert_eq!(snapshot[&SiteId::from("a1")], VoteState::Unvoted);
        assert_eq!(snapshot[&SiteId::from("b2")], VoteState::Upvoted);

        // Upvoted control asks for removal next, and no id was issued.
        h.client.toggle(&"b2".into()).await.unwrap();
        assert_eq!(h.server.calls(), vec!["votes", "vote b2 v-9 0"]);
    }

    #[tokio::test]
    async fn hydration_is_idempotent() {
        let h = harness(
            ScriptedServer::default(),
            MemoryIdentityStore::with_identity(VoterId::new("v-9").unwrap()),
        );
        h.server
            .upvoted
            .lock()
            .unwrap()
            .insert(("v-9".into(), "a1".into()));

        h.client.hydrate(["a1", "b2"]).await;
        let first = h.client.snapshot().await;
        h.client.hydrate(["a1", "b2"]).await;

        assert_eq!(h.client.snapshot().await, first);
    }

    #[tokio::test]
    async fn passive_visit_creates_no_identity() {
        let h = harness(ScriptedServer::default(), MemoryIdentityStore::new());
        h.client.hydrate(["a1", "b2"]).await;

        assert_eq!(h.server.calls(), vec!["votes"]);
        assert!(h.store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn unregistered_site_can_still_be_voted() {
        let h = harness(ScriptedServer::default(), MemoryIdentityStore::new());

        let state = h.client.toggle(&"c3".into()).await.unwrap();
        assert_eq!(state, VoteState::Upvoted);
        assert_eq!(h.client.state(&"c3".into()).await, Some(VoteState::Upvoted));
    }

    #[tokio::test]
    async fn cast_is_symmetric() {
        let h = harness(ScriptedServer::default(), MemoryIdentityStore::new());
        h.client.hydrate(["a1"]).await;
        let site = SiteId::from("a1");

        assert_eq!(h.client.cast(&site, 1).await.unwrap(), VoteState::Upvoted);
        assert!(!h.client.is_pending(&site).await);
        assert_eq!(
            h.client.board.read().await.get(&site).unwrap().next_vote(),
            Vote::Remove
        );

        assert_eq!(h.client.cast(&site, 0).await.unwrap(), VoteState::Unvoted);
        assert!(!h.client.is_pending(&site).await);
        assert_eq!(
            h.client.board.read().await.get(&site).unwrap().next_vote(),
            Vote::Add
        );

        assert_eq!(h.client.toggle(&site).await.unwrap(), VoteState::Upvoted);
        assert_eq!(h.server.calls().last().unwrap(), "vote a1 v-123 1");
    }

    #[tokio::test]
    async fn cast_matching_current_state_is_sent_and_keeps_state() {
        let h = harness(ScriptedServer::default(), MemoryIdentityStore::new());
        let site = SiteId::from("a1");

        h.client.cast(&site, 1).await.unwrap();
        assert_eq!(h.client.cast(&site, 1).await.unwrap(), VoteState::Upvoted);

        let calls = h.server.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1], "vote a1 v-123 1");
        assert_eq!(calls[2], "vote a1 v-123 1");
        assert_eq!(
            h.client.board.read().await.get(&site).unwrap().next_vote(),
            Vote::Remove
        );
    }

    /// Answers `votes/` from the state at arrival, then waits to be released.
    #[derive(Default)]
    struct GatedServer {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl VoteTransport for GatedServer {
        async fn issue_identity(&self) -> Result<VoterId> {
            Ok(VoterId::new("v-1").unwrap())
        }

        async fn cast_vote(&self, _: &SiteId, _: &VoterId, _: Vote) -> Result<()> {
            Ok(())
        }

        async fn fetch_votes(
            &self,
            _: &BTreeSet<SiteId>,
            _: Option<&VoterId>,
        ) -> Result<BTreeSet<SiteId>> {
            let answer = BTreeSet::new();
            self.entered.notify_one();
            self.release.notified().await;
            Ok(answer)
        }
    }

    #[tokio::test]
    async fn late_hydration_keeps_vote_confirmed_meanwhile() {
        let server = Arc::new(GatedServer::default());
        let client = Arc::new(VoteClient::new(
            server.clone(),
            Arc::new(MemoryIdentityStore::new()),
            Arc::new(RecordingNotifier::default()),
        ));
        let site = SiteId::from("a1");

        let hydration = {
            let client = client.clone();
            tokio::spawn(async move { client.hydrate(["a1", "b2"]).await })
        };
        server.entered.notified().await;

        assert_eq!(client.toggle(&site).await.unwrap(), VoteState::Upvoted);
        server.release.notify_one();
        let report = hydration.await.unwrap();

        assert!(!report.degraded);
        assert_eq!(client.state(&site).await, Some(VoteState::Upvoted));
        assert_eq!(client.state(&"b2".into()).await, Some(VoteState::Unvoted));
        assert_eq!(
            client.board.read().await.get(&site).unwrap().next_vote(),
            Vote::Remove
        );
    }

    #[tokio::test]
    async fn dropped_vote_releases_the_control() {
        let server = ScriptedServer {
            stall_next_vote: AtomicBool::new(true),
            ..Default::default()
        };
        let h = harness(server, MemoryIdentityStore::new());
        h.client.hydrate(["a1"]).await;
        let site = SiteId::from("a1");

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), h.client.toggle(&site)).await;
        assert!(abandoned.is_err());
        assert!(!h.client.is_pending(&site).await);
        assert_eq!(h.client.state(&site).await, Some(VoteState::Unvoted));

        assert_eq!(h.client.toggle(&site).await.unwrap(), VoteState::Upvoted);
    }
}
