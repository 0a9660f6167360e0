//! Per-site vote state and the transitions bound to it.
//!
//! Each site is `unvoted` or `upvoted`. Clicking a site's control requests the
//! inverse of what it shows; the board records the request as pending and only
//! flips the state when the server confirms it. The transition a control
//! requests is always derived from the current state, so a control can never
//! ask for the same transition twice in a row.

use crate::error::{Error, Result};
use crate::models::{SiteId, Vote, VoteState};
use std::collections::{BTreeMap, BTreeSet};

/// State of one site's control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SiteControl {
    /// Confirmed state.
    pub state: VoteState,
    /// Vote sent to the server and not answered yet.
    pub pending: Option<Vote>,
    /// Board revision of the last confirmed vote, `0` if none.
    pub confirmed_at: u64,
}

impl SiteControl {
    /// Transition the control requests next.
    pub fn next_vote(&self) -> Vote {
        self.state.requested_vote()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Registry of the sites on a page and their vote state.
#[derive(Debug, Default)]
pub struct VoteBoard {
    sites: BTreeMap<SiteId, SiteControl>,
    revision: u64,
}

impl VoteBoard {
    /// Create an empty board.
    pub fn new() -> Self {
        Self {
            sites: BTreeMap::new(),
            revision: 0,
        }
    }

    /// Add a site as `unvoted`. Already registered sites keep their state.
    pub fn register(&mut self, site: SiteId) -> bool {
        let mut added = false;
        self.sites.entry(site).or_insert_with(|| {
            added = true;
            SiteControl::default()
        });
        added
    }

    /// Control of a site, if registered.
    pub fn get(&self, site: &SiteId) -> Option<&SiteControl> {
        self.sites.get(site)
    }

    /// Confirmed state of a site, if registered.
    pub fn state(&self, site: &SiteId) -> Option<VoteState> {
        self.sites.get(site).map(|c| c.state)
    }

    /// Counter advanced by every confirmed vote.
    ///
    /// Read it before fetching a snapshot and pass it to
    /// [`apply_snapshot`](Self::apply_snapshot).
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Overwrite confirmed states of `sites` from a snapshot fetched at
    /// revision `since`.
    ///
    /// Each site is registered if needed, then set to `Upvoted` if it is in
    /// `upvoted` and `Unvoted` otherwise. A site is left alone while it has a
    /// vote in flight or when a vote on it was confirmed after `since`.
    pub fn apply_snapshot(
        &mut self,
        sites: &BTreeSet<SiteId>,
        upvoted: &BTreeSet<SiteId>,
        since: u64,
    ) {
        for site in sites {
            let control = self.sites.entry(site.clone()).or_default();
            if control.is_pending() || control.confirmed_at > since {
                continue;
            }
            control.state = if upvoted.contains(site) {
                VoteState::Upvoted
            } else {
                VoteState::Unvoted
            };
        }
    }

    /// Start the transition the site's control is bound to.
    pub fn begin(&mut self, site: &SiteId) -> Result<Vote> {
        let vote = self.control(site)?.next_vote();
        self.begin_vote(site, vote)
    }

    /// Start an explicit transition.
    pub fn begin_vote(&mut self, site: &SiteId, vote: Vote) -> Result<Vote> {
        let control = self.control_mut(site)?;
        if control.is_pending() {
            return Err(Error::InFlight(site.clone()));
        }
        control.pending = Some(vote);
        Ok(vote)
    }

    /// Server accepted `vote`: flip the state and release the control.
    pub fn confirm(&mut self, site: &SiteId, vote: Vote) -> Result<VoteState> {
        let control = self
            .sites
            .get_mut(site)
            .ok_or_else(|| Error::UnknownSite(site.clone()))?;
        self.revision += 1;
        control.state = VoteState::after(vote);
        control.pending = None;
        control.confirmed_at = self.revision;
        Ok(control.state)
    }

    /// The request failed: release the control, leaving the state as it was.
    pub fn abort(&mut self, site: &SiteId) -> Result<VoteState> {
        let control = self.control_mut(site)?;
        control.pending = None;
        Ok(control.state)
    }

    /// Registered site ids.
    pub fn site_ids(&self) -> BTreeSet<SiteId> {
        self.sites.keys().cloned().collect()
    }

    /// Confirmed state of every site.
    pub fn snapshot(&self) -> BTreeMap<SiteId, VoteState> {
        self.sites
            .iter()
            .map(|(site, control)| (site.clone(), control.state))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    fn control(&self, site: &SiteId) -> Result<&SiteControl> {
        self.sites
            .get(site)
            .ok_or_else(|| Error::UnknownSite(site.clone()))
    }

    fn control_mut(&mut self, site: &SiteId) -> Result<&mut SiteControl> {
        self.sites
            .get_mut(site)
            .ok_or_else(|| Error::UnknownSite(site.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(ids: &[&str]) -> VoteBoard {
        let mut board = VoteBoard::new();
        for id in ids {
            board.register(SiteId::from(*id));
        }
        board
    }

    #[test]
    fn sites_start_unvoted() {
        assert!(VoteBoard::new().is_empty());
        let board = board(&["a1", "b2"]);
        assert_eq!(board.len(), 2);
        assert_eq!(board.state(&"a1".into()), Some(VoteState::Unvoted));
        assert_eq!(board.state(&"b2".into()), Some(VoteState::Unvoted));
    }

    #[test]
    fn register_keeps_existing_state() {
        let mut board = board(&["a1"]);
        let site = SiteId::from("a1");
        board.begin(&site).unwrap();
        board.confirm(&site, Vote::Add).unwrap();

        assert!(!board.register(site.clone()));
        assert_eq!(board.state(&site), Some(VoteState::Upvoted));
    }

    #[test]
    fn confirmed_toggle_rebinds_control() {
        let mut board = board(&["a1"]);
        let site = SiteId::from("a1");

        let vote = board.begin(&site).unwrap();
        assert_eq!(vote, Vote::Add);
        assert_eq!(board.confirm(&site, vote).unwrap(), VoteState::Upvoted);
        assert_eq!(board.get(&site).unwrap().next_vote(), Vote::Remove);

        let vote = board.begin(&site).unwrap();
        assert_eq!(vote, Vote::Remove);
        assert_eq!(board.confirm(&site, vote).unwrap(), VoteState::Unvoted);
        assert_eq!(board.get(&site).unwrap().next_vote(), Vote::Add);
    }

    #[test]
    fn abort_leaves_state_and_binding() {
        let mut board = board(&["a1"]);
        let site = SiteId::from("a1");

        board.begin(&site).unwrap();
        assert_eq!(board.abort(&site).unwrap(), VoteState::Unvoted);

        let control = board.get(&site).unwrap();
        assert!(!control.is_pending());
        assert_eq!(control.next_vote(), Vote::Add);
    }

    #[test]
    fn second_begin_while_pending_is_refused() {
        let mut board = board(&["a1"]);
        let site = SiteId::from("a1");

        board.begin(&site).unwrap();
        assert!(matches!(board.begin(&site), Err(Error::InFlight(_))));
    }

    #[test]
    fn unknown_site_is_refused() {
        let mut board = VoteBoard::new();
        assert!(matches!(
            board.begin(&"zz".into()),
            Err(Error::UnknownSite(_))
        ));
    }

    #[test]
    fn snapshot_sets_every_site() {
        let mut board = board(&["a1", "b2"]);
        let sites = board.site_ids();
        let upvoted: BTreeSet<SiteId> = [SiteId::from("b2")].into_iter().collect();

        board.apply_snapshot(&sites, &upvoted, 0);
        let first = board.snapshot();
        board.apply_snapshot(&sites, &upvoted, 0);

        assert_eq!(board.snapshot(), first);
        assert_eq!(first[&SiteId::from("a1")], VoteState::Unvoted);
        assert_eq!(first[&SiteId::from("b2")], VoteState::Upvoted);
    }

    #[test]
    fn snapshot_skips_pending_sites() {
        let mut board = board(&["a1"]);
        let site = SiteId::from("a1");
        board.begin(&site).unwrap();

        let sites: BTreeSet<SiteId> = [site.clone()].into_iter().collect();
        board.apply_snapshot(&sites, &sites, 0);
        assert_eq!(board.state(&site), Some(VoteState::Unvoted));
    }

    #[test]
    fn snapshot_leaves_other_sites_alone() {
        let mut board = board(&["a1"]);
        let a1 = SiteId::from("a1");
        board.begin(&a1).unwrap();
        board.confirm(&a1, Vote::Add).unwrap();

        let b2: BTreeSet<SiteId> = [SiteId::from("b2")].into_iter().collect();
        let since = board.revision();
        board.apply_snapshot(&b2, &BTreeSet::new(), since);

        assert_eq!(board.state(&a1), Some(VoteState::Upvoted));
        assert_eq!(board.state(&"b2".into()), Some(VoteState::Unvoted));
    }

    #[test]
    fn snapshot_older_than_a_confirmed_vote_is_ignored() {
        let mut board = board(&["a1", "b2"]);
        let a1 = SiteId::from("a1");
        let since = board.revision();

        board.begin(&a1).unwrap();
        board.confirm(&a1, Vote::Add).unwrap();
        assert!(board.revision() > since);

        // Fetched before the vote landed: nobody upvoted anything.
        let sites = board.site_ids();
        board.apply_snapshot(&sites, &BTreeSet::new(), since);

        assert_eq!(board.state(&a1), Some(VoteState::Upvoted));
        assert_eq!(board.get(&a1).unwrap().next_vote(), Vote::Remove);
        assert_eq!(board.state(&"b2".into()), Some(VoteState::Unvoted));

        // A snapshot fetched after the vote applies normally.
        let since = board.revision();
        board.apply_snapshot(&sites, &BTreeSet::new(), since);
        assert_eq!(board.state(&a1), Some(VoteState::Unvoted));
    }
}
