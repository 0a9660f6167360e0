//! In-process stand-in for the voting server.
//!
//! Speaks the same wire contract as the real `id/`, `vote/` and `votes/`
//! handlers, keeping voters and votes in memory. Tests can switch it into
//! failure modes and inspect how often each endpoint was hit.

use axum::{
    extract::{Form, State},
    http::StatusCode,
    routing::post,
    Router,
};
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tenkb_vote::ClientConfig;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

/// How the fake answers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Mode {
    /// Behave like the real server.
    #[default]
    Normal,
    /// Answer every request with `{code: 500, status}`.
    Reject(String),
    /// Answer every request with a body that is not JSON.
    Garbage,
}

/// Shared state of the fake server.
#[derive(Debug, Default)]
pub struct FakeState {
    voters: Mutex<HashSet<String>>,
    votes: Mutex<HashSet<(String, String)>>,
    hits: Mutex<HashMap<&'static str, usize>>,
    mode: Mutex<Mode>,
    vote_delay: Mutex<Duration>,
}

impl FakeState {
    /// Number of requests an endpoint (`"id"`, `"vote"`, `"votes"`) received.
    pub fn hits(&self, endpoint: &str) -> usize {
        self.hits
            .lock()
            .unwrap()
            .get(endpoint)
            .copied()
            .unwrap_or(0)
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// Hold every `vote/` answer back for `delay`.
    pub fn set_vote_delay(&self, delay: Duration) {
        *self.vote_delay.lock().unwrap() = delay;
    }

    /// Whether `voter` currently upvotes `site`.
    pub fn has_vote(&self, voter: &str, site: &str) -> bool {
        self.votes
            .lock()
            .unwrap()
            .contains(&(voter.to_string(), site.to_string()))
    }

    /// Register a voter with existing upvotes.
    pub fn seed_voter(&self, voter: &str, sites: &[&str]) {
        self.voters.lock().unwrap().insert(voter.to_string());
        let mut votes = self.votes.lock().unwrap();
        for site in sites {
            votes.insert((voter.to_string(), site.to_string()));
        }
    }

    fn hit(&self, endpoint: &'static str) -> Mode {
        *self.hits.lock().unwrap().entry(endpoint).or_insert(0) += 1;
        self.mode.lock().unwrap().clone()
    }
}

type Reply = (StatusCode, String);

fn json_reply(status: StatusCode, body: Value) -> Reply {
    (status, body.to_string())
}

fn failure(status: &str) -> Reply {
    json_reply(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "code": 500, "status": status }),
    )
}

fn forced(mode: Mode) -> Option<Reply> {
    match mode {
        Mode::Normal => None,
        Mode::Reject(status) => Some(failure(&status)),
        Mode::Garbage => Some((
            StatusCode::BAD_GATEWAY,
            "<html><body>502 Bad Gateway</body></html>".to_string(),
        )),
    }
}

/// Build the router for the fake server.
pub fn router(state: Arc<FakeState>) -> Router {
    Router::new()
        .route("/id/", post(id))
        .route("/vote/", post(vote))
        .route("/votes/", post(votes))
        .with_state(state)
}

async fn id(State(state): State<Arc<FakeState>>) -> Reply {
    if let Some(reply) = forced(state.hit("id")) {
        return reply;
    }

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    let voter_id = hex::encode(bytes);

    state.voters.lock().unwrap().insert(voter_id.clone());
    info!("issued voter id {voter_id}");

    json_reply(
        StatusCode::OK,
        json!({ "code": 200, "status": "OK", "voter_id": voter_id }),
    )
}

#[derive(Debug, Deserialize)]
struct VoteRequest {
    voter_id: String,
    site_id: String,
    vote: i64,
}

async fn vote(State(state): State<Arc<FakeState>>, Form(req): Form<VoteRequest>) -> Reply {
    let mode = state.hit("vote");

    let delay = *state.vote_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    if let Some(reply) = forced(mode) {
        return reply;
    }

    if !(0..=1).contains(&req.vote) {
        return failure("invalid vote");
    }

    if !state.voters.lock().unwrap().contains(&req.voter_id) {
        return failure("unknown voter");
    }

    let key = (req.voter_id, req.site_id);
    let mut votes = state.votes.lock().unwrap();
    if req.vote == 0 {
        votes.remove(&key);
    } else {
        votes.insert(key);
    }

    json_reply(StatusCode::OK, json!({ "code": 200, "status": "OK" }))
}

#[derive(Debug, Deserialize)]
struct VotesRequest {
    voter_id: String,
    site_ids: String,
}

async fn votes(State(state): State<Arc<FakeState>>, Form(req): Form<VotesRequest>) -> Reply {
    if let Some(reply) = forced(state.hit("votes")) {
        return reply;
    }

    let votes = state.votes.lock().unwrap();
    let site_ids: Vec<&str> = req
        .site_ids
        .split(',')
        .filter(|site| votes.contains(&(req.voter_id.clone(), site.to_string())))
        .collect();

    json_reply(
        StatusCode::OK,
        json!({ "code": 200, "status": "OK", "site_ids": site_ids }),
    )
}

/// Fake server bound to an ephemeral loopback port.
pub struct FakeServer {
    addr: SocketAddr,
    state: Arc<FakeState>,
    handle: JoinHandle<()>,
}

impl FakeServer {
    /// Bind and start serving.
    pub async fn start() -> std::io::Result<Self> {
        let state = Arc::new(FakeState::default());
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let app = router(state.clone());
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("fake server stopped: {e}");
            }
        });

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    pub fn state(&self) -> &FakeState {
        &self.state
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Client config pointed at this server.
    pub fn config(&self, identity_path: &Path) -> ClientConfig {
        ClientConfig {
            identity_path: identity_path.to_path_buf(),
            timeout: Some(Duration::from_secs(5)),
            ..ClientConfig::default()
        }
        .with_base_url(&self.base_url())
        .expect("loopback url is valid")
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
