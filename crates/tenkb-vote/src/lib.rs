//! 10kb Club voting client
//!
//! Anonymous community voting for the sites listed in the directory. A page
//! embeds one [`VoteClient`], which:
//!
//! - keeps a single anonymous voter id across sessions, issued by the server
//!   the first time the visitor votes
//! - hydrates every listed site's vote state with one bulk request on load
//! - toggles a site's vote, committing the new state only after the server
//!   confirms it
//!
//! # Architecture
//!
//! - **Identity**: [`IdentityStore`] persistence and lazy issuance
//! - **State**: per-site `unvoted`/`upvoted` state machine ([`VoteBoard`])
//! - **Hydrate**: page-load bulk fetch ([`Hydrator`])
//! - **Transport**: the `id/`, `vote/` and `votes/` endpoints ([`VoteTransport`])
//!
//! # Example
//!
//! ```no_run
//! use tenkb_vote::{ClientConfig, VoteClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::from_env()?;
//!     tenkb_vote::logging::init(config.log_level);
//!
//!     let client = VoteClient::from_config(&config)?;
//!     client.hydrate(["17", "42"]).await;
//!     client.toggle(&"42".into()).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod hydrate;
pub mod identity;
pub mod logging;
pub mod models;
pub mod state;
pub mod transport;
pub mod wire;

pub use client::{LogNotifier, Notifier, VoteClient};
pub use config::{ClientConfig, LogLevel};
pub use error::{Error, ErrorKind, Result};
pub use hydrate::{HydrationReport, Hydrator};
pub use identity::{FileIdentityStore, IdentityProvider, IdentityStore, MemoryIdentityStore};
pub use models::{SiteId, Vote, VoteState, VoterId};
pub use state::{SiteControl, VoteBoard};
pub use transport::{HttpTransport, VoteTransport};
