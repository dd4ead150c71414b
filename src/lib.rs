//! Commish: weekly fantasy football recaps
//!
//! Fetches one scoring week from an ESPN, Yahoo or Sleeper league, normalizes
//! it into a [`league::LeagueSnapshot`], and streams a persona-voiced recap
//! from an OpenAI-compatible chat completions endpoint.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use commish::{
//!     config::AppConfig,
//!     core::build_client,
//!     providers::{Aggregator, RawCredentials},
//!     Provider,
//! };
//!
//! # async fn example() -> commish::Result<()> {
//! let config = AppConfig::from_env();
//! let aggregator = Aggregator::new(build_client()?, config.endpoints.clone());
//! let raw = RawCredentials {
//!     league_id: Some("123456789".to_string()),
//!     ..RawCredentials::default()
//! };
//! let snapshot = aggregator.get_summary(Provider::Sleeper, &raw, None).await?;
//! println!("week {} has {} matchups", snapshot.week, snapshot.matchups.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Configuration
//!
//! Set your league ID to avoid passing it in every command:
//! ```bash
//! export COMMISH_LEAGUE_ID=123456
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod league;
pub mod moderation;
pub mod narrative;
pub mod oauth;
pub mod providers;

// Re-export commonly used types
pub use cli::types::{LeagueId, Provider, Season, TeamId, Week};
pub use error::{CommishError, Result};
