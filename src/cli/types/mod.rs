//! Type-safe wrappers for league identifiers, time periods and providers.

pub mod ids;
pub mod provider;
pub mod time;

pub use self::ids::{LeagueId, TeamId};
pub use self::provider::Provider;
pub use self::time::{Season, Week};
