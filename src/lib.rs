//! Collaborator discovery and ranking.
//!
//! Fuses calendar, chat, and file-sharing payloads into a ranked list of a
//! user's actual collaborators: identities are reconciled across sources,
//! system accounts filtered out, interactions weighted by meeting context
//! and decayed by age, and quiet relationships annotated with dormancy
//! tiers. Pure computation over already-fetched JSON — no network, no
//! provider credentials.
//!
//! ```no_run
//! use collabradar::{Engine, EngineConfig, EnginePayloads, RunOptions, UserIdentity};
//!
//! # fn main() -> Result<(), collabradar::EngineError> {
//! let engine = Engine::new(EngineConfig::default())?;
//! let payloads = EnginePayloads {
//!     user: UserIdentity {
//!         id: None,
//!         email: "me@example.com".into(),
//!         display_name: None,
//!     },
//!     calendar: None,
//!     chat: None,
//!     file_shares: None,
//! };
//! let result = engine.run(&payloads, &RunOptions::default())?;
//! println!("{} active collaborators", result.active.len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod dormancy;
pub mod engine;
pub mod error;
pub mod extract;
pub mod filter;
pub mod identity;
mod migrations;
pub mod payload;
pub mod ranking;
pub mod scoring;
pub mod types;

pub use cache::CacheDb;
pub use config::{DormancyThresholds, EngineConfig, Weights};
pub use engine::{Engine, RunOptions};
pub use error::{CacheError, EngineError, Warning, WarningKind};
pub use payload::{EnginePayloads, UserIdentity};
pub use types::{
    DormancyAnnotation, DormancyStatus, PersonKey, PersonScore, RankedEntry, RankedResult,
};
