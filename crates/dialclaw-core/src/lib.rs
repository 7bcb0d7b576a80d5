//! # DialClaw Core
//!
//! Shared foundation for the DialClaw campaign runner: domain types
//! (campaigns, leads, cadence templates, progress records), the
//! configuration system, the crate-wide error type, and the
//! collaborator traits the cadence engine is written against.
//!
//! The engine never talks to SQLite or the voice API directly — it goes
//! through `traits::{LeadStore, CampaignStore, ProgressStore,
//! ActivityStore, CallDispatcher}`, so stores and dispatchers can be
//! swapped out in tests.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::DialClawConfig;
pub use error::{DialClawError, Result};
