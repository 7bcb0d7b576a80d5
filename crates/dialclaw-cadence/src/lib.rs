//! Cadence execution for outbound-contact campaigns.
//!
//! A campaign carries an attached multi-day retry schedule (the
//! cadence template). This crate turns elapsed wall-clock time into
//! cadence days, picks the open time window with spare attempt quota,
//! contacts eligible leads through the voice provider, and records
//! every executed slot in an idempotent progress ledger.
//!
//! ```text
//!   ┌─────────┐  scan   ┌───────┐  job   ┌────────┐  pass  ┌────────┐
//!   │ trigger ├────────▶│ queue ├───────▶│ worker ├───────▶│ engine │
//!   └─────────┘ 25 min  └───────┘ retry  └────────┘        └───┬────┘
//!                                                              │
//!                                   windows · slots · day math │
//!                                   dispatch · progress ledger ▼
//! ```
//!
//! The engine is the only component with write access to campaign and
//! lead state; trigger and worker stay thin on purpose.

pub mod day;
pub mod dispatch;
pub mod engine;
pub mod guard;
pub mod queue;
pub mod slots;
pub mod trigger;
pub mod window;
pub mod worker;

pub use dispatch::VoiceApiDispatcher;
pub use engine::{CadenceEngine, EngineStore, PassOutcome, SkipReason};
pub use queue::{CadenceJob, JobQueue, QueuePolicy};
pub use trigger::CadenceTrigger;
pub use worker::spawn_worker;
