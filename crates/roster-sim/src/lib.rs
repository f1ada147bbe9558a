//! roster-sim: seeded simulation of the roster collection and bulk-mutation
//! layer against an in-memory backend with injected latency and failures.
//!
//! Each seed drives the real [`roster_core`] components through the races an
//! admin UI produces (typing bursts, racing sort clicks, parent switches on
//! dependent lookups, cross-page bulk tag replaces, teardown mid-flight)
//! on a paused tokio clock, then checks the outcome with [`oracle`].
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` for harness failures; invariant
//!   violations are data, see [`oracle::InvariantViolation`].
//! - **Logging**: `tracing` macros.

pub mod backend;
pub mod campaign;
pub mod faults;
pub mod oracle;
pub mod rng;
pub mod scenario;

pub use campaign::{CampaignConfig, CampaignReport, SeedFailure, replay_seed, run_campaign};
pub use scenario::{ScenarioConfig, ScenarioReport, run_scenario};
