//! The turn engine: drives one assistant turn end-to-end from a stored
//! pending turn to a terminal status, broadcasting SSE-shaped events as it
//! goes and letting a reconnecting client catch up without gaps.
//!
//! Five pieces, built bottom-up: the [`accumulator`] folds provider deltas
//! into blocks, the [`hub`] fans a turn's events out to subscribers and
//! guards the persist/clear race, the [`registry`] tracks one hub per live
//! turn, [`catchup`] replays a persisted turn for a reconnecting client, and
//! [`executor`] ties all of it to the store and provider registry.

pub mod accumulator;
pub mod cancel;
pub mod catchup;
pub mod event;
pub mod executor;
pub mod hub;
pub mod registry;

pub use accumulator::{BlockAccumulator, DeltaOutcome};
pub use cancel::{CancelRegistry, CancelToken};
pub use catchup::{
    build_plan, catchup_event, catchup_events, serialize_block, serialize_blocks, Abandoned,
    CatchupPlan,
};
pub use event::TurnEvent;
pub use executor::TurnExecutor;
pub use hub::{Envelope, HubSnapshot, HubStatus, StreamHub};
pub use registry::StreamRegistry;
