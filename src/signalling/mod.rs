//! The SFU routing engine: room/track registry, per-peer state machine,
//! and the Synchronizer/ticker that keep them converged.

pub mod forward_table;
pub mod peer;
pub mod room;
pub mod room_registry;
pub mod synchronizer;
pub mod ticker;
