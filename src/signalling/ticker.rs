//! Keyframe / keepalive ticker (C6).
//!
//! Every `keyframe_interval` the ticker walks all active peers and
//! issues a PLI to each of their inbound video tracks, bounding how long
//! a newly subscribed peer waits before it can decode (§4.6). It also
//! re-runs the Synchronizer as a backstop, covering any trigger that
//! otherwise raced a topology change (join/leave/track observed already
//! call `run_pass` directly; this is belt-and-suspenders).
//!
//! Per-connection ping/pong liveness (§4.6's `I_p`/`D_p`) is enforced by
//! each peer's own actor via `actix`'s heartbeat idiom, not here: it is
//! inherently per-mailbox state, not global topology.

use std::sync::Arc;
use std::time::Duration;

use crate::signalling::forward_table::ForwardTable;
use crate::signalling::room_registry::RoomRegistry;
use crate::signalling::synchronizer::Synchronizer;

/// Runs the keyframe/keepalive loop until the process shuts down.
/// Intended to be spawned once as a background `tokio` task.
pub async fn run(
    interval: Duration,
    registry: Arc<RoomRegistry>,
    sinks: Arc<ForwardTable>,
    synchronizer: Arc<Synchronizer>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; skip it so we don't solicit
    // keyframes before anyone has had a chance to publish.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        for room_id in registry.room_ids() {
            for peer in registry.peers_in(&room_id, None) {
                if peer.is_closed() {
                    continue;
                }
                peer.media.request_keyframes().await;
            }
        }

        synchronizer.run_pass(&registry, &sinks).await;
    }
}
