//! The SFU instance: owns every piece of shared topology state.
//!
//! Per Design Note #1, this is deliberately an explicit, constructible
//! object rather than process-wide singletons/statics, so a test (or a
//! process hosting more than one logical SFU) can own several
//! independent instances.

use std::sync::Arc;
use std::time::Instant;

use webrtc::api::API;

use crate::conf::Conf;
use crate::error::FatalError;
use crate::media;
use crate::signalling::forward_table::ForwardTable;
use crate::signalling::room_registry::RoomRegistry;
use crate::signalling::synchronizer::Synchronizer;

pub struct Sfu {
    pub conf: Conf,
    pub registry: Arc<RoomRegistry>,
    pub sinks: Arc<ForwardTable>,
    pub synchronizer: Arc<Synchronizer>,
    pub media_api: Arc<API>,
    pub started_at: Instant,
}

impl Sfu {
    pub fn new(conf: Conf) -> Result<Arc<Self>, FatalError> {
        let media_api = media::build_api()?;

        let synchronizer = Synchronizer::new(conf.sync);

        Ok(Arc::new(Self {
            registry: Arc::new(RoomRegistry::new()),
            sinks: Arc::new(ForwardTable::new()),
            synchronizer: Arc::new(synchronizer),
            media_api: Arc::new(media_api),
            started_at: Instant::now(),
            conf,
        }))
    }

    /// Requests an out-of-band Synchronizer pass, e.g. right after a
    /// join/leave/inbound-track event, rather than waiting for the
    /// periodic ticker backstop.
    pub fn request_sync(self: &Arc<Self>) {
        let sfu = Arc::clone(self);
        actix::spawn(async move {
            sfu.synchronizer.run_pass(&sfu.registry, &sfu.sinks).await;
        });
    }
}
