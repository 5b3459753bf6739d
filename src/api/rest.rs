//! Operational HTTP surface (§6): `/health`, `/metrics`, `/rooms`. Every
//! value is read live off the `Sfu` instance's registry/forward-table —
//! no placeholder counters (§9's "do not copy the placeholder behavior"
//! open question).

use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use serde::Serialize;

use crate::sfu::Sfu;

#[derive(Serialize)]
struct Health {
    status: &'static str,
    message: &'static str,
    timestamp: String,
    peers: usize,
}

pub async fn health(sfu: web::Data<Arc<Sfu>>) -> impl Responder {
    HttpResponse::Ok().json(Health {
        status: "ok",
        message: "serving",
        timestamp: Utc::now().to_rfc3339(),
        peers: sfu.registry.peer_count(),
    })
}

/// Richer than the bare four fields §6 names, per §2.2's supplemented
/// per-component gauges.
#[derive(Serialize)]
struct Metrics {
    active_connections: usize,
    total_rooms: usize,
    total_peers: usize,
    total_sinks: usize,
    uptime: u64,
}

pub async fn metrics(sfu: web::Data<Arc<Sfu>>) -> impl Responder {
    HttpResponse::Ok().json(Metrics {
        active_connections: sfu.registry.peer_count(),
        total_rooms: sfu.registry.room_count(),
        total_peers: sfu.registry.peer_count(),
        total_sinks: sfu.sinks.len(),
        uptime: sfu.started_at.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
struct RoomSummary {
    room_id: String,
    peer_count: usize,
}

/// Bare array of every room's id and peer count, e.g.
/// `[{"room_id":"r1","peer_count":1}]`. The room-level totals `/metrics`
/// already reports aren't repeated here; a caller wanting them can sum
/// this array or hit `/metrics` directly.
pub async fn rooms(sfu: web::Data<Arc<Sfu>>) -> impl Responder {
    let rooms: Vec<_> = sfu
        .registry
        .snapshot()
        .into_iter()
        .map(|(id, peer_count)| RoomSummary {
            room_id: id.0,
            peer_count,
        })
        .collect();

    HttpResponse::Ok().json(rooms)
}
