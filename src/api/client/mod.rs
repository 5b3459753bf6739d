//! Signalling WebSocket upgrade (C1 entry point).

pub mod session;

use std::sync::Arc;

use actix_web::{error, http::header::AUTHORIZATION, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;

use crate::auth;
use crate::sfu::Sfu;

#[derive(Deserialize)]
pub struct Query {
    token: Option<String>,
}

/// Upgrades to the signalling WebSocket.
///
/// Verifies the bearer token (query parameter `token` or `Authorization:
/// Bearer` header) *before* constructing a `WsSession`, so an invalid or
/// expired token is rejected with 401 and never allocates a `Peer`,
/// `Room`, or `MediaSession` (§4.1, §8).
pub async fn upgrade(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<Query>,
    sfu: web::Data<Arc<Sfu>>,
) -> Result<HttpResponse, Error> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = auth::extract_token(query.token.as_deref(), header)
        .ok_or_else(|| error::ErrorUnauthorized("missing bearer token"))?;

    let claims = auth::verify(token, sfu.conf.auth.secret.as_bytes())
        .map_err(|_| error::ErrorUnauthorized("invalid or expired token"))?;

    ws::start(
        session::WsSession::new(Arc::clone(sfu.get_ref()), claims),
        &req,
        stream,
    )
}
