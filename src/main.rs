//! Process entry point: loads configuration, initializes logging, builds
//! the shared [`Sfu`] instance, and hosts the signalling WebSocket plus
//! the operational HTTP surface described in §6.

mod api;
mod auth;
mod conf;
mod error;
mod log;
mod media;
mod sfu;
mod signalling;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};

use crate::conf::Conf;
use crate::error::FatalError;
use crate::sfu::Sfu;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("fatal: {err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), FatalError> {
    let conf = Conf::load()?;
    let _log_guard = log::init(&conf.server.log_level)?;

    slog_scope::info!(
        "starting sfu";
        "bind" => format!("{}:{}", conf.server.bind_ip, conf.server.bind_port),
    );

    let sfu = Sfu::new(conf.clone())?;

    actix_rt::spawn(signalling::ticker::run(
        conf.sync.keyframe_interval,
        Arc::clone(&sfu.registry),
        Arc::clone(&sfu.sinks),
        Arc::clone(&sfu.synchronizer),
    ));

    let bind_ip = conf.server.bind_ip.clone();
    let bind_port = conf.server.bind_port;
    let shutdown_grace = conf.server.shutdown_grace.as_secs();

    let sfu_data = web::Data::new(sfu);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(sfu_data.clone())
            .route("/signalling", web::get().to(api::client::upgrade))
            .route("/health", web::get().to(api::rest::health))
            .route("/metrics", web::get().to(api::rest::metrics))
            .route("/rooms", web::get().to(api::rest::rooms))
    })
    .shutdown_timeout(shutdown_grace)
    .bind((bind_ip.as_str(), bind_port))
    .map_err(|source| FatalError::Bind {
        addr: format!("{bind_ip}:{bind_port}"),
        source,
    })?
    .run();

    server.await.map_err(|source| FatalError::Bind {
        addr: format!("{bind_ip}:{bind_port}"),
        source,
    })
}
