//! Application configuration, loaded from an optional YAML file and
//! layered with environment variables (the latter always win).

use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration for the SFU process.
#[derive(Clone, Debug, Deserialize)]
pub struct Conf {
    pub server: Server,
    pub auth: Auth,
    pub rpc: Rpc,
    pub sync: Sync,
}

/// Listener and logging configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    pub bind_ip: String,
    pub bind_port: u16,
    /// `slog`/`log` level filter, e.g. `"info"`, `"debug,sfu=trace"`.
    pub log_level: String,
    /// Grace period granted to in-flight media sessions on shutdown.
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
    /// Opaque connection string for durable storage; the core never
    /// interprets it, it only threads it through to whatever collaborator
    /// is configured as the durable-store client.
    #[serde(default)]
    pub durable_store_url: Option<String>,
    /// STUN server threaded into every peer's `RTCConfiguration`. TURN/STUN
    /// provisioning is an explicit Non-goal beyond this single default.
    pub stun_server: String,
}

/// JWT verification configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct Auth {
    /// Shared HMAC-SHA256 signing secret.
    pub secret: String,
}

/// Signalling liveness parameters advertised via `RpcSettings` and
/// enforced by the keepalive ticker (C6).
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Rpc {
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub ping_interval: Duration,
}

/// Synchronizer (C5) and keyframe ticker (C6) tuning.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Sync {
    #[serde(with = "humantime_serde")]
    pub keyframe_interval: Duration,
    pub retry_max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
}

impl Conf {
    /// Loads configuration from `config.yaml` (if present, relative to the
    /// working directory) layered under `SFU__`-prefixed environment
    /// variables, falling back to the design defaults named in the spec.
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();

        let cfg = config::Config::builder()
            .set_default("server.bind_ip", "0.0.0.0")?
            .set_default("server.bind_port", 8080)?
            .set_default("server.log_level", "info")?
            .set_default("server.shutdown_grace", "10s")?
            .set_default("server.stun_server", "stun:stun.l.google.com:19302")?
            .set_default("auth.secret", "")?
            .set_default("rpc.idle_timeout", "30s")?
            .set_default("rpc.ping_interval", "15s")?
            .set_default("sync.keyframe_interval", "3s")?
            .set_default("sync.retry_max_attempts", 10)?
            .set_default("sync.retry_base_delay", "20ms")?
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("SFU")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_with_defaults_when_no_file_or_env_present() {
        let conf = Conf::load().expect("defaults alone must be sufficient");
        assert_eq!(conf.server.bind_port, 8080);
        assert_eq!(conf.rpc.idle_timeout, Duration::from_secs(30));
        assert_eq!(conf.sync.keyframe_interval, Duration::from_secs(3));
        assert_eq!(conf.sync.retry_max_attempts, 10);
    }
}
