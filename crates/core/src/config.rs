//! Coordination-layer configuration loaded from environment variables.
//!
//! All fields have defaults suitable for local development. In production,
//! override via environment variables (the worker binary loads a `.env`
//! file first via `dotenvy`).

use std::time::Duration;

/// Default bound on name-reservation attempts for one join request.
const DEFAULT_NAME_MAX_ATTEMPTS: u32 = 20;
/// Default participant-name reservation TTL: 24 hours, comfortably above a
/// typical session so the TTL only acts as an abandonment backstop.
const DEFAULT_NAME_TTL_SECS: u64 = 86_400;
/// Default grace period before an active-recording lock may be reclaimed.
const DEFAULT_LOCK_GC_GRACE_SECS: u64 = 300;
/// Default egress age after which a recording is suspected stale.
const DEFAULT_STALE_RECORDING_GRACE_SECS: u64 = 600;

/// Configuration for the coordination layer and its GC jobs.
#[derive(Debug, Clone)]
pub struct CoordinationConfig {
    /// Key-value store address (default: `redis://127.0.0.1:6379`).
    pub redis_url: String,
    /// Media server base URL (default: `http://127.0.0.1:7880`).
    pub livekit_url: String,
    /// Media server API key used to sign access tokens.
    pub livekit_api_key: String,
    /// Media server API secret used to sign access tokens.
    pub livekit_api_secret: String,
    /// Base URL of the control-plane recordings API, when the worker should
    /// also run the stale-recording sweep (default: unset, sweep disabled).
    pub recordings_api_url: Option<String>,
    /// Bound on reservation attempts per join request (default: `20`).
    pub name_max_attempts: u32,
    /// Name reservation TTL (default: 24h).
    pub name_ttl: Duration,
    /// Minimum age before an active-recording lock is considered for
    /// reclamation (default: 5m).
    pub lock_gc_grace: Duration,
    /// Egress idle age after which a recording is suspected stale
    /// (default: 10m).
    pub stale_recording_grace: Duration,
    /// Schedule for the orphaned-lock sweep: interval seconds or a cron
    /// expression (default: `600`).
    pub lock_gc_schedule: String,
    /// Schedule for the stale-recording sweep: interval seconds or a cron
    /// expression (default: `900`).
    pub stale_gc_schedule: String,
}

impl CoordinationConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                  |
    /// |-------------------------------|--------------------------|
    /// | `REDIS_URL`                   | `redis://127.0.0.1:6379` |
    /// | `LIVEKIT_URL`                 | `http://127.0.0.1:7880`  |
    /// | `LIVEKIT_API_KEY`             | `devkey`                 |
    /// | `LIVEKIT_API_SECRET`          | `secret`                 |
    /// | `RECORDINGS_API_URL`          | -- (unset)               |
    /// | `NAME_MAX_ATTEMPTS`           | `20`                     |
    /// | `NAME_TTL_SECS`               | `86400`                  |
    /// | `LOCK_GC_GRACE_SECS`          | `300`                    |
    /// | `STALE_RECORDING_GRACE_SECS`  | `600`                    |
    /// | `LOCK_GC_SCHEDULE`            | `600`                    |
    /// | `STALE_GC_SCHEDULE`           | `900`                    |
    ///
    /// # Panics
    ///
    /// Panics if a numeric variable is set but does not parse.
    pub fn from_env() -> Self {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let livekit_url =
            std::env::var("LIVEKIT_URL").unwrap_or_else(|_| "http://127.0.0.1:7880".into());
        let livekit_api_key = std::env::var("LIVEKIT_API_KEY").unwrap_or_else(|_| "devkey".into());
        let livekit_api_secret =
            std::env::var("LIVEKIT_API_SECRET").unwrap_or_else(|_| "secret".into());
        let recordings_api_url = std::env::var("RECORDINGS_API_URL")
            .ok()
            .filter(|s| !s.is_empty());

        let name_max_attempts: u32 = env_parsed("NAME_MAX_ATTEMPTS", DEFAULT_NAME_MAX_ATTEMPTS);
        let name_ttl = Duration::from_secs(env_parsed("NAME_TTL_SECS", DEFAULT_NAME_TTL_SECS));
        let lock_gc_grace =
            Duration::from_secs(env_parsed("LOCK_GC_GRACE_SECS", DEFAULT_LOCK_GC_GRACE_SECS));
        let stale_recording_grace = Duration::from_secs(env_parsed(
            "STALE_RECORDING_GRACE_SECS",
            DEFAULT_STALE_RECORDING_GRACE_SECS,
        ));

        let lock_gc_schedule = std::env::var("LOCK_GC_SCHEDULE").unwrap_or_else(|_| "600".into());
        let stale_gc_schedule = std::env::var("STALE_GC_SCHEDULE").unwrap_or_else(|_| "900".into());

        Self {
            redis_url,
            livekit_url,
            livekit_api_key,
            livekit_api_secret,
            recordings_api_url,
            name_max_attempts,
            name_ttl,
            lock_gc_grace,
            stale_recording_grace,
            lock_gc_schedule,
            stale_gc_schedule,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Debug,
{
    match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{var} must be a valid number: {e:?}")),
        Err(_) => default,
    }
}
