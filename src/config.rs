use crate::service::TransitionPolicy;

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    /// PostgreSQL URL. Unset = in-memory store (development only).
    pub database_url: Option<String>,
    /// Managed relay connection string. Unset = in-process relay.
    pub relay_connection_string: Option<String>,
    pub relay_hub: String,
    /// Lifetime of negotiated client tokens, in minutes.
    pub relay_token_ttl_minutes: i64,
    pub transition_policy: TransitionPolicy,
    /// Browser origin allowed by CORS in addition to localhost.
    pub dashboard_origin: String,
}

impl Config {
    pub fn relay_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.relay_token_ttl_minutes)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: None,
            relay_connection_string: None,
            relay_hub: "approval".into(),
            relay_token_ttl_minutes: 60,
            transition_policy: TransitionPolicy::default(),
            dashboard_origin: "http://localhost:3000".into(),
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build the config from any key lookup (the process env in production).
pub fn from_lookup<F>(get: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();
    let non_empty = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let database_url = non_empty("DATABASE_URL");
    let relay_connection_string = non_empty("RELAY_CONNECTION_STRING");

    let env_mode = get("APPROVALS_ENV")
        .or_else(|| get("RUST_ENV"))
        .unwrap_or_default();
    if env_mode == "production" {
        if database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set in production; the in-memory store loses data on restart.");
        }
        if relay_connection_string.is_none() {
            anyhow::bail!("RELAY_CONNECTION_STRING must be set in production; the in-process relay has no network clients.");
        }
    }

    let transition_policy = match non_empty("APPROVALS_TRANSITION_POLICY") {
        Some(v) => v.parse()?,
        None => defaults.transition_policy,
    };

    let relay_token_ttl_minutes = non_empty("RELAY_TOKEN_TTL_MINUTES")
        .and_then(|v| v.parse().ok())
        .filter(|m: &i64| *m > 0)
        .unwrap_or(defaults.relay_token_ttl_minutes);

    Ok(Config {
        port: non_empty("APPROVALS_PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port),
        database_url,
        relay_connection_string,
        relay_hub: non_empty("RELAY_HUB").unwrap_or(defaults.relay_hub),
        relay_token_ttl_minutes,
        transition_policy,
        dashboard_origin: non_empty("DASHBOARD_ORIGIN").unwrap_or(defaults.dashboard_origin),
    })
}
