// Gateway configuration, read from the environment (after `.env` loading in main).

use std::time::Duration;

use crate::mcp::sse::HEARTBEAT_INTERVAL;
use crate::upstream::{Credential, ServiceConfig};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub issue_tracker: ServiceConfig,
    pub wiki: ServiceConfig,
    pub heartbeat_interval: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut missing = Vec::new();

        let issue_tracker = service_config("JIRA", &get, &mut missing);
        let wiki = service_config("CONFLUENCE", &get, &mut missing);

        let port = match get("PORT") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid { var: "PORT", value: v })?,
            None => DEFAULT_PORT,
        };
        let heartbeat_interval = match get("SSE_HEARTBEAT_SECS") {
            Some(v) => match v.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::Invalid { var: "SSE_HEARTBEAT_SECS", value: v }),
            },
            None => HEARTBEAT_INTERVAL,
        };

        match (issue_tracker, wiki) {
            (Some(issue_tracker), Some(wiki)) if missing.is_empty() => Ok(Self {
                host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port,
                issue_tracker,
                wiki,
                heartbeat_interval,
            }),
            _ => Err(ConfigError::Missing(missing)),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `{PREFIX}_URL` plus either `{PREFIX}_PERSONAL_TOKEN` or
/// `{PREFIX}_USERNAME` (alias `{PREFIX}_EMAIL`) + `{PREFIX}_API_TOKEN`.
fn service_config(
    prefix: &str,
    get: &dyn Fn(&str) -> Option<String>,
    missing: &mut Vec<String>,
) -> Option<ServiceConfig> {
    let url = get(&format!("{prefix}_URL"));
    if url.is_none() {
        missing.push(format!("{prefix}_URL"));
    }

    let credential = match (
        get(&format!("{prefix}_PERSONAL_TOKEN")),
        get(&format!("{prefix}_USERNAME")).or_else(|| get(&format!("{prefix}_EMAIL"))),
        get(&format!("{prefix}_API_TOKEN")),
    ) {
        (Some(token), _, _) => Some(Credential::Token(token)),
        (None, Some(username), Some(api_token)) => Some(Credential::Basic { username, api_token }),
        _ => {
            missing.push(format!(
                "{prefix}_PERSONAL_TOKEN or ({prefix}_USERNAME and {prefix}_API_TOKEN)"
            ));
            None
        }
    };

    let ssl_verify = get(&format!("{prefix}_SSL_VERIFY"))
        .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "false" | "0" | "no"))
        .unwrap_or(true);

    Some(ServiceConfig::new(url?, credential?, ssl_verify))
}
