//! HTTPS client for the language server's local Connect API.

use serde_json::{Value, json};
use std::time::Duration;
use ureq::Agent;
use ureq::tls::TlsConfig;

pub const USER_STATUS_PATH: &str = "/exa.language_server_pb.LanguageServerService/GetUserStatus";
pub const UNLEASH_DATA_PATH: &str =
    "/exa.language_server_pb.LanguageServerService/GetUnleashData";
const PROTOCOL_VERSION_HEADER: &str = "Connect-Protocol-Version";
const CSRF_HEADER: &str = "X-Codeium-Csrf-Token";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Authenticated JSON calls against a local port.
///
/// Every failure (refused connection, timeout, error status, non-JSON body)
/// collapses into `None`.
pub trait Transport {
    fn call(&self, port: u16, path: &str, csrf_token: &str, body: &Value) -> Option<Value>;
}

pub struct QuotaClient {
    agent: Agent,
}

impl QuotaClient {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        // The server is always 127.0.0.1 with a self-signed certificate
        let tls = TlsConfig::builder().disable_verification(true).build();
        let config = Agent::config_builder()
            .tls_config(tls)
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: Agent::new_with_config(config),
        }
    }
}

impl Default for QuotaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for QuotaClient {
    fn call(&self, port: u16, path: &str, csrf_token: &str, body: &Value) -> Option<Value> {
        let url = format!("https://127.0.0.1:{port}{path}");
        let mut response = match self
            .agent
            .post(&url)
            .header("Content-Type", "application/json")
            .header(PROTOCOL_VERSION_HEADER, "1")
            .header(CSRF_HEADER, csrf_token)
            .send_json(body)
        {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(port, path, error = %e, "request failed");
                return None;
            }
        };

        match response.body_mut().read_json::<Value>() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!(port, path, error = %e, "response is not JSON");
                None
            }
        }
    }
}

/// Lightweight probe: does this port speak the language server API?
pub fn ping(transport: &dyn Transport, port: u16, csrf_token: &str) -> bool {
    transport
        .call(
            port,
            UNLEASH_DATA_PATH,
            csrf_token,
            &json!({ "wrapper_data": {} }),
        )
        .is_some()
}

/// Fetch the raw `GetUserStatus` response.
pub fn get_user_status(transport: &dyn Transport, port: u16, csrf_token: &str) -> Option<Value> {
    transport.call(port, USER_STATUS_PATH, csrf_token, &json!({}))
}
