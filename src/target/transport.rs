use crate::core::{Result, SyncError};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::fmt;

/// Public messaging endpoint of the target platform.
pub const DEFAULT_ENDPOINT: &str = "https://sna.etapestry.com/v3messaging/service";

/// Fault reported by the remote procedure layer or its transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcFault {
    pub code: String,
    pub message: String,
}

impl RpcFault {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RpcFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Remote procedure calls against the target platform.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: JsonValue) -> std::result::Result<JsonValue, RpcFault>;

    /// Point later calls at another endpoint, as instructed by the login reply.
    fn redirect(&mut self, endpoint: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: JsonValue,
    #[serde(default)]
    fault: Option<FaultBody>,
}

#[derive(Debug, Deserialize)]
struct FaultBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// JSON envelope transport: posts `{method, params}` and reads `{result}` or `{fault}`.
///
/// Session cookies set by the login call are kept for the client's lifetime.
pub struct HttpRpcTransport {
    http: Client,
    endpoint: Url,
}

impl HttpRpcTransport {
    pub fn new(endpoint: Option<&str>) -> Result<Self> {
        let endpoint = parse_endpoint(endpoint.unwrap_or(DEFAULT_ENDPOINT))?;
        let http = Client::builder().cookie_store(true).build()?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn parse_endpoint(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| SyncError::Config(format!("Invalid target endpoint '{}': {}", raw, e)))
}

#[async_trait]
impl RpcTransport for HttpRpcTransport {
    async fn call(&self, method: &str, params: JsonValue) -> std::result::Result<JsonValue, RpcFault> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&json!({ "method": method, "params": params }))
            .send()
            .await
            .map_err(|e| RpcFault::new("transport", e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RpcFault::new("transport", e.to_string()))?;
        if !status.is_success() {
            return Err(RpcFault::new(format!("http-{}", status.as_u16()), body));
        }

        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|e| RpcFault::new("protocol", format!("{}: {}", e, body)))?;
        match envelope.fault {
            Some(fault) => Err(RpcFault::new(fault.code, fault.message)),
            None => Ok(envelope.result),
        }
    }

    fn redirect(&mut self, endpoint: &str) -> Result<()> {
        self.endpoint = parse_endpoint(endpoint)?;
        Ok(())
    }
}
